#[macro_export]
macro_rules! ydb_log (
    ($($arg:tt)+) => {
        if cfg!(log) {
            eprintln!($($arg)*);
        }
    }
);
