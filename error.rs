use thiserror::Error;

/// Every fallible operation in this crate returns this alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The full error taxonomy of the engine.
///
/// Variants map 1:1 onto the `YDB_ERR_*` codes of the format this crate
/// reimplements; grouping stays flat rather than nested by subsystem
/// because callers match on a handful of these at most.
#[derive(Debug, Error)]
pub enum Error {
    #[error("table file does not exist")]
    TableNotExist,

    #[error("table file already exists")]
    TableExist,

    #[error("table file is corrupted")]
    TableDataCorrupted,

    #[error("table file version is not supported")]
    TableDataVersionMismatch,

    #[error("engine handle is not initialized")]
    EngineUninitialized,

    #[error("engine handle is already in use")]
    EngineBusy,

    #[error("engine handle is idle, nothing to operate on")]
    EngineIdle,

    #[error("page index {0} is out of range")]
    PageIndexOutOfRange(u64),

    #[error("page has not been initialized")]
    PageNotInitialized,

    #[error("page has no more free space")]
    PageNoMoreMem,

    #[error("read or write of zero bytes requested")]
    ZeroSizeRw,

    #[error("write destination buffer is absent")]
    WriteToNullptr,

    #[error("there is no next page")]
    NoMorePages,

    #[error("replace was called with the page that is already current")]
    SamePageAddress,

    #[error("transaction handle has not been initialized")]
    TransactionUninitialized,

    #[error("failed to push operation onto transaction")]
    OpPushFailed,

    #[error("operation index is out of range")]
    OpOutOfRange,

    #[error("journal handle has not been initialized")]
    JournalUninitialized,

    #[error("journal handle is already in use")]
    JournalBusy,

    #[error("journal handle is idle, nothing to operate on")]
    JournalIdle,

    #[error("journal file does not exist")]
    JournalNotExist,

    #[error("journal file already exists")]
    JournalExist,

    #[error("journal file is corrupted")]
    JournalFileCorrupted,

    #[error("journal is in an inconsistent state")]
    JournalInconsistent,

    #[error("journal has no transactions")]
    JournalEmpty,

    #[error("there is no next transaction")]
    NoMoreTransactions,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unknown error")]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
