use std::path::PathBuf;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn mk_table_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(format!("{}.ydb", name))
}

#[allow(dead_code)]
pub fn mk_journal_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(format!("{}.jrnl", name))
}
