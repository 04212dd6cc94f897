/// Tunables read once when a table or journal file is opened.
///
/// Everything the on-disk format pins (page size, header layout, opcode
/// set) stays a constant rather than a config field.
pub struct Config {
    /// Whether `TableFile` mutations (append/replace/delete) fsync before
    /// returning. The journal's three append checkpoints always fsync
    /// regardless of this flag; they are the crash-consistency contract,
    /// not a tunable.
    pub strict_sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            strict_sync: true,
        }
    }
}
