//! A single-table embedded storage engine: fixed-size pages chained into
//! a doubly-linked list inside one table file, with a sibling
//! write-ahead journal file that records transactions of typed
//! operations and repairs a torn tail on open.
//!
//! This crate has no query language, no indexing, and no schema; the
//! page payload is opaque bytes to it. What it owns is the on-disk
//! table format (free-list allocation, linked-list maintenance) and
//! the journal's crash-consistency protocol (three-checkpoint fsync
//! append, tail truncation on open).

mod codec;
mod config;
mod error;
mod macros;
mod page;
mod table;
mod transaction;
mod journal;

pub use config::Config;
pub use error::{Error, Result};
pub use page::{Page, PAGE_SIZE, PAYLOAD_SIZE};
pub use table::TableFile;
pub use transaction::{OpCode, Operation, Transaction};
pub use journal::JournalFile;
