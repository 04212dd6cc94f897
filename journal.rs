use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::codec;
use crate::error::{Error, Result};
use crate::transaction::{OpCode, Operation, Transaction};
use crate::ydb_log;

pub const HEADER_SIZE: u64 = 20;
const RECORD_HEADER_SIZE: u64 = 25; // prev(8) + next(8) + timestamp(8) + flags(1)

const FIRST_OFFSET: usize = 4;
const LAST_OFFSET: usize = 12;

/// A single transaction record read back off disk, plus where it starts
/// and ends on disk (end is one byte past its `complete` operation).
struct DecodedRecord {
    prev: u64,
    next: u64,
    end: u64,
    transaction: Transaction,
}

/// Append-only log of transactions, doubly linked through `prev`/`next`
/// offsets, each terminated by a persisted `complete` operation.
///
/// Grounded on `backend::file::journal_manager::JournalManager` for the
/// open/create/checkpoint shape and on `journal.c`'s
/// `ydb_journal_append_transaction`/`__ydb_jrnl_truncate_incomplete` for
/// the fsync-checkpoint append protocol and torn-tail truncation.
pub struct JournalFile {
    file: File,
    first_offset: u64,
    last_offset: u64,
    current_offset: u64,
    current_prev: u64,
    current_next: u64,
    current_transaction: Option<Transaction>,
    closed: bool,
}

impl JournalFile {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<JournalFile> {
        if path.as_ref().exists() {
            return Err(Error::JournalExist);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(b"JRNL");
        file.write_all(&buf)?;
        file.flush()?;
        drop(file);

        ydb_log!("journal file created: {:?}", path.as_ref());
        JournalFile::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<JournalFile> {
        if !path.as_ref().exists() {
            return Err(Error::JournalNotExist);
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut buf = [0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)
            .map_err(|_| Error::JournalFileCorrupted)?;
        if &buf[0..4] != b"JRNL" {
            return Err(Error::JournalFileCorrupted);
        }
        let first_offset = codec::read_u64(&buf, FIRST_OFFSET);
        let last_offset = codec::read_u64(&buf, LAST_OFFSET);

        let mut journal = JournalFile {
            file,
            first_offset,
            last_offset,
            current_offset: first_offset,
            current_prev: 0,
            current_next: 0,
            current_transaction: None,
            closed: false,
        };
        journal.check_consistency()?;
        ydb_log!("journal file opened: {:?}", path.as_ref());
        Ok(journal)
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.file.flush()?;
        Ok(())
    }

    fn write_header_field(&mut self, offset: usize, value: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        codec::write_u64(&mut buf, 0, value);
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    fn decode_record(&mut self, offset: u64) -> Result<DecodedRecord> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; RECORD_HEADER_SIZE as usize];
        self.file
            .read_exact(&mut header)
            .map_err(|_| Error::JournalFileCorrupted)?;
        let prev = codec::read_u64(&header, 0);
        let next = codec::read_u64(&header, 8);
        let timestamp = codec::read_i64(&header, 16);
        let flags = header[24];

        let mut transaction = Transaction::new();
        transaction.timestamp = timestamp;
        transaction.flags = flags;

        let mut cursor = offset + RECORD_HEADER_SIZE;
        loop {
            let mut op_header = [0u8; 5];
            self.file.seek(SeekFrom::Start(cursor))?;
            self.file
                .read_exact(&mut op_header)
                .map_err(|_| Error::JournalFileCorrupted)?;
            let opcode = OpCode::from_u8(op_header[0]).ok_or(Error::JournalFileCorrupted)?;
            let data_size = codec::read_u32(&op_header, 1) as usize;
            cursor += 5;

            let mut data = vec![0u8; data_size];
            if data_size > 0 {
                self.file
                    .read_exact(&mut data)
                    .map_err(|_| Error::JournalFileCorrupted)?;
            }
            cursor += data_size as u64;

            if opcode == OpCode::Complete {
                break;
            }
            transaction.push_op(Operation::new(opcode, data));
        }

        Ok(DecodedRecord { prev, next, end: cursor, transaction })
    }

    /// Reads just the `prev`/`next` fields of the fixed-size record header
    /// without scanning the operation list, so a torn op list doesn't
    /// hide an otherwise-intact `prev` pointer from the caller.
    fn read_record_header(&mut self, offset: u64) -> Result<(u64, u64)> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; RECORD_HEADER_SIZE as usize];
        self.file
            .read_exact(&mut header)
            .map_err(|_| Error::JournalFileCorrupted)?;
        Ok((codec::read_u64(&header, 0), codec::read_u64(&header, 8)))
    }

    /// Walks the list from `first_offset`, decoding each record in turn,
    /// and returns the offset and contents of the last one that decodes
    /// cleanly (i.e. the last one reached before a record fails to decode,
    /// or the true tail if every record decodes). Used when the claimed
    /// tail's own fixed header can't be trusted, so its `prev` pointer
    /// can't be read off directly.
    fn find_last_complete_record(&mut self) -> Option<(u64, DecodedRecord)> {
        if self.first_offset == 0 {
            return None;
        }

        let mut offset = self.first_offset;
        let mut last_good = None;
        loop {
            match self.decode_record(offset) {
                Ok(record) => {
                    let next = record.next;
                    last_good = Some((offset, record));
                    if next == 0 {
                        break;
                    }
                    offset = next;
                }
                Err(_) => break,
            }
        }
        last_good
    }

    fn check_consistency(&mut self) -> Result<()> {
        if self.last_offset == 0 {
            return Ok(());
        }

        let last_offset = self.last_offset;
        let header = self.read_record_header(last_offset);
        let well_formed = match &header {
            Ok((_, next)) if *next == 0 => self.decode_record(last_offset).is_ok(),
            _ => false,
        };

        if well_formed {
            return Ok(());
        }

        ydb_log!("journal: torn tail detected at {}, truncating", last_offset);

        // If the tail's own fixed header read cleanly, its `prev` pointer
        // can be trusted directly. If the header itself is torn (or its
        // claimed predecessor fails to decode), `prev` isn't trustworthy
        // at all, so fall back to walking the list from the front to find
        // the true last intact record instead of assuming there is none.
        let found = match header {
            Ok((prev, _)) if prev != 0 => match self.decode_record(prev) {
                Ok(record) => Some((prev, record)),
                Err(_) => self.find_last_complete_record(),
            },
            Ok(_) => None,
            Err(_) => self.find_last_complete_record(),
        };

        match found {
            None => {
                self.first_offset = 0;
                self.last_offset = 0;
                self.write_header_field(FIRST_OFFSET, 0)?;
                self.write_header_field(LAST_OFFSET, 0)?;
                self.file.set_len(HEADER_SIZE)?;
            }
            Some((offset, record)) => {
                self.write_header_field(offset as usize + 8, 0)?; // predecessor.next = 0
                self.last_offset = offset;
                self.write_header_field(LAST_OFFSET, offset)?;
                self.file.set_len(record.end)?;
            }
        }

        self.file.flush()?;
        self.file.sync_data()?;
        self.current_offset = self.first_offset;
        Ok(())
    }

    pub fn first_offset(&self) -> u64 {
        self.first_offset
    }

    pub fn last_offset(&self) -> u64 {
        self.last_offset
    }

    pub fn current_transaction(&self) -> Option<&Transaction> {
        self.current_transaction.as_ref()
    }

    fn load(&mut self, offset: u64) -> Result<()> {
        let record = self.decode_record(offset)?;
        self.current_offset = offset;
        self.current_prev = record.prev;
        self.current_next = record.next;
        self.current_transaction = Some(record.transaction);
        Ok(())
    }

    pub fn seek_to_begin(&mut self) -> Result<()> {
        if self.first_offset == 0 {
            return Err(Error::JournalEmpty);
        }
        self.load(self.first_offset)
    }

    pub fn seek_to_end(&mut self) -> Result<()> {
        if self.last_offset == 0 {
            return Err(Error::JournalEmpty);
        }
        self.load(self.last_offset)
    }

    pub fn next_transaction(&mut self) -> Result<()> {
        if self.current_next == 0 {
            return Err(Error::NoMoreTransactions);
        }
        self.load(self.current_next)
    }

    pub fn prev_transaction(&mut self) -> Result<()> {
        if self.current_prev == 0 {
            return Err(Error::NoMoreTransactions);
        }
        self.load(self.current_prev)
    }

    /// Appends a deep clone of `transaction`, following the three-fsync
    /// checkpoint protocol: A (record discoverable), B (predecessor
    /// linked), C (op list complete).
    pub fn append(&mut self, transaction: &Transaction) -> Result<()> {
        let transaction = transaction.clone();
        let target = self.file.seek(SeekFrom::End(0))?;
        let old_last = self.last_offset;

        let mut header = [0u8; RECORD_HEADER_SIZE as usize];
        codec::write_u64(&mut header, 0, old_last);
        codec::write_u64(&mut header, 8, 0);
        codec::write_i64(&mut header, 16, transaction.timestamp);
        header[24] = transaction.flags;
        self.file.seek(SeekFrom::Start(target))?;
        self.file.write_all(&header)?;

        self.last_offset = target;
        self.write_header_field(LAST_OFFSET, target)?;
        self.file.flush()?;
        self.file.sync_data()?; // checkpoint A

        if old_last == 0 {
            self.first_offset = target;
            self.write_header_field(FIRST_OFFSET, target)?;
        } else {
            self.write_header_field(old_last as usize + 8, target)?; // predecessor.next = target
        }
        self.file.flush()?;
        self.file.sync_data()?; // checkpoint B

        let mut cursor = target + RECORD_HEADER_SIZE;
        for op in transaction.ops() {
            cursor = self.append_op(cursor, op.opcode, &op.data)?;
        }
        self.append_op(cursor, OpCode::Complete, &[])?;
        self.file.flush()?;
        self.file.sync_data()?; // checkpoint C

        self.load(target)
    }

    fn append_op(&mut self, offset: u64, opcode: OpCode, data: &[u8]) -> Result<u64> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; 5];
        header[0] = opcode as u8;
        codec::write_u32(&mut header, 1, data.len() as u32);
        self.file.write_all(&header)?;
        self.file.write_all(data)?;
        Ok(offset + 5 + data.len() as u64)
    }
}

impl Drop for JournalFile {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Operation;
    use tempfile::tempdir;

    fn sample_transaction() -> Transaction {
        let mut txn = Transaction::new();
        txn.timestamp = 1_700_000_000;
        txn.flags = 0;
        txn.push_op(Operation::new(OpCode::PageAlloc, b"ABCD".to_vec()));
        txn
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.jrnl");
        let mut journal = JournalFile::create(&path).unwrap();

        let txn = sample_transaction();
        journal.append(&txn).unwrap();

        journal.seek_to_begin().unwrap();
        let read_back = journal.current_transaction().unwrap();
        assert_eq!(read_back.timestamp, txn.timestamp);
        assert_eq!(read_back.ops_count(), 1);
        assert_eq!(read_back.op_at(0).unwrap().data, b"ABCD".to_vec());

        journal.close().unwrap();
    }

    #[test]
    fn torn_single_transaction_truncates_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.jrnl");
        let mut journal = JournalFile::create(&path).unwrap();
        journal.append(&sample_transaction()).unwrap();
        journal.close().unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();
        drop(file);

        let journal = JournalFile::open(&path).unwrap();
        assert_eq!(journal.first_offset(), 0);
        assert_eq!(journal.last_offset(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_SIZE);
    }

    #[test]
    fn torn_second_transaction_truncates_to_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.jrnl");
        let mut journal = JournalFile::create(&path).unwrap();
        journal.append(&sample_transaction()).unwrap();
        let t1_offset = journal.last_offset();
        journal.append(&sample_transaction()).unwrap();
        journal.close().unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();
        drop(file);

        let journal = JournalFile::open(&path).unwrap();
        assert_eq!(journal.last_offset(), t1_offset);
    }

    #[test]
    fn torn_fixed_header_of_second_transaction_truncates_to_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.jrnl");
        let mut journal = JournalFile::create(&path).unwrap();
        journal.append(&sample_transaction()).unwrap();
        let t1_offset = journal.last_offset();
        journal.append(&sample_transaction()).unwrap();
        let t2_offset = journal.last_offset();
        journal.close().unwrap();

        // Truncate inside T2's fixed 25-byte header itself, not just its
        // op list, so `read_record_header` on the claimed tail fails too.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(t2_offset + 10).unwrap();
        drop(file);

        let journal = JournalFile::open(&path).unwrap();
        assert_eq!(journal.first_offset(), t1_offset);
        assert_eq!(journal.last_offset(), t1_offset);
    }

    #[test]
    fn open_missing_journal_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.jrnl");
        assert!(matches!(JournalFile::open(&path), Err(Error::JournalNotExist)));
    }

    #[test]
    fn navigation_errors_at_ends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.jrnl");
        let mut journal = JournalFile::create(&path).unwrap();
        assert!(matches!(journal.seek_to_begin(), Err(Error::JournalEmpty)));

        journal.append(&sample_transaction()).unwrap();
        journal.seek_to_begin().unwrap();
        assert!(matches!(journal.next_transaction(), Err(Error::NoMoreTransactions)));
        assert!(matches!(journal.prev_transaction(), Err(Error::NoMoreTransactions)));
    }
}
