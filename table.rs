use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::codec;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::page::{Page, PAGE_SIZE};
use crate::ydb_log;

pub const HEADER_SIZE: u64 = 30;
const VERSION_MAJOR: u8 = 1;
const VERSION_MINOR: u8 = 0;

/// Offsets within the 30-byte table file header. Named the way
/// `page::header_page_wrapper::HeaderPageWrapper` names its offset
/// constants, scaled down to this format's much smaller header.
const SIGNATURE_OFFSET: usize = 0;
const MAJOR_VERSION_OFFSET: usize = 4;
const MINOR_VERSION_OFFSET: usize = 5;
const FIRST_PAGE_OFFSET: usize = 6;
const LAST_PAGE_OFFSET: usize = 14;
const LAST_FREE_PAGE_OFFSET: usize = 22;

/// The 30-byte table file header: signature, version, and the three
/// list-head offsets. Read and rewritten as a single buffer rather than
/// field-by-field seeks, since it is tiny and always read/written whole.
struct Header {
    clean: bool,
    major: u8,
    minor: u8,
    first_page: u64,
    last_page: u64,
    last_free_page: u64,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 3].copy_from_slice(b"TBL");
        buf[SIGNATURE_OFFSET + 3] = if self.clean { b'!' } else { b'?' };
        buf[MAJOR_VERSION_OFFSET] = self.major;
        buf[MINOR_VERSION_OFFSET] = self.minor;
        codec::write_u64(&mut buf, FIRST_PAGE_OFFSET, self.first_page);
        codec::write_u64(&mut buf, LAST_PAGE_OFFSET, self.last_page);
        codec::write_u64(&mut buf, LAST_FREE_PAGE_OFFSET, self.last_free_page);
        buf
    }

    fn decode(buf: &[u8; HEADER_SIZE as usize]) -> Result<Header> {
        if &buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 3] != b"TBL" {
            return Err(Error::TableDataCorrupted);
        }
        let clean = match buf[SIGNATURE_OFFSET + 3] {
            b'!' => true,
            b'?' => false,
            _ => return Err(Error::TableDataCorrupted),
        };
        Ok(Header {
            clean,
            major: buf[MAJOR_VERSION_OFFSET],
            minor: buf[MINOR_VERSION_OFFSET],
            first_page: codec::read_u64(buf, FIRST_PAGE_OFFSET),
            last_page: codec::read_u64(buf, LAST_PAGE_OFFSET),
            last_free_page: codec::read_u64(buf, LAST_FREE_PAGE_OFFSET),
        })
    }
}

/// A single-table paged file: header plus a doubly-linked chain of fixed
/// `PAGE_SIZE` pages, with a free list of deleted pages threaded through
/// their `next_offset` fields.
///
/// Grounded on `backend::file::FileBackend` for the open/create/close
/// shape and on `ydb.c`'s `__ydb_allocate_page_and_seek`/`ydb_seek_page`
/// for the allocation and navigation algorithms.
pub struct TableFile {
    file: File,
    config: Config,
    first_page_offset: u64,
    last_page_offset: u64,
    last_free_page_offset: u64,
    current_offset: u64,
    current_index: u64,
    current_page: Page,
    closed: bool,
}

impl TableFile {
    pub fn create<P: AsRef<Path>>(path: P, config: Config) -> Result<TableFile> {
        if path.as_ref().exists() {
            return Err(Error::TableExist);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        let header = Header {
            clean: true,
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            first_page: HEADER_SIZE,
            last_page: HEADER_SIZE,
            last_free_page: 0,
        };
        file.write_all(&header.encode())?;
        file.write_all(&Page::allocate().encode())?;
        file.flush()?;
        drop(file);

        ydb_log!("table file created: {:?}", path.as_ref());
        TableFile::open(path, config)
    }

    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> Result<TableFile> {
        if !path.as_ref().exists() {
            return Err(Error::TableNotExist);
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header_buf = [0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_buf)
            .map_err(|_| Error::TableDataCorrupted)?;
        let mut header = Header::decode(&header_buf)?;
        if !header.clean {
            return Err(Error::TableDataCorrupted);
        }
        if header.major != VERSION_MAJOR {
            return Err(Error::TableDataVersionMismatch);
        }

        header.clean = false;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.flush()?;

        let mut table = TableFile {
            file,
            config,
            first_page_offset: header.first_page,
            last_page_offset: header.last_page,
            last_free_page_offset: header.last_free_page,
            current_offset: header.first_page,
            current_index: 0,
            current_page: Page::allocate(),
            closed: false,
        };
        table.read_current_page()?;
        ydb_log!("table file opened: {:?}", path.as_ref());
        Ok(table)
    }

    pub fn close(mut self) -> Result<()> {
        self.mark_clean()?;
        self.closed = true;
        Ok(())
    }

    fn mark_clean(&mut self) -> Result<()> {
        let header = Header {
            clean: true,
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            first_page: self.first_page_offset,
            last_page: self.last_page_offset,
            last_free_page: self.last_free_page_offset,
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.encode())?;
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

    fn sync_if_strict(&mut self) -> Result<()> {
        if self.config.strict_sync {
            self.file.flush()?;
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn current_page(&self) -> &Page {
        &self.current_page
    }

    pub fn tell_page(&self) -> u64 {
        self.current_index
    }

    fn read_page_at(&mut self, offset: u64) -> Result<Page> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; PAGE_SIZE];
        self.file
            .read_exact(&mut buf)
            .map_err(|_| Error::TableDataCorrupted)?;
        Ok(Page::decode(&buf))
    }

    fn write_page_at(&mut self, offset: u64, page: &Page) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page.encode())?;
        Ok(())
    }

    fn read_current_page(&mut self) -> Result<()> {
        let page = self.read_page_at(self.current_offset)?;
        self.current_page = page;
        Ok(())
    }

    pub fn next_page(&mut self) -> Result<()> {
        let next = self.current_page.next_offset;
        if next == 0 {
            return Err(Error::NoMorePages);
        }
        self.current_offset = next;
        self.current_index += 1;
        self.read_current_page()
    }

    pub fn prev_page(&mut self) -> Result<()> {
        let prev = self.current_page.prev_offset;
        if prev == 0 {
            return Err(Error::NoMorePages);
        }
        self.current_offset = prev;
        self.current_index -= 1;
        self.read_current_page()
    }

    pub fn seek_to_begin(&mut self) -> Result<()> {
        if self.current_page.prev_offset == 0 {
            return Ok(());
        }
        self.prev_page()
    }

    pub fn seek_to_end(&mut self) -> Result<()> {
        if self.current_page.next_offset == 0 {
            return Ok(());
        }
        self.next_page()
    }

    pub fn seek_by_index(&mut self, index: u64) -> Result<()> {
        let saved_offset = self.current_offset;
        let saved_index = self.current_index;
        let saved_page = self.current_page.clone();

        let result = (|| {
            if index < self.current_index {
                self.current_offset = self.first_page_offset;
                self.current_index = 0;
                self.read_current_page()?;
            }
            while self.current_index < index {
                self.next_page()?;
            }
            Ok(())
        })();

        if result.is_err() {
            self.current_offset = saved_offset;
            self.current_index = saved_index;
            self.current_page = saved_page;
        }
        result
    }

    /// Allocates a page, preferring the free list; returns its file offset.
    /// On return the new page's header has already been written to disk
    /// with `prev` linked to the current last page; payload is zeroed.
    fn allocate_page(&mut self) -> Result<u64> {
        let target = if self.last_free_page_offset != 0 {
            let target = self.last_free_page_offset;
            let freed = self.read_page_at(target)?;
            self.last_free_page_offset = freed.next_offset;
            self.write_header_field(LAST_FREE_PAGE_OFFSET, self.last_free_page_offset)?;

            let mut page = Page::allocate();
            page.prev_offset = self.last_page_offset;
            self.write_page_at(target, &page)?;
            ydb_log!("allocate: reused free page at {}", target);
            target
        } else {
            let target = self.file.seek(SeekFrom::End(0))?;
            let mut page = Page::allocate();
            page.prev_offset = self.last_page_offset;
            self.write_page_at(target, &page)?;
            ydb_log!("allocate: grew file, new page at {}", target);
            target
        };

        let mut prev = self.read_page_at(self.last_page_offset)?;
        prev.next_offset = target;
        self.write_page_at(self.last_page_offset, &prev)?;
        Ok(target)
    }

    pub fn append_page(&mut self, flags: u8, row_count: u16, payload: &[u8]) -> Result<()> {
        let target = self.allocate_page()?;
        let mut page = self.read_page_at(target)?;
        page.flags = flags;
        page.row_count = row_count;
        page.payload_mut()[..payload.len()].copy_from_slice(payload);
        self.write_page_at(target, &page)?;

        self.last_page_offset = target;
        self.write_header_field(LAST_PAGE_OFFSET, target)?;
        self.sync_if_strict()?;

        self.current_offset = target;
        self.current_index += 1;
        self.read_current_page()
    }

    /// Replaces the installed current page with `page`. `None` maps to
    /// the "missing argument" case; passing back the exact page this
    /// handle already holds (by value, since Rust has no aliasable
    /// pointer identity here) maps to `SamePageAddress`.
    pub fn replace_current_page(&mut self, page: Option<Page>) -> Result<()> {
        let mut page = page.ok_or(Error::PageNotInitialized)?;
        if page == self.current_page {
            return Err(Error::SamePageAddress);
        }

        page.next_offset = self.current_page.next_offset;
        page.prev_offset = self.current_page.prev_offset;
        self.write_page_at(self.current_offset, &page)?;
        self.sync_if_strict()?;

        self.current_page = page;
        Ok(())
    }

    pub fn delete_current_page(&mut self) -> Result<()> {
        let prev_offset = self.current_page.prev_offset;
        let next_offset = self.current_page.next_offset;
        let current_offset = self.current_offset;

        if prev_offset == 0 && next_offset == 0 {
            let empty = Page::allocate();
            self.write_page_at(current_offset, &empty)?;
            self.sync_if_strict()?;
            self.current_page = empty;
            return Ok(());
        }

        let mut deleted = self.current_page.clone();
        deleted.set_deleted(true);
        deleted.next_offset = self.last_free_page_offset;
        self.write_page_at(current_offset, &deleted)?;

        if prev_offset == 0 {
            self.first_page_offset = next_offset;
            self.write_header_field(FIRST_PAGE_OFFSET, next_offset)?;
        } else {
            let mut prev = self.read_page_at(prev_offset)?;
            prev.next_offset = next_offset;
            self.write_page_at(prev_offset, &prev)?;
        }

        if next_offset == 0 {
            self.last_page_offset = prev_offset;
            self.write_header_field(LAST_PAGE_OFFSET, prev_offset)?;
        } else {
            let mut next = self.read_page_at(next_offset)?;
            next.prev_offset = prev_offset;
            self.write_page_at(next_offset, &next)?;
        }

        self.last_free_page_offset = current_offset;
        self.write_header_field(LAST_FREE_PAGE_OFFSET, current_offset)?;
        self.sync_if_strict()?;

        self.current_offset = if next_offset != 0 { next_offset } else { prev_offset };
        if next_offset == 0 {
            self.current_index -= 1;
        }
        self.read_current_page()
    }
}

impl Drop for TableFile {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.mark_clean();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fresh_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        dir.path().join(name)
    }

    #[test]
    fn create_then_open_yields_one_empty_page() {
        let dir = tempdir().unwrap();
        let path = fresh_path(&dir, "a.ydb");
        let table = TableFile::create(&path, Config::default()).unwrap();
        assert_eq!(table.tell_page(), 0);
        assert_eq!(table.current_page().row_count, 0);
        assert_eq!(table.current_page().flags, 0);

        let size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(size, HEADER_SIZE + PAGE_SIZE as u64);
        table.close().unwrap();
    }

    #[test]
    fn header_bytes_match_format() {
        let dir = tempdir().unwrap();
        let path = fresh_path(&dir, "a.ydb");
        TableFile::create(&path, Config::default()).unwrap().close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..6], b"TBL!\x01\x00");
        assert_eq!(codec::read_u64(&bytes, FIRST_PAGE_OFFSET), HEADER_SIZE);
        assert_eq!(codec::read_u64(&bytes, LAST_PAGE_OFFSET), HEADER_SIZE);
        assert_eq!(codec::read_u64(&bytes, LAST_FREE_PAGE_OFFSET), 0);
    }

    #[test]
    fn append_two_pages_and_seek() {
        let dir = tempdir().unwrap();
        let path = fresh_path(&dir, "a.ydb");
        let mut table = TableFile::create(&path, Config::default()).unwrap();

        table.append_page(0, 7, &[0x41]).unwrap();
        table.append_page(0, 9, &[0x42]).unwrap();

        table.seek_by_index(2).unwrap();
        assert_eq!(table.current_page().row_count, 9);
        assert_eq!(table.current_page().payload()[0], 0x42);
        assert_eq!(table.current_page().next_offset, 0);

        let size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(size, HEADER_SIZE + 3 * PAGE_SIZE as u64);
        table.close().unwrap();
    }

    #[test]
    fn delete_middle_and_reuse_free_list() {
        let dir = tempdir().unwrap();
        let path = fresh_path(&dir, "a.ydb");
        let mut table = TableFile::create(&path, Config::default()).unwrap();

        table.append_page(0, 0, &[0]).unwrap(); // P0 -> index 1
        table.append_page(0, 0, &[1]).unwrap(); // P1 -> index 2
        table.append_page(0, 0, &[2]).unwrap(); // P2 -> index 3

        table.seek_by_index(2).unwrap();
        let p1_offset = table.current_offset;
        table.delete_current_page().unwrap();
        assert_eq!(table.last_free_page_offset, p1_offset);

        table.seek_by_index(0).unwrap();
        table.next_page().unwrap(); // P0
        table.next_page().unwrap(); // P2 (P1 spliced out)
        assert_eq!(table.current_page().payload()[0], 2);

        table.append_page(0, 0, &[3]).unwrap(); // P3, should reuse P1's offset
        table.seek_by_index(3).unwrap();
        assert_eq!(table.current_offset, p1_offset);

        table.close().unwrap();
    }

    #[test]
    fn delete_sole_page_stays_readable_and_empty() {
        let dir = tempdir().unwrap();
        let path = fresh_path(&dir, "a.ydb");
        let mut table = TableFile::create(&path, Config::default()).unwrap();
        table.delete_current_page().unwrap();
        assert_eq!(table.current_page().row_count, 0);
        assert_eq!(table.last_free_page_offset, 0);
        table.close().unwrap();
    }

    #[test]
    fn replace_current_page_rejects_missing_and_same() {
        let dir = tempdir().unwrap();
        let path = fresh_path(&dir, "a.ydb");
        let mut table = TableFile::create(&path, Config::default()).unwrap();

        assert!(matches!(table.replace_current_page(None), Err(Error::PageNotInitialized)));

        let same = table.current_page().clone();
        assert!(matches!(table.replace_current_page(Some(same)), Err(Error::SamePageAddress)));

        let mut replacement = Page::allocate();
        replacement.row_count = 3;
        table.replace_current_page(Some(replacement)).unwrap();
        assert_eq!(table.current_page().row_count, 3);

        table.close().unwrap();
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let path = fresh_path(&dir, "missing.ydb");
        assert!(matches!(TableFile::open(&path, Config::default()), Err(Error::TableNotExist)));
    }

    #[test]
    fn create_over_existing_fails() {
        let dir = tempdir().unwrap();
        let path = fresh_path(&dir, "a.ydb");
        TableFile::create(&path, Config::default()).unwrap().close().unwrap();
        assert!(matches!(TableFile::create(&path, Config::default()), Err(Error::TableExist)));
    }
}
