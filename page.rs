use crate::error::{Error, Result};

/// Bytes of page header preceding the payload: flags(1) + next(8) + prev(8) + row_count(2).
pub const PAGE_HEADER_SIZE: usize = 19;

/// Total on-disk size of one page, header included.
pub const PAGE_SIZE: usize = 65536;

pub const PAYLOAD_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

pub const FLAG_DELETED: u8 = 0b0000_0001;

/// In-memory representation of one page: header fields plus a payload
/// buffer with a cursor for sequential byte-level read/write.
///
/// Mirrors the role `page::page::RawPage` plays in the teacher crate, but
/// the header fields are split out instead of living inside the raw byte
/// buffer, and reads/writes return `Result` instead of panicking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub flags: u8,
    pub next_offset: u64,
    pub prev_offset: u64,
    pub row_count: u16,
    payload: Vec<u8>,
    cursor: usize,
}

impl Page {
    pub fn allocate() -> Page {
        Page {
            flags: 0,
            next_offset: 0,
            prev_offset: 0,
            row_count: 0,
            payload: vec![0u8; PAYLOAD_SIZE],
            cursor: 0,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.flags & FLAG_DELETED != 0
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        if deleted {
            self.flags |= FLAG_DELETED;
        } else {
            self.flags &= !FLAG_DELETED;
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos >= PAYLOAD_SIZE {
            return Err(Error::PageIndexOutOfRange(pos as u64));
        }
        self.cursor = pos;
        Ok(())
    }

    pub fn tell(&self) -> usize {
        self.cursor
    }

    pub fn read(&mut self, dst: Option<&mut [u8]>, n: usize) -> Result<()> {
        if n == 0 {
            return Err(Error::ZeroSizeRw);
        }
        let dst = dst.ok_or(Error::WriteToNullptr)?;
        let end = self.cursor as u64 + n as u64;
        if end > PAYLOAD_SIZE as u64 {
            return Err(Error::PageIndexOutOfRange(end));
        }
        dst[..n].copy_from_slice(&self.payload[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(())
    }

    pub fn write(&mut self, src: &[u8], n: usize) -> Result<()> {
        if n == 0 {
            return Err(Error::ZeroSizeRw);
        }
        if self.cursor >= PAYLOAD_SIZE {
            return Err(Error::PageNoMoreMem);
        }
        let end = self.cursor as u64 + n as u64;
        if end > PAYLOAD_SIZE as u64 {
            return Err(Error::PageIndexOutOfRange(end));
        }
        self.payload[self.cursor..self.cursor + n].copy_from_slice(&src[..n]);
        self.cursor += n;
        Ok(())
    }

    /// Serializes header + payload into a fixed `PAGE_SIZE` buffer, LE throughout.
    pub fn encode(&self) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        buf[0] = self.flags;
        crate::codec::write_u64(&mut buf, 1, self.next_offset);
        crate::codec::write_u64(&mut buf, 9, self.prev_offset);
        crate::codec::write_u16(&mut buf, 17, self.row_count);
        buf[PAGE_HEADER_SIZE..].copy_from_slice(&self.payload);
        buf
    }

    pub fn decode(buf: &[u8; PAGE_SIZE]) -> Page {
        Page {
            flags: buf[0],
            next_offset: crate::codec::read_u64(buf, 1),
            prev_offset: crate::codec::read_u64(buf, 9),
            row_count: crate::codec::read_u16(buf, 17),
            payload: buf[PAGE_HEADER_SIZE..].to_vec(),
            cursor: 0,
        }
    }
}
