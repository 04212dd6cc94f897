use byteorder::{ByteOrder, LittleEndian};

/// Little-endian fixed-width integer access into byte slices.
///
/// Every multi-byte field this crate puts on disk passes through these
/// helpers instead of raw struct memcpy, so the wire format stays
/// independent of host byte order.
pub fn read_u16(buf: &[u8], pos: usize) -> u16 {
    LittleEndian::read_u16(&buf[pos..pos + 2])
}

pub fn write_u16(buf: &mut [u8], pos: usize, value: u16) {
    LittleEndian::write_u16(&mut buf[pos..pos + 2], value);
}

pub fn read_u32(buf: &[u8], pos: usize) -> u32 {
    LittleEndian::read_u32(&buf[pos..pos + 4])
}

pub fn write_u32(buf: &mut [u8], pos: usize, value: u32) {
    LittleEndian::write_u32(&mut buf[pos..pos + 4], value);
}

pub fn read_u64(buf: &[u8], pos: usize) -> u64 {
    LittleEndian::read_u64(&buf[pos..pos + 8])
}

pub fn write_u64(buf: &mut [u8], pos: usize, value: u64) {
    LittleEndian::write_u64(&mut buf[pos..pos + 8], value);
}

pub fn read_i64(buf: &[u8], pos: usize) -> i64 {
    LittleEndian::read_i64(&buf[pos..pos + 8])
}

pub fn write_i64(buf: &mut [u8], pos: usize, value: i64) {
    LittleEndian::write_i64(&mut buf[pos..pos + 8], value);
}
