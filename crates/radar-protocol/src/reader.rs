//! Position-tracked cursor over a borrowed byte buffer.
//!
//! Every read checks bounds before advancing the position: a failing read
//! never partially consumes the buffer. All multi-byte reads are big-endian
//! except [`ByteReader::read_f32_le`], which exists only for the one
//! little-endian field in the wire protocol (see the frame parser's event-3
//! patch).

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

/// Error produced when a read would advance past the end of the buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("short read: needed {needed} byte(s) at position {pos}, {available} available")]
pub struct ReaderError {
    pub pos: usize,
    pub needed: usize,
    pub available: usize,
}

/// A cursor over a `&[u8]`. Cheap to construct and clone by copying fields;
/// never mutates the underlying buffer.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn check(&self, n: usize) -> Result<(), ReaderError> {
        if self.pos.saturating_add(n) > self.data.len() {
            Err(ReaderError {
                pos: self.pos,
                needed: n,
                available: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ReaderError> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        self.check(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, ReaderError> {
        self.check(2)?;
        let v = BigEndian::read_u16(&self.data[self.pos..]);
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32_be(&mut self) -> Result<u32, ReaderError> {
        self.check(4)?;
        let v = BigEndian::read_u32(&self.data[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64_be(&mut self) -> Result<u64, ReaderError> {
        self.check(8)?;
        let v = BigEndian::read_u64(&self.data[self.pos..]);
        self.pos += 8;
        Ok(v)
    }

    /// Signed 64-bit, reinterpreting the big-endian bit pattern.
    pub fn read_i64_be(&mut self) -> Result<i64, ReaderError> {
        Ok(self.read_u64_be()? as i64)
    }

    pub fn read_f32_be(&mut self) -> Result<f32, ReaderError> {
        self.check(4)?;
        let v = BigEndian::read_f32(&self.data[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    /// Little-endian float32. Used exactly once in the whole protocol: the
    /// position fields patched into event code 3.
    pub fn read_f32_le(&mut self) -> Result<f32, ReaderError> {
        self.check(4)?;
        let v = LittleEndian::read_f32(&self.data[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    pub fn read_f64_be(&mut self) -> Result<f64, ReaderError> {
        self.check(8)?;
        let v = BigEndian::read_f64(&self.data[self.pos..]);
        self.pos += 8;
        Ok(v)
    }

    /// Copies exactly `n` bytes out of the buffer, advancing the cursor.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ReaderError> {
        self.check(n)?;
        let v = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(v)
    }

    /// A sub-cursor over the next `len` bytes, advancing past them in the
    /// parent. Unlike [`ByteReader::slice`] this consumes the bytes from the
    /// parent cursor.
    pub fn sub_reader(&mut self, len: usize) -> Result<ByteReader<'a>, ReaderError> {
        self.check(len)?;
        let sub = ByteReader::new(&self.data[self.pos..self.pos + len]);
        self.pos += len;
        Ok(sub)
    }

    /// A cursor over up to `len` bytes from the current position, without
    /// advancing this cursor. Silently truncates to what's available.
    pub fn slice(&self, len: usize) -> ByteReader<'a> {
        let end = (self.pos + len).min(self.data.len());
        ByteReader::new(&self.data[self.pos..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_primitives_in_order() {
        let data = [0x00, 0x2Au8, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16_be().unwrap(), 0x002A);
        assert_eq!(r.read_u16_be().unwrap(), 0x0001);
        assert_eq!(r.read_u32_be().unwrap(), 0x0000_0002);
        assert_eq!(r.tell(), 8);
    }

    #[test]
    fn short_read_leaves_position_unchanged() {
        let data = [0x01u8];
        let mut r = ByteReader::new(&data);
        let before = r.tell();
        assert!(r.read_u32_be().is_err());
        assert_eq!(r.tell(), before);
    }

    #[test]
    fn le_float_used_only_for_the_one_special_field() {
        // 1.5f32 little-endian bytes
        let bytes = 1.5f32.to_le_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_f32_le().unwrap(), 1.5);
    }

    #[test]
    fn slice_truncates_silently() {
        let data = [1u8, 2, 3];
        let mut r = ByteReader::new(&data);
        r.skip(1).unwrap();
        let sub = r.slice(10);
        assert_eq!(sub.remaining(), 2);
    }

    #[test]
    fn sub_reader_consumes_from_parent() {
        let data = [1u8, 2, 3, 4];
        let mut r = ByteReader::new(&data);
        let mut sub = r.sub_reader(2).unwrap();
        assert_eq!(r.tell(), 2);
        assert_eq!(sub.read_u8().unwrap(), 1);
        assert_eq!(sub.read_u8().unwrap(), 2);
        assert!(sub.read_u8().is_err());
    }

    #[test]
    fn totality_over_a_mixed_sequence() {
        let data = [0u8; 16];
        let mut r = ByteReader::new(&data);
        let mut consumed = 0usize;
        for width in [1, 2, 4, 8, 1] {
            let before = r.tell();
            let ok = match width {
                1 => r.read_u8().map(|_| ()),
                2 => r.read_u16_be().map(|_| ()),
                4 => r.read_u32_be().map(|_| ()),
                8 => r.read_u64_be().map(|_| ()),
                _ => unreachable!(),
            };
            if ok.is_ok() {
                consumed += width;
                assert_eq!(r.tell(), before + width);
            } else {
                assert_eq!(r.tell(), before);
                break;
            }
        }
        assert_eq!(r.tell(), consumed);
    }
}
