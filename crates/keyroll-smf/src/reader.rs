//! Bounds-checked big-endian byte reader.

use crate::error::{Error, Result};
use crate::vlq::decode_delta_time;

#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline]
    pub(crate) fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let byte = self
            .peek_u8()
            .ok_or_else(|| Error::malformed(self.pos, "unexpected end of data"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::malformed(self.pos, "length exceeds available data"));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub(crate) fn read_u16_be(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32_be(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_tag(&mut self) -> Result<[u8; 4]> {
        let bytes = self.read_bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub(crate) fn read_vlq(&mut self) -> Result<u32> {
        let (value, used) =
            decode_delta_time(&self.data[self.pos..]).map_err(|e| e.at_offset(self.pos))?;
        self.pos += used;
        Ok(value)
    }

    /// Read a variable-length byte count followed by that many bytes.
    pub(crate) fn read_vlq_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_vlq()? as usize;
        self.read_bytes(len)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_reads() {
        let mut reader = Reader::new(&[0x00, 0x06, 0x00, 0x00, 0x01, 0xE0]);
        assert_eq!(reader.read_u16_be().unwrap(), 6);
        assert_eq!(reader.read_u32_be().unwrap(), 480);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_vlq_error_offset_is_absolute() {
        let mut reader = Reader::new(&[0x00, 0x00, 0x81]);
        reader.skip(2).unwrap();
        let err = reader.read_vlq().unwrap_err();
        assert_eq!(err.offset(), Some(3));
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut reader = Reader::new(&[0x01]);
        assert!(reader.read_bytes(2).is_err());
        assert_eq!(reader.position(), 0);
    }
}
