//! Big-endian bit and byte reader.
//!
//! "All multi-byte fields are stored with their most significant byte first"
//! (7.1), and bit fields are read starting from the most significant bit of
//! each byte.

use crate::error::{DecodeError, Result};

/// A reader for reading bits and bytes from a byte stream.
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    /// The position in bits.
    cur_pos: usize,
}

impl<'a> Reader<'a> {
    #[inline(always)]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, cur_pos: 0 }
    }

    /// Skip to the next byte boundary.
    #[inline(always)]
    pub(crate) fn align(&mut self) {
        let bit_pos = self.bit_pos();

        if bit_pos != 0 {
            self.cur_pos += 8 - bit_pos;
        }
    }

    #[inline(always)]
    pub(crate) fn at_end(&self) -> bool {
        self.byte_pos() >= self.data.len()
    }

    /// The number of whole bytes that haven't been touched yet.
    #[inline(always)]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.byte_pos())
    }

    /// The rest of the data, starting at the current byte.
    #[inline(always)]
    pub(crate) fn tail(&self) -> &'a [u8] {
        self.data.get(self.byte_pos()..).unwrap_or_default()
    }

    /// Read the given number of bytes. The reader must be byte-aligned.
    #[inline(always)]
    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        debug_assert_eq!(self.bit_pos(), 0);

        let bytes = self.peek_bytes(len)?;
        self.cur_pos += len * 8;

        Ok(bytes)
    }

    #[inline(always)]
    pub(crate) fn peek_bytes(&self, len: usize) -> Result<&'a [u8]> {
        let start = self.byte_pos();
        let end = start
            .checked_add(len)
            .ok_or(DecodeError::UnexpectedEndOfData)?;

        self.data
            .get(start..end)
            .ok_or(DecodeError::UnexpectedEndOfData)
    }

    #[inline(always)]
    pub(crate) fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    #[inline(always)]
    pub(crate) fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_byte()? as i8)
    }

    #[inline(always)]
    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    #[inline(always)]
    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    #[inline(always)]
    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    #[inline(always)]
    pub(crate) fn read_bit(&mut self) -> Result<u32> {
        let byte = self.cur_byte()?;
        let shift = 7 - self.bit_pos();
        self.cur_pos += 1;

        Ok(u32::from((byte >> shift) & 1))
    }

    /// Read up to 32 bits as an unsigned number, most significant bit first.
    #[inline(always)]
    pub(crate) fn read_bits(&mut self, count: u8) -> Result<u32> {
        debug_assert!(count <= 32);

        let mut value = 0_u64;
        let mut remaining = count;

        while remaining > 0 {
            let available = 8 - self.bit_pos() as u8;
            let take = remaining.min(available);
            let byte = u64::from(self.cur_byte()?);

            let bits = (byte >> (available - take)) & ((1 << take) - 1);
            value = (value << take) | bits;

            self.cur_pos += take as usize;
            remaining -= take;
        }

        Ok(value as u32)
    }

    #[inline(always)]
    pub(crate) fn byte_pos(&self) -> usize {
        self.cur_pos >> 3
    }

    #[inline(always)]
    pub(crate) fn bit_pos(&self) -> usize {
        self.cur_pos & 7
    }

    #[inline(always)]
    fn cur_byte(&self) -> Result<u8> {
        self.data
            .get(self.byte_pos())
            .copied()
            .ok_or(DecodeError::UnexpectedEndOfData)
    }
}
