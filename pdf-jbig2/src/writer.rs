//! Big-endian bit and byte writer, the counterpart of [`Reader`].
//!
//! [`Reader`]: crate::reader::Reader

/// Accumulates bits most significant bit first.
#[derive(Debug, Clone, Default)]
pub(crate) struct Writer {
    data: Vec<u8>,
    /// Number of bits already used in the last byte, 0 when aligned.
    bit_pos: u8,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pad the last byte with zero bits.
    pub(crate) fn align(&mut self) {
        self.bit_pos = 0;
    }

    pub(crate) fn write_bit(&mut self, bit: u32) {
        if self.bit_pos == 0 {
            self.data.push(0);
        }

        if bit & 1 != 0 {
            if let Some(last) = self.data.last_mut() {
                *last |= 0x80 >> self.bit_pos;
            }
        }

        self.bit_pos = (self.bit_pos + 1) & 7;
    }

    /// Write the low `count` bits of `value`, most significant first.
    pub(crate) fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);

        for i in (0..count).rev() {
            self.write_bit(value >> i);
        }
    }

    /// Write whole bytes. The writer must be byte-aligned.
    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.bit_pos, 0);
        self.data.extend_from_slice(bytes);
    }

    pub(crate) fn write_byte(&mut self, byte: u8) {
        self.write_bytes(&[byte]);
    }

    pub(crate) fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_be_bytes());
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_be_bytes());
    }

    pub(crate) fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_be_bytes());
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.data
    }
}
