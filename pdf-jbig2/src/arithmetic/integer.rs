//! Arithmetic integer coding (A.2) and symbol ID coding (A.3).
//!
//! "An invocation of an arithmetic integer decoding procedure involves
//! decoding a sequence of bits, where each bit is decoded using a context
//! formed by the bits decoded previously in this invocation." (A.1)

use super::{Contexts, Decoder, Encoder};
use crate::error::{DecodeError, HuffmanError, Result};

/// The prefix tiers of Figure A.1: the number of value bits that follow each
/// prefix and the offset added to them.
const TIERS: [(u8, u64); 6] = [(2, 0), (4, 4), (6, 20), (8, 84), (12, 340), (32, 4436)];

/// "PREV always contains the values of the eight most-recently-decoded bits,
/// plus a leading 1 bit, which is used to indicate the number of bits decoded
/// so far." (A.2)
#[inline(always)]
fn update_prev(prev: u32, bit: u32) -> u32 {
    if prev < 256 {
        (prev << 1) | bit
    } else {
        (((prev << 1) | bit) & 511) | 256
    }
}

/// One of the IAx procedures, such as IADH or IARDX, with its own 512
/// contexts.
#[derive(Clone, Debug)]
pub(crate) struct IntegerDecoder {
    contexts: Contexts,
}

impl IntegerDecoder {
    pub(crate) fn new() -> Self {
        Self {
            contexts: Contexts::new(9),
        }
    }

    /// Decode a value, where `None` is the out-of-band value.
    ///
    /// "The result of the integer arithmetic decoding procedure is equal to:
    /// V if S = 0; −V if S = 1 and V > 0; OOB if S = 1 and V = 0." (A.2)
    pub(crate) fn decode(&mut self, decoder: &mut Decoder<'_>) -> Result<Option<i32>> {
        let mut prev = 1;

        let s = self.bit(decoder, &mut prev);

        let mut tier = 0;
        while tier < TIERS.len() - 1 && self.bit(decoder, &mut prev) == 1 {
            tier += 1;
        }

        let (bits, offset) = TIERS[tier];
        let mut v = 0_u64;

        for _ in 0..bits {
            v = (v << 1) | u64::from(self.bit(decoder, &mut prev));
        }

        decoder.check_data()?;

        let v = i32::try_from(v + offset).map_err(|_| DecodeError::Overflow)?;

        Ok(match (s, v) {
            (0, v) => Some(v),
            (_, 0) => None,
            (_, v) => Some(-v),
        })
    }

    /// Decode a value that must not be out-of-band.
    pub(crate) fn decode_value(&mut self, decoder: &mut Decoder<'_>) -> Result<i32> {
        self.decode(decoder)?
            .ok_or(DecodeError::Huffman(HuffmanError::UnexpectedOob))
    }

    #[inline(always)]
    fn bit(&mut self, decoder: &mut Decoder<'_>, prev: &mut u32) -> u32 {
        let d = decoder.decode(self.contexts.get(*prev & 0x1FF));
        *prev = update_prev(*prev, d);
        d
    }
}

/// The encoding side of an IAx procedure.
#[derive(Clone, Debug)]
pub(crate) struct IntegerEncoder {
    contexts: Contexts,
}

impl IntegerEncoder {
    pub(crate) fn new() -> Self {
        Self {
            contexts: Contexts::new(9),
        }
    }

    /// Encode a value, with `None` standing for out-of-band.
    pub(crate) fn encode(&mut self, encoder: &mut Encoder, value: Option<i32>) {
        let mut prev = 1;

        let (s, v) = match value {
            None => (1, 0),
            Some(v) => (u32::from(v < 0), u64::from(v.unsigned_abs())),
        };

        self.bit(encoder, &mut prev, s);

        let tier = TIERS
            .iter()
            .rposition(|&(_, offset)| v >= offset)
            .unwrap_or(0);

        for _ in 0..tier {
            self.bit(encoder, &mut prev, 1);
        }

        if tier < TIERS.len() - 1 {
            self.bit(encoder, &mut prev, 0);
        }

        let (bits, offset) = TIERS[tier];
        let v = v - offset;

        for i in (0..bits).rev() {
            self.bit(encoder, &mut prev, ((v >> i) & 1) as u32);
        }
    }

    #[inline(always)]
    fn bit(&mut self, encoder: &mut Encoder, prev: &mut u32, bit: u32) {
        encoder.encode(self.contexts.get(*prev & 0x1FF), bit);
        *prev = update_prev(*prev, bit);
    }
}

/// The IAID procedure (A.3), decoding fixed-length symbol IDs.
#[derive(Clone, Debug)]
pub(crate) struct SymbolIdDecoder {
    contexts: Contexts,
    code_len: u32,
}

impl SymbolIdDecoder {
    /// "The number of contexts required is 2^SBSYMCODELEN" (A.3)
    pub(crate) fn new(code_len: u32) -> Self {
        Self {
            contexts: Contexts::new(code_len),
            code_len,
        }
    }

    pub(crate) fn decode(&mut self, decoder: &mut Decoder<'_>) -> Result<u32> {
        let mut prev = 1_u32;

        for _ in 0..self.code_len {
            let d = decoder.decode(self.contexts.get(prev));
            prev = (prev << 1) | d;
        }

        decoder.check_data()?;

        // "The result of the symbol ID decoding procedure is given by PREV
        // minus 2^SBSYMCODELEN." (A.3)
        Ok(prev - (1 << self.code_len))
    }
}

/// The encoding side of IAID.
#[derive(Clone, Debug)]
pub(crate) struct SymbolIdEncoder {
    contexts: Contexts,
    code_len: u32,
}

impl SymbolIdEncoder {
    pub(crate) fn new(code_len: u32) -> Self {
        Self {
            contexts: Contexts::new(code_len),
            code_len,
        }
    }

    pub(crate) fn encode(&mut self, encoder: &mut Encoder, id: u32) {
        let mut prev = 1_u32;

        for i in (0..self.code_len).rev() {
            let bit = (id >> i) & 1;
            encoder.encode(self.contexts.get(prev), bit);
            prev = (prev << 1) | bit;
        }
    }
}

/// "SBSYMCODELEN = ⌈log2(SBNUMSYMS)⌉" (6.4.10, Table 31)
pub(crate) fn symbol_code_length(num_symbols: u32) -> u32 {
    if num_symbols <= 1 {
        0
    } else {
        32 - (num_symbols - 1).leading_zeros()
    }
}
