//! The MQ decoder (E.3), using the inverted C-register convention of
//! Annex G that T.88 decoders customarily follow.

use super::{Context, ESTIMATES, Estimate};
use crate::error::{DecodeError, Result};

/// How many bytes past the end of the data (or past a marker) the decoder may
/// be fed before its input is considered exhausted. A correctly terminated
/// stream needs at most a few of them.
const MAX_SYNTHETIC_BYTES: u32 = 32;

/// Arithmetic decoder state (Table E.1 / E.3.1).
pub(crate) struct Decoder<'a> {
    data: &'a [u8],
    /// "C-register", with Chigh in the upper 16 bits.
    c: u32,
    /// "A-register", the current interval size.
    a: u32,
    /// "BP", the position of the current byte.
    bp: usize,
    /// "CT", the number of bits left in Clow before the next BYTEIN.
    ct: u32,
    /// Number of BYTEINs that didn't consume a real byte.
    synthetic: u32,
}

impl<'a> Decoder<'a> {
    /// Start decoding `data` (INITDEC, Figure G.1).
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut decoder = Self {
            data,
            c: 0,
            a: 0,
            bp: 0,
            ct: 0,
            synthetic: 0,
        };

        decoder.c = (u32::from(decoder.byte(0)) ^ 0xFF) << 16;
        decoder.byte_in();
        decoder.c <<= 7;
        decoder.ct -= 7;
        decoder.a = 0x8000;

        decoder
    }

    /// Decode a single binary decision with the given context (Figure G.2).
    #[inline(always)]
    pub(crate) fn decode(&mut self, cx: &mut Context) -> u32 {
        let estimate = &ESTIMATES[cx.index as usize];
        self.a -= estimate.qe;

        if (self.c >> 16) < self.a {
            if self.a & 0x8000 != 0 {
                return u32::from(cx.mps);
            }

            let d = self.mps_exchange(cx, estimate);
            self.renormalize();
            d
        } else {
            self.c -= self.a << 16;
            let d = self.lps_exchange(cx, estimate);
            self.renormalize();
            d
        }
    }

    /// Fail if the decoder has been reading far past the end of its data.
    #[inline]
    pub(crate) fn check_data(&self) -> Result<()> {
        if self.synthetic > MAX_SYNTHETIC_BYTES {
            Err(DecodeError::UnexpectedEndOfData)
        } else {
            Ok(())
        }
    }

    /// Figure E.16.
    #[inline(always)]
    fn mps_exchange(&mut self, cx: &mut Context, estimate: &Estimate) -> u32 {
        if self.a < estimate.qe {
            let d = 1 - cx.mps;
            if estimate.switch {
                cx.mps = 1 - cx.mps;
            }
            cx.index = estimate.nlps;
            u32::from(d)
        } else {
            cx.index = estimate.nmps;
            u32::from(cx.mps)
        }
    }

    /// Figure E.17.
    #[inline(always)]
    fn lps_exchange(&mut self, cx: &mut Context, estimate: &Estimate) -> u32 {
        let d = if self.a < estimate.qe {
            cx.index = estimate.nmps;
            cx.mps
        } else {
            let d = 1 - cx.mps;
            if estimate.switch {
                cx.mps = 1 - cx.mps;
            }
            cx.index = estimate.nlps;
            d
        };

        self.a = estimate.qe;
        u32::from(d)
    }

    /// RENORMD (Figure E.18).
    #[inline(always)]
    fn renormalize(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }

            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;

            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// BYTEIN (Figure G.3).
    ///
    /// "If B1 exceeds 0x8F, then B1 must be one of the marker codes. The
    /// marker code is interpreted as required, and the buffer pointer remains
    /// pointed to the 0xFF prefix of the marker code which terminates the
    /// arithmetically compressed image data. 1-bits are then fed to the
    /// decoder until the decoding is complete." (E.3.4)
    #[inline(always)]
    fn byte_in(&mut self) {
        if self.byte(self.bp) == 0xFF {
            if self.byte(self.bp + 1) > 0x8F {
                self.synthetic += 1;
                self.ct = 8;
            } else {
                self.bp += 1;
                self.c = self
                    .c
                    .wrapping_add(0xFE00)
                    .wrapping_sub(u32::from(self.byte(self.bp)) << 9);
                self.ct = 7;
            }
        } else {
            self.bp += 1;
            self.c = self
                .c
                .wrapping_add(0xFF00)
                .wrapping_sub(u32::from(self.byte(self.bp)) << 8);
            self.ct = 8;
        }
    }

    /// Bytes past the end of the data read as 0xFF, which looks like the
    /// start of a marker.
    #[inline(always)]
    fn byte(&self, pos: usize) -> u8 {
        self.data.get(pos).copied().unwrap_or(0xFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_eventually_exhausted() {
        let mut decoder = Decoder::new(&[]);

        for _ in 0..16 {
            let _ = decoder.decode(&mut Context::default());
        }

        assert!(decoder.check_data().is_ok());

        for _ in 0..10_000 {
            let _ = decoder.decode(&mut Context::default());
        }

        assert_eq!(decoder.check_data(), Err(DecodeError::UnexpectedEndOfData));
    }
}
