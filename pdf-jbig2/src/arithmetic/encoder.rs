//! The MQ encoder (E.2).

use super::{Context, ESTIMATES};

/// Arithmetic encoder state (E.2.1).
pub(crate) struct Encoder {
    out: Vec<u8>,
    /// "C-register"
    c: u32,
    /// "A-register"
    a: u32,
    /// "CT", the number of shifts left before the next BYTEOUT.
    ct: u32,
    /// "B", the byte that is still open to a carry.
    b: u8,
    /// Whether `b` is a real output byte yet. Before the first BYTEOUT it
    /// stands for the byte preceding the code stream.
    has_b: bool,
}

impl Encoder {
    /// INITENC (Figure E.3).
    pub(crate) fn new() -> Self {
        Self {
            out: Vec::new(),
            c: 0,
            a: 0x8000,
            ct: 12,
            b: 0,
            has_b: false,
        }
    }

    /// Encode one binary decision with the given context (ENCODE, E.2.2).
    #[inline]
    pub(crate) fn encode(&mut self, cx: &mut Context, bit: u32) {
        if bit & 1 == u32::from(cx.mps) {
            self.code_mps(cx);
        } else {
            self.code_lps(cx);
        }
    }

    /// Terminate the code stream (FLUSH, E.2.9) and append the `0xFF 0xAC`
    /// marker that ends arithmetically coded data in JBIG2.
    pub(crate) fn finish(mut self) -> Vec<u8> {
        // SETBITS
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }

        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();

        if self.has_b {
            self.out.push(self.b);
        }

        if self.b != 0xFF {
            self.out.push(0xFF);
        }

        self.out.push(0xAC);
        self.out
    }

    /// CODEMPS (Figure E.6).
    #[inline]
    fn code_mps(&mut self, cx: &mut Context) {
        let estimate = &ESTIMATES[cx.index as usize];
        self.a -= estimate.qe;

        if self.a & 0x8000 == 0 {
            if self.a < estimate.qe {
                self.a = estimate.qe;
            } else {
                self.c += estimate.qe;
            }

            cx.index = estimate.nmps;
            self.renormalize();
        } else {
            self.c += estimate.qe;
        }
    }

    /// CODELPS (Figure E.5).
    #[inline]
    fn code_lps(&mut self, cx: &mut Context) {
        let estimate = &ESTIMATES[cx.index as usize];
        self.a -= estimate.qe;

        if self.a < estimate.qe {
            self.c += estimate.qe;
        } else {
            self.a = estimate.qe;
        }

        if estimate.switch {
            cx.mps = 1 - cx.mps;
        }

        cx.index = estimate.nlps;
        self.renormalize();
    }

    /// RENORME (Figure E.8).
    #[inline]
    fn renormalize(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;

            if self.ct == 0 {
                self.byte_out();
            }

            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// BYTEOUT (Figure E.9), including carry propagation into the open byte
    /// and bit stuffing after 0xFF.
    fn byte_out(&mut self) {
        if self.b == 0xFF {
            self.emit_stuffed();
        } else if self.c < 0x800_0000 {
            self.emit();
        } else {
            self.b = self.b.wrapping_add(1);

            if self.b == 0xFF {
                self.c &= 0x7FF_FFFF;
                self.emit_stuffed();
            } else {
                self.emit();
            }
        }
    }

    /// Move to the next byte, taking 7 bits since the previous one was 0xFF.
    fn emit_stuffed(&mut self) {
        self.push_b();
        self.b = (self.c >> 20) as u8;
        self.c &= 0xF_FFFF;
        self.ct = 7;
    }

    fn emit(&mut self) {
        self.push_b();
        self.b = (self.c >> 19) as u8;
        self.c &= 0x7_FFFF;
        self.ct = 8;
    }

    fn push_b(&mut self) {
        if self.has_b {
            self.out.push(self.b);
        }

        self.has_b = true;
    }
}
