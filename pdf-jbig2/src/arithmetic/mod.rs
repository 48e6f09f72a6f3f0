//! The MQ arithmetic coder (Annex E) and the integer coding procedures built
//! on top of it (Annex A).
//!
//! Both directions share the probability estimation state machine of
//! Table E.1: every context holds an index into that table together with the
//! sense of its more probable symbol.

pub(crate) mod decoder;
pub(crate) mod encoder;
pub(crate) mod integer;

pub(crate) use decoder::Decoder;
pub(crate) use encoder::Encoder;
pub(crate) use integer::{IntegerDecoder, IntegerEncoder, SymbolIdDecoder, SymbolIdEncoder};

/// The adaptive state of a single context (E.2.4).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Context {
    /// "I(CX)": index into the probability estimation table.
    pub(crate) index: u8,
    /// "MPS(CX)": the more probable symbol, 0 or 1.
    pub(crate) mps: u8,
}

/// A dense array of contexts, addressed by the context value formed from a
/// pixel neighbourhood or by the integer decoding procedures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Contexts(Vec<Context>);

impl Contexts {
    pub(crate) fn new(bits: u32) -> Self {
        Self(vec![Context::default(); 1 << bits])
    }

    #[inline(always)]
    pub(crate) fn get(&mut self, cx: u32) -> &mut Context {
        &mut self.0[cx as usize]
    }
}

/// One row of Table E.1.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Estimate {
    pub(crate) qe: u32,
    pub(crate) nmps: u8,
    pub(crate) nlps: u8,
    pub(crate) switch: bool,
}

const fn row(qe: u32, nmps: u8, nlps: u8, switch: u8) -> Estimate {
    Estimate {
        qe,
        nmps,
        nlps,
        switch: switch == 1,
    }
}

/// "Table E.1 - Qe values and probability estimation process"
#[rustfmt::skip]
pub(crate) static ESTIMATES: [Estimate; 47] = [
    row(0x5601, 1, 1, 1),   row(0x3401, 2, 6, 0),   row(0x1801, 3, 9, 0),
    row(0x0AC1, 4, 12, 0),  row(0x0521, 5, 29, 0),  row(0x0221, 38, 33, 0),
    row(0x5601, 7, 6, 1),   row(0x5401, 8, 14, 0),  row(0x4801, 9, 14, 0),
    row(0x3801, 10, 14, 0), row(0x3001, 11, 17, 0), row(0x2401, 12, 18, 0),
    row(0x1C01, 13, 20, 0), row(0x1601, 29, 21, 0), row(0x5601, 15, 14, 1),
    row(0x5401, 16, 14, 0), row(0x5101, 17, 15, 0), row(0x4801, 18, 16, 0),
    row(0x3801, 19, 17, 0), row(0x3401, 20, 18, 0), row(0x3001, 21, 19, 0),
    row(0x2801, 22, 19, 0), row(0x2401, 23, 20, 0), row(0x2201, 24, 21, 0),
    row(0x1C01, 25, 22, 0), row(0x1801, 26, 23, 0), row(0x1601, 27, 24, 0),
    row(0x1401, 28, 25, 0), row(0x1201, 29, 26, 0), row(0x1101, 30, 27, 0),
    row(0x0AC1, 31, 28, 0), row(0x09C1, 32, 29, 0), row(0x08A1, 33, 30, 0),
    row(0x0521, 34, 31, 0), row(0x0441, 35, 32, 0), row(0x02A1, 36, 33, 0),
    row(0x0221, 37, 34, 0), row(0x0141, 38, 35, 0), row(0x0111, 39, 36, 0),
    row(0x0085, 40, 37, 0), row(0x0049, 41, 38, 0), row(0x0025, 42, 39, 0),
    row(0x0015, 43, 40, 0), row(0x0009, 44, 41, 0), row(0x0005, 45, 42, 0),
    row(0x0001, 45, 43, 0), row(0x5601, 46, 46, 0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip() {
        let bits: Vec<u32> = (0..4000_u32)
            .map(|i| u32::from((i * 7919) % 13 < 3 || i % 97 == 0))
            .collect();

        let mut encoder = Encoder::new();
        let mut contexts = Contexts::new(2);

        for (i, &bit) in bits.iter().enumerate() {
            encoder.encode(contexts.get(i as u32 & 3), bit);
        }

        let data = encoder.finish();
        assert_eq!(&data[data.len() - 2..], &[0xFF, 0xAC]);

        let mut decoder = Decoder::new(&data);
        let mut contexts = Contexts::new(2);

        for (i, &bit) in bits.iter().enumerate() {
            assert_eq!(decoder.decode(contexts.get(i as u32 & 3)), bit, "bit {i}");
        }

        assert!(decoder.check_data().is_ok());
    }

    #[test]
    fn long_runs_compress() {
        let mut encoder = Encoder::new();
        let mut context = Context::default();

        for _ in 0..10_000 {
            encoder.encode(&mut context, 0);
        }

        let data = encoder.finish();
        assert!(data.len() < 40, "{} bytes", data.len());

        let mut decoder = Decoder::new(&data);
        let mut context = Context::default();
        assert!((0..10_000).all(|_| decoder.decode(&mut context) == 0));
    }
}
