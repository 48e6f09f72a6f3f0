//! Symbol dictionary encoding, the mirror of 6.5.5.

use core::ops::Range;

use crate::arithmetic::{self, IntegerEncoder};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::decode::generic::GenericParams;
use crate::decode::write_at_pixels;
use crate::encode::generic::encode_bitmap;
use crate::error::{EncodeError, EncodeResult};
use crate::huffman::standard_table;
use crate::writer::Writer;

/// A symbol dictionary ready to be written as a segment.
pub(crate) struct EncodedSymbols {
    pub(crate) data: Vec<u8>,
    /// For each dictionary index, the index of the symbol in the input.
    pub(crate) order: Vec<usize>,
    /// For each exported symbol, the index of the symbol in the input.
    pub(crate) exported: Vec<usize>,
}

/// Encode `symbols` as a symbol dictionary without refinement/aggregate
/// coding.
///
/// `export` says which input symbols are exported. Symbols are sorted by
/// height and then width, since height class and width deltas are coded
/// with tables that only cover increasing values.
pub(crate) fn encode_dictionary(
    symbols: &[Bitmap],
    export: &[bool],
    huffman: bool,
    params: &GenericParams,
) -> EncodeResult<EncodedSymbols> {
    if symbols.iter().any(|s| s.width() == 0 || s.height() == 0) {
        return Err(EncodeError::EmptyBitmap);
    }

    if export.len() != symbols.len() {
        return Err(EncodeError::DimensionMismatch);
    }

    let num_new = u32::try_from(symbols.len()).map_err(|_| EncodeError::ValueNotRepresentable)?;

    // Symbol bitmaps are always coded with TPGDON = 0 (Table 16).
    let params = GenericParams {
        tpgdon: false,
        ..params.clone()
    };

    let mut order: Vec<usize> = (0..symbols.len()).collect();
    order.sort_by_key(|&i| (symbols[i].height(), symbols[i].width()));

    let sorted: Vec<&Bitmap> = order.iter().map(|&i| &symbols[i]).collect();
    let exported: Vec<usize> = order.iter().copied().filter(|&i| export[i]).collect();
    let classes = height_classes(&sorted);
    let runs = export_runs(order.iter().map(|&i| export[i]));

    let mut writer = Writer::new();

    // "Bit 0: SDHUFF [...] Bits 10-11: SDTEMPLATE" (7.4.2.1.1). Huffman
    // dictionaries select tables B.4, B.2 and B.1, which are all zero.
    if huffman {
        writer.write_u16(0x0001);
    } else {
        writer.write_u16(u16::from(params.template.to_value()) << 10);
        write_at_pixels(&mut writer, &params.at_pixels);
    }

    writer.write_u32(exported.len() as u32);
    writer.write_u32(num_new);

    if huffman {
        encode_huffman(&mut writer, &sorted, &classes, &runs)?;
    } else {
        let mut encoder = arithmetic::Encoder::new();
        encode_arithmetic(&mut encoder, &sorted, &classes, &runs, &params)?;
        writer.write_bytes(&encoder.finish());
    }

    Ok(EncodedSymbols {
        data: writer.finish(),
        order,
        exported,
    })
}

/// Split sorted symbols into runs of equal height.
fn height_classes(sorted: &[&Bitmap]) -> Vec<Range<usize>> {
    let mut classes = Vec::new();
    let mut start = 0;

    for i in 1..=sorted.len() {
        if i == sorted.len() || sorted[i].height() != sorted[start].height() {
            classes.push(start..i);
            start = i;
        }
    }

    classes
}

/// "EXRUNLENGTH" values, alternating between runs of symbols that aren't
/// exported and runs that are, starting with the former.
fn export_runs(flags: impl Iterator<Item = bool>) -> Vec<i32> {
    let mut runs = Vec::new();
    let mut current = false;
    let mut run = 0;

    for flag in flags {
        if flag != current {
            runs.push(run);
            run = 0;
            current = flag;
        }
        run += 1;
    }

    if run > 0 {
        runs.push(run);
    }

    runs
}

fn delta(to: u32, from: u32) -> EncodeResult<i32> {
    i32::try_from(i64::from(to) - i64::from(from)).map_err(|_| EncodeError::ValueNotRepresentable)
}

fn encode_arithmetic(
    encoder: &mut arithmetic::Encoder,
    sorted: &[&Bitmap],
    classes: &[Range<usize>],
    runs: &[i32],
    params: &GenericParams,
) -> EncodeResult<()> {
    let mut iadh = IntegerEncoder::new();
    let mut iadw = IntegerEncoder::new();
    let mut iaex = IntegerEncoder::new();
    let mut contexts = params.contexts();
    let mut height = 0;

    for class in classes {
        let class_height = sorted[class.start].height();
        iadh.encode(encoder, Some(delta(class_height, height)?));
        height = class_height;

        let mut width = 0;
        for symbol in &sorted[class.clone()] {
            iadw.encode(encoder, Some(delta(symbol.width(), width)?));
            width = symbol.width();

            encode_bitmap(encoder, &mut contexts, symbol, params);
        }

        iadw.encode(encoder, None);
    }

    for &run in runs {
        iaex.encode(encoder, Some(run));
    }

    Ok(())
}

fn encode_huffman(
    writer: &mut Writer,
    sorted: &[&Bitmap],
    classes: &[Range<usize>],
    runs: &[i32],
) -> EncodeResult<()> {
    let table = |n| standard_table(n).map_err(|_| EncodeError::ValueNotRepresentable);
    let (dh, dw, b1) = (table(4)?, table(2)?, table(1)?);
    let mut height = 0;

    for class in classes {
        let symbols = &sorted[class.clone()];
        let class_height = symbols[0].height();
        dh.encode(Some(delta(class_height, height)?), writer)?;
        height = class_height;

        let mut width = 0;
        for symbol in symbols {
            dw.encode(Some(delta(symbol.width(), width)?), writer)?;
            width = symbol.width();
        }
        dw.encode(None, writer)?;

        // "If BMSIZE is zero, then the bitmap is stored uncompressed"
        // (6.5.9), as the symbols of the class side by side.
        let total_width = symbols
            .iter()
            .try_fold(0_u32, |acc, s| acc.checked_add(s.width()))
            .ok_or(EncodeError::ValueNotRepresentable)?;
        let mut collective = Bitmap::new(total_width, class_height);
        let mut x = 0;
        for symbol in symbols {
            collective.combine(symbol, i64::from(x), 0, CombinationOperator::Or);
            x += symbol.width();
        }

        b1.encode(Some(0), writer)?;
        writer.align();
        writer.write_bytes(collective.data());
    }

    for &run in runs {
        b1.encode(Some(run), writer)?;
    }

    Ok(())
}
