//! Text region encoding, the mirror of 6.4.5 for arithmetic coding with
//! REFCORNER = TOPLEFT and no refinement.

use crate::arithmetic::integer::symbol_code_length;
use crate::arithmetic::{self, IntegerEncoder, SymbolIdEncoder};
use crate::bitmap::Bitmap;
use crate::decode::text::{ReferenceCorner, SymbolPlacement};
use crate::error::{EncodeError, EncodeResult};
use crate::segment::region::RegionInfo;
use crate::writer::Writer;

/// Produce the data part of a text region segment that places `instances`,
/// given as top-left corners, using `symbols`.
pub(crate) fn encode_region(
    info: &RegionInfo,
    symbols: &[&Bitmap],
    instances: &[SymbolPlacement],
    log_strips: u8,
) -> EncodeResult<Vec<u8>> {
    if log_strips > 3 {
        return Err(EncodeError::ValueNotRepresentable);
    }

    if instances
        .iter()
        .any(|i| i.symbol as usize >= symbols.len())
    {
        return Err(EncodeError::SymbolOutOfRange);
    }

    let strips = 1_i32 << log_strips;

    // With TOPLEFT and TRANSPOSED = 0, S is x and T is y. Instances are
    // grouped into strips of SBSTRIPS rows and ordered by S within a strip.
    let mut sorted: Vec<&SymbolPlacement> = instances.iter().collect();
    sorted.sort_by_key(|i| (i.y.div_euclid(strips), i.x));

    let mut writer = Writer::new();
    info.write(&mut writer);

    // "Bits 2-3: LOGSBSTRIPS. Bits 4-5: REFCORNER." (7.4.3.1.1) Everything
    // else is zero: arithmetic coding, no refinement, OR, SBDSOFFSET 0.
    writer.write_u16(
        (u16::from(log_strips) << 2) | (u16::from(ReferenceCorner::TopLeft.to_value()) << 4),
    );
    writer.write_u32(
        u32::try_from(instances.len()).map_err(|_| EncodeError::ValueNotRepresentable)?,
    );

    let num_symbols = u32::try_from(symbols.len()).map_err(|_| EncodeError::ValueNotRepresentable)?;
    let mut encoder = arithmetic::Encoder::new();
    let mut iadt = IntegerEncoder::new();
    let mut iafs = IntegerEncoder::new();
    let mut iads = IntegerEncoder::new();
    let mut iait = IntegerEncoder::new();
    let mut iaid = SymbolIdEncoder::new(symbol_code_length(num_symbols));

    let value = |v: i64| i32::try_from(v).map_err(|_| EncodeError::ValueNotRepresentable);

    // The initial STRIPT is 0.
    iadt.encode(&mut encoder, Some(0));

    let mut strip_t = 0_i64;
    let mut first_s = 0_i64;

    for strip in sorted.chunk_by(|a, b| a.y.div_euclid(strips) == b.y.div_euclid(strips)) {
        let t = i64::from(strip[0].y.div_euclid(strips)) * i64::from(strips);
        iadt.encode(&mut encoder, Some(value((t - strip_t) / i64::from(strips))?));
        strip_t = t;

        let mut cur_s = None;

        for instance in strip {
            let s = i64::from(instance.x);

            match cur_s {
                None => {
                    iafs.encode(&mut encoder, Some(value(s - first_s)?));
                    first_s = s;
                }
                Some(cur) => iads.encode(&mut encoder, Some(value(s - cur)?)),
            }

            if strips > 1 {
                iait.encode(&mut encoder, Some(value(i64::from(instance.y) - strip_t)?));
            }

            iaid.encode(&mut encoder, instance.symbol);

            let width = symbols[instance.symbol as usize].width();
            cur_s = Some(s + i64::from(width) - 1);
        }

        iads.encode(&mut encoder, None);
    }

    writer.write_bytes(&encoder.finish());
    Ok(writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecodeSettings;
    use crate::bitmap::bitmap_from_ascii;
    use crate::decode::text;

    fn symbols() -> [Bitmap; 3] {
        [
            bitmap_from_ascii(&["##", "##"]),
            bitmap_from_ascii(&["#.", ".#", "#."]),
            bitmap_from_ascii(&["####"]),
        ]
    }

    fn placements() -> Vec<SymbolPlacement> {
        let at = |symbol, x, y| SymbolPlacement { symbol, x, y };
        vec![
            at(0, 1, 1),
            at(2, 10, 0),
            at(1, 4, 1),
            at(1, 3, 6),
            at(0, 12, 5),
            at(2, 0, 9),
        ]
    }

    #[test]
    fn placements_survive_round_trip() {
        let symbols = symbols();
        let refs: Vec<_> = symbols.iter().collect();
        let info = RegionInfo::new(16, 12, 0, 0);

        for log_strips in 0..=3 {
            let data = encode_region(&info, &refs, &placements(), log_strips).unwrap();
            let decoded =
                text::decode_region(&data, &refs, &[], &DecodeSettings::default()).unwrap();

            let mut expected = Vec::new();
            let mut region = Bitmap::new(16, 12);
            for p in placements() {
                region.combine(
                    &symbols[p.symbol as usize],
                    i64::from(p.x),
                    i64::from(p.y),
                    crate::bitmap::CombinationOperator::Or,
                );
                expected.push(p);
            }

            let mut actual = decoded.placements.clone();
            actual.sort_by_key(|p| (p.y, p.x));
            expected.sort_by_key(|p| (p.y, p.x));

            assert_eq!(actual, expected, "LOGSBSTRIPS {log_strips}");
            assert_eq!(decoded.region.bitmap, region);
        }
    }

    #[test]
    fn unknown_symbol() {
        let symbols = symbols();
        let refs: Vec<_> = symbols.iter().collect();
        let bad = [SymbolPlacement {
            symbol: 3,
            x: 0,
            y: 0,
        }];

        assert!(matches!(
            encode_region(&RegionInfo::new(4, 4, 0, 0), &refs, &bad, 0),
            Err(EncodeError::SymbolOutOfRange)
        ));
    }
}
