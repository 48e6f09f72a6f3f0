//! Generic refinement region encoding, the mirror of 6.3.5.6.

use crate::arithmetic::{self, Contexts};
use crate::bitmap::Bitmap;
use crate::decode::RefinementTemplate;
use crate::decode::refinement::{RefinementNeighbourhood, RefinementParams};
use crate::decode::write_at_pixels;
use crate::segment::region::RegionInfo;
use crate::writer::Writer;

/// Encode `bitmap` as a refinement of `reference`.
pub(crate) fn encode_bitmap(
    encoder: &mut arithmetic::Encoder,
    contexts: &mut Contexts,
    bitmap: &Bitmap,
    reference: &Bitmap,
    params: &RefinementParams,
) {
    let neighbourhood = RefinementNeighbourhood::new(params);
    let sltp_context = params.template.sltp_context();
    let mut ltp = false;

    for y in 0..bitmap.height() {
        if params.tpgron {
            // A row is typical if every pixel with a uniform reference
            // neighbourhood has that uniform value.
            let typical = (0..bitmap.width()).all(|x| {
                neighbourhood
                    .typical_value(reference, x, y)
                    .is_none_or(|value| value == bitmap.get_pixel(x, y))
            });

            encoder.encode(contexts.get(sltp_context), u32::from(typical != ltp));
            ltp = typical;
        }

        for x in 0..bitmap.width() {
            if ltp && neighbourhood.typical_value(reference, x, y).is_some() {
                continue;
            }

            let cx = neighbourhood.context(bitmap, reference, x, y);
            encoder.encode(contexts.get(cx), u32::from(bitmap.get_pixel(x, y)));
        }
    }
}

/// Produce the data part of an immediate refinement region segment (7.4.7).
pub(crate) fn encode_region(
    bitmap: &Bitmap,
    reference: &Bitmap,
    info: &RegionInfo,
    params: &RefinementParams,
) -> Vec<u8> {
    let mut writer = Writer::new();
    info.write(&mut writer);
    writer.write_byte(params.template.to_value() | (u8::from(params.tpgron) << 1));

    if params.template == RefinementTemplate::Template0 {
        write_at_pixels(&mut writer, &params.at_pixels);
    }

    let mut encoder = arithmetic::Encoder::new();
    let mut contexts = params.contexts();
    encode_bitmap(&mut encoder, &mut contexts, bitmap, reference, params);

    writer.write_bytes(&encoder.finish());
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DecodeSettings;
    use crate::decode::refinement;
    use crate::encode::generic::test_pattern;

    /// `reference` with a few pixels flipped, as a refinement would see it.
    fn touched_up(reference: &Bitmap) -> Bitmap {
        let mut bitmap = reference.clone();
        for (x, y) in [(0, 0), (7, 3), (8, 3), (20, 10), (31, 19)] {
            bitmap.set_pixel(x, y, !bitmap.get_pixel(x, y));
        }
        bitmap
    }

    #[test]
    fn round_trip_with_tpgron() {
        let reference = test_pattern(32, 20);
        let bitmap = touched_up(&reference);
        let info = RegionInfo::new(32, 20, 0, 0);

        for template in [RefinementTemplate::Template0, RefinementTemplate::Template1] {
            for tpgron in [false, true] {
                let mut params = RefinementParams::new(template, 0, 0);
                params.tpgron = tpgron;

                let data = encode_region(&bitmap, &reference, &info, &params);
                let region =
                    refinement::decode_region(&data, &reference, &DecodeSettings::default())
                        .unwrap();

                assert_eq!(region.bitmap, bitmap, "{template:?}, TPGRON {tpgron}");
            }
        }
    }

    #[test]
    fn shifted_reference() {
        let reference = test_pattern(16, 16);
        let bitmap = reference.crop(1, 2, 14, 13, u64::MAX).unwrap();
        let params = RefinementParams::new(RefinementTemplate::Template0, -1, -2);

        let mut encoder = arithmetic::Encoder::new();
        encode_bitmap(&mut encoder, &mut params.contexts(), &bitmap, &reference, &params);
        let data = encoder.finish();

        let mut decoded = Bitmap::new(14, 13);
        refinement::decode_bitmap(
            &mut arithmetic::Decoder::new(&data),
            &mut params.contexts(),
            &mut decoded,
            &reference,
            &params,
        )
        .unwrap();

        assert_eq!(decoded, bitmap);
    }

    #[test]
    fn uniform_rows_are_implicit() {
        // Black blocks on white: with TPGRON every row is typical and only
        // the SLTP bits and the block edges are left to code.
        let mut reference = Bitmap::new(64, 64);
        for y in 16..48 {
            for x in 16..48 {
                reference.set_pixel(x, y, true);
            }
        }

        let info = RegionInfo::new(64, 64, 0, 0);
        let mut params = RefinementParams::new(RefinementTemplate::Template1, 0, 0);
        params.tpgron = true;

        let data = encode_region(&reference, &reference, &info, &params);
        let region =
            refinement::decode_region(&data, &reference, &DecodeSettings::default()).unwrap();

        assert_eq!(region.bitmap, reference);
        assert!(data.len() < RegionInfo::SIZE + 1 + 64, "{} bytes", data.len());
    }
}
