//! Generic region encoding, the mirror of 6.2.5.7.

use crate::arithmetic::{self, Contexts};
use crate::bitmap::Bitmap;
use crate::decode::generic::{GenericParams, Neighbourhood};
use crate::decode::write_at_pixels;
use crate::segment::region::RegionInfo;
use crate::writer::Writer;

/// Encode `bitmap` with template-based arithmetic coding.
///
/// A row counts as typical if it equals the row above it, with the row above
/// the first one being white. SLTP is coded whenever typicality changes from
/// one row to the next, so the decoder's `LTP ^= SLTP` reproduces it.
pub(crate) fn encode_bitmap(
    encoder: &mut arithmetic::Encoder,
    contexts: &mut Contexts,
    bitmap: &Bitmap,
    params: &GenericParams,
) {
    let neighbourhood = Neighbourhood::new(params.template, &params.at_pixels);
    let sltp_context = params.template.sltp_context();
    let mut ltp = false;

    for y in 0..bitmap.height() {
        if params.tpgdon {
            let typical = if y == 0 {
                bitmap.row(0).iter().all(|&b| b == 0)
            } else {
                bitmap.row(y) == bitmap.row(y - 1)
            };

            encoder.encode(contexts.get(sltp_context), u32::from(typical != ltp));
            ltp = typical;

            if ltp {
                continue;
            }
        }

        for x in 0..bitmap.width() {
            let cx = neighbourhood.context(bitmap, x, y);
            encoder.encode(contexts.get(cx), u32::from(bitmap.get_pixel(x, y)));
        }
    }
}

/// Produce the data part of an immediate generic region segment (7.4.6).
pub(crate) fn encode_region(bitmap: &Bitmap, info: &RegionInfo, params: &GenericParams) -> Vec<u8> {
    let mut writer = Writer::new();
    info.write(&mut writer);

    // "Bit 0: MMR. Bits 1-2: GBTEMPLATE. Bit 3: TPGDON." (7.4.6.2)
    writer.write_byte((params.template.to_value() << 1) | (u8::from(params.tpgdon) << 3));
    write_at_pixels(&mut writer, &params.at_pixels);

    let mut encoder = arithmetic::Encoder::new();
    let mut contexts = params.contexts();
    encode_bitmap(&mut encoder, &mut contexts, bitmap, params);

    writer.write_bytes(&encoder.finish());
    writer.finish()
}

#[cfg(test)]
pub(crate) fn test_pattern(width: u32, height: u32) -> Bitmap {
    let mut bitmap = Bitmap::new(width, height);
    let mut state = 0x2545_F491_u32;

    for y in 0..height {
        // Leave some rows white and repeat others to exercise TPGDON.
        if y % 7 == 3 {
            continue;
        }
        if y % 5 == 4 {
            for x in 0..width {
                bitmap.set_pixel(x, y, bitmap.get_pixel(x, y - 1));
            }
            continue;
        }

        for x in 0..width {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;

            // Mostly-white noise with a vertical bar, like scanned text.
            bitmap.set_pixel(x, y, state % 5 == 0 || x % 11 == 2);
        }
    }

    bitmap
}
