//! Generic refinement region decoding (6.3, 7.4.7).

use smallvec::SmallVec;

use super::{AtPixel, Region, RefinementTemplate, parse_refinement_at_pixels};
use crate::DecodeSettings;
use crate::arithmetic::{Contexts, Decoder};
use crate::bitmap::Bitmap;
use crate::error::{FormatError, Result, bail};
use crate::reader::Reader;
use crate::segment::check_reserved;
use crate::segment::region::RegionInfo;

/// The parameters of the refinement procedure (Table 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RefinementParams {
    pub(crate) template: RefinementTemplate,
    pub(crate) tpgron: bool,
    pub(crate) at_pixels: [AtPixel; 2],
    /// "GRREFERENCEDX"
    pub(crate) dx: i32,
    /// "GRREFERENCEDY"
    pub(crate) dy: i32,
}

impl RefinementParams {
    pub(crate) fn new(template: RefinementTemplate, dx: i32, dy: i32) -> Self {
        Self {
            template,
            tpgron: false,
            at_pixels: RefinementTemplate::nominal_at_pixels(),
            dx,
            dy,
        }
    }

    pub(crate) fn contexts(&self) -> Contexts {
        Contexts::new(self.template.context_bits())
    }
}

/// The pixels read by a refinement template, split into the ones taken from
/// the bitmap being coded and the ones taken from the reference bitmap.
#[derive(Debug, Clone)]
pub(crate) struct RefinementNeighbourhood {
    current: SmallVec<[(i32, i32); 4]>,
    reference: SmallVec<[(i32, i32); 9]>,
    dx: i32,
    dy: i32,
}

impl RefinementNeighbourhood {
    pub(crate) fn new(params: &RefinementParams) -> Self {
        let [a1, a2] = params.at_pixels.map(|p| (i32::from(p.x), i32::from(p.y)));

        let (current, reference) = match params.template {
            // Figure 12.
            RefinementTemplate::Template0 => (
                SmallVec::from_slice(&[a1, (0, -1), (1, -1), (-1, 0)]),
                SmallVec::from_slice(&[
                    a2,
                    (0, -1),
                    (1, -1),
                    (-1, 0),
                    (0, 0),
                    (1, 0),
                    (-1, 1),
                    (0, 1),
                    (1, 1),
                ]),
            ),
            // Figure 13.
            RefinementTemplate::Template1 => (
                SmallVec::from_slice(&[(-1, -1), (0, -1), (1, -1), (-1, 0)]),
                SmallVec::from_slice(&[(0, -1), (-1, 0), (0, 0), (1, 0), (0, 1), (1, 1)]),
            ),
        };

        Self {
            current,
            reference,
            dx: params.dx,
            dy: params.dy,
        }
    }

    #[inline]
    pub(crate) fn context(&self, bitmap: &Bitmap, reference: &Bitmap, x: u32, y: u32) -> u32 {
        let (x, y) = (x as i32, y as i32);
        let (rx, ry) = (x - self.dx, y - self.dy);

        let cx = self
            .current
            .iter()
            .fold(0, |cx, &(ox, oy)| (cx << 1) | bitmap.pixel(x + ox, y + oy));

        self.reference
            .iter()
            .fold(cx, |cx, &(ox, oy)| (cx << 1) | reference.pixel(rx + ox, ry + oy))
    }

    /// "TPGRPIX": whether the 3 × 3 reference neighbourhood around the pixel
    /// corresponding to (x, y) is uniform, and if so, its value.
    #[inline]
    pub(crate) fn typical_value(&self, reference: &Bitmap, x: u32, y: u32) -> Option<bool> {
        let (rx, ry) = (x as i32 - self.dx, y as i32 - self.dy);
        let centre = reference.pixel(rx, ry);

        for oy in -1..=1 {
            for ox in -1..=1 {
                if reference.pixel(rx + ox, ry + oy) != centre {
                    return None;
                }
            }
        }

        Some(centre != 0)
    }
}

/// A parsed generic refinement region segment data header (7.4.7.1).
#[derive(Debug, Clone)]
pub(crate) struct RefinementRegionHeader {
    pub(crate) info: RegionInfo,
    pub(crate) params: RefinementParams,
}

impl RefinementRegionHeader {
    pub(crate) fn parse(reader: &mut Reader<'_>, strict: bool) -> Result<Self> {
        let info = RegionInfo::parse(reader, strict)?;

        // "Bit 0: GRTEMPLATE. Bit 1: TPGRON. Bits 2-7: Reserved; must be
        // zero." (7.4.7.2)
        let flags = reader.read_byte()?;
        check_reserved(u32::from(flags & 0xFC), strict)?;

        let template = RefinementTemplate::from_bit(flags & 0x01 != 0);
        let at_pixels = if template == RefinementTemplate::Template0 {
            parse_refinement_at_pixels(reader)?
        } else {
            RefinementTemplate::nominal_at_pixels()
        };

        Ok(Self {
            info,
            params: RefinementParams {
                template,
                tpgron: flags & 0x02 != 0,
                at_pixels,
                dx: 0,
                dy: 0,
            },
        })
    }
}

/// Decode the data part of a refinement region segment against `reference`.
///
/// "If this segment refers to another region segment, then set the
/// reference bitmap GRREFERENCE to be the current contents of the auxiliary
/// buffer associated with the region segment that this segment refers to.
/// [...] Otherwise, set GRREFERENCE to be the part of the page buffer
/// corresponding to this segment's region segment information field."
/// (7.4.7.5)
///
/// Either way, the reference has the size of the region and
/// GRREFERENCEDX and GRREFERENCEDY are zero.
pub(crate) fn decode_region(
    data: &[u8],
    reference: &Bitmap,
    settings: &DecodeSettings,
) -> Result<Region> {
    let mut reader = Reader::new(data);
    let header = RefinementRegionHeader::parse(&mut reader, settings.strict)?;

    if reference.width() != header.info.width || reference.height() != header.info.height {
        bail!(FormatError::InvalidDimension);
    }

    let mut bitmap = Bitmap::try_new(
        header.info.width,
        header.info.height,
        settings.max_pixel_count,
    )?;

    let mut decoder = Decoder::new(reader.tail());
    let mut contexts = header.params.contexts();
    decode_bitmap(
        &mut decoder,
        &mut contexts,
        &mut bitmap,
        reference,
        &header.params,
    )?;

    Ok(Region {
        info: header.info,
        bitmap,
    })
}

/// The generic refinement region decoding procedure (6.3.5.6).
pub(crate) fn decode_bitmap(
    decoder: &mut Decoder<'_>,
    contexts: &mut Contexts,
    bitmap: &mut Bitmap,
    reference: &Bitmap,
    params: &RefinementParams,
) -> Result<()> {
    let neighbourhood = RefinementNeighbourhood::new(params);
    let sltp_context = params.template.sltp_context();

    // "1) Set LTP = 0."
    let mut ltp = false;

    for y in 0..bitmap.height() {
        if params.tpgron {
            ltp ^= decoder.decode(contexts.get(sltp_context)) != 0;
        }

        for x in 0..bitmap.width() {
            // "d) If LTP = 1 then, from left to right, implicitly decode
            // certain pixels of the current row of GRREG, and explicitly
            // decode the rest."
            let typical = if ltp {
                neighbourhood.typical_value(reference, x, y)
            } else {
                None
            };

            let pixel = match typical {
                Some(value) => value,
                None => {
                    let cx = neighbourhood.context(bitmap, reference, x, y);
                    decoder.decode(contexts.get(cx)) != 0
                }
            };

            if pixel {
                bitmap.set_pixel(x, y, true);
            }
        }

        decoder.check_data()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::bitmap_from_ascii;

    #[test]
    fn centre_reference_pixel() {
        let reference = bitmap_from_ascii(&["...", ".#.", "..."]);
        let bitmap = Bitmap::new(3, 3);

        // The context used for SLTP is exactly the one where only the
        // reference pixel under the current pixel is black.
        for template in [RefinementTemplate::Template0, RefinementTemplate::Template1] {
            let params = RefinementParams::new(template, 0, 0);
            let neighbourhood = RefinementNeighbourhood::new(&params);

            assert_eq!(
                neighbourhood.context(&bitmap, &reference, 1, 1),
                template.sltp_context()
            );
        }
    }

    #[test]
    fn reference_offset() {
        let reference = bitmap_from_ascii(&["#.", ".."]);
        let params = RefinementParams::new(RefinementTemplate::Template1, 1, 1);
        let neighbourhood = RefinementNeighbourhood::new(&params);

        // With GRREFERENCEDX = GRREFERENCEDY = 1, pixel (1, 1) corresponds to
        // reference pixel (0, 0).
        assert_eq!(
            neighbourhood.context(&Bitmap::new(2, 2), &reference, 1, 1),
            RefinementTemplate::Template1.sltp_context()
        );
        assert_eq!(neighbourhood.typical_value(&reference, 1, 1), None);
        assert_eq!(
            neighbourhood.typical_value(&Bitmap::new(2, 2), 1, 1),
            Some(false)
        );
    }

    #[test]
    fn reference_must_match_region_size() {
        let mut data = vec![0, 0, 0, 4, 0, 0, 0, 4];
        data.extend_from_slice(&[0; 9]);
        data.push(0x01);

        assert!(matches!(
            decode_region(&data, &Bitmap::new(4, 3), &DecodeSettings::default()),
            Err(crate::error::DecodeError::MalformedSegment(
                FormatError::InvalidDimension
            ))
        ));
    }
}
