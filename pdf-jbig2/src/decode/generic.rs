//! Generic region decoding (6.2, 7.4.6).

use smallvec::SmallVec;

use super::{AtPixel, Region, Template, parse_at_pixels};
use crate::DecodeSettings;
use crate::arithmetic::{Contexts, Decoder};
use crate::bitmap::Bitmap;
use crate::error::{FormatError, Result, UnsupportedFeature, bail};
use crate::reader::Reader;
use crate::segment::check_reserved;
use crate::segment::region::RegionInfo;

/// The parameters of template-based arithmetic coding (Table 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GenericParams {
    pub(crate) template: Template,
    pub(crate) tpgdon: bool,
    pub(crate) at_pixels: SmallVec<[AtPixel; 4]>,
}

impl GenericParams {
    pub(crate) fn new(template: Template, tpgdon: bool) -> Self {
        Self {
            template,
            tpgdon,
            at_pixels: template.nominal_at_pixels(),
        }
    }

    pub(crate) fn contexts(&self) -> Contexts {
        Contexts::new(self.template.context_bits())
    }
}

/// A template position: either a fixed neighbour or one of the AT pixels.
#[derive(Clone, Copy)]
enum Tap {
    Fixed(i8, i8),
    Adaptive(usize),
}

use Tap::{Adaptive as At, Fixed as F};

// Most significant context bit first.
#[rustfmt::skip]
const TEMPLATE_0: &[Tap] = &[
    At(3), F(-1, -2), F(0, -2), F(1, -2), At(2),
    At(1), F(-2, -1), F(-1, -1), F(0, -1), F(1, -1), F(2, -1), At(0),
    F(-4, 0), F(-3, 0), F(-2, 0), F(-1, 0),
];
#[rustfmt::skip]
const TEMPLATE_1: &[Tap] = &[
    F(-1, -2), F(0, -2), F(1, -2), F(2, -2),
    F(-2, -1), F(-1, -1), F(0, -1), F(1, -1), F(2, -1), At(0),
    F(-3, 0), F(-2, 0), F(-1, 0),
];
#[rustfmt::skip]
const TEMPLATE_2: &[Tap] = &[
    F(-1, -2), F(0, -2), F(1, -2),
    F(-2, -1), F(-1, -1), F(0, -1), F(1, -1), At(0),
    F(-2, 0), F(-1, 0),
];
#[rustfmt::skip]
const TEMPLATE_3: &[Tap] = &[
    F(-3, -1), F(-2, -1), F(-1, -1), F(0, -1), F(1, -1), At(0),
    F(-4, 0), F(-3, 0), F(-2, 0), F(-1, 0),
];

/// The pixel offsets a template reads, with its AT pixels filled in.
#[derive(Debug, Clone)]
pub(crate) struct Neighbourhood(SmallVec<[(i32, i32); 16]>);

impl Neighbourhood {
    pub(crate) fn new(template: Template, at_pixels: &[AtPixel]) -> Self {
        let taps = match template {
            Template::Template0 => TEMPLATE_0,
            Template::Template1 => TEMPLATE_1,
            Template::Template2 => TEMPLATE_2,
            Template::Template3 => TEMPLATE_3,
        };

        Self(
            taps.iter()
                .map(|tap| match *tap {
                    Tap::Fixed(x, y) => (i32::from(x), i32::from(y)),
                    Tap::Adaptive(i) => at_pixels
                        .get(i)
                        .map_or((0, -1), |p| (i32::from(p.x), i32::from(p.y))),
                })
                .collect(),
        )
    }

    /// "Form an integer CONTEXT by gathering the values of the image pixels
    /// overlaid by the template (including AT pixels) at its current
    /// location." (6.2.5.7)
    #[inline]
    pub(crate) fn context(&self, bitmap: &Bitmap, x: u32, y: u32) -> u32 {
        let (x, y) = (x as i32, y as i32);

        self.0
            .iter()
            .fold(0, |cx, &(dx, dy)| (cx << 1) | bitmap.pixel(x + dx, y + dy))
    }
}

/// A parsed generic region segment data header (7.4.6.1).
#[derive(Debug, Clone)]
pub(crate) struct GenericRegionHeader {
    pub(crate) info: RegionInfo,
    pub(crate) params: GenericParams,
}

impl GenericRegionHeader {
    pub(crate) fn parse(reader: &mut Reader<'_>, strict: bool) -> Result<Self> {
        let info = RegionInfo::parse(reader, strict)?;

        // "Bit 0: MMR. Bits 1-2: GBTEMPLATE. Bit 3: TPGDON. Bit 4:
        // EXTTEMPLATE. Bits 5-7: Reserved; must be zero." (7.4.6.2)
        let flags = reader.read_byte()?;

        if flags & 0x01 != 0 {
            bail!(UnsupportedFeature::Mmr);
        }

        let template = Template::from_byte(flags >> 1);
        let tpgdon = flags & 0x08 != 0;

        if flags & 0x10 != 0 {
            if template == Template::Template0 {
                bail!(UnsupportedFeature::ExtendedTemplate);
            }

            check_reserved(u32::from(flags & 0x10), strict)?;
        }

        check_reserved(u32::from(flags & 0xE0), strict)?;

        let at_pixels = parse_at_pixels(reader, template.at_pixel_count())?;

        Ok(Self {
            info,
            params: GenericParams {
                template,
                tpgdon,
                at_pixels,
            },
        })
    }
}

/// Decode the data part of a generic region segment.
///
/// "As a special case, as noted in 7.2.7, an immediate generic region
/// segment may have an unknown length. In this case, it also indicates the
/// height of the generic region" (7.4.6.4). The row count is the last four
/// bytes of the data.
pub(crate) fn decode_region(
    data: &[u8],
    unknown_length: bool,
    settings: &DecodeSettings,
) -> Result<Region> {
    let mut reader = Reader::new(data);
    let mut header = GenericRegionHeader::parse(&mut reader, settings.strict)?;
    let mut coded = reader.tail();

    if unknown_length {
        let Some(split) = coded.len().checked_sub(4) else {
            bail!(FormatError::MissingEndMarker);
        };
        let (head, tail) = coded.split_at(split);
        let row_count = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);

        if row_count > header.info.height {
            bail!(FormatError::InvalidDimension);
        }

        header.info.height = row_count;
        coded = head;
    }

    let mut bitmap = Bitmap::try_new(
        header.info.width,
        header.info.height,
        settings.max_pixel_count,
    )?;

    let mut decoder = Decoder::new(coded);
    let mut contexts = header.params.contexts();
    decode_bitmap(&mut decoder, &mut contexts, &mut bitmap, &header.params)?;

    Ok(Region {
        info: header.info,
        bitmap,
    })
}

/// The generic region decoding procedure with MMR = 0 (6.2.5.7).
///
/// `bitmap` must be white. The decoder and contexts are passed in because
/// symbol dictionaries decode many bitmaps from one arithmetic stream.
pub(crate) fn decode_bitmap(
    decoder: &mut Decoder<'_>,
    contexts: &mut Contexts,
    bitmap: &mut Bitmap,
    params: &GenericParams,
) -> Result<()> {
    let neighbourhood = Neighbourhood::new(params.template, &params.at_pixels);
    let sltp_context = params.template.sltp_context();

    // "1) Set: LTP = 0"
    let mut ltp = false;

    for y in 0..bitmap.height() {
        // "b) If TPGDON is 1, then decode a bit using the arithmetic entropy
        // coder [...] Let SLTP be the value of this bit. Set: LTP = LTP XOR
        // SLTP"
        if params.tpgdon {
            ltp ^= decoder.decode(contexts.get(sltp_context)) != 0;
        }

        if ltp {
            // "c) If LTP = 1 then set every pixel of the current row of GBREG
            // equal to the corresponding pixel of the row immediately above."
            // The row above the first one is white.
            if y > 0 {
                bitmap.copy_row(y - 1, y);
            }
        } else {
            for x in 0..bitmap.width() {
                let cx = neighbourhood.context(bitmap, x, y);

                if decoder.decode(contexts.get(cx)) != 0 {
                    bitmap.set_pixel(x, y, true);
                }
            }
        }

        decoder.check_data()?;
    }

    Ok(())
}
