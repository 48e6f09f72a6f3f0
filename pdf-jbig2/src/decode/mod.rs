//! Region decoding procedures (6.2 to 6.5) and the segment data headers
//! that configure them (7.4).

pub(crate) mod generic;
pub(crate) mod refinement;
pub(crate) mod symbol;
pub(crate) mod text;

use smallvec::SmallVec;

use crate::bitmap::Bitmap;
use crate::error::{FormatError, HuffmanError, Result, bail};
use crate::huffman::{HuffmanTable, standard_table};
use crate::reader::Reader;
use crate::segment::region::RegionInfo;
use crate::writer::Writer;

/// A decoded region together with where and how it goes onto the page.
#[derive(Debug, Clone)]
pub(crate) struct Region {
    pub(crate) info: RegionInfo,
    pub(crate) bitmap: Bitmap,
}

/// The template of generic region coding, "GBTEMPLATE" (6.2.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Template {
    /// 16 pixels, 4 of them adaptive (Figure 3).
    #[default]
    Template0,
    /// 13 pixels (Figure 4).
    Template1,
    /// 10 pixels (Figure 5).
    Template2,
    /// 10 pixels on two rows (Figure 6).
    Template3,
}

impl Template {
    pub(crate) fn from_byte(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::Template0,
            1 => Self::Template1,
            2 => Self::Template2,
            _ => Self::Template3,
        }
    }

    pub(crate) fn to_value(self) -> u8 {
        self as u8
    }

    pub(crate) fn context_bits(self) -> u32 {
        match self {
            Self::Template0 => 16,
            Self::Template1 => 13,
            Self::Template2 | Self::Template3 => 10,
        }
    }

    pub(crate) fn at_pixel_count(self) -> usize {
        match self {
            Self::Template0 => 4,
            _ => 1,
        }
    }

    /// The AT pixel positions of Figure 7, used when nothing else is asked
    /// for.
    pub(crate) fn nominal_at_pixels(self) -> SmallVec<[AtPixel; 4]> {
        let pixels: &[(i8, i8)] = match self {
            Self::Template0 => &[(3, -1), (-3, -1), (2, -2), (-2, -2)],
            Self::Template1 => &[(3, -1)],
            Self::Template2 | Self::Template3 => &[(2, -1)],
        };

        pixels.iter().map(|&(x, y)| AtPixel { x, y }).collect()
    }

    /// The context in which SLTP is coded (Figures 8 to 11).
    pub(crate) fn sltp_context(self) -> u32 {
        match self {
            Self::Template0 => 0x9B25,
            Self::Template1 => 0x0795,
            Self::Template2 => 0x00E5,
            Self::Template3 => 0x0195,
        }
    }
}

/// The template of refinement coding, "GRTEMPLATE" (6.3.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefinementTemplate {
    /// 13 pixels, 2 of them adaptive (Figure 12).
    #[default]
    Template0,
    /// 10 pixels (Figure 13).
    Template1,
}

impl RefinementTemplate {
    pub(crate) fn from_bit(bit: bool) -> Self {
        if bit { Self::Template1 } else { Self::Template0 }
    }

    pub(crate) fn to_value(self) -> u8 {
        self as u8
    }

    pub(crate) fn context_bits(self) -> u32 {
        match self {
            Self::Template0 => 13,
            Self::Template1 => 10,
        }
    }

    /// The context in which SLTP is coded (Figures 14 and 15).
    pub(crate) fn sltp_context(self) -> u32 {
        match self {
            Self::Template0 => 0x0010,
            Self::Template1 => 0x0008,
        }
    }

    /// The default AT pixels: "GRATX1 = −1, GRATY1 = −1, GRATX2 = −1,
    /// GRATY2 = −1".
    pub(crate) fn nominal_at_pixels() -> [AtPixel; 2] {
        [AtPixel { x: -1, y: -1 }; 2]
    }
}

/// An adaptive template pixel, relative to the pixel being coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct AtPixel {
    pub(crate) x: i8,
    pub(crate) y: i8,
}

impl AtPixel {
    /// "The AT pixels must all reference pixels that have already been
    /// decoded" (6.2.5.4).
    pub(crate) fn is_causal(self) -> bool {
        self.y < 0 || (self.y == 0 && self.x < 0)
    }
}

/// Read `count` AT pixels for generic coding (7.4.6.3, 7.4.2.1.2).
pub(crate) fn parse_at_pixels(
    reader: &mut Reader<'_>,
    count: usize,
) -> Result<SmallVec<[AtPixel; 4]>> {
    let mut pixels = SmallVec::with_capacity(count);

    for _ in 0..count {
        let pixel = AtPixel {
            x: reader.read_i8()?,
            y: reader.read_i8()?,
        };

        if !pixel.is_causal() {
            bail!(FormatError::InvalidAtPixel);
        }

        pixels.push(pixel);
    }

    Ok(pixels)
}

/// Read the two refinement AT pixels (7.4.7.3, 7.4.2.1.3).
///
/// Only the first one lies in the bitmap being decoded. The second one is
/// taken from the reference bitmap and may point anywhere.
pub(crate) fn parse_refinement_at_pixels(reader: &mut Reader<'_>) -> Result<[AtPixel; 2]> {
    let first = AtPixel {
        x: reader.read_i8()?,
        y: reader.read_i8()?,
    };
    let second = AtPixel {
        x: reader.read_i8()?,
        y: reader.read_i8()?,
    };

    if !first.is_causal() {
        bail!(FormatError::InvalidAtPixel);
    }

    Ok([first, second])
}

pub(crate) fn write_at_pixels(writer: &mut Writer, pixels: &[AtPixel]) {
    for pixel in pixels {
        writer.write_byte(pixel.x as u8);
        writer.write_byte(pixel.y as u8);
    }
}

/// The table a Huffman coded field is decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableChoice {
    /// One of the tables of Annex B.
    Standard(u8),
    /// The next table segment among the referred segments.
    Custom,
}

impl TableChoice {
    /// Interpret a table selection field where the value 3 means "user
    /// supplied" and the other values pick from `standard`.
    pub(crate) fn from_field(value: u16, standard: &[u8]) -> Result<Self> {
        if value == 3 {
            return Ok(Self::Custom);
        }

        standard
            .get(usize::from(value))
            .map(|&n| Self::Standard(n))
            .ok_or(HuffmanError::InvalidSelection.into())
    }
}

/// Hands out the custom tables of the referred table segments, in order.
pub(crate) struct TableSelector<'t> {
    custom: core::slice::Iter<'t, &'t HuffmanTable>,
}

impl<'t> TableSelector<'t> {
    pub(crate) fn new(custom: &'t [&'t HuffmanTable]) -> Self {
        Self {
            custom: custom.iter(),
        }
    }

    pub(crate) fn select(&mut self, choice: TableChoice) -> Result<&'t HuffmanTable> {
        match choice {
            TableChoice::Standard(n) => standard_table(n),
            TableChoice::Custom => self
                .custom
                .next()
                .copied()
                .ok_or(HuffmanError::MissingTables.into()),
        }
    }
}
