//! Region segment information field (7.4.1).

use crate::bitmap::CombinationOperator;
use crate::error::{FormatError, Result, UnsupportedFeature, bail};
use crate::reader::Reader;
use crate::segment::check_reserved;
use crate::writer::Writer;

/// "The region segment information field contains the size and location of
/// the region's bitmap and how it is to be combined with the page." (7.4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RegionInfo {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) operator: CombinationOperator,
}

impl RegionInfo {
    pub(crate) const SIZE: usize = 17;

    pub(crate) fn new(width: u32, height: u32, x: u32, y: u32) -> Self {
        Self {
            width,
            height,
            x,
            y,
            operator: CombinationOperator::Or,
        }
    }

    pub(crate) fn parse(reader: &mut Reader<'_>, strict: bool) -> Result<Self> {
        let width = reader.read_u32()?;
        let height = reader.read_u32()?;
        let x = reader.read_u32()?;
        let y = reader.read_u32()?;

        // "Bits 0-2: External combination operator. [...] Bit 3: Colour
        // extension flag. Bits 4-7: Reserved; must be zero." (7.4.1.5)
        let flags = reader.read_byte()?;
        let operator = CombinationOperator::from_value(flags & 0x07)
            .ok_or(FormatError::InvalidCombinationOperator)?;

        if flags & 0x08 != 0 {
            bail!(UnsupportedFeature::ColourExtension);
        }

        check_reserved(u32::from(flags & 0xF0), strict)?;

        Ok(Self {
            width,
            height,
            x,
            y,
            operator,
        })
    }

    pub(crate) fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.width);
        writer.write_u32(self.height);
        writer.write_u32(self.x);
        writer.write_u32(self.y);
        writer.write_byte(self.operator.to_value());
    }
}
