//! Page information segments (7.4.8).

use bitflags::bitflags;

use crate::bitmap::CombinationOperator;
use crate::error::{FormatError, Result, bail};
use crate::reader::Reader;
use crate::writer::Writer;

bitflags! {
    /// Page segment flags (7.4.8.5). Bits 3-4 hold the default combination
    /// operator and are not part of the flag set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct PageFlags: u8 {
        /// "Page is eventually lossless."
        const LOSSLESS = 1 << 0;
        /// "Page might contain refinements."
        const MIGHT_CONTAIN_REFINEMENTS = 1 << 1;
        /// "Page default pixel value."
        const DEFAULT_PIXEL = 1 << 2;
        /// "Page requires auxiliary buffers."
        const AUXILIARY_BUFFERS = 1 << 5;
        /// "Page combination operator overridden."
        const OPERATOR_OVERRIDDEN = 1 << 6;
        /// "Page might contain coloured segment."
        const MIGHT_CONTAIN_COLOURED = 1 << 7;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageInformation {
    pub(crate) width: u32,
    /// `None` if the height is only known once the page has ended.
    ///
    /// "A page whose height is 0xffffffff is a page whose height is not known
    /// in advance." (7.4.8.2)
    pub(crate) height: Option<u32>,
    /// Pixels per metre, 0 if unknown.
    pub(crate) x_resolution: u32,
    pub(crate) y_resolution: u32,
    pub(crate) flags: PageFlags,
    pub(crate) default_operator: CombinationOperator,
    /// "Bit 15: Page is striped." (7.4.8.6)
    pub(crate) striped: bool,
    pub(crate) max_stripe_size: u16,
}

impl PageInformation {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height: Some(height),
            x_resolution: 0,
            y_resolution: 0,
            flags: PageFlags::LOSSLESS,
            default_operator: CombinationOperator::Or,
            striped: false,
            max_stripe_size: 0,
        }
    }

    pub(crate) fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let width = reader.read_u32()?;
        let height = match reader.read_u32()? {
            0xFFFF_FFFF => None,
            h => Some(h),
        };
        let x_resolution = reader.read_u32()?;
        let y_resolution = reader.read_u32()?;

        let raw = reader.read_byte()?;
        let flags = PageFlags::from_bits_truncate(raw);
        // Only the four operators below fit into two bits.
        let default_operator = CombinationOperator::from_value((raw >> 3) & 0x03)
            .ok_or(FormatError::InvalidCombinationOperator)?;

        let striping = reader.read_u16()?;
        let striped = striping & 0x8000 != 0;

        // "If the page's bitmap height is unknown [...] then the "page is
        // striped" bit must be 1." (7.4.8.6)
        if height.is_none() && !striped {
            bail!(FormatError::InvalidDimension);
        }

        Ok(Self {
            width,
            height,
            x_resolution,
            y_resolution,
            flags,
            default_operator,
            striped,
            max_stripe_size: striping & 0x7FFF,
        })
    }

    pub(crate) fn default_pixel(&self) -> bool {
        self.flags.contains(PageFlags::DEFAULT_PIXEL)
    }

    pub(crate) fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.width);
        writer.write_u32(self.height.unwrap_or(0xFFFF_FFFF));
        writer.write_u32(self.x_resolution);
        writer.write_u32(self.y_resolution);
        writer.write_byte(self.flags.bits() | (self.default_operator.to_value() << 3));
        writer.write_u16((u16::from(self.striped) << 15) | (self.max_stripe_size & 0x7FFF));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn parse_flags_and_striping() {
        let data = [
            0x00, 0x00, 0x00, 0x40, // width 64
            0xFF, 0xFF, 0xFF, 0xFF, // unknown height
            0x00, 0x00, 0x0B, 0x86, // 2950 px/m
            0x00, 0x00, 0x0B, 0x86, //
            0x15, // lossless, default pixel 1, XOR
            0x80, 0x20, // striped, stripes of at most 32 rows
        ];

        let info = PageInformation::parse(&data).unwrap();
        assert_eq!(info.width, 64);
        assert_eq!(info.height, None);
        assert_eq!(info.x_resolution, 2950);
        assert!(info.default_pixel());
        assert!(info.flags.contains(PageFlags::LOSSLESS));
        assert_eq!(info.default_operator, CombinationOperator::Xor);
        assert!(info.striped);
        assert_eq!(info.max_stripe_size, 32);

        let mut writer = Writer::new();
        info.write(&mut writer);
        assert_eq!(writer.finish(), data);
    }

    #[test]
    fn unknown_height_requires_striping() {
        let mut data = [0_u8; 19];
        data[4..8].fill(0xFF);

        assert_eq!(
            PageInformation::parse(&data),
            Err(DecodeError::MalformedSegment(FormatError::InvalidDimension))
        );
    }

    #[test]
    fn truncated() {
        assert_eq!(
            PageInformation::parse(&[0; 18]),
            Err(DecodeError::UnexpectedEndOfData)
        );
    }
}
