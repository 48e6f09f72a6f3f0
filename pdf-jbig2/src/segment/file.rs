//! The standalone file header (Annex D).

use bitflags::bitflags;

use crate::error::{FormatError, Result, bail};
use crate::reader::Reader;
use crate::writer::Writer;

/// "This is an 8-byte sequence containing 0x97 0x4A 0x42 0x32 0x0D 0x0A 0x1A
/// 0x0A." (D.4.1)
pub(crate) const FILE_ID: [u8; 8] = [0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];

bitflags! {
    /// The file header flags (D.4.2). Bits 4-7 are reserved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct FileFlags: u8 {
        /// "If this bit is 0, the file uses the random-access organization.
        /// If this bit is 1, the file uses the sequential organization."
        const SEQUENTIAL = 1 << 0;
        /// "If this bit is 0, the number of pages contained in the file is
        /// known."
        const UNKNOWN_PAGE_COUNT = 1 << 1;
        const EXTENDED_TEMPLATES = 1 << 2;
        const COLOURED = 1 << 3;
    }
}

/// How segment headers and data parts are laid out in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Organization {
    /// Each segment header is directly followed by its data (D.1).
    Sequential,
    /// All segment headers come first, then all data parts (D.2).
    RandomAccess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileHeader {
    pub(crate) organization: Organization,
    pub(crate) page_count: Option<u32>,
    pub(crate) flags: FileFlags,
}

impl FileHeader {
    pub(crate) fn sequential(page_count: Option<u32>) -> Self {
        let mut flags = FileFlags::SEQUENTIAL;
        flags.set(FileFlags::UNKNOWN_PAGE_COUNT, page_count.is_none());

        Self {
            organization: Organization::Sequential,
            page_count,
            flags,
        }
    }

    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        if reader.read_bytes(8)? != FILE_ID {
            bail!(FormatError::InvalidFileHeader);
        }

        // "Bits 4-7 are reserved and must be 0." (D.4.2)
        let Some(flags) = FileFlags::from_bits(reader.read_byte()?) else {
            bail!(FormatError::ReservedBits);
        };

        // "This field is not present if bit 1 of the file header flags is
        // 1." (D.4.3)
        let page_count = if flags.contains(FileFlags::UNKNOWN_PAGE_COUNT) {
            None
        } else {
            Some(reader.read_u32()?)
        };

        let organization = if flags.contains(FileFlags::SEQUENTIAL) {
            Organization::Sequential
        } else {
            Organization::RandomAccess
        };

        Ok(Self {
            organization,
            page_count,
            flags,
        })
    }

    pub(crate) fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&FILE_ID);
        writer.write_byte(self.flags.bits());

        if let Some(count) = self.page_count {
            writer.write_u32(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn sequential_with_page_count() {
        let mut writer = Writer::new();
        FileHeader::sequential(Some(3)).write(&mut writer);
        let data = writer.finish();

        assert_eq!(data.len(), 13);

        let header = FileHeader::parse(&mut Reader::new(&data)).unwrap();
        assert_eq!(header.organization, Organization::Sequential);
        assert_eq!(header.page_count, Some(3));
    }

    #[test]
    fn random_access_with_unknown_page_count() {
        let mut data = FILE_ID.to_vec();
        data.push(0x02);

        let header = FileHeader::parse(&mut Reader::new(&data)).unwrap();
        assert_eq!(header.organization, Organization::RandomAccess);
        assert_eq!(header.page_count, None);
    }

    #[test]
    fn invalid_headers() {
        let mut data = FILE_ID.to_vec();
        data[3] = 0x33;
        data.push(0x03);
        assert_eq!(
            FileHeader::parse(&mut Reader::new(&data)),
            Err(DecodeError::MalformedSegment(FormatError::InvalidFileHeader))
        );

        let mut data = FILE_ID.to_vec();
        data.push(0x13);
        assert_eq!(
            FileHeader::parse(&mut Reader::new(&data)),
            Err(DecodeError::MalformedSegment(FormatError::ReservedBits))
        );
    }
}
