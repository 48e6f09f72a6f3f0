//! Segment headers and the segment parser (7.2, Annex D).
//!
//! "A JBIG2 bitstream is composed of a collection of segments." (7.1) Each
//! segment is a header followed by a data part. The parser splits a byte
//! stream into segments without decoding their data.

pub(crate) mod file;
pub(crate) mod page_info;
pub(crate) mod region;

use std::collections::VecDeque;

use smallvec::SmallVec;

use crate::error::{DecodeError, FormatError, ReferenceError, Result, bail};
use crate::reader::Reader;
use crate::writer::Writer;
use file::{FileHeader, Organization};
use region::RegionInfo;

/// "The segment type is a number between 0 and 63, inclusive. Not all values
/// are allowed." (7.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentType {
    /// Symbol dictionary (type 0).
    SymbolDictionary,
    /// Intermediate text region (type 4).
    IntermediateTextRegion,
    /// Immediate text region (type 6).
    ImmediateTextRegion,
    /// Immediate lossless text region (type 7).
    ImmediateLosslessTextRegion,
    /// Pattern dictionary (type 16).
    PatternDictionary,
    /// Intermediate halftone region (type 20).
    IntermediateHalftoneRegion,
    /// Immediate halftone region (type 22).
    ImmediateHalftoneRegion,
    /// Immediate lossless halftone region (type 23).
    ImmediateLosslessHalftoneRegion,
    /// Intermediate generic region (type 36).
    IntermediateGenericRegion,
    /// Immediate generic region (type 38).
    ImmediateGenericRegion,
    /// Immediate lossless generic region (type 39).
    ImmediateLosslessGenericRegion,
    /// Intermediate generic refinement region (type 40).
    IntermediateRefinementRegion,
    /// Immediate generic refinement region (type 42).
    ImmediateRefinementRegion,
    /// Immediate lossless generic refinement region (type 43).
    ImmediateLosslessRefinementRegion,
    /// Page information (type 48).
    PageInformation,
    /// End of page (type 49).
    EndOfPage,
    /// End of stripe (type 50).
    EndOfStripe,
    /// End of file (type 51).
    EndOfFile,
    /// Profiles (type 52).
    Profiles,
    /// Code tables (type 53).
    Tables,
    /// Colour palette (type 54).
    ColourPalette,
    /// Extension (type 62).
    Extension,
}

impl SegmentType {
    /// "All other segment types are reserved and must not be used." (7.3)
    pub(crate) fn from_value(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::SymbolDictionary,
            4 => Self::IntermediateTextRegion,
            6 => Self::ImmediateTextRegion,
            7 => Self::ImmediateLosslessTextRegion,
            16 => Self::PatternDictionary,
            20 => Self::IntermediateHalftoneRegion,
            22 => Self::ImmediateHalftoneRegion,
            23 => Self::ImmediateLosslessHalftoneRegion,
            36 => Self::IntermediateGenericRegion,
            38 => Self::ImmediateGenericRegion,
            39 => Self::ImmediateLosslessGenericRegion,
            40 => Self::IntermediateRefinementRegion,
            42 => Self::ImmediateRefinementRegion,
            43 => Self::ImmediateLosslessRefinementRegion,
            48 => Self::PageInformation,
            49 => Self::EndOfPage,
            50 => Self::EndOfStripe,
            51 => Self::EndOfFile,
            52 => Self::Profiles,
            53 => Self::Tables,
            54 => Self::ColourPalette,
            62 => Self::Extension,
            _ => return None,
        })
    }

    pub(crate) fn to_value(self) -> u8 {
        match self {
            Self::SymbolDictionary => 0,
            Self::IntermediateTextRegion => 4,
            Self::ImmediateTextRegion => 6,
            Self::ImmediateLosslessTextRegion => 7,
            Self::PatternDictionary => 16,
            Self::IntermediateHalftoneRegion => 20,
            Self::ImmediateHalftoneRegion => 22,
            Self::ImmediateLosslessHalftoneRegion => 23,
            Self::IntermediateGenericRegion => 36,
            Self::ImmediateGenericRegion => 38,
            Self::ImmediateLosslessGenericRegion => 39,
            Self::IntermediateRefinementRegion => 40,
            Self::ImmediateRefinementRegion => 42,
            Self::ImmediateLosslessRefinementRegion => 43,
            Self::PageInformation => 48,
            Self::EndOfPage => 49,
            Self::EndOfStripe => 50,
            Self::EndOfFile => 51,
            Self::Profiles => 52,
            Self::Tables => 53,
            Self::ColourPalette => 54,
            Self::Extension => 62,
        }
    }

    /// Whether segments of this type only make sense as part of a page.
    pub(crate) fn is_page_bound(self) -> bool {
        !matches!(
            self,
            Self::SymbolDictionary
                | Self::PatternDictionary
                | Self::EndOfFile
                | Self::Profiles
                | Self::Tables
                | Self::ColourPalette
                | Self::Extension
        )
    }

    /// "If the segment's type is "Immediate generic region", then the length
    /// field may contain the value 0xFFFFFFFF." (7.2.7)
    fn allows_unknown_length(self) -> bool {
        matches!(
            self,
            Self::ImmediateGenericRegion | Self::ImmediateLosslessGenericRegion
        )
    }
}

/// A parsed segment header (7.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    /// "The valid range of segment numbers is 0 through 4294967295
    /// (0xFFFFFFFF) inclusive." (7.2.2)
    pub number: u32,
    /// "Bits 0-5: Segment type." (7.2.3)
    pub segment_type: SegmentType,
    /// "Bit 7: Deferred non-retain." (7.2.3)
    pub deferred_non_retain: bool,
    /// Retention bits. The first entry is the retain bit of this segment,
    /// followed by one entry per referred-to segment.
    pub retention_flags: SmallVec<[bool; 8]>,
    /// "This field contains the segment numbers of the segments that this
    /// segment refers to, if any." (7.2.5)
    pub referred_segments: SmallVec<[u32; 4]>,
    /// "This field encodes the number of the page to which this segment
    /// belongs. [...] this value indicates that this segment is not
    /// associated with any page." (7.2.6)
    pub page_association: u32,
    /// The data length, or `None` for the "unknown" value 0xFFFFFFFF.
    pub data_length: Option<u32>,
}

impl SegmentHeader {
    pub(crate) fn new(number: u32, segment_type: SegmentType, page_association: u32) -> Self {
        Self {
            number,
            segment_type,
            deferred_non_retain: false,
            retention_flags: SmallVec::new(),
            referred_segments: SmallVec::new(),
            page_association,
            data_length: Some(0),
        }
    }

    /// Parse a segment header (7.2.2 to 7.2.7).
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let number = reader.read_u32()?;

        let flags = reader.read_byte()?;
        let segment_type = SegmentType::from_value(flags & 0x3F)
            .ok_or(FormatError::UnknownSegmentType(flags & 0x3F))?;
        let long_page_association = flags & 0x40 != 0;
        let deferred_non_retain = flags & 0x80 != 0;

        // "The three most significant bits of the first byte in this field
        // determine the length of the field. [...] This three-bit subfield
        // must not contain values of 5 and 6." (7.2.4)
        let first = reader.read_byte()?;
        let mut retention_flags = SmallVec::new();

        let count = match first >> 5 {
            5 | 6 => bail!(FormatError::InvalidReferredCount),
            7 => {
                let rest = reader.read_bytes(3)?;
                let count = u32::from_be_bytes([first & 0x1F, rest[0], rest[1], rest[2]]);

                let retention_bytes = (count as usize + 1).div_ceil(8);
                let ref_size = referred_number_size(number);

                if retention_bytes + count as usize * ref_size > reader.remaining() {
                    bail!(FormatError::InvalidReferredCount);
                }

                let bytes = reader.read_bytes(retention_bytes)?;
                retention_flags.extend(
                    (0..=count as usize).map(|i| bytes[i / 8] & (1 << (i % 8)) != 0),
                );

                count
            }
            short => {
                let count = u32::from(short);
                retention_flags.extend((0..=count).map(|i| first & (1 << i) != 0));
                count
            }
        };

        // "When the current segment's number is 256 or less, then each
        // referred-to segment number is one byte long. Otherwise, when the
        // current segment's number is 65536 or less, each referred-to segment
        // number is two bytes long. Otherwise, each referred-to segment
        // number is four bytes long." (7.2.5)
        let mut referred_segments = SmallVec::with_capacity(count as usize);
        for _ in 0..count {
            referred_segments.push(match referred_number_size(number) {
                1 => u32::from(reader.read_byte()?),
                2 => u32::from(reader.read_u16()?),
                _ => reader.read_u32()?,
            });
        }

        let page_association = if long_page_association {
            reader.read_u32()?
        } else {
            u32::from(reader.read_byte()?)
        };

        let data_length = match reader.read_u32()? {
            0xFFFF_FFFF => None,
            len => Some(len),
        };

        Ok(Self {
            number,
            segment_type,
            deferred_non_retain,
            retention_flags,
            referred_segments,
            page_association,
            data_length,
        })
    }

    /// Check the constraints whose violation only invalidates this segment.
    ///
    /// "A segment may only refer to segments with lower segment numbers"
    /// (7.2.5) and region segments must belong to a page.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(&referred) = self.referred_segments.iter().find(|&&r| r >= self.number) {
            bail!(ReferenceError::Forward {
                segment: self.number,
                referred,
            });
        }

        if self.page_association == 0 && self.segment_type.is_page_bound() {
            bail!(FormatError::InvalidPageAssociation);
        }

        Ok(())
    }

    /// Serialize the header.
    pub(crate) fn write(&self, writer: &mut Writer) {
        writer.write_u32(self.number);

        let long_page_association = self.page_association > 0xFF;
        writer.write_byte(
            self.segment_type.to_value()
                | (u8::from(long_page_association) << 6)
                | (u8::from(self.deferred_non_retain) << 7),
        );

        let count = self.referred_segments.len();
        let retain = |i: usize| self.retention_flags.get(i).copied().unwrap_or(false);

        if count <= 4 {
            let bits = (0..=count).fold(0_u8, |acc, i| acc | (u8::from(retain(i)) << i));
            writer.write_byte(((count as u8) << 5) | bits);
        } else {
            writer.write_u32(0xE000_0000 | count as u32);

            for chunk in 0..(count + 1).div_ceil(8) {
                let byte = (0..8).fold(0_u8, |acc, bit| {
                    acc | (u8::from(retain(chunk * 8 + bit)) << bit)
                });
                writer.write_byte(byte);
            }
        }

        for &referred in &self.referred_segments {
            match referred_number_size(self.number) {
                1 => writer.write_byte(referred as u8),
                2 => writer.write_u16(referred as u16),
                _ => writer.write_u32(referred),
            }
        }

        if long_page_association {
            writer.write_u32(self.page_association);
        } else {
            writer.write_byte(self.page_association as u8);
        }

        writer.write_u32(self.data_length.unwrap_or(0xFFFF_FFFF));
    }
}

/// Reject set reserved bits in strict mode, otherwise only log them.
pub(crate) fn check_reserved(bits: u32, strict: bool) -> Result<()> {
    if bits != 0 {
        if strict {
            bail!(FormatError::ReservedBits);
        }

        lwarn!("ignoring reserved bits {:#x}", bits);
    }

    Ok(())
}

fn referred_number_size(number: u32) -> usize {
    if number <= 256 {
        1
    } else if number <= 65536 {
        2
    } else {
        4
    }
}

/// A segment header together with its data part.
#[derive(Debug, Clone)]
pub struct Segment<'a> {
    /// The segment header.
    pub header: SegmentHeader,
    /// The segment data part.
    pub data: &'a [u8],
}

/// A segment that couldn't be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFailure {
    /// The segment number, if the header could be read that far.
    pub segment_number: Option<u32>,
    /// The page association, if the header could be read that far.
    pub page_association: Option<u32>,
    /// What went wrong.
    pub error: DecodeError,
    /// Whether parsing continues after this segment. If `false`, this is
    /// the last item the parser yields.
    pub recoverable: bool,
}

/// An iterator over the segments of a JBIG2 bitstream.
///
/// Segments whose header is intact but invalid (for example because they
/// refer to a later segment) are reported as recoverable failures and
/// their data is skipped. Any other problem ends the iteration.
pub struct Segments<'a> {
    reader: Reader<'a>,
    file_header: Option<FileHeader>,
    /// Headers still waiting for their data part, in the random-access
    /// organization.
    pending: Option<VecDeque<SegmentHeader>>,
    done: bool,
}

impl<'a> Segments<'a> {
    /// Iterate over an embedded stream, such as the content of a PDF image
    /// with the `JBIG2Decode` filter.
    pub fn embedded(data: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(data),
            file_header: None,
            pending: None,
            done: false,
        }
    }

    /// Iterate over a standalone JBIG2 file (Annex D).
    pub fn file(data: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let file_header = FileHeader::parse(&mut reader)?;

        Ok(Self {
            reader,
            file_header: Some(file_header),
            pending: None,
            done: false,
        })
    }

    /// The file header, for standalone files.
    pub(crate) fn file_header(&self) -> Option<&FileHeader> {
        self.file_header.as_ref()
    }

    fn fail(&mut self, header: Option<&SegmentHeader>, error: DecodeError) -> SegmentFailure {
        self.done = true;

        SegmentFailure {
            segment_number: header.map(|h| h.number),
            page_association: header.map(|h| h.page_association),
            error,
            recoverable: false,
        }
    }

    /// "A file header is followed by a sequence of segment headers; the last
    /// segment header is followed by the data for the first segment, then
    /// the data for the second segment, and so on." (D.2)
    fn read_all_headers(&mut self) -> Result<VecDeque<SegmentHeader>> {
        let mut headers = VecDeque::new();

        while !self.reader.at_end() {
            let header = SegmentHeader::parse(&mut self.reader)?;

            if header.data_length.is_none() {
                bail!(FormatError::UnknownLength);
            }

            let is_eof = header.segment_type == SegmentType::EndOfFile;
            headers.push_back(header);

            if is_eof {
                break;
            }
        }

        Ok(headers)
    }

    fn read_data(&mut self, header: &SegmentHeader) -> Result<&'a [u8]> {
        let len = match header.data_length {
            Some(len) => len as usize,
            None if header.segment_type.allows_unknown_length() => {
                unknown_generic_region_length(&self.reader)?
            }
            None => bail!(FormatError::UnknownLength),
        };

        self.reader.read_bytes(len)
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = core::result::Result<Segment<'a>, SegmentFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let random_access = self
            .file_header
            .as_ref()
            .is_some_and(|h| h.organization == Organization::RandomAccess);

        if random_access && self.pending.is_none() {
            match self.read_all_headers() {
                Ok(headers) => self.pending = Some(headers),
                Err(e) => return Some(Err(self.fail(None, e))),
            }
        }

        let header = if let Some(pending) = &mut self.pending {
            let Some(header) = pending.pop_front() else {
                self.done = true;
                return None;
            };
            header
        } else {
            if self.reader.at_end() {
                self.done = true;
                return None;
            }

            match SegmentHeader::parse(&mut self.reader) {
                Ok(header) => header,
                Err(e) => return Some(Err(self.fail(None, e))),
            }
        };

        let data = match self.read_data(&header) {
            Ok(data) => data,
            Err(e) => return Some(Err(self.fail(Some(&header), e))),
        };

        // "If a file contains an end of file segment, it must be the last
        // segment." (7.4.11)
        if header.segment_type == SegmentType::EndOfFile {
            self.done = true;
        }

        if let Err(error) = header.validate() {
            return Some(Err(SegmentFailure {
                segment_number: Some(header.number),
                page_association: Some(header.page_association),
                error,
                recoverable: true,
            }));
        }

        Some(Ok(Segment { header, data }))
    }
}

/// Find the data length of an immediate generic region whose header says
/// the length is unknown.
///
/// "The form of encoding used by the segment may be determined by examining
/// the eighteenth byte of its segment data part, and the end sequences can
/// occur anywhere after that eighteenth byte." (7.2.7)
fn unknown_generic_region_length(reader: &Reader<'_>) -> Result<usize> {
    let data = reader.tail();
    let flags = *data
        .get(RegionInfo::SIZE)
        .ok_or(DecodeError::UnexpectedEndOfData)?;

    // "if MMR is 1, they are preceded by the two-byte sequence 0x00 0x00; if
    // MMR is 0, they are preceded by the two-byte sequence 0xFF 0xAC." (7.4.6.4)
    let marker: [u8; 2] = if flags & 1 != 0 {
        [0x00, 0x00]
    } else {
        [0xFF, 0xAC]
    };

    data.windows(6)
        .enumerate()
        .skip(RegionInfo::SIZE + 1)
        .find(|(_, w)| w[..2] == marker)
        .map(|(pos, _)| pos + 6)
        .ok_or(FormatError::MissingEndMarker.into())
}
