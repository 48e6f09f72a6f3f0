//! Error types for JBIG2 decoding and encoding.

use core::fmt;

/// The main error type for JBIG2 decoding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A segment header or payload is structurally invalid.
    MalformedSegment(FormatError),
    /// The data is valid but uses a feature this crate does not implement.
    UnsupportedFeature(UnsupportedFeature),
    /// The input ended before the decoder was done with it.
    UnexpectedEndOfData,
    /// A segment refers to a segment that cannot be used.
    InvalidReference(ReferenceError),
    /// Errors related to Huffman coding.
    Huffman(HuffmanError),
    /// Arithmetic overflow in coordinate or size calculations.
    Overflow,
}

/// Errors describing a structurally invalid segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Invalid file header signature.
    InvalidFileHeader,
    /// Reserved bits are not zero.
    ReservedBits,
    /// Unknown or reserved segment type.
    UnknownSegmentType(u8),
    /// Invalid referred-to segment count.
    InvalidReferredCount,
    /// A page-bound segment is associated with page 0.
    InvalidPageAssociation,
    /// The segment has an unknown data length where that isn't allowed.
    UnknownLength,
    /// Missing end marker for unknown-length region.
    MissingEndMarker,
    /// Invalid combination operator value.
    InvalidCombinationOperator,
    /// A region or page with an invalid dimension.
    InvalidDimension,
    /// Invalid adaptive template pixel location.
    InvalidAtPixel,
    /// A region segment appeared before the page information segment.
    MissingPageInformation,
    /// A second page information segment for the same page.
    DuplicatePageInformation,
    /// A text region or aggregate symbol contains more symbol instances
    /// than announced.
    TooManyInstances,
    /// A symbol ID is out of range.
    SymbolOutOfRange,
    /// The number of exported symbols doesn't match the announced count.
    ExportCountMismatch,
    /// A symbol height class or width is not valid.
    InvalidSymbolSize,
    /// Reused coding contexts don't match the segment parameters.
    ContextMismatch,
}

/// Features that are valid JBIG2 but not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedFeature {
    /// MMR (T.6) coded bitmaps.
    Mmr,
    /// Halftone region segments.
    Halftone,
    /// Pattern dictionary segments.
    PatternDictionary,
    /// Generic region templates with 12 AT pixels.
    ExtendedTemplate,
    /// Coloured region segments.
    ColourExtension,
    /// A bitmap exceeds the configured size limit.
    ImageTooLarge,
}

/// Errors related to segment references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceError {
    /// A segment refers to a segment with an equal or larger number.
    Forward {
        /// The referring segment.
        segment: u32,
        /// The referred-to segment.
        referred: u32,
    },
    /// The referred-to segment has not been decoded.
    Missing(u32),
    /// The referred-to segment is of an unexpected type.
    WrongType(u32),
}

/// Errors related to Huffman coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanError {
    /// Invalid Huffman code sequence.
    InvalidCode,
    /// Invalid Huffman table selection.
    InvalidSelection,
    /// Not enough referred Huffman tables.
    MissingTables,
    /// The table lines don't form a prefix code.
    InvalidTable,
    /// Unexpected out-of-band value.
    UnexpectedOob,
    /// Standard tables are numbered 1 to 15.
    UnknownStandardTable(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedSegment(e) => write!(f, "malformed segment: {e}"),
            Self::UnsupportedFeature(e) => write!(f, "unsupported feature: {e}"),
            Self::UnexpectedEndOfData => write!(f, "unexpected end of data"),
            Self::InvalidReference(e) => write!(f, "invalid reference: {e}"),
            Self::Huffman(e) => write!(f, "{e}"),
            Self::Overflow => write!(f, "arithmetic overflow"),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFileHeader => write!(f, "invalid JBIG2 file header"),
            Self::ReservedBits => write!(f, "reserved bits must be zero"),
            Self::UnknownSegmentType(t) => write!(f, "unknown segment type {t}"),
            Self::InvalidReferredCount => write!(f, "invalid referred-to segment count"),
            Self::InvalidPageAssociation => write!(f, "invalid page association"),
            Self::UnknownLength => write!(f, "unknown segment data length"),
            Self::MissingEndMarker => write!(f, "missing end marker for unknown-length region"),
            Self::InvalidCombinationOperator => write!(f, "invalid combination operator"),
            Self::InvalidDimension => write!(f, "invalid dimension value"),
            Self::InvalidAtPixel => write!(f, "invalid adaptive template pixel location"),
            Self::MissingPageInformation => write!(f, "region before page information"),
            Self::DuplicatePageInformation => write!(f, "duplicate page information"),
            Self::TooManyInstances => write!(f, "too many symbol instances"),
            Self::SymbolOutOfRange => write!(f, "symbol ID out of range"),
            Self::ExportCountMismatch => write!(f, "exported symbol count mismatch"),
            Self::InvalidSymbolSize => write!(f, "invalid symbol size"),
            Self::ContextMismatch => write!(f, "retained coding contexts don't match"),
        }
    }
}

impl fmt::Display for UnsupportedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mmr => write!(f, "MMR coding"),
            Self::Halftone => write!(f, "halftone regions"),
            Self::PatternDictionary => write!(f, "pattern dictionaries"),
            Self::ExtendedTemplate => write!(f, "extended generic templates"),
            Self::ColourExtension => write!(f, "coloured regions"),
            Self::ImageTooLarge => write!(f, "image exceeds the pixel limit"),
        }
    }
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward { segment, referred } => {
                write!(f, "segment {segment} refers to later segment {referred}")
            }
            Self::Missing(n) => write!(f, "segment {n} is not available"),
            Self::WrongType(n) => write!(f, "segment {n} has an unexpected type"),
        }
    }
}

impl fmt::Display for HuffmanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCode => write!(f, "invalid Huffman code"),
            Self::InvalidSelection => write!(f, "invalid Huffman table selection"),
            Self::MissingTables => write!(f, "not enough referred Huffman tables"),
            Self::InvalidTable => write!(f, "Huffman table is not a prefix code"),
            Self::UnexpectedOob => write!(f, "unexpected out-of-band value"),
            Self::UnknownStandardTable(n) => write!(f, "no standard Huffman table {n}"),
        }
    }
}

impl core::error::Error for DecodeError {}
impl core::error::Error for FormatError {}
impl core::error::Error for UnsupportedFeature {}
impl core::error::Error for ReferenceError {}
impl core::error::Error for HuffmanError {}

impl From<FormatError> for DecodeError {
    fn from(e: FormatError) -> Self {
        Self::MalformedSegment(e)
    }
}

impl From<UnsupportedFeature> for DecodeError {
    fn from(e: UnsupportedFeature) -> Self {
        Self::UnsupportedFeature(e)
    }
}

impl From<ReferenceError> for DecodeError {
    fn from(e: ReferenceError) -> Self {
        Self::InvalidReference(e)
    }
}

impl From<HuffmanError> for DecodeError {
    fn from(e: HuffmanError) -> Self {
        Self::Huffman(e)
    }
}

/// Result type for JBIG2 decoding operations.
pub type Result<T> = core::result::Result<T, DecodeError>;

/// Errors returned by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Bitmaps with zero width or height can't be encoded.
    EmptyBitmap,
    /// Two bitmaps that must have the same size don't.
    DimensionMismatch,
    /// A symbol instance refers to a symbol that doesn't exist.
    SymbolOutOfRange,
    /// A value can't be represented with the selected coding.
    ValueNotRepresentable,
    /// A region was added while no page was open.
    NoPage,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBitmap => write!(f, "empty bitmap"),
            Self::DimensionMismatch => write!(f, "bitmap dimensions don't match"),
            Self::SymbolOutOfRange => write!(f, "symbol ID out of range"),
            Self::ValueNotRepresentable => write!(f, "value is not representable"),
            Self::NoPage => write!(f, "no page has been started"),
        }
    }
}

impl core::error::Error for EncodeError {}

/// Result type for JBIG2 encoding operations.
pub type EncodeResult<T> = core::result::Result<T, EncodeError>;

macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

macro_rules! err {
    ($err:expr) => {
        Err($err.into())
    };
}

pub(crate) use bail;
pub(crate) use err;
