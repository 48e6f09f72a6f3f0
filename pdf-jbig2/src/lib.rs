/*!
A memory-safe, pure-Rust JBIG2 codec for PDF images.

`pdf-jbig2` decodes and encodes bi-level images as specified in ITU-T T.88
(also known as ISO/IEC 14492). In PDF, such images are stored in streams
with the `JBIG2Decode` filter, optionally together with a `JBIG2Globals`
stream that holds the segments shared by several images.

The decoder supports generic, refinement and text regions as well as symbol
dictionaries, with both arithmetic and Huffman coding. Halftone regions,
pattern dictionaries and MMR coding are recognized but reported as
unsupported.

# Example
```rust,no_run
use pdf_jbig2::{Globals, decode};

let globals = Globals::new(&std::fs::read("globals.jb2").unwrap());
let data = std::fs::read("image.jb2").unwrap();
let document = decode(&data, Some(&globals)).unwrap();

for page in &document.pages {
    println!("page {}: {}x{}", page.number, page.bitmap.width(), page.bitmap.height());
}
```

Pages that fail to decode don't affect the other pages of a stream. They
are listed in [`DecodedDocument::failures`].

# Encoding
The [`Encoder`] writes the same segment types losslessly, see its
documentation for an example.

# Features
- `image` (default): conversion between [`Bitmap`] and `image::GrayImage`.
- `logging` (default): diagnostics through the `log` crate.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

#[macro_use]
mod log;

mod arithmetic;
mod bitmap;
mod decode;
mod document;
mod encode;
mod error;
mod huffman;
#[cfg(feature = "image")]
mod integration;
mod reader;
mod segment;
mod writer;

pub use bitmap::{Bitmap, CombinationOperator};
pub use decode::symbol::SymbolDictionary;
pub use decode::text::SymbolPlacement;
pub use decode::{RefinementTemplate, Template};
pub use document::{DecodedDocument, Globals, Page, PageFailure, TextLayout};
pub use encode::{
    EncodedDictionary, Encoder, GenericEncodeParams, RefinementEncodeParams,
    SymbolDictionaryEncodeParams, TextRegionEncodeParams,
};
pub use error::{
    DecodeError, EncodeError, EncodeResult, FormatError, HuffmanError, ReferenceError, Result,
    UnsupportedFeature,
};
pub use huffman::{CodeTable, HuffmanTable, standard_table};
pub use segment::{Segment, SegmentFailure, SegmentHeader, SegmentType, Segments};

/// Settings that apply to decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSettings {
    /// The largest number of pixels any page or region bitmap may have.
    ///
    /// Larger bitmaps fail with [`UnsupportedFeature::ImageTooLarge`]
    /// before anything is allocated.
    pub max_pixel_count: u64,
    /// Whether to reject set reserved bits instead of ignoring them.
    ///
    /// Some producers write garbage into reserved fields, so this is off by
    /// default.
    pub strict: bool,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            max_pixel_count: 1 << 30,
            strict: false,
        }
    }
}

/// Decode an embedded JBIG2 stream, as found in PDF files.
///
/// `globals` holds the decoded `JBIG2Globals` stream, if the image has one.
///
/// Returns an error only if no page could be decoded at all. Otherwise,
/// failed pages are reported in [`DecodedDocument::failures`].
pub fn decode(data: &[u8], globals: Option<&Globals>) -> Result<DecodedDocument> {
    decode_with_settings(data, globals, &DecodeSettings::default())
}

/// Decode an embedded JBIG2 stream with custom settings.
pub fn decode_with_settings(
    data: &[u8],
    globals: Option<&Globals>,
    settings: &DecodeSettings,
) -> Result<DecodedDocument> {
    check_document(document::decode_segments(
        Segments::embedded(data),
        globals,
        settings,
    ))
}

/// Decode a standalone JBIG2 file (Annex D), in either the sequential or the
/// random-access organization.
pub fn decode_file(data: &[u8]) -> Result<DecodedDocument> {
    decode_file_with_settings(data, &DecodeSettings::default())
}

/// Decode a standalone JBIG2 file with custom settings.
pub fn decode_file_with_settings(
    data: &[u8],
    settings: &DecodeSettings,
) -> Result<DecodedDocument> {
    let segments = Segments::file(data)?;

    if let Some(header) = segments.file_header() {
        ldebug!("file header: {:?}", header);
    }

    check_document(document::decode_segments(segments, None, settings))
}

fn check_document(document: DecodedDocument) -> Result<DecodedDocument> {
    match document.failures.first() {
        Some(failure) if document.pages.is_empty() => Err(failure.error),
        _ => Ok(document),
    }
}
