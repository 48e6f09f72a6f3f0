//! Writing JBIG2 streams.
//!
//! The [`Encoder`] produces the embedded organization that PDF's
//! `JBIG2Decode` filter expects, or a sequential standalone file. All
//! regions are coded losslessly with arithmetic coding, except for symbol
//! dictionaries, which can also use the standard Huffman tables.
//!
//! The encoder keeps a copy of the page being written so that refinement
//! regions can be coded against what a decoder will have at that point.

pub(crate) mod generic;
pub(crate) mod refinement;
pub(crate) mod symbol;
pub(crate) mod text;

use smallvec::SmallVec;

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::decode::generic::GenericParams;
use crate::decode::refinement::RefinementParams;
use crate::decode::text::SymbolPlacement;
use crate::decode::{AtPixel, RefinementTemplate, Template};
use crate::error::{EncodeError, EncodeResult};
use crate::huffman::CodeTable;
use crate::segment::file::FileHeader;
use crate::segment::page_info::{PageFlags, PageInformation};
use crate::segment::region::RegionInfo;
use crate::segment::{SegmentHeader, SegmentType};
use crate::writer::Writer;

/// Settings for an immediate generic region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericEncodeParams {
    /// The template used for context formation.
    pub template: Template,
    /// Whether to skip rows that repeat the row above them ("TPGDON").
    pub tpgdon: bool,
    /// Positions of the adaptive template pixels, relative to the pixel
    /// being coded. Template 0 takes four, the others one. `None` selects
    /// the nominal positions.
    pub at_pixels: Option<Vec<(i8, i8)>>,
    /// How the region is combined with the page.
    pub operator: CombinationOperator,
}

impl Default for GenericEncodeParams {
    fn default() -> Self {
        Self {
            template: Template::Template0,
            tpgdon: true,
            at_pixels: None,
            operator: CombinationOperator::Or,
        }
    }
}

/// Settings for an immediate generic refinement region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinementEncodeParams {
    /// The refinement template.
    pub template: RefinementTemplate,
    /// Whether to skip pixels predictable from the reference ("TPGRON").
    pub tpgron: bool,
    /// How the region is combined with the page.
    pub operator: CombinationOperator,
}

impl Default for RefinementEncodeParams {
    fn default() -> Self {
        Self {
            template: RefinementTemplate::Template0,
            tpgron: true,
            operator: CombinationOperator::Replace,
        }
    }
}

/// Settings for a symbol dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolDictionaryEncodeParams {
    /// Code the dictionary with the standard Huffman tables and
    /// uncompressed height class bitmaps instead of arithmetic coding.
    pub huffman: bool,
    /// The generic template for symbol bitmaps in arithmetic mode.
    pub template: Template,
    /// Which symbols to export, one flag per input symbol. `None` exports
    /// all of them.
    pub export: Option<Vec<bool>>,
}

/// Settings for an immediate text region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextRegionEncodeParams {
    /// Base-2 logarithm of the strip height, at most 3.
    pub log_strips: u8,
    /// How the region is combined with the page.
    pub operator: CombinationOperator,
}

/// A symbol dictionary that has been written by an [`Encoder`].
///
/// Pass it to [`Encoder::add_text_region`] to place its symbols. It stays
/// valid for any stream whose segments come after it, which is how a
/// dictionary in a globals stream is shared by several images.
#[derive(Debug, Clone)]
pub struct EncodedDictionary {
    segment: u32,
    symbols: Vec<Bitmap>,
    exported: Vec<usize>,
    order: Vec<usize>,
}

impl EncodedDictionary {
    /// The segment number of the dictionary.
    pub fn segment_number(&self) -> u32 {
        self.segment
    }

    /// The exported symbols, in the order a decoder sees them.
    pub fn symbols(&self) -> &[Bitmap] {
        &self.symbols
    }

    /// The export index of the input symbol `input`, if it was exported.
    ///
    /// Text regions refer to symbols by export index.
    pub fn export_index(&self, input: usize) -> Option<u32> {
        self.exported
            .iter()
            .position(|&i| i == input)
            .map(|i| i as u32)
    }

    /// The input index of each symbol, in the order the dictionary codes
    /// them.
    pub fn coding_order(&self) -> &[usize] {
        &self.order
    }
}

#[derive(Debug)]
struct OpenPage {
    number: u32,
    bitmap: Bitmap,
}

/// Writes a sequence of JBIG2 segments.
///
/// ```
/// use pdf_jbig2::{Bitmap, Encoder, GenericEncodeParams};
///
/// let mut glyph = Bitmap::new(8, 8);
/// glyph.set_pixel(3, 3, true);
///
/// let mut encoder = Encoder::new();
/// encoder.start_page(64, 32).unwrap();
/// encoder
///     .add_generic_region(&glyph, 4, 4, &GenericEncodeParams::default())
///     .unwrap();
/// let data = encoder.finish();
///
/// let document = pdf_jbig2::decode(&data, None).unwrap();
/// assert!(document.pages[0].bitmap.get_pixel(7, 7));
/// ```
#[derive(Debug)]
pub struct Encoder {
    writer: Writer,
    next_segment: u32,
    page_count: u32,
    page: Option<OpenPage>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Create an encoder whose first segment has number 0.
    pub fn new() -> Self {
        Self::with_first_segment(0)
    }

    /// Create an encoder whose first segment has the given number.
    ///
    /// Use this for an image stream that refers to dictionaries in a globals
    /// stream, so that the image's segment numbers come after them.
    pub fn with_first_segment(number: u32) -> Self {
        Self {
            writer: Writer::new(),
            next_segment: number,
            page_count: 0,
            page: None,
        }
    }

    /// The number the next segment will get.
    pub fn next_segment_number(&self) -> u32 {
        self.next_segment
    }

    /// Start a new white page and return its page number. An open page is
    /// ended first.
    pub fn start_page(&mut self, width: u32, height: u32) -> EncodeResult<u32> {
        if width == 0 || height == 0 {
            return Err(EncodeError::EmptyBitmap);
        }

        self.end_page();

        let number = self
            .page_count
            .checked_add(1)
            .ok_or(EncodeError::ValueNotRepresentable)?;

        let mut info = PageInformation::new(width, height);
        info.flags |= PageFlags::MIGHT_CONTAIN_REFINEMENTS | PageFlags::OPERATOR_OVERRIDDEN;

        let mut data = Writer::new();
        info.write(&mut data);
        self.write_segment(SegmentType::PageInformation, number, &[], &data.finish())?;

        self.page_count = number;
        self.page = Some(OpenPage {
            number,
            bitmap: Bitmap::new(width, height),
        });

        Ok(number)
    }

    /// The current content of the open page.
    pub fn page_bitmap(&self) -> Option<&Bitmap> {
        self.page.as_ref().map(|p| &p.bitmap)
    }

    /// Write an end of page segment and return the finished page, if a page
    /// was open.
    pub fn end_page(&mut self) -> Option<Bitmap> {
        let page = self.page.take()?;

        if let Err(e) = self.write_segment(SegmentType::EndOfPage, page.number, &[], &[]) {
            lwarn!("no end of page segment for page {}: {}", page.number, e);
        }

        Some(page.bitmap)
    }

    /// Add an immediate lossless generic region with its top-left corner at
    /// (x, y) and return its segment number.
    pub fn add_generic_region(
        &mut self,
        bitmap: &Bitmap,
        x: u32,
        y: u32,
        params: &GenericEncodeParams,
    ) -> EncodeResult<u32> {
        let page_number = self.page_number()?;
        check_size(bitmap)?;

        let mut generic = GenericParams::new(params.template, params.tpgdon);

        if let Some(pixels) = &params.at_pixels {
            if pixels.len() != params.template.at_pixel_count() {
                return Err(EncodeError::ValueNotRepresentable);
            }

            generic.at_pixels = pixels.iter().map(|&(x, y)| AtPixel { x, y }).collect();

            if !generic.at_pixels.iter().all(|p| p.is_causal()) {
                return Err(EncodeError::ValueNotRepresentable);
            }
        }

        let info = region_info(bitmap, x, y, params.operator);
        let data = generic::encode_region(bitmap, &info, &generic);

        let number = self.write_segment(
            SegmentType::ImmediateLosslessGenericRegion,
            page_number,
            &[],
            &data,
        )?;
        self.draw(bitmap, x, y, params.operator);

        Ok(number)
    }

    /// Add an immediate lossless refinement region with its top-left corner
    /// at (x, y) and return its segment number.
    ///
    /// The region refines the part of the page it covers, so it is coded
    /// against what earlier regions drew there.
    pub fn add_refinement_region(
        &mut self,
        bitmap: &Bitmap,
        x: u32,
        y: u32,
        params: &RefinementEncodeParams,
    ) -> EncodeResult<u32> {
        let page_number = self.page_number()?;
        check_size(bitmap)?;

        let reference = self
            .page_bitmap()
            .ok_or(EncodeError::NoPage)?
            .crop(x, y, bitmap.width(), bitmap.height(), u64::MAX)
            .map_err(|_| EncodeError::ValueNotRepresentable)?;

        let mut refinement = RefinementParams::new(params.template, 0, 0);
        refinement.tpgron = params.tpgron;

        let info = region_info(bitmap, x, y, params.operator);
        let data = refinement::encode_region(bitmap, &reference, &info, &refinement);

        let number = self.write_segment(
            SegmentType::ImmediateLosslessRefinementRegion,
            page_number,
            &[],
            &data,
        )?;
        self.draw(bitmap, x, y, params.operator);

        Ok(number)
    }

    /// Add a symbol dictionary holding `symbols`.
    ///
    /// The dictionary belongs to the open page, or to no page if there is
    /// none, which is what a globals stream needs.
    pub fn add_symbol_dictionary(
        &mut self,
        symbols: &[Bitmap],
        params: &SymbolDictionaryEncodeParams,
    ) -> EncodeResult<EncodedDictionary> {
        let export = params
            .export
            .clone()
            .unwrap_or_else(|| vec![true; symbols.len()]);
        let generic = GenericParams::new(params.template, false);

        let encoded = symbol::encode_dictionary(symbols, &export, params.huffman, &generic)?;
        let page = self.page.as_ref().map_or(0, |p| p.number);
        let segment = self.write_segment(SegmentType::SymbolDictionary, page, &[], &encoded.data)?;

        Ok(EncodedDictionary {
            segment,
            symbols: encoded
                .exported
                .iter()
                .map(|&i| symbols[i].clone())
                .collect(),
            exported: encoded.exported,
            order: encoded.order,
        })
    }

    /// Add a code table segment (7.4.13) and return its segment number.
    pub fn add_code_table(&mut self, table: &CodeTable) -> EncodeResult<u32> {
        let data = table.write()?;
        let page = self.page.as_ref().map_or(0, |p| p.number);

        self.write_segment(SegmentType::Tables, page, &[], &data)
    }

    /// Add an immediate lossless text region of the given size with its
    /// top-left corner at (x, y) and return its segment number.
    ///
    /// Symbol IDs in `instances` index the exported symbols of
    /// `dictionaries`, concatenated in order. Instance coordinates are the
    /// top-left corner of the symbol within the region.
    pub fn add_text_region(
        &mut self,
        dictionaries: &[&EncodedDictionary],
        instances: &[SymbolPlacement],
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        params: &TextRegionEncodeParams,
    ) -> EncodeResult<u32> {
        let page_number = self.page_number()?;

        if width == 0 || height == 0 {
            return Err(EncodeError::EmptyBitmap);
        }

        let symbols: Vec<&Bitmap> = dictionaries.iter().flat_map(|d| d.symbols()).collect();
        let referred: SmallVec<[u32; 4]> = dictionaries.iter().map(|d| d.segment).collect();

        let mut info = RegionInfo::new(width, height, x, y);
        info.operator = params.operator;
        let data = text::encode_region(&info, &symbols, instances, params.log_strips)?;

        let mut region = Bitmap::new(width, height);
        for instance in instances {
            region.combine(
                symbols[instance.symbol as usize],
                i64::from(instance.x),
                i64::from(instance.y),
                CombinationOperator::Or,
            );
        }

        let number = self.write_segment(
            SegmentType::ImmediateLosslessTextRegion,
            page_number,
            &referred,
            &data,
        )?;
        self.draw(&region, x, y, params.operator);

        Ok(number)
    }

    /// End the open page and return the stream in the embedded
    /// organization.
    pub fn finish(mut self) -> Vec<u8> {
        self.end_page();
        self.writer.finish()
    }

    /// End the open page and return a standalone file in the sequential
    /// organization (D.1).
    pub fn into_file(mut self) -> Vec<u8> {
        self.end_page();

        let mut file = Writer::new();
        FileHeader::sequential(Some(self.page_count)).write(&mut file);

        let mut header = SegmentHeader::new(self.next_segment, SegmentType::EndOfFile, 0);
        header.retention_flags.push(false);

        let segments = core::mem::take(&mut self.writer).finish();
        file.write_bytes(&segments);
        header.write(&mut file);

        file.finish()
    }

    fn page_number(&self) -> EncodeResult<u32> {
        self.page
            .as_ref()
            .map(|p| p.number)
            .ok_or(EncodeError::NoPage)
    }

    fn draw(&mut self, bitmap: &Bitmap, x: u32, y: u32, operator: CombinationOperator) {
        if let Some(page) = &mut self.page {
            page.bitmap
                .combine(bitmap, i64::from(x), i64::from(y), operator);
        }
    }

    fn write_segment(
        &mut self,
        segment_type: SegmentType,
        page: u32,
        referred: &[u32],
        data: &[u8],
    ) -> EncodeResult<u32> {
        let number = self.next_segment;

        // An open page always has a number left for its end of page segment.
        let needed = match segment_type {
            SegmentType::EndOfPage => 1,
            SegmentType::PageInformation => 2,
            _ if self.page.is_some() => 2,
            _ => 1,
        };

        if number.checked_add(needed).is_none() || referred.iter().any(|&r| r >= number) {
            return Err(EncodeError::ValueNotRepresentable);
        }

        let mut header = SegmentHeader::new(number, segment_type, page);
        header.referred_segments.extend_from_slice(referred);
        // Dictionaries and tables are kept for later segments, everything
        // else is used once.
        header.retention_flags.push(matches!(
            segment_type,
            SegmentType::SymbolDictionary | SegmentType::Tables
        ));
        header
            .retention_flags
            .extend(core::iter::repeat_n(true, referred.len()));
        header.data_length =
            Some(u32::try_from(data.len()).map_err(|_| EncodeError::ValueNotRepresentable)?);

        self.next_segment = number
            .checked_add(1)
            .ok_or(EncodeError::ValueNotRepresentable)?;

        header.write(&mut self.writer);
        self.writer.write_bytes(data);

        ldebug!(
            "wrote segment {} ({:?}, {} bytes)",
            number,
            segment_type,
            data.len()
        );

        Ok(number)
    }
}

fn check_size(bitmap: &Bitmap) -> EncodeResult<()> {
    if bitmap.width() == 0 || bitmap.height() == 0 {
        return Err(EncodeError::EmptyBitmap);
    }

    Ok(())
}

fn region_info(bitmap: &Bitmap, x: u32, y: u32, operator: CombinationOperator) -> RegionInfo {
    let mut info = RegionInfo::new(bitmap.width(), bitmap.height(), x, y);
    info.operator = operator;
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segments;

    fn segment_types(data: &[u8]) -> Vec<(u32, SegmentType, u32)> {
        Segments::embedded(data)
            .map(|s| {
                let s = s.unwrap();
                (s.header.number, s.header.segment_type, s.header.page_association)
            })
            .collect()
    }

    #[test]
    fn regions_need_a_page() {
        let mut encoder = Encoder::new();

        assert_eq!(
            encoder.add_generic_region(&Bitmap::new(4, 4), 0, 0, &GenericEncodeParams::default()),
            Err(EncodeError::NoPage)
        );
    }

    #[test]
    fn segment_layout() {
        let mut glyph = Bitmap::new(3, 3);
        glyph.set_pixel(1, 1, true);

        let mut encoder = Encoder::with_first_segment(5);
        let dictionary = encoder
            .add_symbol_dictionary(&[glyph.clone()], &SymbolDictionaryEncodeParams::default())
            .unwrap();
        assert_eq!(dictionary.segment_number(), 5);

        encoder.start_page(16, 16).unwrap();
        let placement = SymbolPlacement {
            symbol: 0,
            x: 2,
            y: 2,
        };
        encoder
            .add_text_region(
                &[&dictionary],
                &[placement],
                8,
                8,
                0,
                0,
                &TextRegionEncodeParams::default(),
            )
            .unwrap();

        assert!(encoder.page_bitmap().unwrap().get_pixel(3, 3));
        let data = encoder.finish();

        assert_eq!(
            segment_types(&data),
            [
                (5, SegmentType::SymbolDictionary, 0),
                (6, SegmentType::PageInformation, 1),
                (7, SegmentType::ImmediateLosslessTextRegion, 1),
                (8, SegmentType::EndOfPage, 1),
            ]
        );

        let text = Segments::embedded(&data).nth(2).unwrap().unwrap();
        assert_eq!(text.header.referred_segments.as_slice(), &[5]);
    }

    #[test]
    fn invalid_at_pixels() {
        let mut encoder = Encoder::new();
        encoder.start_page(8, 8).unwrap();

        let params = GenericEncodeParams {
            template: Template::Template1,
            at_pixels: Some(vec![(1, 0)]),
            ..GenericEncodeParams::default()
        };

        assert_eq!(
            encoder.add_generic_region(&Bitmap::new(4, 4), 0, 0, &params),
            Err(EncodeError::ValueNotRepresentable)
        );
    }

    #[test]
    fn standalone_file() {
        let mut encoder = Encoder::new();
        encoder.start_page(8, 8).unwrap();
        let data = encoder.into_file();

        let segments = Segments::file(&data).unwrap();
        assert_eq!(segments.file_header().and_then(|h| h.page_count), Some(1));

        let types: Vec<_> = segments.map(|s| s.unwrap().header.segment_type).collect();
        assert_eq!(
            types,
            [
                SegmentType::PageInformation,
                SegmentType::EndOfPage,
                SegmentType::EndOfFile
            ]
        );
    }

    #[test]
    fn last_segment_number_is_kept_for_end_of_page() {
        let mut encoder = Encoder::with_first_segment(u32::MAX - 2);
        assert_eq!(encoder.start_page(8, 8), Ok(1));

        let mut bitmap = Bitmap::new(4, 4);
        bitmap.fill(true);
        assert_eq!(
            encoder.add_generic_region(&bitmap, 0, 0, &GenericEncodeParams::default()),
            Err(EncodeError::ValueNotRepresentable)
        );
        assert_eq!(encoder.page_bitmap(), Some(&Bitmap::new(8, 8)));

        let data = encoder.finish();
        assert_eq!(
            segment_types(&data),
            [
                (u32::MAX - 2, SegmentType::PageInformation, 1),
                (u32::MAX - 1, SegmentType::EndOfPage, 1),
            ]
        );

        let document = crate::decode(&data, None).unwrap();
        assert_eq!(document.pages.len(), 1);
        assert!(!document.pages[0].bitmap.get_pixel(0, 0));
    }

    #[test]
    fn no_page_after_the_last_segment_number() {
        let mut encoder = Encoder::with_first_segment(u32::MAX - 1);

        assert_eq!(
            encoder.start_page(8, 8),
            Err(EncodeError::ValueNotRepresentable)
        );
        assert!(encoder.page_bitmap().is_none());
        assert!(encoder.finish().is_empty());
    }
}
