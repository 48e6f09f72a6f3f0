//! Assembling pages from segments.
//!
//! This drives the segment parser over a stream, hands each segment to its
//! region decoder and composes the results onto page bitmaps. Dictionaries,
//! tables and intermediate regions are kept by segment number so later
//! segments can refer to them.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::DecodeSettings;
use crate::bitmap::Bitmap;
use crate::decode::text::{self, SymbolPlacement};
use crate::decode::{Region, generic, refinement, symbol};
use crate::error::{
    DecodeError, FormatError, ReferenceError, Result, UnsupportedFeature, bail, err,
};
use crate::huffman::HuffmanTable;
use crate::reader::Reader;
use crate::segment::page_info::PageInformation;
use crate::segment::region::RegionInfo;
use crate::segment::{Segment, SegmentFailure, SegmentHeader, SegmentType, Segments};
use crate::SymbolDictionary;

/// A decoded page.
#[derive(Debug, Clone)]
pub struct Page {
    /// The page number from the segment headers.
    pub number: u32,
    /// The page content.
    pub bitmap: Bitmap,
    /// Horizontal resolution in pixels per metre, 0 if unknown.
    pub x_resolution: u32,
    /// Vertical resolution in pixels per metre, 0 if unknown.
    pub y_resolution: u32,
    /// The symbol instances of the page's immediate text regions.
    pub text_regions: Vec<TextLayout>,
}

/// Where the symbols of one text region went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLayout {
    /// The segment number of the text region.
    pub segment: u32,
    /// The x coordinate of the region on the page.
    pub x: u32,
    /// The y coordinate of the region on the page.
    pub y: u32,
    /// The placed symbols, in region coordinates and decoding order.
    pub placements: Vec<SymbolPlacement>,
}

/// A page, or a segment that doesn't belong to a page, that couldn't be
/// decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    /// The page number, 0 for segments that don't belong to a page.
    pub page: u32,
    /// The first segment that failed, if the parser got far enough to know.
    pub segment: Option<u32>,
    /// What went wrong.
    pub error: DecodeError,
}

/// The result of decoding a stream.
///
/// Pages that decoded successfully are kept even if other pages failed.
#[derive(Debug, Clone)]
pub struct DecodedDocument {
    /// The pages that decoded successfully, in the order they ended.
    pub pages: Vec<Page>,
    /// The pages and segments that failed.
    pub failures: Vec<PageFailure>,
    dictionaries: FxHashMap<u32, SymbolDictionary>,
}

impl DecodedDocument {
    /// The page with the given page number.
    pub fn page(&self, number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.number == number)
    }

    /// The symbol dictionary decoded from the segment with the given number.
    pub fn symbol_dictionary(&self, segment: u32) -> Option<&SymbolDictionary> {
        self.dictionaries.get(&segment)
    }

    /// All symbol dictionaries of the stream, ordered by segment number.
    pub fn symbol_dictionaries(&self) -> impl Iterator<Item = (u32, &SymbolDictionary)> {
        let mut numbers: Vec<u32> = self.dictionaries.keys().copied().collect();
        numbers.sort_unstable();

        numbers
            .into_iter()
            .filter_map(|n| self.dictionaries.get(&n).map(|d| (n, d)))
    }
}

/// The decoded segments of a globals stream.
///
/// In PDF, a `JBIG2Globals` stream holds the segments that several images
/// share, usually symbol dictionaries. It is decoded once and can then be
/// used by any number of images, also from several threads at once.
#[derive(Debug, Clone)]
pub struct Globals {
    store: Store,
    failures: Vec<PageFailure>,
}

impl Globals {
    /// Decode a globals stream with the default settings.
    pub fn new(data: &[u8]) -> Self {
        Self::with_settings(data, &DecodeSettings::default())
    }

    /// Decode a globals stream.
    pub fn with_settings(data: &[u8], settings: &DecodeSettings) -> Self {
        let mut assembler = Assembler::new(settings, None);
        assembler.run(Segments::embedded(data));

        if !assembler.done.is_empty() {
            lwarn!(
                "ignoring {} pages in globals stream",
                assembler.done.len()
            );
        }

        Self {
            store: assembler.store,
            failures: assembler.failures,
        }
    }

    /// Segments of the globals stream that couldn't be decoded. Image
    /// segments that refer to them fail with
    /// [`DecodeError::InvalidReference`].
    pub fn failures(&self) -> &[PageFailure] {
        &self.failures
    }

    /// The symbol dictionary decoded from the segment with the given number.
    pub fn symbol_dictionary(&self, segment: u32) -> Option<&SymbolDictionary> {
        self.store.dictionaries.get(&segment)
    }
}

/// Decode the segments produced by `segments`.
pub(crate) fn decode_segments(
    segments: Segments<'_>,
    globals: Option<&Globals>,
    settings: &DecodeSettings,
) -> DecodedDocument {
    let mut assembler = Assembler::new(settings, globals);
    assembler.run(segments);

    DecodedDocument {
        pages: assembler.done,
        failures: assembler.failures,
        dictionaries: assembler.store.dictionaries,
    }
}

/// Decoded segments that later segments may refer to.
#[derive(Debug, Clone, Default)]
struct Store {
    dictionaries: FxHashMap<u32, SymbolDictionary>,
    tables: FxHashMap<u32, HuffmanTable>,
    regions: FxHashMap<u32, Region>,
    /// Every segment that was processed successfully.
    decoded: FxHashSet<u32>,
}

enum Referred<'a> {
    Dictionary(&'a SymbolDictionary),
    Table(&'a HuffmanTable),
    Region(&'a Region),
}

impl Store {
    fn get(&self, number: u32) -> Option<Referred<'_>> {
        if let Some(d) = self.dictionaries.get(&number) {
            Some(Referred::Dictionary(d))
        } else if let Some(t) = self.tables.get(&number) {
            Some(Referred::Table(t))
        } else {
            self.regions.get(&number).map(Referred::Region)
        }
    }
}

/// The inputs of a symbol dictionary or text region: the symbols of the
/// referred dictionaries and the referred tables, in reference order.
struct SymbolInputs<'a> {
    symbols: Vec<&'a Bitmap>,
    tables: Vec<&'a HuffmanTable>,
    previous: Option<(u32, &'a SymbolDictionary)>,
}

struct PageState {
    info: PageInformation,
    bitmap: Bitmap,
    text_regions: Vec<TextLayout>,
}

impl PageState {
    fn new(info: PageInformation, settings: &DecodeSettings) -> Result<Self> {
        if info.width == 0 {
            bail!(FormatError::InvalidDimension);
        }

        // "A page whose height is 0xffffffff [...] the page's height is
        // determined by the end of stripe segments" (7.4.8.2). It grows as
        // regions and stripes arrive.
        let mut bitmap = Bitmap::try_new(
            info.width,
            info.height.unwrap_or(0),
            settings.max_pixel_count,
        )?;

        // "Bit 2: Page default pixel value. This bit contains the initial
        // value for every pixel in the page, before any region segments are
        // decoded or drawn." (7.4.8.5)
        if info.default_pixel() {
            bitmap.fill(true);
        }

        Ok(Self {
            info,
            bitmap,
            text_regions: Vec::new(),
        })
    }

    /// Make a page of unknown height at least `height` rows tall.
    fn grow(&mut self, height: u32, settings: &DecodeSettings) -> Result<()> {
        if self.info.height.is_some() || height <= self.bitmap.height() {
            return Ok(());
        }

        if u64::from(self.info.width) * u64::from(height) > settings.max_pixel_count {
            bail!(UnsupportedFeature::ImageTooLarge);
        }

        self.bitmap.extend_height(height, self.info.default_pixel());

        Ok(())
    }

    fn draw(&mut self, region: &Region, settings: &DecodeSettings) -> Result<()> {
        let info = &region.info;
        let right = info.x.checked_add(info.width).ok_or(DecodeError::Overflow)?;
        let bottom = info.y.checked_add(info.height).ok_or(DecodeError::Overflow)?;

        self.grow(bottom, settings)?;

        if right > self.bitmap.width() || bottom > self.bitmap.height() {
            lwarn!(
                "region at ({}, {}) of size {}x{} is clipped to the page",
                info.x,
                info.y,
                info.width,
                info.height
            );
        }

        self.bitmap.combine(
            &region.bitmap,
            i64::from(info.x),
            i64::from(info.y),
            info.operator,
        );

        Ok(())
    }

    fn finish(self, number: u32) -> Page {
        Page {
            number,
            bitmap: self.bitmap,
            x_resolution: self.info.x_resolution,
            y_resolution: self.info.y_resolution,
            text_regions: self.text_regions,
        }
    }
}

struct Assembler<'g> {
    settings: DecodeSettings,
    globals: Option<&'g Globals>,
    store: Store,
    open: FxHashMap<u32, PageState>,
    failed_pages: FxHashSet<u32>,
    done: Vec<Page>,
    failures: Vec<PageFailure>,
    stopped: bool,
}

impl<'g> Assembler<'g> {
    fn new(settings: &DecodeSettings, globals: Option<&'g Globals>) -> Self {
        Self {
            settings: *settings,
            globals,
            store: Store::default(),
            open: FxHashMap::default(),
            failed_pages: FxHashSet::default(),
            done: Vec::new(),
            failures: Vec::new(),
            stopped: false,
        }
    }

    fn run(&mut self, segments: Segments<'_>) {
        for item in segments {
            match item {
                Ok(segment) => self.process(&segment),
                Err(failure) if failure.recoverable => self.fail(
                    failure.page_association.unwrap_or(0),
                    failure.segment_number,
                    failure.error,
                ),
                Err(failure) => {
                    lwarn!("stopping at unreadable segment: {}", failure.error);
                    self.fail_open_pages(&failure);
                    return;
                }
            }

            if self.stopped {
                break;
            }
        }

        // The end of the stream ends every open page.
        let mut remaining: Vec<u32> = self.open.keys().copied().collect();
        remaining.sort_unstable();

        for number in remaining {
            self.end_page(number);
        }
    }

    fn process(&mut self, segment: &Segment<'_>) {
        let header = &segment.header;
        let page = header.page_association;

        if page != 0 && self.failed_pages.contains(&page) {
            ltrace!(
                "skipping segment {} of failed page {page}",
                header.number
            );
            return;
        }

        ltrace!(
            "segment {} ({:?}, page {page}, {} bytes)",
            header.number,
            header.segment_type,
            segment.data.len()
        );

        match self.dispatch(header, segment.data) {
            Ok(()) => {
                self.store.decoded.insert(header.number);
            }
            Err(e) => self.fail(page, Some(header.number), e),
        }
    }

    fn dispatch(&mut self, header: &SegmentHeader, data: &[u8]) -> Result<()> {
        let page = header.page_association;

        match header.segment_type {
            SegmentType::PageInformation => {
                if self.open.contains_key(&page) {
                    bail!(FormatError::DuplicatePageInformation);
                }

                let state = PageState::new(PageInformation::parse(data)?, &self.settings)?;
                self.open.insert(page, state);
            }
            SegmentType::EndOfPage => {
                self.page(page)?;
                self.end_page(page);
            }
            SegmentType::EndOfStripe => {
                // "This field contains the Y coordinate of the last row of
                // the stripe." (7.4.10)
                let row = Reader::new(data).read_u32()?;
                let settings = self.settings;
                self.page(page)?
                    .grow(row.checked_add(1).ok_or(DecodeError::Overflow)?, &settings)?;
            }
            SegmentType::EndOfFile => {
                self.stopped = true;
            }
            SegmentType::Profiles | SegmentType::ColourPalette | SegmentType::Extension => {
                ldebug!(
                    "ignoring {:?} segment {}",
                    header.segment_type,
                    header.number
                );
            }
            SegmentType::Tables => {
                let table = HuffmanTable::read_custom(data)?;
                self.store.tables.insert(header.number, table);
            }
            SegmentType::SymbolDictionary => {
                let dictionary = {
                    let inputs = self.symbol_inputs(header)?;
                    symbol::decode(
                        data,
                        &inputs.symbols,
                        &inputs.tables,
                        inputs.previous,
                        &self.settings,
                    )?
                };

                ltrace!(
                    "segment {} exports {} symbols",
                    header.number,
                    dictionary.len()
                );
                self.store.dictionaries.insert(header.number, dictionary);
            }
            SegmentType::IntermediateGenericRegion
            | SegmentType::ImmediateGenericRegion
            | SegmentType::ImmediateLosslessGenericRegion => {
                self.page(page)?;
                let region =
                    generic::decode_region(data, header.data_length.is_none(), &self.settings)?;
                self.place(header, region)?;
            }
            SegmentType::IntermediateTextRegion
            | SegmentType::ImmediateTextRegion
            | SegmentType::ImmediateLosslessTextRegion => {
                self.page(page)?;
                let decoded = {
                    let inputs = self.symbol_inputs(header)?;
                    text::decode_region(data, &inputs.symbols, &inputs.tables, &self.settings)?
                };

                if header.segment_type != SegmentType::IntermediateTextRegion {
                    let layout = TextLayout {
                        segment: header.number,
                        x: decoded.region.info.x,
                        y: decoded.region.info.y,
                        placements: decoded.placements,
                    };
                    self.page(page)?.text_regions.push(layout);
                }

                self.place(header, decoded.region)?;
            }
            SegmentType::IntermediateRefinementRegion
            | SegmentType::ImmediateRefinementRegion
            | SegmentType::ImmediateLosslessRefinementRegion => {
                self.page(page)?;
                let region = self.decode_refinement(header, data)?;
                self.place(header, region)?;
            }
            SegmentType::PatternDictionary => {
                bail!(UnsupportedFeature::PatternDictionary);
            }
            SegmentType::IntermediateHalftoneRegion
            | SegmentType::ImmediateHalftoneRegion
            | SegmentType::ImmediateLosslessHalftoneRegion => {
                bail!(UnsupportedFeature::Halftone);
            }
        }

        Ok(())
    }

    fn page(&mut self, number: u32) -> Result<&mut PageState> {
        self.open
            .get_mut(&number)
            .ok_or(FormatError::MissingPageInformation.into())
    }

    /// Draw an immediate region onto its page, or keep an intermediate one
    /// for later segments.
    fn place(&mut self, header: &SegmentHeader, region: Region) -> Result<()> {
        let intermediate = matches!(
            header.segment_type,
            SegmentType::IntermediateGenericRegion
                | SegmentType::IntermediateTextRegion
                | SegmentType::IntermediateRefinementRegion
        );

        if intermediate {
            self.store.regions.insert(header.number, region);
        } else {
            let settings = self.settings;
            self.page(header.page_association)?
                .draw(&region, &settings)?;
        }

        Ok(())
    }

    fn decode_refinement(&mut self, header: &SegmentHeader, data: &[u8]) -> Result<Region> {
        let info = RegionInfo::parse(&mut Reader::new(data), self.settings.strict)?;

        // "If this segment refers to another region segment, then set the
        // reference bitmap GRREFERENCE to be the current contents of the
        // auxiliary buffer associated with the region segment that this
        // segment refers to." (7.4.7.5)
        if let Some(&number) = header.referred_segments.first() {
            return match self.referred(number)? {
                Referred::Region(reference) => {
                    refinement::decode_region(data, &reference.bitmap, &self.settings)
                }
                _ => err!(ReferenceError::WrongType(number)),
            };
        }

        // "Otherwise, set GRREFERENCE to be the part of the page buffer
        // corresponding to this segment's region segment information field."
        let settings = self.settings;
        let page = self.page(header.page_association)?;
        info.x.checked_add(info.width).ok_or(DecodeError::Overflow)?;
        let bottom = info.y.checked_add(info.height).ok_or(DecodeError::Overflow)?;
        page.grow(bottom, &settings)?;

        let reference = page.bitmap.crop(
            info.x,
            info.y,
            info.width,
            info.height,
            settings.max_pixel_count,
        )?;
        refinement::decode_region(data, &reference, &settings)
    }

    /// Look a referred segment up in this stream and then in the globals.
    fn referred(&self, number: u32) -> Result<Referred<'_>> {
        let stores = core::iter::once(&self.store).chain(self.globals.map(|g| &g.store));

        for store in stores {
            if let Some(referred) = store.get(number) {
                return Ok(referred);
            }

            if store.decoded.contains(&number) {
                bail!(ReferenceError::WrongType(number));
            }
        }

        err!(ReferenceError::Missing(number))
    }

    fn symbol_inputs(&self, header: &SegmentHeader) -> Result<SymbolInputs<'_>> {
        let mut inputs = SymbolInputs {
            symbols: Vec::new(),
            tables: Vec::new(),
            previous: None,
        };

        // "1) Concatenate all the input symbol dictionaries to form
        // SDINSYMS." (6.5.5)
        for &number in &header.referred_segments {
            match self.referred(number)? {
                Referred::Dictionary(dictionary) => {
                    inputs.symbols.extend(dictionary.symbols());
                    inputs.previous = Some((number, dictionary));
                }
                Referred::Table(table) => inputs.tables.push(table),
                Referred::Region(_) => bail!(ReferenceError::WrongType(number)),
            }
        }

        Ok(inputs)
    }

    fn end_page(&mut self, number: u32) {
        if let Some(state) = self.open.remove(&number) {
            ldebug!(
                "page {number} done ({}x{})",
                state.bitmap.width(),
                state.bitmap.height()
            );
            self.done.push(state.finish(number));
        }
    }

    fn fail(&mut self, page: u32, segment: Option<u32>, error: DecodeError) {
        if let Some(n) = segment {
            lwarn!("segment {} of page {} failed: {}", n, page, error);
        } else {
            lwarn!("segment of page {} failed: {}", page, error);
        }

        if page != 0 {
            self.open.remove(&page);
            self.failed_pages.insert(page);
        }

        self.failures.push(PageFailure {
            page,
            segment,
            error,
        });
    }

    fn fail_open_pages(&mut self, failure: &SegmentFailure) {
        let mut pages: Vec<u32> = self.open.keys().copied().collect();
        pages.sort_unstable();

        if pages.is_empty() {
            pages.push(failure.page_association.unwrap_or(0));
        }

        for page in pages {
            self.fail(page, failure.segment_number, failure.error);
        }
    }
}
