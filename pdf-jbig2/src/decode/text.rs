//! Text region decoding (6.4, 7.4.3).
//!
//! A text region is a list of symbol instances, each one a reference into
//! the symbols of the referred dictionaries plus a position. Instances are
//! grouped into strips along the T axis and ordered along the S axis within
//! a strip. Which axis is horizontal depends on TRANSPOSED.

use super::refinement::{self, RefinementParams};
use super::{
    AtPixel, RefinementTemplate, Region, TableChoice, TableSelector, parse_refinement_at_pixels,
};
use crate::DecodeSettings;
use crate::arithmetic::{Contexts, Decoder, IntegerDecoder, SymbolIdDecoder};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{DecodeError, FormatError, HuffmanError, Result, bail};
use crate::huffman::{Code, HuffmanTable, standard_table};
use crate::reader::Reader;
use crate::segment::check_reserved;
use crate::segment::region::RegionInfo;

/// "REFCORNER" (7.4.3.1.1): the corner of a symbol instance that its
/// coordinates refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ReferenceCorner {
    BottomLeft,
    #[default]
    TopLeft,
    BottomRight,
    TopRight,
}

impl ReferenceCorner {
    pub(crate) fn from_value(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::BottomLeft,
            1 => Self::TopLeft,
            2 => Self::BottomRight,
            _ => Self::TopRight,
        }
    }

    pub(crate) fn to_value(self) -> u8 {
        self as u8
    }

    fn is_left(self) -> bool {
        matches!(self, Self::TopLeft | Self::BottomLeft)
    }

    fn is_top(self) -> bool {
        matches!(self, Self::TopLeft | Self::TopRight)
    }
}

/// Where a symbol instance ended up, in region coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolPlacement {
    /// The index of the symbol among the symbols available to the region.
    pub symbol: u32,
    /// The x coordinate of the top-left corner of the placed bitmap.
    pub x: i32,
    /// The y coordinate of the top-left corner of the placed bitmap.
    pub y: i32,
}

/// The parameters of the text region decoding procedure (Table 9) that
/// don't depend on the coding method.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextParams {
    pub(crate) num_instances: u32,
    /// "LOGSBSTRIPS"
    pub(crate) log_strips: u8,
    pub(crate) corner: ReferenceCorner,
    pub(crate) transposed: bool,
    pub(crate) operator: CombinationOperator,
    /// "SBDSOFFSET"
    pub(crate) ds_offset: i32,
    pub(crate) refine: bool,
    pub(crate) refinement_template: RefinementTemplate,
    pub(crate) refinement_at_pixels: [AtPixel; 2],
    pub(crate) max_pixel_count: u64,
}

impl TextParams {
    fn strips(&self) -> i32 {
        1 << self.log_strips
    }
}

/// The refinement values of a single symbol instance (6.4.11).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RefinementDeltas {
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) x: i32,
    pub(crate) y: i32,
}

/// The source of the values that make up a text region, either the
/// arithmetic integer decoders or Huffman tables.
pub(crate) trait TextValues {
    /// "DT", not yet multiplied by SBSTRIPS.
    fn strip_delta_t(&mut self) -> Result<i32>;
    /// "DFS"
    fn first_s(&mut self) -> Result<i32>;
    /// "IDS", or `None` at the end of a strip.
    fn delta_s(&mut self) -> Result<Option<i32>>;
    /// "CURT", only present if there is more than one strip.
    fn instance_t(&mut self, log_strips: u8) -> Result<i32>;
    /// "ID"
    fn symbol_id(&mut self) -> Result<u32>;
    /// "RI"
    fn refinement_flag(&mut self) -> Result<bool>;
    fn refinement_deltas(&mut self) -> Result<RefinementDeltas>;
    /// Decode a refined instance bitmap into `bitmap`.
    fn refine(
        &mut self,
        bitmap: &mut Bitmap,
        reference: &Bitmap,
        params: &RefinementParams,
    ) -> Result<()>;
}

/// The integer decoders of a text region (Table 31), kept together so that
/// symbol dictionaries can carry them from one aggregate symbol to the next.
#[derive(Debug, Clone)]
pub(crate) struct TextContexts {
    iadt: IntegerDecoder,
    iafs: IntegerDecoder,
    iads: IntegerDecoder,
    iait: IntegerDecoder,
    iari: IntegerDecoder,
    iardw: IntegerDecoder,
    iardh: IntegerDecoder,
    pub(crate) iardx: IntegerDecoder,
    pub(crate) iardy: IntegerDecoder,
    pub(crate) iaid: SymbolIdDecoder,
}

impl TextContexts {
    pub(crate) fn new(symbol_code_length: u32) -> Self {
        Self {
            iadt: IntegerDecoder::new(),
            iafs: IntegerDecoder::new(),
            iads: IntegerDecoder::new(),
            iait: IntegerDecoder::new(),
            iari: IntegerDecoder::new(),
            iardw: IntegerDecoder::new(),
            iardh: IntegerDecoder::new(),
            iardx: IntegerDecoder::new(),
            iardy: IntegerDecoder::new(),
            iaid: SymbolIdDecoder::new(symbol_code_length),
        }
    }
}

pub(crate) struct ArithmeticValues<'c, 'a> {
    pub(crate) decoder: &'c mut Decoder<'a>,
    pub(crate) contexts: &'c mut TextContexts,
    pub(crate) refinement: &'c mut Contexts,
}

impl TextValues for ArithmeticValues<'_, '_> {
    fn strip_delta_t(&mut self) -> Result<i32> {
        self.contexts.iadt.decode_value(self.decoder)
    }

    fn first_s(&mut self) -> Result<i32> {
        self.contexts.iafs.decode_value(self.decoder)
    }

    fn delta_s(&mut self) -> Result<Option<i32>> {
        self.contexts.iads.decode(self.decoder)
    }

    fn instance_t(&mut self, _: u8) -> Result<i32> {
        self.contexts.iait.decode_value(self.decoder)
    }

    fn symbol_id(&mut self) -> Result<u32> {
        self.contexts.iaid.decode(self.decoder)
    }

    fn refinement_flag(&mut self) -> Result<bool> {
        Ok(self.contexts.iari.decode_value(self.decoder)? != 0)
    }

    fn refinement_deltas(&mut self) -> Result<RefinementDeltas> {
        Ok(RefinementDeltas {
            width: self.contexts.iardw.decode_value(self.decoder)?,
            height: self.contexts.iardh.decode_value(self.decoder)?,
            x: self.contexts.iardx.decode_value(self.decoder)?,
            y: self.contexts.iardy.decode_value(self.decoder)?,
        })
    }

    fn refine(
        &mut self,
        bitmap: &mut Bitmap,
        reference: &Bitmap,
        params: &RefinementParams,
    ) -> Result<()> {
        refinement::decode_bitmap(self.decoder, self.refinement, bitmap, reference, params)
    }
}

/// The Huffman tables of a text region, in the order of 7.4.3.1.2.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextTables<'t> {
    pub(crate) fs: &'t HuffmanTable,
    pub(crate) ds: &'t HuffmanTable,
    pub(crate) dt: &'t HuffmanTable,
    pub(crate) rdw: &'t HuffmanTable,
    pub(crate) rdh: &'t HuffmanTable,
    pub(crate) rdx: &'t HuffmanTable,
    pub(crate) rdy: &'t HuffmanTable,
    pub(crate) rsize: &'t HuffmanTable,
}

impl TextTables<'static> {
    /// The tables used for aggregate symbols in Huffman coded symbol
    /// dictionaries (Table 17).
    pub(crate) fn aggregate() -> Result<Self> {
        Ok(Self {
            fs: standard_table(6)?,
            ds: standard_table(8)?,
            dt: standard_table(11)?,
            rdw: standard_table(15)?,
            rdh: standard_table(15)?,
            rdx: standard_table(15)?,
            rdy: standard_table(15)?,
            rsize: standard_table(1)?,
        })
    }
}

/// How symbol IDs are coded in Huffman mode.
#[derive(Debug)]
pub(crate) enum SymbolIdCoding {
    /// The table of 7.4.3.1.7.
    Table(HuffmanTable),
    /// Fixed-length codes, used by aggregate symbols (6.5.8.2.3).
    Fixed(u8),
}

pub(crate) struct HuffmanValues<'c, 'a, 't> {
    pub(crate) reader: &'c mut Reader<'a>,
    pub(crate) tables: TextTables<'t>,
    pub(crate) symbol_ids: &'c SymbolIdCoding,
}

impl TextValues for HuffmanValues<'_, '_, '_> {
    fn strip_delta_t(&mut self) -> Result<i32> {
        self.tables.dt.decode_value(self.reader)
    }

    fn first_s(&mut self) -> Result<i32> {
        self.tables.fs.decode_value(self.reader)
    }

    fn delta_s(&mut self) -> Result<Option<i32>> {
        self.tables.ds.decode(self.reader)
    }

    fn instance_t(&mut self, log_strips: u8) -> Result<i32> {
        Ok(self.reader.read_bits(log_strips)? as i32)
    }

    fn symbol_id(&mut self) -> Result<u32> {
        match self.symbol_ids {
            SymbolIdCoding::Table(table) => Ok(table.decode_value(self.reader)? as u32),
            SymbolIdCoding::Fixed(bits) => self.reader.read_bits(*bits),
        }
    }

    fn refinement_flag(&mut self) -> Result<bool> {
        Ok(self.reader.read_bit()? != 0)
    }

    fn refinement_deltas(&mut self) -> Result<RefinementDeltas> {
        Ok(RefinementDeltas {
            width: self.tables.rdw.decode_value(self.reader)?,
            height: self.tables.rdh.decode_value(self.reader)?,
            x: self.tables.rdx.decode_value(self.reader)?,
            y: self.tables.rdy.decode_value(self.reader)?,
        })
    }

    fn refine(
        &mut self,
        bitmap: &mut Bitmap,
        reference: &Bitmap,
        params: &RefinementParams,
    ) -> Result<()> {
        // "If SBHUFF is 1, then [...] decode BMSIZE using SBHUFFRSIZE [...]
        // skip over any bits remaining in the last byte read." (6.4.11.1)
        let size = self.tables.rsize.decode_value(self.reader)?;
        let size = usize::try_from(size).map_err(|_| FormatError::InvalidDimension)?;
        self.reader.align();

        let data = self.reader.read_bytes(size)?;
        let mut decoder = Decoder::new(data);
        let mut contexts = params.contexts();

        refinement::decode_bitmap(&mut decoder, &mut contexts, bitmap, reference, params)
    }
}

/// The text region decoding procedure (6.4.5).
///
/// Draws the instances onto `region`, which already holds SBDEFPIXEL, and
/// returns where each of them was placed.
pub(crate) fn decode_instances(
    values: &mut impl TextValues,
    symbols: &[&Bitmap],
    params: &TextParams,
    region: &mut Bitmap,
) -> Result<Vec<SymbolPlacement>> {
    let strips = params.strips();
    let mut placements = Vec::with_capacity(params.num_instances.min(1 << 16) as usize);

    // "1) Decode the initial STRIPT value [...] Set: STRIPT = STRIPT ×
    // SBSTRIPS"
    let mut strip_t = mul(values.strip_delta_t()?, strips)?
        .checked_neg()
        .ok_or(DecodeError::Overflow)?;
    let mut first_s = 0_i32;

    // "4) [...] until NINSTANCES = SBNUMINSTANCES"
    while (placements.len() as u32) < params.num_instances {
        // "b) Decode the strip's delta T value as described in 6.4.6."
        strip_t = add(strip_t, mul(values.strip_delta_t()?, strips)?)?;

        let mut cur_s = None;

        loop {
            let s = match cur_s {
                // "i) If the current symbol instance is the first symbol
                // instance in the strip, then decode the first symbol
                // instance's S coordinate as described in 6.4.7."
                None => {
                    first_s = add(first_s, values.first_s()?)?;
                    first_s
                }
                // "ii) Otherwise, decode the symbol instance's S coordinate as
                // described in 6.4.8. If the result of this decoding is OOB
                // then the last symbol instance of the strip has been
                // decoded"
                Some(s) => match values.delta_s()? {
                    Some(ds) => add(add(s, ds)?, params.ds_offset)?,
                    None => break,
                },
            };

            if placements.len() as u32 >= params.num_instances {
                bail!(FormatError::TooManyInstances);
            }

            // "iii) Decode the symbol instance's T coordinate as described in
            // 6.4.9."
            let cur_t = if strips == 1 {
                0
            } else {
                values.instance_t(params.log_strips)?
            };
            let t = add(strip_t, cur_t)?;

            let id = values.symbol_id()?;
            let symbol = *symbols
                .get(id as usize)
                .ok_or(FormatError::SymbolOutOfRange)?;

            let refined = if params.refine && values.refinement_flag()? {
                Some(refine_instance(values, symbol, params)?)
            } else {
                None
            };
            let bitmap = refined.as_ref().unwrap_or(symbol);

            let (placement, next_s) = place(params, bitmap, id, s, t)?;
            region.combine(
                bitmap,
                i64::from(placement.x),
                i64::from(placement.y),
                params.operator,
            );

            placements.push(placement);
            cur_s = Some(next_s);
        }
    }

    Ok(placements)
}

/// "6.4.11 Symbol instance bitmap" with RI = 1.
fn refine_instance(
    values: &mut impl TextValues,
    symbol: &Bitmap,
    params: &TextParams,
) -> Result<Bitmap> {
    let deltas = values.refinement_deltas()?;

    let size = |base: u32, delta: i32| {
        u32::try_from(i64::from(base) + i64::from(delta))
            .map_err(|_| DecodeError::from(FormatError::InvalidSymbolSize))
    };
    let width = size(symbol.width(), deltas.width)?;
    let height = size(symbol.height(), deltas.height)?;

    // "GRREFERENCEDX = ⌊RDWI / 2⌋ + RDXI, GRREFERENCEDY = ⌊RDHI / 2⌋ + RDYI"
    let refinement = RefinementParams {
        template: params.refinement_template,
        tpgron: false,
        at_pixels: params.refinement_at_pixels,
        dx: add(deltas.width >> 1, deltas.x)?,
        dy: add(deltas.height >> 1, deltas.y)?,
    };

    let mut bitmap = Bitmap::try_new(width, height, params.max_pixel_count)?;
    values.refine(&mut bitmap, symbol, &refinement)?;

    Ok(bitmap)
}

/// Work out the top-left corner of an instance whose reference corner lies
/// at (S, T), and the value of CURS after it (6.4.5, steps 3 c) vi to x).
fn place(
    params: &TextParams,
    bitmap: &Bitmap,
    id: u32,
    s: i32,
    t: i32,
) -> Result<(SymbolPlacement, i32)> {
    let width = i32::try_from(bitmap.width()).map_err(|_| DecodeError::Overflow)?;
    let height = i32::try_from(bitmap.height()).map_err(|_| DecodeError::Overflow)?;

    // The extent of the instance along S.
    let extent = if params.transposed { height } else { width };
    let corner = params.corner;

    // "vi) [...] If TRANSPOSED is 0 and REFCORNER is TOPRIGHT or
    // BOTTOMRIGHT, set: CURS = CURS + WI – 1. If TRANSPOSED is 1 and
    // REFCORNER is BOTTOMLEFT or BOTTOMRIGHT, set: CURS = CURS + HI – 1."
    let advance_first = if params.transposed {
        !corner.is_top()
    } else {
        !corner.is_left()
    };

    let s = if advance_first {
        add(s, extent - 1)?
    } else {
        s
    };

    let (along_x, along_y) = if params.transposed { (t, s) } else { (s, t) };

    let x = if corner.is_left() {
        along_x
    } else {
        add(along_x, 1 - width)?
    };
    let y = if corner.is_top() {
        along_y
    } else {
        add(along_y, 1 - height)?
    };

    let next_s = if advance_first {
        s
    } else {
        add(s, extent - 1)?
    };

    Ok((SymbolPlacement { symbol: id, x, y }, next_s))
}

fn add(a: i32, b: i32) -> Result<i32> {
    a.checked_add(b).ok_or(DecodeError::Overflow)
}

fn mul(a: i32, b: i32) -> Result<i32> {
    a.checked_mul(b).ok_or(DecodeError::Overflow)
}

/// The Huffman table flags of a text region (7.4.3.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TextHuffmanFlags {
    pub(crate) fs: TableChoice,
    pub(crate) ds: TableChoice,
    pub(crate) dt: TableChoice,
    pub(crate) rdw: TableChoice,
    pub(crate) rdh: TableChoice,
    pub(crate) rdx: TableChoice,
    pub(crate) rdy: TableChoice,
    pub(crate) rsize: TableChoice,
}

pub(crate) const FS_TABLES: &[u8] = &[6, 7];
pub(crate) const DS_TABLES: &[u8] = &[8, 9, 10];
pub(crate) const DT_TABLES: &[u8] = &[11, 12, 13];
pub(crate) const RD_TABLES: &[u8] = &[14, 15];

impl TextHuffmanFlags {
    fn parse(flags: u16, strict: bool) -> Result<Self> {
        let field = |shift: u16| (flags >> shift) & 0x03;

        check_reserved(u32::from(flags & 0x8000), strict)?;

        Ok(Self {
            fs: TableChoice::from_field(field(0), FS_TABLES)?,
            ds: TableChoice::from_field(field(2), DS_TABLES)?,
            dt: TableChoice::from_field(field(4), DT_TABLES)?,
            rdw: TableChoice::from_field(field(6), RD_TABLES)?,
            rdh: TableChoice::from_field(field(8), RD_TABLES)?,
            rdx: TableChoice::from_field(field(10), RD_TABLES)?,
            rdy: TableChoice::from_field(field(12), RD_TABLES)?,
            rsize: if flags & 0x4000 != 0 {
                TableChoice::Custom
            } else {
                TableChoice::Standard(1)
            },
        })
    }

    /// "The Huffman tables are taken from the referred table segments in
    /// the order FS, DS, DT, RDW, RDH, RDX, RDY, RSIZE."
    fn resolve<'t>(&self, selector: &mut TableSelector<'t>) -> Result<TextTables<'t>> {
        Ok(TextTables {
            fs: selector.select(self.fs)?,
            ds: selector.select(self.ds)?,
            dt: selector.select(self.dt)?,
            rdw: selector.select(self.rdw)?,
            rdh: selector.select(self.rdh)?,
            rdx: selector.select(self.rdx)?,
            rdy: selector.select(self.rdy)?,
            rsize: selector.select(self.rsize)?,
        })
    }
}

/// A parsed text region segment data header (7.4.3.1).
#[derive(Debug, Clone)]
pub(crate) struct TextRegionHeader {
    pub(crate) info: RegionInfo,
    pub(crate) huffman: Option<TextHuffmanFlags>,
    pub(crate) default_pixel: bool,
    pub(crate) params: TextParams,
}

impl TextRegionHeader {
    pub(crate) fn parse(reader: &mut Reader<'_>, settings: &DecodeSettings) -> Result<Self> {
        let info = RegionInfo::parse(reader, settings.strict)?;

        // 7.4.3.1.1
        let flags = reader.read_u16()?;
        let huffman = flags & 0x0001 != 0;
        let refine = flags & 0x0002 != 0;
        let log_strips = ((flags >> 2) & 0x03) as u8;
        let corner = ReferenceCorner::from_value((flags >> 4) as u8);
        let transposed = flags & 0x0040 != 0;
        let operator = CombinationOperator::from_value(((flags >> 7) & 0x03) as u8)
            .ok_or(FormatError::InvalidCombinationOperator)?;
        let default_pixel = flags & 0x0200 != 0;
        // "Bits 10-14: SBDSOFFSET. [...] signed five-bit quantity"
        let ds_offset = (((flags >> 10) & 0x1F) as i32) << 27 >> 27;
        let refinement_template = RefinementTemplate::from_bit(flags & 0x8000 != 0);

        let huffman = if huffman {
            Some(TextHuffmanFlags::parse(reader.read_u16()?, settings.strict)?)
        } else {
            None
        };

        let refinement_at_pixels = if refine && refinement_template == RefinementTemplate::Template0
        {
            parse_refinement_at_pixels(reader)?
        } else {
            RefinementTemplate::nominal_at_pixels()
        };

        let num_instances = reader.read_u32()?;

        Ok(Self {
            info,
            huffman,
            default_pixel,
            params: TextParams {
                num_instances,
                log_strips,
                corner,
                transposed,
                operator,
                ds_offset,
                refine,
                refinement_template,
                refinement_at_pixels,
                max_pixel_count: settings.max_pixel_count,
            },
        })
    }
}

/// A decoded text region.
#[derive(Debug, Clone)]
pub(crate) struct TextRegion {
    pub(crate) region: Region,
    pub(crate) placements: Vec<SymbolPlacement>,
}

/// Decode the data part of a text region segment.
///
/// `symbols` are the exported symbols of the referred dictionaries and
/// `tables` the referred table segments, both in reference order.
pub(crate) fn decode_region(
    data: &[u8],
    symbols: &[&Bitmap],
    tables: &[&HuffmanTable],
    settings: &DecodeSettings,
) -> Result<TextRegion> {
    let mut reader = Reader::new(data);
    let header = TextRegionHeader::parse(&mut reader, settings)?;

    let mut bitmap = Bitmap::try_new(
        header.info.width,
        header.info.height,
        settings.max_pixel_count,
    )?;

    // "1) Fill a bitmap SBREG, of the size given by SBW and SBH, with the
    // SBDEFPIXEL value." (6.4.5)
    if header.default_pixel {
        bitmap.fill(true);
    }

    let placements = match header.huffman {
        Some(flags) => {
            let tables = flags.resolve(&mut TableSelector::new(tables))?;
            let symbol_ids =
                SymbolIdCoding::Table(read_symbol_id_table(&mut reader, symbols.len())?);

            let mut values = HuffmanValues {
                reader: &mut reader,
                tables,
                symbol_ids: &symbol_ids,
            };
            decode_instances(&mut values, symbols, &header.params, &mut bitmap)?
        }
        None => {
            let code_length = crate::arithmetic::integer::symbol_code_length(symbols.len() as u32);
            let mut decoder = Decoder::new(reader.tail());
            let mut contexts = TextContexts::new(code_length);
            let mut refinement = Contexts::new(header.params.refinement_template.context_bits());

            let mut values = ArithmeticValues {
                decoder: &mut decoder,
                contexts: &mut contexts,
                refinement: &mut refinement,
            };
            decode_instances(&mut values, symbols, &header.params, &mut bitmap)?
        }
    };

    Ok(TextRegion {
        region: Region {
            info: header.info,
            bitmap,
        },
        placements,
    })
}

/// Read the symbol ID Huffman table (7.4.3.1.7).
fn read_symbol_id_table(reader: &mut Reader<'_>, num_symbols: usize) -> Result<HuffmanTable> {
    // "1) Read the code lengths for RUNCODE0 through RUNCODE34; each is stored
    // as a four-bit value."
    let mut run_codes = [Code::value(0, 0, 0); 35];
    for (i, code) in run_codes.iter_mut().enumerate() {
        *code = Code::value(reader.read_bits(4)? as u8, 0, i as i32);
    }
    let run_table = HuffmanTable::build(&run_codes)?;

    // "2) [...] read the code lengths for the symbol IDs"
    let mut lengths = Vec::with_capacity(num_symbols);

    while lengths.len() < num_symbols {
        let run_code = run_table.decode_value(reader)?;

        let (length, repeat) = match run_code {
            0..=31 => (run_code as u8, 1),
            // "Repeat the previous length 3-6 times"
            32 => {
                let previous = *lengths.last().ok_or(HuffmanError::InvalidCode)?;
                (previous, 3 + reader.read_bits(2)? as usize)
            }
            // "Repeat a zero length 3-10 times"
            33 => (0, 3 + reader.read_bits(3)? as usize),
            // "Repeat a zero length 11-138 times"
            34 => (0, 11 + reader.read_bits(7)? as usize),
            _ => bail!(HuffmanError::InvalidCode),
        };

        if lengths.len() + repeat > num_symbols {
            bail!(HuffmanError::InvalidCode);
        }

        lengths.extend(core::iter::repeat_n(length, repeat));
    }

    // "3) Skip over any bits remaining in the last byte read."
    reader.align();

    let codes: Vec<_> = lengths
        .iter()
        .enumerate()
        .map(|(i, &length)| Code::value(length, 0, i as i32))
        .collect();

    HuffmanTable::build(&codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic::{Encoder, IntegerEncoder, SymbolIdEncoder};
    use crate::bitmap::bitmap_from_ascii;
    use crate::encode::refinement::encode_bitmap;
    use crate::writer::Writer;

    /// Values scripted in advance, for testing placement without a coder.
    #[derive(Default)]
    struct Scripted {
        dt: Vec<i32>,
        fs: Vec<i32>,
        ds: Vec<Option<i32>>,
        it: Vec<i32>,
        ids: Vec<u32>,
    }

    impl TextValues for Scripted {
        fn strip_delta_t(&mut self) -> Result<i32> {
            Ok(self.dt.remove(0))
        }

        fn first_s(&mut self) -> Result<i32> {
            Ok(self.fs.remove(0))
        }

        fn delta_s(&mut self) -> Result<Option<i32>> {
            Ok(self.ds.remove(0))
        }

        fn instance_t(&mut self, _: u8) -> Result<i32> {
            Ok(self.it.remove(0))
        }

        fn symbol_id(&mut self) -> Result<u32> {
            Ok(self.ids.remove(0))
        }

        fn refinement_flag(&mut self) -> Result<bool> {
            Ok(false)
        }

        fn refinement_deltas(&mut self) -> Result<RefinementDeltas> {
            Ok(RefinementDeltas::default())
        }

        fn refine(&mut self, _: &mut Bitmap, _: &Bitmap, _: &RefinementParams) -> Result<()> {
            Ok(())
        }
    }

    fn params(num_instances: u32) -> TextParams {
        TextParams {
            num_instances,
            log_strips: 0,
            corner: ReferenceCorner::TopLeft,
            transposed: false,
            operator: CombinationOperator::Or,
            ds_offset: 0,
            refine: false,
            refinement_template: RefinementTemplate::Template0,
            refinement_at_pixels: RefinementTemplate::nominal_at_pixels(),
            max_pixel_count: u64::MAX,
        }
    }

    #[test]
    fn placement_follows_deltas() {
        let a = bitmap_from_ascii(&["##", "##"]);
        let b = bitmap_from_ascii(&["#", "#", "#"]);
        let symbols = [&a, &b];

        let mut values = Scripted {
            // Initial STRIPT, then two strips.
            dt: vec![0, 1, 4],
            fs: vec![1, 2],
            // Leave a one pixel gap after the first instance.
            ds: vec![Some(2), None, None],
            ids: vec![0, 1, 1],
            ..Default::default()
        };

        let mut region = Bitmap::new(8, 8);
        let placements =
            decode_instances(&mut values, &symbols, &params(3), &mut region).unwrap();

        assert_eq!(
            placements,
            [
                SymbolPlacement { symbol: 0, x: 1, y: 1 },
                SymbolPlacement { symbol: 1, x: 4, y: 1 },
                SymbolPlacement { symbol: 1, x: 3, y: 5 },
            ]
        );
        assert_eq!(
            region,
            bitmap_from_ascii(&[
                "........",
                ".##.#...",
                ".##.#...",
                "....#...",
                "........",
                "...#....",
                "...#....",
                "...#....",
            ])
        );
    }

    #[test]
    fn bottom_right_transposed() {
        let a = bitmap_from_ascii(&["###", "###"]);
        let symbols = [&a];

        let mut p = params(2);
        p.corner = ReferenceCorner::BottomRight;
        p.transposed = true;
        p.ds_offset = -1;

        let mut values = Scripted {
            dt: vec![0, 5],
            fs: vec![1],
            ds: vec![Some(3), None],
            ids: vec![0, 0],
            ..Default::default()
        };

        let mut region = Bitmap::new(10, 10);
        let placements = decode_instances(&mut values, &symbols, &p, &mut region).unwrap();

        // S runs down, T runs right. The first instance's bottom-right corner
        // is at (T, S + HI - 1) = (5, 2); the next S is 2 + 3 - 1 = 4, and
        // its bottom-right corner lands at (5, 4 + 2 - 1).
        assert_eq!(
            placements,
            [
                SymbolPlacement { symbol: 0, x: 3, y: 1 },
                SymbolPlacement { symbol: 0, x: 3, y: 4 },
            ]
        );
    }

    #[test]
    fn too_many_instances() {
        let a = bitmap_from_ascii(&["#"]);
        let mut values = Scripted {
            dt: vec![0, 0],
            fs: vec![0],
            ds: vec![Some(0), Some(0)],
            ids: vec![0, 0, 0],
            ..Default::default()
        };

        assert_eq!(
            decode_instances(&mut values, &[&a], &params(1), &mut Bitmap::new(4, 4)),
            Err(DecodeError::MalformedSegment(FormatError::TooManyInstances))
        );
    }

    #[test]
    fn unknown_symbol() {
        let a = bitmap_from_ascii(&["#"]);
        let mut values = Scripted {
            dt: vec![0, 0],
            fs: vec![0],
            ids: vec![1],
            ..Default::default()
        };

        assert_eq!(
            decode_instances(&mut values, &[&a], &params(1), &mut Bitmap::new(4, 4)),
            Err(DecodeError::MalformedSegment(FormatError::SymbolOutOfRange))
        );
    }

    #[test]
    fn ds_offset_sign_extension() {
        let mut data = vec![0_u8; 17];
        // SBDSOFFSET = 0b11110 = -2, TOPLEFT.
        data.extend_from_slice(&[0x78, 0x10]);
        data.extend_from_slice(&[0, 0, 0, 0]);

        let header =
            TextRegionHeader::parse(&mut Reader::new(&data), &DecodeSettings::default()).unwrap();
        assert_eq!(header.params.ds_offset, -2);
        assert_eq!(header.params.corner, ReferenceCorner::TopLeft);
        assert!(header.huffman.is_none());
    }

    #[test]
    fn symbol_id_table_with_run_codes() {
        // RUNCODE2 gets a 2-bit prefix, RUNCODE32 and RUNCODE33 3-bit
        // prefixes, which assigns 00, 010 and 011.
        let mut bits = String::new();
        for i in 0..35 {
            let length = match i {
                2 => 2,
                32 | 33 => 3,
                _ => 0,
            };
            bits.push_str(&format!("{length:04b}"));
        }
        // A length of 2, repeated three more times, then three zeros.
        bits.push_str("00");
        bits.push_str("010" /* RUNCODE32 */);
        bits.push_str("00");
        bits.push_str("011" /* RUNCODE33 */);
        bits.push_str("000");

        let data = crate::huffman::bits_to_bytes(&bits);
        let mut reader = Reader::new(&data);
        let table = read_symbol_id_table(&mut reader, 7).unwrap();

        assert!(reader.at_end());
        assert_eq!(
            table.to_string(),
            "00: 0..=0\n01: 1..=1\n10: 2..=2\n11: 3..=3\n"
        );
    }

    #[test]
    fn run_past_symbol_count() {
        let mut bits = String::new();
        for i in 0..35 {
            bits.push_str(if i == 34 { "0001" } else { "0000" });
        }
        // Eleven zeros for a dictionary of five symbols.
        bits.push_str("0");
        bits.push_str("0000000");

        let data = crate::huffman::bits_to_bytes(&bits);
        assert_eq!(
            read_symbol_id_table(&mut Reader::new(&data), 5).map(|_| ()),
            Err(DecodeError::Huffman(HuffmanError::InvalidCode))
        );
    }

    /// A 7x3 region with two instances of the same symbol, the second one
    /// refined to one pixel wider (RDW = 1) and placed right after the
    /// first.
    struct RefinedInstance {
        symbol: Bitmap,
        other: Bitmap,
        refined: Bitmap,
        region: Bitmap,
    }

    impl RefinedInstance {
        fn new() -> Self {
            Self {
                symbol: bitmap_from_ascii(&["#.#", ".#.", "#.#"]),
                other: bitmap_from_ascii(&["##"]),
                refined: bitmap_from_ascii(&["#.##", ".#..", "#.##"]),
                region: bitmap_from_ascii(&["#.##.##", ".#..#..", "#.##.##"]),
            }
        }

        /// "GRREFERENCEDX = ⌊1 / 2⌋ + 0"
        fn params() -> RefinementParams {
            RefinementParams::new(RefinementTemplate::Template1, 0, 0)
        }

        fn header(flags: u16, huffman_flags: Option<u16>) -> Writer {
            let mut writer = Writer::new();
            RegionInfo::new(7, 3, 0, 0).write(&mut writer);
            writer.write_u16(flags);
            if let Some(huffman_flags) = huffman_flags {
                writer.write_u16(huffman_flags);
            }
            writer.write_u32(2);
            writer
        }

        fn check(&self, data: &[u8], tables: &[&HuffmanTable]) {
            let symbols = [&self.symbol, &self.other];
            let text = decode_region(data, &symbols, tables, &DecodeSettings::default()).unwrap();

            assert_eq!(text.region.bitmap, self.region);
            assert_eq!(
                text.placements,
                [
                    SymbolPlacement { symbol: 0, x: 0, y: 0 },
                    SymbolPlacement { symbol: 0, x: 3, y: 0 },
                ]
            );
        }
    }

    #[test]
    fn arithmetic_region_with_refined_instance() {
        let fixture = RefinedInstance::new();
        let params = RefinedInstance::params();

        let mut encoder = Encoder::new();
        let mut refinement = params.contexts();
        let mut iadt = IntegerEncoder::new();
        let mut iafs = IntegerEncoder::new();
        let mut iads = IntegerEncoder::new();
        let mut iari = IntegerEncoder::new();
        let mut iardw = IntegerEncoder::new();
        let mut iardh = IntegerEncoder::new();
        let mut iardx = IntegerEncoder::new();
        let mut iardy = IntegerEncoder::new();
        let mut iaid = SymbolIdEncoder::new(1);

        iadt.encode(&mut encoder, Some(0));
        iadt.encode(&mut encoder, Some(0));
        iafs.encode(&mut encoder, Some(0));
        iaid.encode(&mut encoder, 0);
        iari.encode(&mut encoder, Some(0));
        iads.encode(&mut encoder, Some(1));
        iaid.encode(&mut encoder, 0);
        iari.encode(&mut encoder, Some(1));
        iardw.encode(&mut encoder, Some(1));
        iardh.encode(&mut encoder, Some(0));
        iardx.encode(&mut encoder, Some(0));
        iardy.encode(&mut encoder, Some(0));
        encode_bitmap(
            &mut encoder,
            &mut refinement,
            &fixture.refined,
            &fixture.symbol,
            &params,
        );
        iads.encode(&mut encoder, None);

        // SBREFINE, REFCORNER = TOPLEFT, SBRTEMPLATE = 1.
        let mut writer = RefinedInstance::header(0x8012, None);
        writer.write_bytes(&encoder.finish());

        fixture.check(&writer.finish(), &[]);
    }

    #[test]
    fn huffman_region_with_custom_table_and_refined_instance() {
        let fixture = RefinedInstance::new();
        let params = RefinedInstance::params();

        let payload = {
            let mut encoder = Encoder::new();
            encode_bitmap(
                &mut encoder,
                &mut params.contexts(),
                &fixture.refined,
                &fixture.symbol,
                &params,
            );
            encoder.finish()
        };

        // First S values of 0..=3 behind a 1-bit prefix.
        let fs = HuffmanTable::build(&[
            Code::value(1, 2, 0),
            Code::lower(2, -1),
            Code::upper(2, 4),
        ])
        .unwrap();
        let table = |n| standard_table(n).unwrap();

        // SBHUFF, SBREFINE, REFCORNER = TOPLEFT, SBRTEMPLATE = 1, then a
        // custom FS table, DS = B.8, DT = B.11, RDW to RDY = B.15 and
        // RSIZE = B.1.
        let mut writer = RefinedInstance::header(0x8013, Some(0x1543));

        // RUNCODE0 and RUNCODE1 get 1-bit prefixes, and both symbols a
        // 1-bit code.
        for i in 0..35 {
            writer.write_bits(u32::from(i < 2), 4);
        }
        writer.write_bits(0b11, 2);
        writer.align();

        table(11).encode(Some(1), &mut writer).unwrap();
        table(11).encode(Some(1), &mut writer).unwrap();
        fs.encode(Some(0), &mut writer).unwrap();
        writer.write_bit(0);
        writer.write_bit(0);
        table(8).encode(Some(1), &mut writer).unwrap();
        writer.write_bit(0);
        writer.write_bit(1);
        table(15).encode(Some(1), &mut writer).unwrap();
        for _ in 0..3 {
            table(15).encode(Some(0), &mut writer).unwrap();
        }
        table(1).encode(Some(payload.len() as i32), &mut writer).unwrap();
        writer.align();
        writer.write_bytes(&payload);
        table(8).encode(None, &mut writer).unwrap();
        let data = writer.finish();

        fixture.check(&data, &[&fs]);

        // The custom FS table has to be among the referred tables.
        assert_eq!(
            decode_region(
                &data,
                &[&fixture.symbol, &fixture.other],
                &[],
                &DecodeSettings::default()
            )
            .map(|_| ()),
            Err(DecodeError::Huffman(HuffmanError::MissingTables))
        );
    }
}
