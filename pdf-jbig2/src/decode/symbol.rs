//! Symbol dictionary decoding (6.5, 7.4.2).

use smallvec::SmallVec;

use super::generic::{self, GenericParams};
use super::refinement::{self, RefinementParams};
use super::text::{
    self, ArithmeticValues, HuffmanValues, ReferenceCorner, SymbolIdCoding, TextContexts,
    TextParams, TextTables,
};
use super::{
    AtPixel, RefinementTemplate, TableChoice, TableSelector, Template, parse_at_pixels,
    parse_refinement_at_pixels,
};
use crate::DecodeSettings;
use crate::arithmetic::integer::symbol_code_length;
use crate::arithmetic::{Contexts, Decoder, IntegerDecoder};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{
    DecodeError, FormatError, ReferenceError, Result, UnsupportedFeature, bail,
};
use crate::huffman::{HuffmanTable, standard_table};
use crate::reader::Reader;
use crate::segment::check_reserved;

pub(crate) const DH_TABLES: &[u8] = &[4, 5];
pub(crate) const DW_TABLES: &[u8] = &[2, 3];

/// A decoded symbol dictionary.
///
/// Holds the exported symbols in export order. Text regions and later
/// dictionaries address them by index.
#[derive(Debug, Clone)]
pub struct SymbolDictionary {
    symbols: Vec<Bitmap>,
    retained: Option<RetainedContexts>,
}

impl SymbolDictionary {
    /// The exported symbols.
    pub fn symbols(&self) -> &[Bitmap] {
        &self.symbols
    }

    /// The number of exported symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the dictionary exports no symbols at all.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The exported symbol with the given index.
    pub fn get(&self, index: usize) -> Option<&Bitmap> {
        self.symbols.get(index)
    }

    /// Whether the dictionary kept its coding contexts for a later
    /// dictionary to continue with.
    pub fn has_retained_contexts(&self) -> bool {
        self.retained.is_some()
    }
}

/// The arithmetic coding state of a dictionary whose "bitmap coding context
/// retained" flag was set (7.4.2.2).
#[derive(Debug, Clone)]
struct RetainedContexts {
    template: Template,
    refinement_template: RefinementTemplate,
    refagg: bool,
    at_pixels: SmallVec<[AtPixel; 4]>,
    refinement_at_pixels: [AtPixel; 2],
    generic: Contexts,
    refinement: Contexts,
}

/// The Huffman table selections of a symbol dictionary (7.4.2.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SymbolHuffmanFlags {
    pub(crate) dh: TableChoice,
    pub(crate) dw: TableChoice,
    pub(crate) bmsize: TableChoice,
    pub(crate) agginst: TableChoice,
}

/// A parsed symbol dictionary segment data header (7.4.2.1).
#[derive(Debug, Clone)]
pub(crate) struct SymbolDictionaryHeader {
    pub(crate) huffman: Option<SymbolHuffmanFlags>,
    pub(crate) refagg: bool,
    pub(crate) context_used: bool,
    pub(crate) context_retained: bool,
    pub(crate) template: Template,
    pub(crate) refinement_template: RefinementTemplate,
    pub(crate) at_pixels: SmallVec<[AtPixel; 4]>,
    pub(crate) refinement_at_pixels: [AtPixel; 2],
    /// "SDNUMEXSYMS"
    pub(crate) num_exported: u32,
    /// "SDNUMNEWSYMS"
    pub(crate) num_new: u32,
}

impl SymbolDictionaryHeader {
    pub(crate) fn parse(reader: &mut Reader<'_>, strict: bool) -> Result<Self> {
        let flags = reader.read_u16()?;
        let huffman = flags & 0x0001 != 0;
        let refagg = flags & 0x0002 != 0;
        let context_used = flags & 0x0100 != 0;
        let context_retained = flags & 0x0200 != 0;
        let template = Template::from_byte((flags >> 10) as u8);
        let refinement_template = RefinementTemplate::from_bit(flags & 0x1000 != 0);

        // "Bits 13-15: Reserved; must be 0."
        check_reserved(u32::from(flags & 0xE000), strict)?;

        let huffman = if huffman {
            let custom_or_b1 = |bit: u16| {
                if flags & bit != 0 {
                    TableChoice::Custom
                } else {
                    TableChoice::Standard(1)
                }
            };

            Some(SymbolHuffmanFlags {
                dh: TableChoice::from_field((flags >> 2) & 0x03, DH_TABLES)?,
                dw: TableChoice::from_field((flags >> 4) & 0x03, DW_TABLES)?,
                bmsize: custom_or_b1(0x0040),
                agginst: custom_or_b1(0x0080),
            })
        } else {
            None
        };

        // "This field is only present if SDHUFF is 0." (7.4.2.1.2)
        let at_pixels = if huffman.is_none() {
            parse_at_pixels(reader, template.at_pixel_count())?
        } else {
            SmallVec::new()
        };

        let refinement_at_pixels =
            if refagg && refinement_template == RefinementTemplate::Template0 {
                parse_refinement_at_pixels(reader)?
            } else {
                RefinementTemplate::nominal_at_pixels()
            };

        let num_exported = reader.read_u32()?;
        let num_new = reader.read_u32()?;

        Ok(Self {
            huffman,
            refagg,
            context_used,
            context_retained,
            template,
            refinement_template,
            at_pixels,
            refinement_at_pixels,
            num_exported,
            num_new,
        })
    }
}

/// The arithmetic decoding state of a dictionary (Table 26 and the
/// text region procedures used for aggregation).
struct ArithmeticState<'a> {
    decoder: Decoder<'a>,
    iadh: IntegerDecoder,
    iadw: IntegerDecoder,
    iaex: IntegerDecoder,
    iaai: IntegerDecoder,
    generic: Contexts,
    refinement: Contexts,
    text: TextContexts,
}

struct HuffmanState<'a, 't> {
    reader: Reader<'a>,
    dh: &'t HuffmanTable,
    dw: &'t HuffmanTable,
    bmsize: &'t HuffmanTable,
    agginst: &'t HuffmanTable,
}

enum Coding<'a, 't> {
    Arithmetic(ArithmeticState<'a>),
    Huffman(HuffmanState<'a, 't>),
}

impl Coding<'_, '_> {
    /// "HCDH"
    fn height_delta(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic(state) => state.iadh.decode_value(&mut state.decoder),
            Self::Huffman(state) => state.dh.decode_value(&mut state.reader),
        }
    }

    /// "DW", or `None` once the height class is complete.
    fn width_delta(&mut self) -> Result<Option<i32>> {
        match self {
            Self::Arithmetic(state) => state.iadw.decode(&mut state.decoder),
            Self::Huffman(state) => state.dw.decode(&mut state.reader),
        }
    }

    /// "REFAGGNINST"
    fn aggregate_count(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic(state) => state.iaai.decode_value(&mut state.decoder),
            Self::Huffman(state) => state.agginst.decode_value(&mut state.reader),
        }
    }

    /// "EXRUNLENGTH"
    fn export_run(&mut self) -> Result<i32> {
        match self {
            Self::Arithmetic(state) => state.iaex.decode_value(&mut state.decoder),
            Self::Huffman(state) => standard_table(1)?.decode_value(&mut state.reader),
        }
    }
}

/// Decode a symbol dictionary segment.
///
/// `input` holds the exported symbols of all referred dictionaries, in
/// reference order, and `tables` the referred table segments. `previous` is
/// the last referred dictionary along with its segment number, which is
/// where coding contexts are picked up from if the segment asks for that.
pub(crate) fn decode(
    data: &[u8],
    input: &[&Bitmap],
    tables: &[&HuffmanTable],
    previous: Option<(u32, &SymbolDictionary)>,
    settings: &DecodeSettings,
) -> Result<SymbolDictionary> {
    let mut reader = Reader::new(data);
    let header = SymbolDictionaryHeader::parse(&mut reader, settings.strict)?;

    let num_symbols = u32::try_from(input.len())
        .ok()
        .and_then(|n| n.checked_add(header.num_new))
        .ok_or(DecodeError::Overflow)?;
    let code_length = symbol_code_length(num_symbols);

    let mut coding = match header.huffman {
        Some(flags) => {
            let mut selector = TableSelector::new(tables);

            // "The Huffman tables are taken from the referred table segments
            // in the order DH, DW, BMSIZE, AGGINST."
            Coding::Huffman(HuffmanState {
                dh: selector.select(flags.dh)?,
                dw: selector.select(flags.dw)?,
                bmsize: selector.select(flags.bmsize)?,
                agginst: selector.select(flags.agginst)?,
                reader,
            })
        }
        None => {
            let (generic, refinement) = initial_contexts(&header, previous)?;

            Coding::Arithmetic(ArithmeticState {
                decoder: Decoder::new(reader.tail()),
                iadh: IntegerDecoder::new(),
                iadw: IntegerDecoder::new(),
                iaex: IntegerDecoder::new(),
                iaai: IntegerDecoder::new(),
                generic,
                refinement,
                text: TextContexts::new(code_length),
            })
        }
    };

    let generic_params = GenericParams {
        template: header.template,
        tpgdon: false,
        at_pixels: header.at_pixels.clone(),
    };

    let mut new_symbols: Vec<Bitmap> = Vec::with_capacity(header.num_new.min(1 << 16) as usize);
    let mut height_class_height = 0_u32;

    // "4) Repeat steps 4a) through 4d) until NSYMSDECODED = SDNUMNEWSYMS."
    while (new_symbols.len() as u32) < header.num_new {
        let delta = coding.height_delta()?;
        height_class_height = height_class_height
            .checked_add_signed(delta)
            .ok_or(FormatError::InvalidSymbolSize)?;

        let mut widths = Vec::new();
        let mut symbol_width = 0_u32;
        let mut total_width = 0_u32;

        // "If the result of this decoding is OOB then all the symbols in this
        // height class have been decoded"
        while let Some(delta) = coding.width_delta()? {
            if new_symbols.len() + widths.len() >= header.num_new as usize {
                bail!(FormatError::TooManyInstances);
            }

            symbol_width = symbol_width
                .checked_add_signed(delta)
                .ok_or(FormatError::InvalidSymbolSize)?;
            total_width = total_width
                .checked_add(symbol_width)
                .ok_or(DecodeError::Overflow)?;

            let symbol = match (&mut coding, header.refagg) {
                (Coding::Huffman(_), false) => {
                    widths.push(symbol_width);
                    continue;
                }
                (Coding::Arithmetic(state), false) => {
                    let mut bitmap = Bitmap::try_new(
                        symbol_width,
                        height_class_height,
                        settings.max_pixel_count,
                    )?;
                    generic::decode_bitmap(
                        &mut state.decoder,
                        &mut state.generic,
                        &mut bitmap,
                        &generic_params,
                    )?;
                    bitmap
                }
                (coding, true) => {
                    let mut available: Vec<&Bitmap> = Vec::with_capacity(input.len() + new_symbols.len());
                    available.extend_from_slice(input);
                    available.extend(new_symbols.iter());

                    decode_refagg_symbol(
                        coding,
                        &header,
                        &available,
                        code_length,
                        symbol_width,
                        height_class_height,
                        settings,
                    )?
                }
            };

            new_symbols.push(symbol);
        }

        if let Coding::Huffman(state) = &mut coding
            && !header.refagg
        {
            let collective = read_collective_bitmap(
                state,
                total_width,
                height_class_height,
                settings.max_pixel_count,
            )?;

            // "Break up the bitmap BHC as follows to obtain the symbols
            // SDNEWSYMS[HCFIRSTSYM] through SDNEWSYMS[NSYMSDECODED – 1]."
            // (6.5.5, step 4 d)
            let mut x = 0;
            for width in widths {
                new_symbols.push(collective.crop(
                    x,
                    0,
                    width,
                    height_class_height,
                    settings.max_pixel_count,
                )?);
                x += width;
            }
        }
    }

    let symbols = exported_symbols(&mut coding, input, &new_symbols, header.num_exported)?;

    let retained = match coding {
        Coding::Arithmetic(state) if header.context_retained => Some(RetainedContexts {
            template: header.template,
            refinement_template: header.refinement_template,
            refagg: header.refagg,
            at_pixels: header.at_pixels.clone(),
            refinement_at_pixels: header.refinement_at_pixels,
            generic: state.generic,
            refinement: state.refinement,
        }),
        _ => None,
    };

    Ok(SymbolDictionary { symbols, retained })
}

/// Set up the generic and refinement contexts, either fresh or continued
/// from the last referred dictionary (7.4.2.2, step 3).
fn initial_contexts(
    header: &SymbolDictionaryHeader,
    previous: Option<(u32, &SymbolDictionary)>,
) -> Result<(Contexts, Contexts)> {
    if !header.context_used {
        return Ok((
            header.template_contexts(),
            Contexts::new(header.refinement_template.context_bits()),
        ));
    }

    let Some((number, previous)) = previous else {
        bail!(FormatError::ContextMismatch);
    };

    let retained = previous
        .retained
        .as_ref()
        .ok_or(ReferenceError::Missing(number))?;

    // "[...] the values of SDHUFF, SDREFAGG, SDTEMPLATE, SDRTEMPLATE, and all
    // of the AT locations (both direct and refinement) for this symbol
    // dictionary must be equal to the corresponding values from the symbol
    // dictionary segment that is the last referred [...]"
    if retained.template != header.template
        || retained.refinement_template != header.refinement_template
        || retained.refagg != header.refagg
        || retained.at_pixels != header.at_pixels
        || retained.refinement_at_pixels != header.refinement_at_pixels
    {
        bail!(FormatError::ContextMismatch);
    }

    Ok((retained.generic.clone(), retained.refinement.clone()))
}

impl SymbolDictionaryHeader {
    fn template_contexts(&self) -> Contexts {
        Contexts::new(self.template.context_bits())
    }
}

/// Decode a symbol with refinement/aggregate coding (6.5.8.2).
fn decode_refagg_symbol(
    coding: &mut Coding<'_, '_>,
    header: &SymbolDictionaryHeader,
    available: &[&Bitmap],
    code_length: u32,
    width: u32,
    height: u32,
    settings: &DecodeSettings,
) -> Result<Bitmap> {
    let instances = coding.aggregate_count()?;
    let instances = u32::try_from(instances).map_err(|_| FormatError::InvalidSymbolSize)?;

    let mut bitmap = Bitmap::try_new(width, height, settings.max_pixel_count)?;

    if instances == 1 {
        decode_single_refinement(coding, header, available, code_length, &mut bitmap)?;
        return Ok(bitmap);
    }

    // "If REFAGGNINST is greater than one, then decode the bitmap itself
    // using a text region decoding procedure as described in 6.4. Set the
    // parameters to this decoding procedure as shown in Table 17."
    let params = TextParams {
        num_instances: instances,
        log_strips: 0,
        corner: ReferenceCorner::TopLeft,
        transposed: false,
        operator: CombinationOperator::Or,
        ds_offset: 0,
        refine: true,
        refinement_template: header.refinement_template,
        refinement_at_pixels: header.refinement_at_pixels,
        max_pixel_count: settings.max_pixel_count,
    };

    match coding {
        Coding::Arithmetic(state) => {
            let mut values = ArithmeticValues {
                decoder: &mut state.decoder,
                contexts: &mut state.text,
                refinement: &mut state.refinement,
            };
            text::decode_instances(&mut values, available, &params, &mut bitmap)?;
        }
        Coding::Huffman(state) => {
            let symbol_ids = SymbolIdCoding::Fixed(code_length.max(1) as u8);
            let mut values = HuffmanValues {
                reader: &mut state.reader,
                tables: TextTables::aggregate()?,
                symbol_ids: &symbol_ids,
            };
            text::decode_instances(&mut values, available, &params, &mut bitmap)?;
        }
    }

    Ok(bitmap)
}

/// Refine a single existing symbol (6.5.8.2.2).
fn decode_single_refinement(
    coding: &mut Coding<'_, '_>,
    header: &SymbolDictionaryHeader,
    available: &[&Bitmap],
    code_length: u32,
    bitmap: &mut Bitmap,
) -> Result<()> {
    let reference_of = |id: u32| {
        available
            .get(id as usize)
            .copied()
            .ok_or(DecodeError::from(FormatError::SymbolOutOfRange))
    };

    let params = |dx: i32, dy: i32| RefinementParams {
        template: header.refinement_template,
        tpgron: false,
        at_pixels: header.refinement_at_pixels,
        dx,
        dy,
    };

    match coding {
        Coding::Arithmetic(state) => {
            let id = state.text.iaid.decode(&mut state.decoder)?;
            let dx = state.text.iardx.decode_value(&mut state.decoder)?;
            let dy = state.text.iardy.decode_value(&mut state.decoder)?;

            refinement::decode_bitmap(
                &mut state.decoder,
                &mut state.refinement,
                bitmap,
                reference_of(id)?,
                &params(dx, dy),
            )
        }
        Coding::Huffman(state) => {
            // "If SDHUFF is 1, then SBSYMCODELEN is at least 1" (6.5.8.2.3)
            let id = state.reader.read_bits(code_length.max(1) as u8)?;
            let b15 = standard_table(15)?;
            let dx = b15.decode_value(&mut state.reader)?;
            let dy = b15.decode_value(&mut state.reader)?;

            let size = standard_table(1)?.decode_value(&mut state.reader)?;
            let size = usize::try_from(size).map_err(|_| FormatError::InvalidDimension)?;
            state.reader.align();

            let data = state.reader.read_bytes(size)?;
            let params = params(dx, dy);
            let mut decoder = Decoder::new(data);
            let mut contexts = params.contexts();

            refinement::decode_bitmap(
                &mut decoder,
                &mut contexts,
                bitmap,
                reference_of(id)?,
                &params,
            )
        }
    }
}

/// Read a height class collective bitmap (6.5.9).
fn read_collective_bitmap(
    state: &mut HuffmanState<'_, '_>,
    width: u32,
    height: u32,
    max_pixel_count: u64,
) -> Result<Bitmap> {
    // "1) Read the size in bytes using the SDHUFFBMSIZE Huffman table."
    let size = state.bmsize.decode_value(&mut state.reader)?;

    // "2) Skip over any bits remaining in the last byte read."
    state.reader.align();

    if size != 0 {
        bail!(UnsupportedFeature::Mmr);
    }

    if u64::from(width) * u64::from(height) > max_pixel_count {
        bail!(UnsupportedFeature::ImageTooLarge);
    }

    // "3) If BMSIZE is zero, then the bitmap is stored uncompressed, and the
    // actual size in bytes is HCHEIGHT × ⌈TOTWIDTH / 8⌉"
    let len = (width.div_ceil(8) as usize)
        .checked_mul(height as usize)
        .ok_or(DecodeError::Overflow)?;
    let data = state.reader.read_bytes(len)?;

    Bitmap::from_packed(width, height, data.to_vec()).ok_or(DecodeError::Overflow)
}

/// Work out which symbols the dictionary exports (6.5.10).
fn exported_symbols(
    coding: &mut Coding<'_, '_>,
    input: &[&Bitmap],
    new_symbols: &[Bitmap],
    num_exported: u32,
) -> Result<Vec<Bitmap>> {
    let total = input.len() + new_symbols.len();
    let mut exported = Vec::with_capacity(num_exported.min(1 << 16) as usize);

    // "1) Set: EXINDEX = 0, CUREXFLAG = 0"
    let mut index = 0_usize;
    let mut export = false;

    // "5) Repeat steps 2) through 4) until EXINDEX = SDNUMINSYMS +
    // SDNUMNEWSYMS."
    while index < total {
        let run = coding.export_run()?;
        let run = usize::try_from(run).map_err(|_| FormatError::ExportCountMismatch)?;
        let end = index
            .checked_add(run)
            .filter(|&end| end <= total)
            .ok_or(FormatError::ExportCountMismatch)?;

        if export {
            for i in index..end {
                let symbol = match i.checked_sub(input.len()) {
                    None => input[i],
                    Some(new) => &new_symbols[new],
                };
                exported.push(symbol.clone());
            }
        }

        index = end;
        export = !export;
    }

    if exported.len() != num_exported as usize {
        bail!(FormatError::ExportCountMismatch);
    }

    Ok(exported)
}

#[cfg(test)]
impl SymbolDictionary {
    pub(crate) fn from_symbols(symbols: Vec<Bitmap>) -> Self {
        Self {
            symbols,
            retained: None,
        }
    }
}
