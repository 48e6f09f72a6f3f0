//! Huffman code tables (Annex B).
//!
//! A table is a list of lines, each with a prefix length and a value range.
//! Prefixes are assigned canonically (B.3) and compiled into a binary tree
//! whose nodes live in a single arena, so decoding a value is a walk from the
//! root following one bit at a time.

mod standard;

use core::fmt;

pub use standard::standard_table;

use crate::error::{
    DecodeError, EncodeError, EncodeResult, FormatError, HuffmanError, Result, bail,
};
use crate::reader::Reader;
use crate::writer::Writer;

/// The values covered by a table line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeRange {
    /// `low ..= low + 2^bits - 1`.
    Value { low: i32, bits: u8 },
    /// "lower range table line": `-∞ ..= high`, followed by a 32-bit offset
    /// that is subtracted from `high`.
    Lower { high: i32 },
    /// "upper range table line": `low ..= ∞`, followed by a 32-bit offset.
    Upper { low: i32 },
    /// The out-of-band value.
    OutOfBand,
}

/// A single table line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Code {
    /// "PREFLEN". Zero means the line is never used.
    pub(crate) prefix_length: u8,
    pub(crate) range: CodeRange,
}

impl Code {
    pub(crate) const fn value(prefix_length: u8, bits: u8, low: i32) -> Self {
        Self {
            prefix_length,
            range: CodeRange::Value { low, bits },
        }
    }

    pub(crate) const fn lower(prefix_length: u8, high: i32) -> Self {
        Self {
            prefix_length,
            range: CodeRange::Lower { high },
        }
    }

    pub(crate) const fn upper(prefix_length: u8, low: i32) -> Self {
        Self {
            prefix_length,
            range: CodeRange::Upper { low },
        }
    }

    pub(crate) const fn oob(prefix_length: u8) -> Self {
        Self {
            prefix_length,
            range: CodeRange::OutOfBand,
        }
    }

    fn is_used(&self) -> bool {
        self.prefix_length > 0
    }

    fn range_bits(&self) -> u8 {
        match self.range {
            CodeRange::Value { bits, .. } => bits,
            CodeRange::Lower { .. } | CodeRange::Upper { .. } => 32,
            CodeRange::OutOfBand => 0,
        }
    }

    fn covers(&self, value: i32) -> bool {
        match self.range {
            CodeRange::Value { low, bits } => {
                let offset = i64::from(value) - i64::from(low);
                offset >= 0 && offset < (1_i64 << bits)
            }
            CodeRange::Lower { high } => value <= high,
            CodeRange::Upper { low } => value >= low,
            CodeRange::OutOfBand => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    /// Children for a 0 and a 1 bit, as indices into the node arena.
    Branch([Option<u32>; 2]),
    /// Index of the table line.
    Leaf(u32),
}

/// A compiled Huffman table.
#[derive(Clone)]
pub struct HuffmanTable {
    codes: Vec<Code>,
    /// The assigned prefix of each line (B.3 "CODES").
    prefixes: Vec<u32>,
    nodes: Vec<Node>,
}

impl HuffmanTable {
    /// Assign prefix codes (B.3) and build the decoding tree.
    pub(crate) fn build(codes: &[Code]) -> Result<Self> {
        let max_len = codes.iter().map(|c| c.prefix_length).max().unwrap_or(0) as usize;
        if max_len > 32 {
            bail!(HuffmanError::InvalidTable);
        }

        // "1) Build a histogram in the array LENCOUNT counting the number of
        // times each prefix length value occurs in PREFLEN" (B.3)
        let mut len_count = vec![0_u64; max_len + 1];
        for code in codes {
            len_count[code.prefix_length as usize] += 1;
        }
        len_count[0] = 0;

        let mut prefixes = vec![0_u32; codes.len()];
        let mut first_code = 0_u64;

        for cur_len in 1..=max_len {
            first_code = (first_code + len_count[cur_len - 1]) << 1;
            let mut cur_code = first_code;

            for (i, code) in codes.iter().enumerate() {
                if code.prefix_length as usize == cur_len {
                    prefixes[i] = cur_code as u32;
                    cur_code += 1;
                }
            }

            // More codes of this length than there is room for.
            if cur_code > 1_u64 << cur_len {
                bail!(HuffmanError::InvalidTable);
            }
        }

        let mut table = Self {
            codes: codes.to_vec(),
            prefixes,
            nodes: vec![Node::Branch([None, None])],
        };

        for i in 0..codes.len() {
            table.insert(i)?;
        }

        Ok(table)
    }

    fn insert(&mut self, code_idx: usize) -> Result<()> {
        let length = self.codes[code_idx].prefix_length;
        let prefix = self.prefixes[code_idx];

        if length == 0 {
            return Ok(());
        }

        let mut node = 0_usize;

        for i in (0..length).rev() {
            let bit = ((prefix >> i) & 1) as usize;
            let next = self.nodes.len() as u32;

            let Node::Branch(children) = &mut self.nodes[node] else {
                bail!(HuffmanError::InvalidTable);
            };

            let child = children[bit];
            node = match child {
                Some(child) => child as usize,
                None => {
                    children[bit] = Some(next);
                    let new = if i == 0 {
                        Node::Leaf(code_idx as u32)
                    } else {
                        Node::Branch([None, None])
                    };
                    self.nodes.push(new);
                    next as usize
                }
            };
        }

        // The final node must be the leaf we just created, otherwise the
        // prefix collides with a longer code.
        match self.nodes[node] {
            Node::Leaf(idx) if idx as usize == code_idx => Ok(()),
            _ => Err(HuffmanError::InvalidTable.into()),
        }
    }

    /// Decode one value (B.4). `None` is the out-of-band value.
    pub(crate) fn decode(&self, reader: &mut Reader<'_>) -> Result<Option<i32>> {
        let mut node = 0_usize;

        let code = loop {
            match self.nodes[node] {
                Node::Branch(children) => {
                    let bit = reader
                        .read_bit()
                        .map_err(|_| HuffmanError::InvalidCode)?;
                    node = children[bit as usize].ok_or(HuffmanError::InvalidCode)? as usize;
                }
                Node::Leaf(idx) => break self.codes[idx as usize],
            }
        };

        // "2) Read RANGELEN bits [...] and call this value HTOFFSET" (B.4)
        let offset = i64::from(reader.read_bits(code.range_bits())?);

        let value = match code.range {
            CodeRange::OutOfBand => return Ok(None),
            CodeRange::Value { low, .. } | CodeRange::Upper { low } => i64::from(low) + offset,
            CodeRange::Lower { high } => i64::from(high) - offset,
        };

        Ok(Some(
            i32::try_from(value).map_err(|_| DecodeError::Overflow)?,
        ))
    }

    /// Decode a value that must not be out-of-band.
    pub(crate) fn decode_value(&self, reader: &mut Reader<'_>) -> Result<i32> {
        self.decode(reader)?
            .ok_or(DecodeError::Huffman(HuffmanError::UnexpectedOob))
    }

    /// Write the code for `value`, with `None` standing for out-of-band.
    ///
    /// Ordinary lines are preferred over the lower and upper range lines.
    pub(crate) fn encode(&self, value: Option<i32>, writer: &mut Writer) -> EncodeResult<()> {
        let idx = match value {
            None => self
                .codes
                .iter()
                .position(|c| c.is_used() && c.range == CodeRange::OutOfBand),
            Some(v) => self
                .codes
                .iter()
                .position(|c| {
                    c.is_used() && matches!(c.range, CodeRange::Value { .. }) && c.covers(v)
                })
                .or_else(|| self.codes.iter().position(|c| c.is_used() && c.covers(v))),
        }
        .ok_or(EncodeError::ValueNotRepresentable)?;

        let code = self.codes[idx];
        writer.write_bits(self.prefixes[idx], code.prefix_length);

        let offset = match (code.range, value) {
            (CodeRange::Value { low, .. } | CodeRange::Upper { low }, Some(v)) => {
                i64::from(v) - i64::from(low)
            }
            (CodeRange::Lower { high }, Some(v)) => i64::from(high) - i64::from(v),
            _ => 0,
        };

        writer.write_bits(offset as u32, code.range_bits());

        Ok(())
    }

    /// Whether the table has an out-of-band line ("HTOOB").
    pub fn has_oob(&self) -> bool {
        self.codes
            .iter()
            .any(|c| c.is_used() && c.range == CodeRange::OutOfBand)
    }

    /// Read a table from a code table segment (B.2).
    pub(crate) fn read_custom(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        // "Bit 0 is HTOOB [...] Bits 1-3 specify the value of HTPS – 1 [...]
        // Bits 4-6 specify the value of HTRS – 1 [...] Bit 7 is reserved and
        // must be 0." (B.2, Table B.1)
        let flags = reader.read_byte()?;
        let htoob = flags & 1 != 0;
        let htps = ((flags >> 1) & 7) + 1;
        let htrs = ((flags >> 4) & 7) + 1;

        if flags & 0x80 != 0 {
            bail!(FormatError::ReservedBits);
        }

        let htlow = reader.read_i32()?;
        let hthigh = reader.read_i32()?;

        let mut codes = Vec::new();
        let mut cur_range_low = i64::from(htlow);

        // "4) Read table lines until CURRANGELOW ≥ HTHIGH" (B.2)
        while cur_range_low < i64::from(hthigh) {
            let prefix_length = reader.read_bits(htps)? as u8;
            let range_length = reader.read_bits(htrs)? as u8;

            if range_length > 32 {
                bail!(HuffmanError::InvalidTable);
            }

            codes.push(Code::value(
                prefix_length,
                range_length,
                cur_range_low as i32,
            ));
            cur_range_low += 1_i64 << range_length;
        }

        let upper_low = i32::try_from(cur_range_low).map_err(|_| DecodeError::Overflow)?;
        let lower_high = htlow.checked_sub(1).ok_or(DecodeError::Overflow)?;

        codes.push(Code::lower(reader.read_bits(htps)? as u8, lower_high));
        codes.push(Code::upper(reader.read_bits(htps)? as u8, upper_low));

        if htoob {
            codes.push(Code::oob(reader.read_bits(htps)? as u8));
        }

        Self::build(&codes)
    }
}

/// A user-defined code table, written as a code table segment (B.2).
///
/// The explicit lines cover consecutive ranges starting at `low`. Values
/// below and above them use the lower and upper range lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    /// The lowest value covered by the explicit lines ("HTLOW").
    pub low: i32,
    /// `(prefix length, range length)` of each explicit line.
    pub lines: Vec<(u8, u8)>,
    /// Prefix length of the lower range line.
    pub lower_prefix_length: u8,
    /// Prefix length of the upper range line.
    pub upper_prefix_length: u8,
    /// Prefix length of the out-of-band line, if the table has one.
    pub oob_prefix_length: Option<u8>,
}

impl CodeTable {
    /// Serialize the table into code table segment data.
    pub(crate) fn write(&self) -> EncodeResult<Vec<u8>> {
        let bits_for = |v: u8| (8 - v.leading_zeros() as u8).max(1);

        let prefix_lengths = self
            .lines
            .iter()
            .map(|l| l.0)
            .chain([self.lower_prefix_length, self.upper_prefix_length])
            .chain(self.oob_prefix_length);
        let htps = prefix_lengths.map(bits_for).max().unwrap_or(1);
        let htrs = self.lines.iter().map(|l| bits_for(l.1)).max().unwrap_or(1);

        if htps > 8 || htrs > 8 || self.lines.iter().any(|l| l.1 > 32) {
            return Err(EncodeError::ValueNotRepresentable);
        }

        let high = self
            .lines
            .iter()
            .try_fold(i64::from(self.low), |acc, l| {
                let next = acc + (1_i64 << l.1);
                (next <= i64::from(i32::MAX)).then_some(next)
            })
            .ok_or(EncodeError::ValueNotRepresentable)?;

        let mut writer = Writer::new();
        writer.write_byte(
            u8::from(self.oob_prefix_length.is_some()) | ((htps - 1) << 1) | ((htrs - 1) << 4),
        );
        writer.write_i32(self.low);
        writer.write_i32(high as i32);

        for &(prefix_length, range_length) in &self.lines {
            writer.write_bits(u32::from(prefix_length), htps);
            writer.write_bits(u32::from(range_length), htrs);
        }

        writer.write_bits(u32::from(self.lower_prefix_length), htps);
        writer.write_bits(u32::from(self.upper_prefix_length), htps);

        if let Some(oob) = self.oob_prefix_length {
            writer.write_bits(u32::from(oob), htps);
        }

        writer.align();
        Ok(writer.finish())
    }
}

impl fmt::Display for HuffmanTable {
    /// Renders every reachable line as `prefix: range`, in prefix order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(0_u32, String::new())];

        while let Some((node, path)) = stack.pop() {
            match self.nodes[node as usize] {
                Node::Branch(children) => {
                    for (bit, child) in children.iter().enumerate().rev() {
                        if let Some(child) = child {
                            stack.push((*child, format!("{path}{bit}")));
                        }
                    }
                }
                Node::Leaf(idx) => match self.codes[idx as usize].range {
                    CodeRange::Value { low, bits } => {
                        let high = i64::from(low) + (1_i64 << bits) - 1;
                        writeln!(f, "{path}: {low}..={high}")?;
                    }
                    CodeRange::Lower { high } => writeln!(f, "{path}: ..={high}")?,
                    CodeRange::Upper { low } => writeln!(f, "{path}: {low}..")?,
                    CodeRange::OutOfBand => writeln!(f, "{path}: OOB")?,
                },
            }
        }

        Ok(())
    }
}

impl fmt::Debug for HuffmanTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HuffmanTable({} lines)", self.codes.len())
    }
}

#[cfg(test)]
pub(crate) fn bits_to_bytes(bits: &str) -> Vec<u8> {
    let mut writer = Writer::new();
    for c in bits.chars() {
        writer.write_bit(u32::from(c == '1'));
    }
    writer.finish()
}
