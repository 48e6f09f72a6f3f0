//! Packed bi-level bitmaps.
//!
//! "A bitmap is a rectangular array of pixels. [...] Pixels with the value 1
//! are black and pixels with the value 0 are white." (4.1)

use crate::error::{DecodeError, Result, UnsupportedFeature, bail};

/// "These operators describe how the segment's bitmap is to be combined with
/// the page bitmap." (7.4.1.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombinationOperator {
    /// 0 OR
    #[default]
    Or,
    /// 1 AND
    And,
    /// 2 XOR
    Xor,
    /// 3 XNOR
    Xnor,
    /// 4 REPLACE
    Replace,
}

impl CombinationOperator {
    pub(crate) fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Or),
            1 => Some(Self::And),
            2 => Some(Self::Xor),
            3 => Some(Self::Xnor),
            4 => Some(Self::Replace),
            _ => None,
        }
    }

    pub(crate) fn to_value(self) -> u8 {
        match self {
            Self::Or => 0,
            Self::And => 1,
            Self::Xor => 2,
            Self::Xnor => 3,
            Self::Replace => 4,
        }
    }

    #[inline]
    fn apply(self, dst: bool, src: bool) -> bool {
        match self {
            Self::Or => dst | src,
            Self::And => dst & src,
            Self::Xor => dst ^ src,
            Self::Xnor => !(dst ^ src),
            Self::Replace => src,
        }
    }
}

/// A bi-level image stored row by row, eight pixels per byte.
///
/// The most significant bit of each byte is the leftmost pixel and a set bit
/// is black. Every row starts on a byte boundary and unused bits at the end
/// of a row are always zero.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl Bitmap {
    /// Create a new white bitmap.
    ///
    /// # Panics
    ///
    /// Panics if the size of the bitmap in bytes overflows `usize`.
    pub fn new(width: u32, height: u32) -> Self {
        let Some(len) = packed_len(width, height) else {
            panic!("bitmap of {width}x{height} pixels is too large");
        };

        Self {
            width,
            height,
            stride: width.div_ceil(8) as usize,
            data: vec![0; len],
        }
    }

    /// Create a new white bitmap, refusing sizes above `max_pixel_count`.
    pub(crate) fn try_new(width: u32, height: u32, max_pixel_count: u64) -> Result<Self> {
        if u64::from(width) * u64::from(height) > max_pixel_count {
            bail!(UnsupportedFeature::ImageTooLarge);
        }

        let len = packed_len(width, height).ok_or(DecodeError::Overflow)?;

        Ok(Self {
            width,
            height,
            stride: width.div_ceil(8) as usize,
            data: vec![0; len],
        })
    }

    /// Create a bitmap from packed rows of `width.div_ceil(8)` bytes each.
    ///
    /// Returns `None` if `data` has the wrong length. Padding bits are
    /// cleared.
    pub fn from_packed(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != packed_len(width, height)? {
            return None;
        }

        let mut bitmap = Self {
            width,
            height,
            stride: width.div_ceil(8) as usize,
            data,
        };
        bitmap.clear_padding();

        Some(bitmap)
    }

    /// The width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The number of bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The packed pixel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the bitmap and return its packed pixel data.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Whether the pixel at (x, y) is black. Pixels outside of the bitmap
    /// are white.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }

        let byte = self.data[y as usize * self.stride + (x >> 3) as usize];
        byte & (0x80 >> (x & 7)) != 0
    }

    /// Set the pixel at (x, y). Writes outside of the bitmap are ignored.
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, black: bool) {
        if x >= self.width || y >= self.height {
            return;
        }

        let idx = y as usize * self.stride + (x >> 3) as usize;
        let mask = 0x80 >> (x & 7);

        if black {
            self.data[idx] |= mask;
        } else {
            self.data[idx] &= !mask;
        }
    }

    /// The pixel value at signed coordinates, as used in context formation.
    ///
    /// "[...] any pixel that is outside the bitmap [...] is taken to have the
    /// value 0" (6.2.5.2)
    #[inline(always)]
    pub(crate) fn pixel(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 {
            return 0;
        }

        u32::from(self.get_pixel(x as u32, y as u32))
    }

    /// The packed bytes of row `y`.
    pub(crate) fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    /// Copy row `src` over row `dst`.
    pub(crate) fn copy_row(&mut self, src: u32, dst: u32) {
        let stride = self.stride;
        let src = src as usize * stride;
        self.data
            .copy_within(src..src + stride, dst as usize * stride);
    }

    /// Set every pixel to the given value.
    pub(crate) fn fill(&mut self, black: bool) {
        self.data.fill(if black { 0xFF } else { 0 });
        self.clear_padding();
    }

    /// Grow the bitmap to `height` rows, filling new rows with `black`.
    pub(crate) fn extend_height(&mut self, height: u32, black: bool) {
        if height <= self.height {
            return;
        }

        let fill = if black { 0xFF } else { 0 };
        self.data.resize(self.stride * height as usize, fill);
        self.height = height;
        self.clear_padding();
    }

    /// Copy out a `width` x `height` window starting at (x, y).
    ///
    /// Parts of the window outside of this bitmap are white.
    pub(crate) fn crop(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        max_pixel_count: u64,
    ) -> Result<Self> {
        let mut out = Self::try_new(width, height, max_pixel_count)?;
        let cols = self.width.saturating_sub(x).min(width);
        let rows = self.height.saturating_sub(y).min(height);

        for row in 0..rows {
            for col in 0..cols {
                if self.get_pixel(x + col, y + row) {
                    out.set_pixel(col, row, true);
                }
            }
        }

        Ok(out)
    }

    /// Combine `other` into this bitmap with its top-left corner at (x, y).
    ///
    /// Parts of `other` that fall outside of this bitmap are clipped.
    pub(crate) fn combine(&mut self, other: &Self, x: i64, y: i64, op: CombinationOperator) {
        let x_start = x.max(0);
        let y_start = y.max(0);
        let x_end = (x + i64::from(other.width)).min(i64::from(self.width));
        let y_end = (y + i64::from(other.height)).min(i64::from(self.height));

        if x_start >= x_end || y_start >= y_end {
            return;
        }

        if op == CombinationOperator::Or && x & 7 == 0 && x >= 0 {
            self.combine_or_aligned(other, x, y_start, y_end, y);
            return;
        }

        for dy in y_start..y_end {
            let sy = (dy - y) as u32;

            for dx in x_start..x_end {
                let sx = (dx - x) as u32;
                let src = other.get_pixel(sx, sy);
                let dst = self.get_pixel(dx as u32, dy as u32);
                self.set_pixel(dx as u32, dy as u32, op.apply(dst, src));
            }
        }
    }

    /// OR-combination for a byte-aligned horizontal offset, which is how text
    /// and generic regions are usually placed.
    fn combine_or_aligned(&mut self, other: &Self, x: i64, y_start: i64, y_end: i64, y: i64) {
        let byte_offset = (x >> 3) as usize;
        let count = other.stride.min(self.stride.saturating_sub(byte_offset));

        for dy in y_start..y_end {
            let src = other.row((dy - y) as u32);
            let dst_start = dy as usize * self.stride + byte_offset;
            let dst = &mut self.data[dst_start..dst_start + count];

            for (d, s) in dst.iter_mut().zip(src) {
                *d |= *s;
            }
        }

        self.clear_padding();
    }

    fn clear_padding(&mut self) {
        let rem = self.width & 7;

        if rem == 0 || self.stride == 0 {
            return;
        }

        let mask = 0xFF_u8 << (8 - rem);

        for row in self.data.chunks_exact_mut(self.stride) {
            if let Some(last) = row.last_mut() {
                *last &= mask;
            }
        }
    }
}

/// The size in bytes of a bitmap with rows of `width.div_ceil(8)` bytes.
fn packed_len(width: u32, height: u32) -> Option<usize> {
    (width.div_ceil(8) as usize).checked_mul(height as usize)
}

impl core::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Bitmap {}x{}", self.width, self.height)?;

        for y in 0..self.height {
            for x in 0..self.width {
                f.write_str(if self.get_pixel(x, y) { "#" } else { "." })?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn bitmap_from_ascii(rows: &[&str]) -> Bitmap {
    let height = rows.len() as u32;
    let width = rows.first().map_or(0, |r| r.len()) as u32;
    let mut bitmap = Bitmap::new(width, height);

    for (y, row) in rows.iter().enumerate() {
        for (x, c) in row.chars().enumerate() {
            bitmap.set_pixel(x as u32, y as u32, c == '#');
        }
    }

    bitmap
}
