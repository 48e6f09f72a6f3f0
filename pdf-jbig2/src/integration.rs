//! Integration with the [image] crate.

use ::image::{GrayImage, Luma};

use crate::Bitmap;

impl Bitmap {
    /// Convert to an 8-bit grayscale image, with black pixels at 0 and white
    /// pixels at 255.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            Luma([if self.get_pixel(x, y) { 0 } else { 255 }])
        })
    }

    /// Threshold a grayscale image. Pixels darker than `threshold` become
    /// black.
    pub fn from_gray_image(image: &GrayImage, threshold: u8) -> Self {
        let mut bitmap = Self::new(image.width(), image.height());

        for (x, y, pixel) in image.enumerate_pixels() {
            if pixel.0[0] < threshold {
                bitmap.set_pixel(x, y, true);
            }
        }

        bitmap
    }
}

impl From<&Bitmap> for GrayImage {
    fn from(bitmap: &Bitmap) -> Self {
        bitmap.to_gray_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::bitmap_from_ascii;

    #[test]
    fn gray_round_trip() {
        let bitmap = bitmap_from_ascii(&["#..#", ".##.", "#..."]);
        let image = GrayImage::from(&bitmap);

        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(1, 0).0, [255]);
        assert_eq!(Bitmap::from_gray_image(&image, 128), bitmap);
    }
}
