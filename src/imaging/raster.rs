//! Single-owner decoded pixel buffers.
//!
//! [`Raster`] is deliberately not `Clone`: every stage takes the raster it
//! replaces by value, so the old buffer is dropped as soon as the new one
//! exists. Peak memory stays at one current plus one next buffer.

use super::calculations::{CropRect, square_crop};
use image::DynamicImage;

/// A decoded image owned by exactly one stage.
#[derive(Debug)]
pub struct Raster {
    image: DynamicImage,
}

impl Raster {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Crop to the largest centered square, consuming the unsquared raster.
    pub fn into_square(self) -> (Raster, CropRect) {
        let crop = square_crop(self.width(), self.height());
        if crop.x == 0 && crop.y == 0 && crop.size == self.width() && crop.size == self.height() {
            return (self, crop);
        }
        let square = self.image.crop_imm(crop.x, crop.y, crop.size, crop.size);
        (Raster::new(square), crop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    #[test]
    fn square_from_landscape_keeps_center() {
        // Column index encoded in the red channel
        let img = RgbImage::from_fn(10, 4, |x, _| Rgb([x as u8, 0, 0]));
        let (square, crop) = Raster::new(DynamicImage::ImageRgb8(img)).into_square();

        assert_eq!(crop, CropRect { x: 3, y: 0, size: 4 });
        assert_eq!(square.dimensions(), (4, 4));
        assert_eq!(square.image().get_pixel(0, 0).0[0], 3);
    }

    #[test]
    fn square_input_is_passed_through() {
        let raster = Raster::new(DynamicImage::new_rgb8(6, 6));
        let (square, crop) = raster.into_square();
        assert_eq!(crop, CropRect { x: 0, y: 0, size: 6 });
        assert_eq!(square.dimensions(), (6, 6));
    }
}
