//! Pure calculation functions for sampling, cropping and scaling.
//!
//! All functions here are pure and testable without any I/O or images.

/// Multiplier applied to the scale factor on every shrink step.
pub const SCALE_STEP: f32 = 0.75;

/// Pick the power-of-two decode subsample factor for a source image.
///
/// Returns 1 when `width x height` already fits inside `dst_width x dst_height`.
/// Otherwise the factor is doubled (and the working dimensions halved with
/// integer truncation) until both working dimensions fit.
///
/// # Examples
/// ```
/// # use squarefit::imaging::compute_sample;
/// assert_eq!(compute_sample(800, 600, 1024, 1024), 1);
/// // 4000/2 = 2000 is still too wide, 4000/4 = 1000 fits
/// assert_eq!(compute_sample(4000, 3000, 1024, 1024), 4);
/// ```
pub fn compute_sample(width: u32, height: u32, dst_width: u32, dst_height: u32) -> u32 {
    if width <= dst_width && height <= dst_height {
        return 1;
    }

    let mut sample = 1u32;
    let (mut w, mut h) = (width, height);
    while (w > dst_width || h > dst_height) && sample < 1 << 31 {
        sample *= 2;
        w /= 2;
        h /= 2;
    }
    sample
}

/// A centered square region inside a decoded raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    /// Side length; the crop is always `size x size`.
    pub size: u32,
}

/// Largest centered square that fits in `width x height`.
pub fn square_crop(width: u32, height: u32) -> CropRect {
    let size = width.min(height);
    CropRect {
        x: (width - size) / 2,
        y: (height - size) / 2,
        size,
    }
}

/// Shrink from 1.0 in [`SCALE_STEP`] increments until `out_width x out_height`
/// scaled by the result fits the limits.
pub fn initial_scale_factor(
    out_width: u32,
    out_height: u32,
    width_limit: u32,
    height_limit: u32,
) -> f32 {
    let mut scale = 1.0f32;
    while out_width as f32 * scale > width_limit as f32
        || out_height as f32 * scale > height_limit as f32
    {
        scale *= SCALE_STEP;
    }
    scale
}

/// Side length after applying `scale`, truncated toward zero but never below 1.
pub fn scaled_side(side: u32, scale: f32) -> u32 {
    ((side as f32 * scale) as u32).max(1)
}

/// Lower `quality` in proportion to how far `encoded_size` overshot `byte_limit`.
///
/// Integer division on purpose: the estimate lands a little low, and the
/// next attempt makes up the difference. Never returns less than `min_quality`.
pub fn reduce_quality(quality: u8, byte_limit: u32, encoded_size: usize, min_quality: u8) -> u8 {
    if encoded_size == 0 {
        return quality;
    }
    let proportional = u64::from(quality) * u64::from(byte_limit) / encoded_size as u64;
    // proportional <= quality whenever the encode overshot, so it fits in u8
    let proportional = proportional.min(u64::from(quality)) as u8;
    proportional.max(min_quality)
}
