//! Image processing: decode, square-crop, rescale and encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` with a subsample factor |
//! | **Square** | `DynamicImage::crop_imm`, centered |
//! | **Rescale** | `DynamicImage::resize_exact` |
//! | **Encode** | `JpegEncoder` / `AvifEncoder` at a quality |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for sample, crop, scale and quality math (unit testable)
//! - **Parameters**: Data structures describing one operation
//! - **Source / Raster**: Input handles and single-owner pixel buffers
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: The two retry ladders combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod raster;
pub mod rust_backend;
pub mod source;

pub use backend::{BackendError, DecodeOutcome, Decoded, Dimensions, ImageBackend, Outcome};
pub use calculations::{
    CropRect, SCALE_STEP, compute_sample, initial_scale_factor, reduce_quality, scaled_side,
    square_crop,
};
pub use operations::{
    DecodedSquare, FitResult, ResizeError, Resized, decode_square, fit_and_compress,
    resize_and_compress,
};
pub use params::{
    CompressionState, Constraints, DecodeRequest, FitSettings, OutputFormat, Quality,
    ResampleFilter,
};
pub use raster::Raster;
pub use rust_backend::RustBackend;
pub use source::{ContentResolver, ImageSource, SourceStream};
