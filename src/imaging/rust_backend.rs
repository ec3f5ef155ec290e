//! Pure Rust image backend on top of the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader::into_decoder` + `DynamicImage::from_decoder` |
//! | Subsample | `DynamicImage::resize_exact` with `Nearest` |
//! | Rescale | `DynamicImage::resize_exact` with the configured filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//!
//! ## Memory budget
//!
//! The `image` decoders cannot subsample while decoding, so the budget is
//! enforced on the buffers this backend hands out: a sampled raster or a
//! rescale target larger than `max_raster_bytes` is reported as
//! [`Outcome::OutOfMemory`] before anything is allocated. The decoder itself
//! runs under `image::Limits` with `max_alloc`; tripping that limit ends the
//! decode with [`Outcome::Empty`], since every sample decodes the full image.
//! Encode buffers are reserved with `Vec::try_reserve`.

use super::backend::{
    BackendError, DecodeOutcome, Decoded, Dimensions, ImageBackend, Outcome,
};
use super::params::{DecodeRequest, OutputFormat, Quality, ResampleFilter};
use super::raster::Raster;
use super::source::ImageSource;
use image::error::{ImageError, LimitErrorKind};
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader, Limits};
use std::io::{BufRead, Cursor, Seek};

/// Default budget for one raster: 256 MiB, an 8192x8192 RGBA image.
pub const DEFAULT_MAX_RASTER_BYTES: u64 = 256 * 1024 * 1024;
/// Default ceiling for decoder allocations.
pub const DEFAULT_MAX_ALLOC: u64 = 1024 * 1024 * 1024;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest).
const AVIF_SPEED: u8 = 6;

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone)]
pub struct RustBackend {
    max_raster_bytes: u64,
    max_alloc: u64,
    filter: ResampleFilter,
}

impl RustBackend {
    pub fn new() -> Self {
        Self {
            max_raster_bytes: DEFAULT_MAX_RASTER_BYTES,
            max_alloc: DEFAULT_MAX_ALLOC,
            filter: ResampleFilter::default(),
        }
    }

    pub fn with_limits(max_raster_bytes: u64, max_alloc: u64) -> Self {
        Self {
            max_raster_bytes,
            max_alloc,
            ..Self::new()
        }
    }

    pub fn with_filter(mut self, filter: ResampleFilter) -> Self {
        self.filter = filter;
        self
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_alloc);
        limits
    }

    fn fits_budget(&self, width: u32, height: u32, bytes_per_pixel: u8) -> bool {
        u64::from(width)
            .saturating_mul(u64::from(height))
            .saturating_mul(u64::from(bytes_per_pixel))
            <= self.max_raster_bytes
    }

    fn decode_reader<R: BufRead + Seek>(
        &self,
        mut reader: ImageReader<R>,
        sample: u32,
        origin: &ImageSource<'_>,
    ) -> DecodeOutcome {
        reader.limits(self.limits());
        let decoder = match reader.into_decoder() {
            Ok(decoder) => decoder,
            Err(e) => return decode_error(origin, e),
        };

        let (width, height) = decoder.dimensions();
        let sampled = Dimensions::new((width / sample).max(1), (height / sample).max(1));
        let bytes_per_pixel = decoder.color_type().bytes_per_pixel();
        if !self.fits_budget(sampled.width, sampled.height, bytes_per_pixel) {
            log::debug!(
                "{origin}: {}x{} at sample {sample} exceeds raster budget of {} bytes",
                sampled.width,
                sampled.height,
                self.max_raster_bytes
            );
            return Outcome::OutOfMemory;
        }

        let image = match DynamicImage::from_decoder(decoder) {
            Ok(image) => image,
            Err(e) => return decode_error(origin, e),
        };
        let image = if sample > 1 {
            image.resize_exact(sampled.width, sampled.height, FilterType::Nearest)
        } else {
            image
        };

        Outcome::Ready(Decoded {
            reported: Dimensions::new(image.width(), image.height()),
            raster: Raster::new(image),
        })
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn is_out_of_memory(error: &ImageError) -> bool {
    matches!(error, ImageError::Limits(limit) if matches!(limit.kind(), LimitErrorKind::InsufficientMemory))
}

/// Every decode failure is `Empty`, including `max_alloc`: decoding always runs
/// at full resolution, so a larger sample would hit the same limit again.
fn decode_error<T>(origin: &ImageSource<'_>, error: ImageError) -> Outcome<T> {
    let error = if is_out_of_memory(&error) {
        BackendError::ProcessingFailed(format!(
            "{origin} exceeds the decoder allocation limit: {error}"
        ))
    } else {
        BackendError::ProcessingFailed(format!("Failed to decode {origin}: {error}"))
    };
    log::warn!("{error}");
    Outcome::Empty
}

/// Buffer a content stream into a seekable reader with its format guessed.
fn open_reader(source: &ImageSource<'_>) -> Result<ImageReader<Cursor<Vec<u8>>>, BackendError> {
    let bytes = source.read_all()?;
    Ok(ImageReader::new(Cursor::new(bytes)).with_guessed_format()?)
}

/// JPEG has no alpha channel and only takes 8-bit samples.
fn jpeg_compatible(image: &DynamicImage) -> Option<DynamicImage> {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => None,
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            Some(DynamicImage::ImageLuma8(image.to_luma8()))
        }
        _ => Some(DynamicImage::ImageRgb8(image.to_rgb8())),
    }
}

fn avif_compatible(image: &DynamicImage) -> Option<DynamicImage> {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => None,
        other if other.color().has_alpha() => Some(DynamicImage::ImageRgba8(other.to_rgba8())),
        other => Some(DynamicImage::ImageRgb8(other.to_rgb8())),
    }
}

fn write_encoded(
    image: &DynamicImage,
    quality: Quality,
    format: OutputFormat,
    buffer: &mut Vec<u8>,
) -> Result<(), ImageError> {
    match format {
        OutputFormat::Jpeg => {
            let converted = jpeg_compatible(image);
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut *buffer, quality.value());
            converted.as_ref().unwrap_or(image).write_with_encoder(encoder)
        }
        OutputFormat::Avif => {
            let converted = avif_compatible(image);
            let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
                &mut *buffer,
                AVIF_SPEED,
                quality.value(),
            );
            converted.as_ref().unwrap_or(image).write_with_encoder(encoder)
        }
    }
}

impl ImageBackend for RustBackend {
    fn decode(&self, request: &DecodeRequest<'_>) -> DecodeOutcome {
        // Files decode straight from a buffered handle; content streams are
        // not seekable, so they are read into memory first.
        let outcome = match request.source {
            ImageSource::File(path) => ImageReader::open(path)
                .and_then(|reader| reader.with_guessed_format())
                .map_err(BackendError::Io)
                .map(|reader| self.decode_reader(reader, request.sample, request.source)),
            ImageSource::Content { .. } => open_reader(request.source)
                .map(|reader| self.decode_reader(reader, request.sample, request.source)),
        };
        outcome.unwrap_or_else(|e| {
            log::warn!("{}: {e}", request.source);
            Outcome::Empty
        })
    }

    fn encode(&self, raster: &Raster, quality: Quality, format: OutputFormat) -> Outcome<Vec<u8>> {
        let (width, height) = raster.dimensions();
        let mut buffer = Vec::new();
        // One byte per pixel is ample for lossy output at these qualities.
        let estimate = (width as usize).saturating_mul(height as usize);
        if buffer.try_reserve(estimate).is_err() {
            return Outcome::OutOfMemory;
        }

        match write_encoded(raster.image(), quality, format, &mut buffer) {
            Ok(()) if buffer.is_empty() => Outcome::Empty,
            Ok(()) => Outcome::Ready(buffer),
            Err(e) if is_out_of_memory(&e) => Outcome::OutOfMemory,
            Err(e) => {
                log::warn!("{format:?} encode of {width}x{height} failed: {e}");
                Outcome::Empty
            }
        }
    }

    fn rescale(&self, raster: &Raster, width: u32, height: u32) -> Outcome<Raster> {
        if width == 0 || height == 0 {
            return Outcome::Empty;
        }
        if !self.fits_budget(width, height, raster.image().color().bytes_per_pixel()) {
            return Outcome::OutOfMemory;
        }
        Outcome::Ready(Raster::new(raster.image().resize_exact(
            width,
            height,
            self.filter.into(),
        )))
    }
}
