//! Parameter types for the resize-and-compress operation.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which runs the retry ladders) and the [`backend`](super::backend) (which
//! does the actual pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100). Clamped on construction.
//! - [`Constraints`]: Width, height and byte limits for one operation.
//! - [`FitSettings`]: Quality bounds, attempt ceiling and output format.
//! - [`DecodeRequest`]: Source plus the current subsample factor.
//! - [`CompressionState`]: Scale factor and quality as they evolve across attempts.

use super::calculations::SCALE_STEP;
use super::operations::ResizeError;
use super::source::ImageSource;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: Quality = Quality(50);
    pub const MAX: Quality = Quality(95);

    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::MAX
    }
}

/// Encoded output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Avif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Avif => "avif",
        }
    }
}

/// Resampling filter used when rescaling a decoded raster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Width, height and encoded-size limits. All three are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    width_limit: u32,
    height_limit: u32,
    byte_limit: u32,
}

impl Constraints {
    pub fn new(width_limit: u32, height_limit: u32, byte_limit: u32) -> Result<Self, ResizeError> {
        if width_limit == 0 || height_limit == 0 || byte_limit == 0 {
            return Err(ResizeError::InvalidConstraints(format!(
                "limits must be non-zero (width={width_limit}, height={height_limit}, bytes={byte_limit})"
            )));
        }
        Ok(Self {
            width_limit,
            height_limit,
            byte_limit,
        })
    }

    pub fn width_limit(&self) -> u32 {
        self.width_limit
    }

    pub fn height_limit(&self) -> u32 {
        self.height_limit
    }

    pub fn byte_limit(&self) -> u32 {
        self.byte_limit
    }
}

/// Knobs shared by both stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitSettings {
    /// Floor for quality reduction.
    pub min_quality: Quality,
    /// Quality of the first encode.
    pub max_quality: Quality,
    /// Ceiling for both the decode ladder and the compress loop.
    pub max_attempts: u32,
    pub format: OutputFormat,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            min_quality: Quality::MIN,
            max_quality: Quality::MAX,
            max_attempts: 8,
            format: OutputFormat::Jpeg,
        }
    }
}

/// One decode attempt: which source, at which subsample factor.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    pub source: &'a ImageSource<'a>,
    /// Power-of-two divisor the decoder applies to both dimensions.
    pub sample: u32,
}

impl<'a> DecodeRequest<'a> {
    pub fn new(source: &'a ImageSource<'a>, sample: u32) -> Self {
        Self {
            source,
            sample: sample.max(1),
        }
    }

    /// Escalate after a memory failure.
    pub fn double_sample(&mut self) {
        self.sample = self.sample.saturating_mul(2);
    }
}

/// Mutable state of the fit-and-compress loop.
///
/// The scale factor only ever shrinks and the quality only ever drops, never
/// below the floor it was created with.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionState {
    scale_factor: f32,
    quality: Quality,
    min_quality: Quality,
    last_encoded_size: Option<usize>,
}

impl CompressionState {
    pub fn new(scale_factor: f32, settings: &FitSettings) -> Self {
        Self {
            scale_factor: scale_factor.min(1.0),
            quality: settings.max_quality.max(settings.min_quality),
            min_quality: settings.min_quality,
            last_encoded_size: None,
        }
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn min_quality(&self) -> Quality {
        self.min_quality
    }

    pub fn last_encoded_size(&self) -> Option<usize> {
        self.last_encoded_size
    }

    pub fn shrink(&mut self) {
        self.scale_factor *= SCALE_STEP;
    }

    /// Lower quality; requests above the current value are ignored.
    pub fn lower_quality(&mut self, quality: u8) {
        let next = Quality::new(quality).max(self.min_quality);
        self.quality = self.quality.min(next);
    }

    pub fn record_encoded(&mut self, size: usize) {
        self.last_encoded_size = Some(size);
    }
}
