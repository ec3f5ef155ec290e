//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three primitives the resize
//! pipeline needs: decode (with a subsample hint), encode at a quality, and
//! rescale. Each returns an [`Outcome`] so that running out of memory is an
//! ordinary value the retry ladders can react to, distinct from "the codec
//! produced nothing".
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.

use super::params::{DecodeRequest, OutputFormat, Quality};
use super::raster::Raster;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of a backend primitive.
#[must_use]
#[derive(Debug)]
pub enum Outcome<T> {
    Ready(T),
    /// The codec ran but produced no data (unreadable or unsupported input).
    Empty,
    /// Allocation for the requested buffer failed or would exceed the budget.
    OutOfMemory,
}

impl<T> Outcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

pub type DecodeOutcome = Outcome<Decoded>;

/// Width and height as reported by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn short_side(&self) -> u32 {
        self.width.min(self.height)
    }
}

/// A successful decode: the pixels plus the size the decoder reported for
/// them after subsampling.
#[derive(Debug)]
pub struct Decoded {
    pub raster: Raster,
    pub reported: Dimensions,
}

/// Trait for image processing backends.
///
/// Implementations hold no per-operation state, so one backend can serve
/// independent operations from several threads.
pub trait ImageBackend: Sync {
    /// Decode `request.source`, dividing both dimensions by `request.sample`.
    fn decode(&self, request: &DecodeRequest<'_>) -> DecodeOutcome;

    /// Encode a raster at the given quality.
    fn encode(&self, raster: &Raster, quality: Quality, format: OutputFormat) -> Outcome<Vec<u8>>;

    /// Produce a new raster of exactly `width x height`.
    fn rescale(&self, raster: &Raster, width: u32, height: u32) -> Outcome<Raster>;
}
