//! # squarefit
//!
//! Turn an arbitrary photo into a square image that fits three independent
//! limits at once: a maximum width, a maximum height, and a maximum encoded
//! size in bytes.
//!
//! # Architecture: Two-Stage Pipeline
//!
//! ```text
//! 1. Decode-and-square   source  →  square raster   (subsample, center crop)
//! 2. Fit-and-compress    raster  →  encoded bytes   (shrink, lower quality)
//! ```
//!
//! Both stages are retry ladders with a shared attempt ceiling (8 by default):
//!
//! - **Decode** starts at the smallest power-of-two subsample that brings the
//!   source under the pixel limits and doubles it whenever the backend runs out
//!   of memory.
//! - **Compress** shrinks the square by 0.75 per attempt and lowers the encode
//!   quality in proportion to the byte overshoot, never below a floor (50).
//!   If the ceiling is reached while still oversized, the last attempt is
//!   returned as a best-effort result instead of failing.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Sources, rasters, the backend trait, the `image` crate backend, and the two stages |
//! | [`config`] | `squarefit.toml` loading, merging and validation |
//! | [`output`] | CLI report formatting |
//! | [`format`] | Byte-size formatting and CRC64 fingerprints |
//!
//! # Design Decisions
//!
//! ## Out-of-memory as a value
//!
//! Backend primitives return [`imaging::Outcome`], where `OutOfMemory` is a
//! variant next to `Ready` and `Empty`. The retry ladders are plain state
//! transitions on that value; nothing unwinds.
//!
//! ## Single-owner rasters
//!
//! [`imaging::Raster`] is not `Clone`. Each stage takes the raster it
//! replaces by value, so the previous buffer is dropped as soon as the next
//! one exists and peak memory stays at roughly two buffers.
//!
//! ## Stateless backends
//!
//! An operation keeps all of its state on the stack. Backends hold only
//! configuration, so concurrent callers can share one backend or use their
//! own without coordinating.

pub mod config;
pub mod format;
pub mod imaging;
pub mod output;
