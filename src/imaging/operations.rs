//! High-level resize-and-compress operations.
//!
//! Two stages run back to back:
//!
//! 1. [`decode_square`] decodes the source with a power-of-two subsample
//!    factor, doubling it every time the decoder runs out of memory, then
//!    crops the result to a centered square.
//! 2. [`fit_and_compress`] shrinks the square by 0.75 per attempt and lowers
//!    the encode quality until the encoded bytes fit the byte limit.
//!
//! Both ladders share one attempt ceiling ([`FitSettings::max_attempts`]).
//! [`resize_and_compress`] chains them.

use super::backend::{Decoded, Dimensions, ImageBackend, Outcome};
use super::calculations::{
    CropRect, compute_sample, initial_scale_factor, reduce_quality, scaled_side,
};
use super::params::{CompressionState, Constraints, DecodeRequest, FitSettings, Quality};
use super::raster::Raster;
use super::source::ImageSource;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResizeError {
    #[error("Invalid constraints: {0}")]
    InvalidConstraints(String),
    #[error("Failed to decode {origin}: {reason}")]
    Decode { origin: String, reason: String },
    #[error("Failed to encode: {0}")]
    Encode(String),
    #[error("Out of memory while {0}")]
    OutOfMemory(String),
}

/// Result type for resize operations.
pub type Result<T> = std::result::Result<T, ResizeError>;

/// Output of the decode-and-square stage.
#[derive(Debug)]
pub struct DecodedSquare {
    pub raster: Raster,
    /// Size the decoder reported for the subsampled (uncropped) image.
    pub reported: Dimensions,
    pub sample: u32,
    pub crop: CropRect,
    pub attempts: u32,
}

/// Encoded bytes plus how the fit loop got there.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Quality of the encode that produced `bytes`.
    pub quality: Quality,
    pub attempts: u32,
    /// False when the attempt ceiling was hit and `bytes` is the last,
    /// still oversized, attempt.
    pub within_budget: bool,
}

/// Full pipeline result.
#[derive(Debug, Clone, PartialEq)]
pub struct Resized {
    pub sample: u32,
    pub crop: CropRect,
    pub decode_attempts: u32,
    pub fit: FitResult,
}

/// Decode `source` small enough to fit in memory, then crop it square.
///
/// When `natural` (the source's full-resolution size) is known, the first
/// attempt already uses [`compute_sample`] against the limits; otherwise it
/// starts at 1 and relies on the out-of-memory ladder.
pub fn decode_square(
    backend: &impl ImageBackend,
    source: &ImageSource<'_>,
    natural: Option<Dimensions>,
    width_limit: u32,
    height_limit: u32,
    settings: &FitSettings,
) -> Result<DecodedSquare> {
    let initial = natural
        .map(|dims| compute_sample(dims.width, dims.height, width_limit, height_limit))
        .unwrap_or(1);
    let mut request = DecodeRequest::new(source, initial);
    let max_attempts = settings.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match backend.decode(&request) {
            Outcome::Ready(Decoded { raster, reported }) => {
                let (raster, crop) = raster.into_square();
                log::debug!(
                    "{source}: decoded {}x{} at sample {}, square {}px at ({}, {})",
                    reported.width,
                    reported.height,
                    request.sample,
                    crop.size,
                    crop.x,
                    crop.y
                );
                return Ok(DecodedSquare {
                    raster,
                    reported,
                    sample: request.sample,
                    crop,
                    attempts: attempt,
                });
            }
            Outcome::Empty => {
                return Err(ResizeError::Decode {
                    origin: source.to_string(),
                    reason: "decoder returned no data".into(),
                });
            }
            Outcome::OutOfMemory => {
                log::warn!(
                    "{source}: too large to decode at sample {} (attempt {attempt}/{max_attempts})",
                    request.sample
                );
                request.double_sample();
            }
        }
    }

    log::error!("{source}: gave up decoding after {max_attempts} attempts");
    Err(ResizeError::Decode {
        origin: source.to_string(),
        reason: format!("out of memory after {max_attempts} attempts"),
    })
}

/// Encode once. `Ok(None)` means the encoder ran out of memory.
fn encode_once(
    backend: &impl ImageBackend,
    raster: &Raster,
    quality: Quality,
    settings: &FitSettings,
) -> Result<Option<Vec<u8>>> {
    match backend.encode(raster, quality, settings.format) {
        Outcome::Ready(bytes) => Ok(Some(bytes)),
        Outcome::Empty => Err(ResizeError::Encode(format!(
            "encoder produced no data at quality {}",
            quality.value()
        ))),
        Outcome::OutOfMemory => Ok(None),
    }
}

/// Shrink and re-encode `square` until it fits `constraints`.
///
/// Each attempt:
/// - rescales to `side * scale` when the decoded size exceeds a pixel limit,
///   the previous attempt overshot the byte limit, or the previous attempt ran
///   out of memory;
/// - encodes at the current quality, and on overshoot lowers the quality in
///   proportion and encodes once more;
/// - multiplies the scale by 0.75, even when the encode fit.
///
/// When the ceiling is reached with every encode still oversized, the last
/// attempt's bytes come back with `within_budget == false`. Running out of
/// memory on the final attempt is an error.
pub fn fit_and_compress(
    backend: &impl ImageBackend,
    square: Raster,
    reported: Dimensions,
    constraints: &Constraints,
    settings: &FitSettings,
) -> Result<FitResult> {
    let side = reported.short_side();
    let oversized =
        reported.width > constraints.width_limit() || reported.height > constraints.height_limit();
    let byte_limit = constraints.byte_limit() as usize;
    let max_attempts = settings.max_attempts.max(1);

    let mut state = CompressionState::new(
        initial_scale_factor(
            side,
            side,
            constraints.width_limit(),
            constraints.height_limit(),
        ),
        settings,
    );
    let mut current = square;
    let mut last_oversized: Option<Vec<u8>> = None;
    let mut out_of_memory = false;

    for attempt in 1..=max_attempts {
        let over_budget = state
            .last_encoded_size()
            .is_some_and(|size| size > byte_limit);

        if oversized || over_budget || out_of_memory {
            let target = scaled_side(side, state.scale_factor());
            log::debug!(
                "rescaling to {target}x{target} (scale {:.4}, attempt {attempt}/{max_attempts})",
                state.scale_factor()
            );
            match backend.rescale(&current, target, target) {
                Outcome::Ready(next) => current = next,
                Outcome::Empty => {
                    return Err(ResizeError::Encode(format!(
                        "rescale to {target}x{target} produced no image"
                    )));
                }
                Outcome::OutOfMemory => {
                    log::warn!("out of memory rescaling to {target}x{target}");
                    out_of_memory = true;
                    state.shrink();
                    continue;
                }
            }
        }
        out_of_memory = false;

        let Some(mut bytes) = encode_once(backend, &current, state.quality(), settings)? else {
            log::warn!("out of memory encoding {}x{}", current.width(), current.height());
            out_of_memory = true;
            state.shrink();
            continue;
        };

        if bytes.len() > byte_limit {
            let quality = reduce_quality(
                state.quality().value(),
                constraints.byte_limit(),
                bytes.len(),
                state.min_quality().value(),
            );
            log::debug!(
                "{} bytes exceeds limit {}, re-encoding at quality {quality}",
                bytes.len(),
                byte_limit
            );
            state.record_encoded(bytes.len());
            state.lower_quality(quality);
            bytes = match encode_once(backend, &current, state.quality(), settings)? {
                Some(bytes) => bytes,
                None => {
                    log::warn!("out of memory re-encoding at quality {quality}");
                    out_of_memory = true;
                    state.shrink();
                    continue;
                }
            };
        }

        state.record_encoded(bytes.len());
        state.shrink();

        if bytes.len() <= byte_limit {
            return Ok(FitResult {
                bytes,
                width: current.width(),
                height: current.height(),
                quality: state.quality(),
                attempts: attempt,
                within_budget: true,
            });
        }
        last_oversized = Some(bytes);
    }

    if out_of_memory {
        log::error!("out of memory on final attempt {max_attempts}");
        return Err(ResizeError::OutOfMemory(format!(
            "compressing (attempt {max_attempts} of {max_attempts})"
        )));
    }

    match last_oversized {
        Some(bytes) => {
            log::warn!(
                "still {} bytes after {max_attempts} attempts (limit {byte_limit}), returning best effort",
                bytes.len()
            );
            Ok(FitResult {
                bytes,
                width: current.width(),
                height: current.height(),
                quality: state.quality(),
                attempts: max_attempts,
                within_budget: false,
            })
        }
        None => Err(ResizeError::Encode(format!(
            "no encode succeeded in {max_attempts} attempts"
        ))),
    }
}

/// Decode, square-crop and compress `source` to fit `constraints`.
pub fn resize_and_compress(
    backend: &impl ImageBackend,
    source: &ImageSource<'_>,
    natural: Option<Dimensions>,
    constraints: &Constraints,
    settings: &FitSettings,
) -> Result<Resized> {
    let DecodedSquare {
        raster,
        reported,
        sample,
        crop,
        attempts,
    } = decode_square(
        backend,
        source,
        natural,
        constraints.width_limit(),
        constraints.height_limit(),
        settings,
    )?;

    let fit = fit_and_compress(backend, raster, reported, constraints, settings)?;
    log::info!(
        "{source}: {}x{} at quality {}, {} bytes",
        fit.width,
        fit.height,
        fit.quality.value(),
        fit.bytes.len()
    );

    Ok(Resized {
        sample,
        crop,
        decode_attempts: attempts,
        fit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, Step};
    use crate::imaging::source::tests::MemoryResolver;
    use image::DynamicImage;

    fn limits(width: u32, height: u32, bytes: u32) -> Constraints {
        Constraints::new(width, height, bytes).unwrap()
    }

    fn file_source() -> ImageSource<'static> {
        // MockBackend opens the source, so point at something that exists.
        ImageSource::File(std::env::current_exe().unwrap())
    }

    fn is_non_increasing<T: PartialOrd>(values: &[T]) -> bool {
        values.windows(2).all(|w| w[1] <= w[0])
    }

    // =========================================================================
    // decode_square tests
    // =========================================================================

    #[test]
    fn decode_uses_sample_from_natural_size() {
        let backend = MockBackend::new(4000, 3000);
        let square = decode_square(
            &backend,
            &file_source(),
            Some(Dimensions::new(4000, 3000)),
            1024,
            1024,
            &FitSettings::default(),
        )
        .unwrap();

        assert_eq!(backend.decode_samples(), vec![4]);
        assert_eq!(square.reported, Dimensions::new(1000, 750));
        assert_eq!(square.crop, CropRect { x: 125, y: 0, size: 750 });
        assert_eq!(square.raster.dimensions(), (750, 750));
        assert_eq!(square.attempts, 1);
    }

    #[test]
    fn decode_doubles_sample_on_out_of_memory() {
        // Natural size unknown: start at 1 and escalate
        let backend =
            MockBackend::new(4000, 3000).with_decode([Step::OutOfMemory, Step::OutOfMemory]);
        let square = decode_square(
            &backend,
            &file_source(),
            None,
            1024,
            1024,
            &FitSettings::default(),
        )
        .unwrap();

        assert_eq!(backend.decode_samples(), vec![1, 2, 4]);
        assert_eq!(square.sample, 4);
        assert_eq!(square.reported, Dimensions::new(1000, 750));
        assert_eq!(square.attempts, 3);
    }

    #[test]
    fn decode_gives_up_after_ceiling_without_leaking_streams() {
        let resolver = MemoryResolver::with_entry("big", vec![0; 16]);
        let source = ImageSource::content("big", &resolver);
        let backend = MockBackend::new(4000, 3000).with_decode([Step::OutOfMemory; 20]);

        let result = decode_square(&backend, &source, None, 1024, 1024, &FitSettings::default());

        assert!(matches!(result, Err(ResizeError::Decode { .. })));
        assert_eq!(
            backend.decode_samples(),
            vec![1, 2, 4, 8, 16, 32, 64, 128]
        );
        assert_eq!(resolver.opened(), 8);
        assert_eq!(resolver.live(), 0);
    }

    #[test]
    fn decode_no_data_is_terminal() {
        let backend = MockBackend::new(100, 100).with_decode([Step::Empty]);
        let result = decode_square(
            &backend,
            &file_source(),
            None,
            1024,
            1024,
            &FitSettings::default(),
        );

        assert!(matches!(result, Err(ResizeError::Decode { .. })));
        assert_eq!(backend.decode_samples(), vec![1]);
    }

    #[test]
    fn decode_unreadable_source_is_decode_failure() {
        let backend = MockBackend::new(100, 100);
        let source = ImageSource::File("/nonexistent/image.jpg".into());
        let result = decode_square(&backend, &source, None, 10, 10, &FitSettings::default());
        assert!(matches!(result, Err(ResizeError::Decode { .. })));
    }

    // =========================================================================
    // fit_and_compress tests
    // =========================================================================

    fn square(side: u32) -> Raster {
        Raster::new(DynamicImage::new_luma8(side, side))
    }

    #[test]
    fn compliant_image_encoded_once_without_rescale() {
        let backend = MockBackend::new(500, 500).with_encode([Step::Size(10_000)]);
        let result = fit_and_compress(
            &backend,
            square(500),
            Dimensions::new(500, 500),
            &limits(1024, 1024, 500_000),
            &FitSettings::default(),
        )
        .unwrap();

        assert!(backend.rescales().is_empty());
        assert_eq!(backend.encode_qualities(), vec![95]);
        assert_eq!((result.width, result.height), (500, 500));
        assert_eq!(result.bytes.len(), 10_000);
        assert_eq!(result.attempts, 1);
        assert!(result.within_budget);
    }

    #[test]
    fn oversized_dimensions_rescaled_on_first_attempt() {
        // 2000 → 0.75^3 → 843
        let backend = MockBackend::new(2000, 2000);
        let result = fit_and_compress(
            &backend,
            square(2000),
            Dimensions::new(2000, 2000),
            &limits(1024, 1024, 1_000_000),
            &FitSettings::default(),
        )
        .unwrap();

        assert_eq!(backend.rescales(), vec![(843, 843)]);
        assert_eq!((result.width, result.height), (843, 843));
        assert!(result.within_budget);
    }

    #[test]
    fn byte_overshoot_lowers_quality_then_shrinks() {
        let backend = MockBackend::new(1000, 1000);
        let result = fit_and_compress(
            &backend,
            square(1000),
            Dimensions::new(1000, 1000),
            &limits(1024, 1024, 100_000),
            &FitSettings::default(),
        )
        .unwrap();

        // Scale keeps shrinking by 0.75 from the first attempt onward
        assert_eq!(
            backend.rescales(),
            vec![(750, 750), (562, 562), (421, 421)]
        );
        assert_eq!(backend.encode_qualities(), vec![95, 50, 50, 50, 50, 50, 50]);
        assert_eq!(result.bytes.len(), 88_620);
        assert_eq!(result.quality.value(), 50);
        assert_eq!(result.attempts, 4);
        assert!(result.within_budget);
    }

    #[test]
    fn persistent_overshoot_returns_last_attempt() {
        let backend = MockBackend::new(500, 500).with_encode([Step::Size(600_000); 32]);
        let result = fit_and_compress(
            &backend,
            square(500),
            Dimensions::new(500, 500),
            &limits(1024, 1024, 500_000),
            &FitSettings::default(),
        )
        .unwrap();

        assert!(!result.within_budget);
        assert_eq!(result.attempts, 8);
        assert_eq!(result.bytes.len(), 600_000);
        assert_eq!(result.quality.value(), 50);

        let qualities = backend.encode_qualities();
        assert_eq!(qualities.len(), 16);
        assert!(qualities.iter().all(|&q| q >= 50));
        assert!(is_non_increasing(&qualities));

        let sides: Vec<u32> = backend.rescales().iter().map(|(w, _)| *w).collect();
        assert_eq!(sides.len(), 7);
        assert!(is_non_increasing(&sides));
    }

    #[test]
    fn one_pixel_limit_yields_one_pixel_square() {
        let backend = MockBackend::new(2000, 2000);
        let result = fit_and_compress(
            &backend,
            square(2000),
            Dimensions::new(2000, 2000),
            &limits(1, 1, 500_000),
            &FitSettings::default(),
        )
        .unwrap();

        assert_eq!(backend.rescales(), vec![(1, 1)]);
        assert_eq!((result.width, result.height), (1, 1));
        assert!(result.within_budget);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn tiny_source_under_header_sized_limit_is_best_effort() {
        // 3 → 2 → 1 → 1 ..., the shrink ladder bottoms out at one pixel
        let backend = MockBackend::new(3, 3).with_encode([Step::Size(600); 32]);
        let result = fit_and_compress(
            &backend,
            square(3),
            Dimensions::new(3, 3),
            &limits(1024, 1024, 100),
            &FitSettings::default(),
        )
        .unwrap();

        assert!(!result.within_budget);
        assert_eq!(result.attempts, 8);
        assert_eq!(result.bytes.len(), 600);
        assert_eq!((result.width, result.height), (1, 1));

        let rescales = backend.rescales();
        assert_eq!(rescales.len(), 7);
        assert_eq!(rescales[0], (2, 2));
        assert!(rescales.iter().all(|&(w, h)| w >= 1 && h >= 1));
    }

    #[test]
    fn rescale_no_data_is_encode_failure() {
        let backend = MockBackend::new(2000, 2000).with_rescale([Step::Empty]);
        let result = fit_and_compress(
            &backend,
            square(2000),
            Dimensions::new(2000, 2000),
            &limits(1024, 1024, 1_000_000),
            &FitSettings::default(),
        );

        assert!(matches!(result, Err(ResizeError::Encode(_))));
        assert_eq!(backend.encode_qualities(), Vec::<u8>::new());
    }

    #[test]
    fn encode_no_data_is_encode_failure() {
        let backend = MockBackend::new(100, 100).with_encode([Step::Empty]);
        let result = fit_and_compress(
            &backend,
            square(100),
            Dimensions::new(100, 100),
            &limits(1024, 1024, 1_000_000),
            &FitSettings::default(),
        );
        assert!(matches!(result, Err(ResizeError::Encode(_))));
    }

    #[test]
    fn encode_out_of_memory_retries_smaller() {
        let backend = MockBackend::new(500, 500).with_encode([Step::OutOfMemory]);
        let result = fit_and_compress(
            &backend,
            square(500),
            Dimensions::new(500, 500),
            &limits(1024, 1024, 500_000),
            &FitSettings::default(),
        )
        .unwrap();

        assert_eq!(backend.rescales(), vec![(375, 375)]);
        assert_eq!((result.width, result.height), (375, 375));
        assert_eq!(result.attempts, 2);
    }

    #[test]
    fn out_of_memory_on_final_attempt_is_error() {
        let backend = MockBackend::new(500, 500).with_encode([Step::OutOfMemory; 8]);
        let result = fit_and_compress(
            &backend,
            square(500),
            Dimensions::new(500, 500),
            &limits(1024, 1024, 500_000),
            &FitSettings::default(),
        );

        assert!(matches!(result, Err(ResizeError::OutOfMemory(_))));
        assert_eq!(backend.encode_qualities().len(), 8);
    }

    #[test]
    fn rescale_out_of_memory_consumes_attempt() {
        let backend = MockBackend::new(2000, 2000).with_rescale([Step::OutOfMemory]);
        let result = fit_and_compress(
            &backend,
            square(2000),
            Dimensions::new(2000, 2000),
            &limits(1024, 1024, 1_000_000),
            &FitSettings::default(),
        )
        .unwrap();

        // 843 failed, next attempt at 0.75^4 → 632
        assert_eq!(backend.rescales(), vec![(843, 843), (632, 632)]);
        assert_eq!(result.attempts, 2);
    }

    #[test]
    fn custom_attempt_ceiling_is_honoured() {
        let backend = MockBackend::new(500, 500).with_encode([Step::Size(600_000); 32]);
        let settings = FitSettings {
            max_attempts: 3,
            ..FitSettings::default()
        };
        let result = fit_and_compress(
            &backend,
            square(500),
            Dimensions::new(500, 500),
            &limits(1024, 1024, 500_000),
            &settings,
        )
        .unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(backend.encode_qualities().len(), 6);
    }

    // =========================================================================
    // resize_and_compress tests
    // =========================================================================

    #[test]
    fn large_source_fits_all_limits() {
        let backend = MockBackend::new(4000, 3000);
        let resized = resize_and_compress(
            &backend,
            &file_source(),
            Some(Dimensions::new(4000, 3000)),
            &limits(1024, 1024, 500_000),
            &FitSettings::default(),
        )
        .unwrap();

        assert!(resized.sample >= 4);
        assert!(resized.fit.width <= 1024 && resized.fit.height <= 1024);
        assert_eq!(resized.fit.width, resized.fit.height);
        assert!(resized.fit.bytes.len() <= 500_000);
        // 750*750*0.95 overshoots, 95*500000/534375 = 88 fits
        assert_eq!(resized.fit.quality.value(), 88);
        assert!(resized.fit.within_budget);
    }

    #[test]
    fn content_source_streams_released() {
        let resolver = MemoryResolver::with_entry("photo", vec![1, 2, 3]);
        let source = ImageSource::content("photo", &resolver);
        let backend = MockBackend::new(800, 600).with_decode([Step::OutOfMemory]);

        let resized = resize_and_compress(
            &backend,
            &source,
            None,
            &limits(1024, 1024, 500_000),
            &FitSettings::default(),
        )
        .unwrap();

        assert_eq!(resized.decode_attempts, 2);
        assert_eq!(resized.fit.width, 300);
        assert_eq!(resolver.opened(), 2);
        assert_eq!(resolver.live(), 0);
        assert!(matches!(
            backend.get_operations().first(),
            Some(RecordedOp::Decode { source, sample: 1 }) if source == "content:photo"
        ));
    }
}
