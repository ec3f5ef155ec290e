//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Fit
//!
//! ```text
//! photo.jpg → photo-square.jpg
//!     Decoded: sample 4 (1 attempt), square 750px at (125, 0)
//!     Output: 750x750 jpeg, quality 88
//!     Size: 483KB (495000 bytes, limit 500000)
//!     CRC64: 9f1c2a0b5d3e4f61
//! ```
//!
//! A best-effort result (attempt ceiling reached, still over the byte limit)
//! gets an extra `Warning:` line.
//!
//! ## Probe
//!
//! ```text
//! photo.jpg
//!     Dimensions: 4000x3000
//!     Sample: 4 → 1000x750 (limits 1024x1024)
//! ```
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::format::{crc64, format_size};
use crate::imaging::{Constraints, Dimensions, OutputFormat, Resized, compute_sample};
use std::path::Path;

fn plural(count: u32, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// Lines describing one finished resize.
pub fn format_fit_report(
    input: &Path,
    output: &Path,
    resized: &Resized,
    constraints: &Constraints,
    format: OutputFormat,
) -> Vec<String> {
    let fit = &resized.fit;
    let mut lines = vec![
        format!("{} → {}", input.display(), output.display()),
        format!(
            "    Decoded: sample {} ({}), square {}px at ({}, {})",
            resized.sample,
            plural(resized.decode_attempts, "attempt"),
            resized.crop.size,
            resized.crop.x,
            resized.crop.y
        ),
        format!(
            "    Output: {}x{} {}, quality {}",
            fit.width,
            fit.height,
            format!("{format:?}").to_lowercase(),
            fit.quality.value()
        ),
        format!(
            "    Size: {} ({} bytes, limit {})",
            format_size(fit.bytes.len() as u64),
            fit.bytes.len(),
            constraints.byte_limit()
        ),
        format!("    CRC64: {:016x}", crc64(&fit.bytes)),
    ];
    if !fit.within_budget {
        lines.push(format!(
            "    Warning: still over the byte limit after {}",
            plural(fit.attempts, "attempt")
        ));
    }
    lines
}

pub fn print_fit_report(
    input: &Path,
    output: &Path,
    resized: &Resized,
    constraints: &Constraints,
    format: OutputFormat,
) {
    for line in format_fit_report(input, output, resized, constraints, format) {
        println!("{line}");
    }
}

/// Lines describing a source's size and the subsample the limits would pick.
pub fn format_probe(input: &Path, dims: Dimensions, constraints: &Constraints) -> Vec<String> {
    let sample = compute_sample(
        dims.width,
        dims.height,
        constraints.width_limit(),
        constraints.height_limit(),
    );
    vec![
        input.display().to_string(),
        format!("    Dimensions: {}x{}", dims.width, dims.height),
        format!(
            "    Sample: {sample} → {}x{} (limits {}x{})",
            dims.width / sample,
            dims.height / sample,
            constraints.width_limit(),
            constraints.height_limit()
        ),
    ]
}

pub fn print_probe(input: &Path, dims: Dimensions, constraints: &Constraints) {
    for line in format_probe(input, dims, constraints) {
        println!("{line}");
    }
}
