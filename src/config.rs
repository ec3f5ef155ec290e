//! Configuration module.
//!
//! Handles loading, validating, and merging `squarefit.toml`. Stock defaults
//! are serialized to a TOML table, the user file is merged on top, and the
//! result is deserialized and validated. Command line flags override the
//! merged values afterwards (see `main.rs`).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [limits]
//! width = 1024              # Maximum output width in pixels
//! height = 1024             # Maximum output height in pixels
//! bytes = 500000            # Maximum encoded size in bytes
//!
//! [compression]
//! min_quality = 50          # Quality floor when shrinking to fit the byte limit
//! max_quality = 95          # Quality of the first encode
//! max_attempts = 8          # Retry ceiling for both decode and compress
//! format = "jpeg"           # "jpeg" or "avif"
//!
//! [decoder]
//! max_raster_bytes = 268435456  # Largest raster handed out before reporting out-of-memory
//! max_alloc = 1073741824        # Allocation ceiling passed to the image decoders
//! filter = "triangle"           # nearest, triangle, catmullrom, lanczos3
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::rust_backend::{DEFAULT_MAX_ALLOC, DEFAULT_MAX_RASTER_BYTES};
use crate::imaging::{Constraints, FitSettings, OutputFormat, Quality, ResampleFilter, RustBackend};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "squarefit.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `squarefit.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitConfig {
    /// Output dimension and size limits.
    pub limits: LimitsConfig,
    /// Quality bounds, retry ceiling and output format.
    pub compression: CompressionConfig,
    /// Memory budget and resampling for the `image` backend.
    pub decoder: DecoderConfig,
}

impl FitConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if limits.width == 0 || limits.height == 0 || limits.bytes == 0 {
            return Err(ConfigError::Validation(
                "limits.width, limits.height and limits.bytes must be non-zero".into(),
            ));
        }
        let compression = &self.compression;
        for (name, value) in [
            ("min_quality", compression.min_quality),
            ("max_quality", compression.max_quality),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "compression.{name} must be 1-100"
                )));
            }
        }
        if compression.min_quality > compression.max_quality {
            return Err(ConfigError::Validation(
                "compression.min_quality must not exceed compression.max_quality".into(),
            ));
        }
        if compression.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "compression.max_attempts must be at least 1".into(),
            ));
        }
        if self.decoder.max_raster_bytes == 0 || self.decoder.max_alloc == 0 {
            return Err(ConfigError::Validation(
                "decoder budgets must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn constraints(&self) -> Result<Constraints, ConfigError> {
        Constraints::new(self.limits.width, self.limits.height, self.limits.bytes)
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    pub fn fit_settings(&self) -> FitSettings {
        FitSettings {
            min_quality: Quality::new(self.compression.min_quality),
            max_quality: Quality::new(self.compression.max_quality),
            max_attempts: self.compression.max_attempts,
            format: self.compression.format,
        }
    }

    pub fn backend(&self) -> RustBackend {
        RustBackend::with_limits(self.decoder.max_raster_bytes, self.decoder.max_alloc)
            .with_filter(self.decoder.filter)
    }
}

/// Output limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub width: u32,
    pub height: u32,
    pub bytes: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            bytes: 500_000,
        }
    }
}

/// Encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    pub min_quality: u8,
    pub max_quality: u8,
    pub max_attempts: u32,
    pub format: OutputFormat,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        let settings = FitSettings::default();
        Self {
            min_quality: settings.min_quality.value(),
            max_quality: settings.max_quality.value(),
            max_attempts: settings.max_attempts,
            format: settings.format,
        }
    }
}

/// Backend memory budget and resampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    pub max_raster_bytes: u64,
    pub max_alloc: u64,
    pub filter: ResampleFilter,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_raster_bytes: DEFAULT_MAX_RASTER_BYTES,
            max_alloc: DEFAULT_MAX_ALLOC,
            filter: ResampleFilter::default(),
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(FitConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<FitConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: FitConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when it is missing.
pub fn load_config(path: &Path) -> Result<FitConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock `squarefit.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# squarefit configuration
# =======================
#
# Every key is optional; omitted keys use the values shown here.

[limits]
# Maximum output width in pixels.
width = 1024
# Maximum output height in pixels.
height = 1024
# Maximum encoded size in bytes. When the attempt ceiling is reached the
# last (possibly oversized) encode is written and reported as best effort.
bytes = 500000

[compression]
# Quality never drops below this while shrinking to fit the byte limit.
min_quality = 50
# Quality of the first encode.
max_quality = 95
# Retry ceiling for both the decode ladder and the compress loop.
max_attempts = 8
# Output format: "jpeg" or "avif".
format = "jpeg"

[decoder]
# Largest raster (width * height * bytes per pixel) the backend will hand
# out. Bigger requests count as out-of-memory and trigger a smaller retry.
max_raster_bytes = 268435456
# Allocation ceiling passed to the image decoders. Exceeding it fails the
# decode outright.
max_alloc = 1073741824
# Resampling filter: "nearest", "triangle", "catmullrom" or "lanczos3".
filter = "triangle"
"##
}
