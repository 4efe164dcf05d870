//! Normalizer configuration.
//!
//! Handles loading, validating, and merging `normalizer.toml`. Stock defaults
//! are the base layer; a user file overrides just the keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [thresholds]
//! max_resolution = 2000             # Longest edge allowed in the output
//! min_resolution = 1000             # Floor for the adaptive resizer
//! pad_tolerance = 5                 # |w-h| treated as already square
//! transparent_pad_threshold = 100   # |w-h| above which padding is transparent
//! size_budget_kb = 5120             # Trial-encoded PNG budget for padded covers
//! resize_step = 50                  # Adaptive resizer decrement in pixels
//! jpeg_quality = 85                 # Default JPEG quality
//! skip_compression_below_kb = 0     # PNGs at or below this size are not compressed
//!
//! [output]
//! delete_original = true
//! fill_color = [255, 255, 255]      # Opaque padding color
//!
//! [compression]
//! png_backend = "remote"            # "remote" | "local" | "none"
//! jpeg_optimizer = "jpegoptim"
//!
//! [compression.remote]
//! endpoint = "https://tinypng.com/web/shrink"
//! max_attempts = 8
//! retry_delay_ms = 3000
//! max_delay_ms = 60000
//! timeout_secs = 60
//!
//! [compression.local]
//! quantizer = "pngquant"
//! optimizer = "optipng"
//! speed = 1
//! dithering = 1.0
//!
//! [processing]
//! max_processes = 1                 # 0 = one worker per CPU core
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "normalizer.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full normalizer configuration.
///
/// All fields have defaults; a user file only needs the values it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizerConfig {
    /// Geometry, size-budget and compression thresholds.
    pub thresholds: ThresholdConfig,
    /// Output directory behavior.
    pub output: OutputConfig,
    /// Compression backends.
    pub compression: CompressionConfig,
    /// Parallel normalization settings.
    pub processing: ProcessingConfig,
}

impl NormalizerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if t.min_resolution == 0 {
            return Err(ConfigError::Validation(
                "thresholds.min_resolution must be non-zero".into(),
            ));
        }
        if t.min_resolution > t.max_resolution {
            return Err(ConfigError::Validation(
                "thresholds.min_resolution must not exceed thresholds.max_resolution".into(),
            ));
        }
        if t.resize_step == 0 {
            return Err(ConfigError::Validation(
                "thresholds.resize_step must be non-zero".into(),
            ));
        }
        if t.size_budget_kb == 0 {
            return Err(ConfigError::Validation(
                "thresholds.size_budget_kb must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&t.jpeg_quality) {
            return Err(ConfigError::Validation(
                "thresholds.jpeg_quality must be 1-100".into(),
            ));
        }
        if t.transparent_pad_threshold < t.pad_tolerance {
            return Err(ConfigError::Validation(
                "thresholds.transparent_pad_threshold must be >= thresholds.pad_tolerance".into(),
            ));
        }

        let local = &self.compression.local;
        if local.speed > 10 {
            return Err(ConfigError::Validation(
                "compression.local.speed must be 0-10".into(),
            ));
        }
        if !(0.0..=1.0).contains(&local.dithering) {
            return Err(ConfigError::Validation(
                "compression.local.dithering must be 0.0-1.0".into(),
            ));
        }
        if self.compression.remote.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "compression.remote.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Named numeric parameters that drive classification and compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Longest edge allowed in the output, in pixels.
    pub max_resolution: u32,
    /// The adaptive resizer never goes below this dimension.
    pub min_resolution: u32,
    /// Maximum `|width - height|` treated as already square.
    pub pad_tolerance: u32,
    /// `|width - height|` above which padding uses a transparent canvas.
    /// Kept separate from `pad_tolerance` even when the two coincide.
    pub transparent_pad_threshold: u32,
    /// Trial-encoded PNG size budget for padded covers, in KB.
    pub size_budget_kb: u64,
    /// Adaptive resizer decrement, in pixels.
    pub resize_step: u32,
    /// JPEG quality for sources that carry no quality of their own.
    pub jpeg_quality: u32,
    /// PNG outputs at or below this size (KB) skip compression.
    pub skip_compression_below_kb: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            max_resolution: 2000,
            min_resolution: 1000,
            pad_tolerance: 5,
            transparent_pad_threshold: 100,
            size_budget_kb: 5120,
            resize_step: 50,
            jpeg_quality: 85,
            skip_compression_below_kb: 0,
        }
    }
}

/// Output directory behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Remove each source file once its normalized output is written.
    pub delete_original: bool,
    /// RGB color used for opaque padding.
    pub fill_color: [u8; 3],
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            delete_original: true,
            fill_color: [255, 255, 255],
        }
    }
}

/// Which PNG compression strategy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngBackendKind {
    /// Remote shrink service over HTTP.
    Remote,
    /// Local palette quantizer followed by a lossless optimizer.
    Local,
    /// PNG compression disabled.
    None,
}

/// Compression backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    pub png_backend: PngBackendKind,
    /// JPEG Huffman optimizer executable.
    pub jpeg_optimizer: String,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            png_backend: PngBackendKind::Remote,
            jpeg_optimizer: "jpegoptim".to_string(),
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
        }
    }
}

/// Remote shrink service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub endpoint: String,
    /// Total POST attempts per file, including the first.
    pub max_attempts: u32,
    /// Base delay before the first retry; doubles on each further retry.
    pub retry_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://tinypng.com/web/shrink".to_string(),
            max_attempts: 8,
            retry_delay_ms: 3000,
            max_delay_ms: 60_000,
            timeout_secs: 60,
        }
    }
}

/// Local PNG pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalConfig {
    /// Palette quantizer executable.
    pub quantizer: String,
    /// Lossless PNG stream optimizer executable.
    pub optimizer: String,
    /// Quantizer speed, 0 (slowest) to 10.
    pub speed: u8,
    /// Floyd-Steinberg dithering level, 0.0 to 1.0.
    pub dithering: f32,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            quantizer: "pngquant".to_string(),
            optimizer: "optipng".to_string(),
            speed: 1,
            dithering: 1.0,
        }
    }
}

/// Parallel normalization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of files normalized at once. `1` keeps the strictly
    /// sequential batch loop, `0` means one worker per core. Values larger
    /// than the core count are clamped.
    pub max_processes: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { max_processes: 1 }
    }
}

/// Resolve the effective worker count from config.
///
/// - `0` → use all available cores
/// - `n` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match config.max_processes {
        0 => cores,
        n => n.min(cores),
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(NormalizerConfig::default()).expect("default config must serialize")
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

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<NormalizerConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: NormalizerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from an explicit file.
pub fn load_config_file(path: &Path) -> Result<NormalizerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    resolve_config(Some(value))
}

/// Load `normalizer.toml` from a directory, falling back to stock defaults
/// when the file does not exist.
pub fn load_config(dir: &Path) -> Result<NormalizerConfig, ConfigError> {
    let path = dir.join(CONFIG_FILENAME);
    if !path.exists() {
        return resolve_config(None);
    }
    load_config_file(&path)
}

/// Returns a fully-commented stock `normalizer.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Album Art Normalizer Configuration
# ==================================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Thresholds
# ---------------------------------------------------------------------------
[thresholds]
# Longest edge allowed in the output, in pixels.
max_resolution = 2000

# The adaptive resizer never shrinks a padded cover below this dimension,
# even when the size budget is still exceeded.
min_resolution = 1000

# Covers whose |width - height| is at most this many pixels count as square.
pad_tolerance = 5

# Above this |width - height| the padding is transparent instead of solid.
transparent_pad_threshold = 100

# Padded covers are shrunk until a PNG encode fits in this many KB.
size_budget_kb = 5120

# Pixels removed per adaptive resize step.
resize_step = 50

# JPEG quality for sources that are not JPEGs already.
jpeg_quality = 85

# PNG outputs at or below this size (KB) are not sent to a compressor.
skip_compression_below_kb = 0

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Remove each source file once its normalized output is written.
delete_original = true

# RGB color used when padding with a solid fill.
fill_color = [255, 255, 255]

# ---------------------------------------------------------------------------
# Compression
# ---------------------------------------------------------------------------
[compression]
# PNG strategy: "remote" (shrink service), "local" (pngquant + optipng)
# or "none".
png_backend = "remote"

# JPEG Huffman optimizer executable.
jpeg_optimizer = "jpegoptim"

[compression.remote]
endpoint = "https://tinypng.com/web/shrink"
# Total attempts per file, including the first.
max_attempts = 8
# Base retry delay; doubles on every further retry up to max_delay_ms.
retry_delay_ms = 3000
max_delay_ms = 60000
timeout_secs = 60

[compression.local]
quantizer = "pngquant"
optimizer = "optipng"
# Quantizer speed, 0 (slowest, best) to 10.
speed = 1
# Dithering level, 0.0 (off) to 1.0 (full Floyd-Steinberg).
dithering = 1.0

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Files normalized at once. 1 keeps the sequential batch loop,
# 0 uses one worker per CPU core.
max_processes = 1
"##
}
