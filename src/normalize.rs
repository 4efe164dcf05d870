//! Cover normalization.
//!
//! The first pass of a run. Every discovered source goes through:
//!
//! ```text
//! cache lookup → inspect → plan → (resize → pad)? → select format → save
//! ```
//!
//! and ends in one of three states: [`AssetStatus::Normalized`],
//! [`AssetStatus::Skipped`] (already normalized, via the cache) or
//! [`AssetStatus::Failed`]. A failure never stops the batch.
//!
//! ## Output naming
//!
//! Outputs are written flat into the output directory:
//!
//! ```text
//! Artist/Album/cover.png   (pad)          → _output/cover.png
//! Artist/Album/folder.png  (format only)  → _output/folder.jpg
//! Other/back.jpeg          (pass-through) → _output/back.jpeg
//! ```
//!
//! Re-encoded covers get the extension of their new encoding; pass-through
//! covers are moved (or copied, when originals are kept) byte for byte.
//!
//! ## Resuming
//!
//! The returned [`OutputManifest`] starts from the outputs an earlier run
//! left pending in `manifest.json` and appends this run's outputs. A cover
//! that hits the cache is not re-added, but if its output was never
//! compressed it is still listed from the earlier manifest.
//!
//! ## Parallel Processing
//!
//! Sources are normalized on the global [rayon](https://docs.rs/rayon) pool,
//! sized from `processing.max_processes` (sequential by default). Reports and
//! the [`OutputManifest`] are collected in discovery order regardless of
//! which worker finishes first.

use crate::cache::{self, CacheManifest, CacheStats};
use crate::config::{NormalizerConfig, ThresholdConfig};
use crate::imaging::{
    BackendError, Dimensions, Encoding, ImageBackend, NormalizationPlan, RustBackend,
    SourceFormat, inspect, plan, render,
};
use crate::types::OutputManifest;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("Source has no file name: {0}")]
    NoFileName(PathBuf),
}

/// Settings for the normalize pass.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub thresholds: ThresholdConfig,
    pub fill_color: [u8; 3],
    pub delete_original: bool,
    pub use_cache: bool,
}

impl NormalizeOptions {
    pub fn from_config(config: &NormalizerConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            fill_color: config.output.fill_color,
            delete_original: config.output.delete_original,
            use_cache: true,
        }
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::from_config(&NormalizerConfig::default())
    }
}

/// What happened to one normalized cover.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAsset {
    pub output: PathBuf,
    pub plan: NormalizationPlan,
    pub original: Dimensions,
    pub result: Dimensions,
    /// `None` when the file was moved unchanged.
    pub encoding: Option<Encoding>,
    /// Adaptive resizer trial encodes.
    pub trials: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetStatus {
    Normalized(NormalizedAsset),
    /// Already normalized with the same parameters; output left in place.
    Skipped { output: PathBuf },
    Failed(String),
}

/// Per-source outcome, in discovery order.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetReport {
    pub source: PathBuf,
    pub status: AssetStatus,
}

/// Progress event emitted as each source finishes.
#[derive(Debug, Clone)]
pub enum NormalizeEvent {
    Finished {
        /// 1-based position in discovery order.
        index: usize,
        total: usize,
        report: AssetReport,
    },
}

#[derive(Debug)]
pub struct NormalizeResult {
    pub reports: Vec<AssetReport>,
    pub manifest: OutputManifest,
    pub cache_stats: CacheStats,
}

impl NormalizeResult {
    pub fn failures(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, AssetStatus::Failed(_)))
            .count()
    }
}

/// Normalize `sources` into `output_dir` with the production backend.
pub fn normalize(
    sources: &[PathBuf],
    output_dir: &Path,
    options: &NormalizeOptions,
    progress: Option<Sender<NormalizeEvent>>,
) -> Result<NormalizeResult, NormalizeError> {
    normalize_with_backend(&RustBackend::new(), sources, output_dir, options, progress)
}

/// Normalize using a specific backend (allows testing with mock).
pub fn normalize_with_backend(
    backend: &impl ImageBackend,
    sources: &[PathBuf],
    output_dir: &Path,
    options: &NormalizeOptions,
    progress: Option<Sender<NormalizeEvent>>,
) -> Result<NormalizeResult, NormalizeError> {
    std::fs::create_dir_all(output_dir)?;

    // Hashing sources is only worth it when they survive the run.
    let caching = options.use_cache && !options.delete_original;
    let cache = if caching {
        CacheManifest::load(output_dir)
    } else {
        CacheManifest::empty()
    };
    let params_hash = cache::hash_normalize_params(&options.thresholds, options.fill_color);
    let total = sources.len();

    let outcomes: Vec<(AssetReport, Option<String>)> = sources
        .par_iter()
        .enumerate()
        .map(|(i, source)| {
            let source_hash = if caching {
                match cache::hash_file(source) {
                    Ok(h) => Some(h),
                    Err(e) => {
                        debug!("cannot hash {}: {e}", source.display());
                        None
                    }
                }
            } else {
                None
            };

            let cached = source_hash
                .as_deref()
                .and_then(|h| cache.find_cached(h, &params_hash, output_dir));

            let status = match cached {
                Some(name) => {
                    info!("{}: already normalized as {name}", source.display());
                    AssetStatus::Skipped {
                        output: output_dir.join(name),
                    }
                }
                None => match normalize_file(backend, source, output_dir, options) {
                    Ok(asset) => AssetStatus::Normalized(asset),
                    Err(e) => {
                        warn!("{}: {e}", source.display());
                        AssetStatus::Failed(e.to_string())
                    }
                },
            };

            let report = AssetReport {
                source: source.clone(),
                status,
            };
            if let Some(tx) = &progress {
                tx.send(NormalizeEvent::Finished {
                    index: i + 1,
                    total,
                    report: report.clone(),
                })
                .ok();
            }
            (report, source_hash)
        })
        .collect();

    let mut cache = cache;
    let mut manifest = OutputManifest::load_pending(output_dir);
    if !manifest.is_empty() {
        info!("{} outputs still pending compression", manifest.len());
    }
    let mut cache_stats = CacheStats::default();
    let mut reports = Vec::with_capacity(outcomes.len());

    for (report, source_hash) in outcomes {
        match &report.status {
            AssetStatus::Normalized(asset) => {
                cache_stats.miss();
                let name = output_name(&asset.output);
                if let Some(hash) = source_hash {
                    cache.insert(name.clone(), hash, params_hash.clone());
                }
                manifest.push(name);
            }
            AssetStatus::Skipped { .. } => cache_stats.hit(),
            AssetStatus::Failed(_) => {}
        }
        reports.push(report);
    }

    if caching {
        cache.save(output_dir)?;
    }

    Ok(NormalizeResult {
        reports,
        manifest,
        cache_stats,
    })
}

fn output_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Normalize a single source into `output_dir`.
pub fn normalize_file(
    backend: &impl ImageBackend,
    source: &Path,
    output_dir: &Path,
    options: &NormalizeOptions,
) -> Result<NormalizedAsset, NormalizeError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| NormalizeError::NoFileName(source.to_path_buf()))?;
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| NormalizeError::NoFileName(source.to_path_buf()))?;
    let thresholds = &options.thresholds;

    // JPEGs have no alpha, so their plan needs only the header.
    let extension = source
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    if SourceFormat::from_extension(&extension) == Some(SourceFormat::Jpeg) {
        let dims = backend.identify(source)?;
        let p = plan(dims.width, dims.height, SourceFormat::Jpeg, false, thresholds);
        if p == NormalizationPlan::passthrough() {
            let output = output_dir.join(file_name);
            transfer(source, &output, options.delete_original)?;
            return Ok(NormalizedAsset {
                output,
                plan: p,
                original: dims,
                result: dims,
                encoding: None,
                trials: 0,
            });
        }
    }

    let asset = backend.load(source)?;
    let info = inspect(&asset);
    let original = Dimensions {
        width: info.width,
        height: info.height,
    };
    let p = plan(
        info.width,
        info.height,
        asset.format,
        info.has_real_transparency,
        thresholds,
    );
    debug!(
        "{}: {}x{} {:?} → {}",
        source.display(),
        info.width,
        info.height,
        asset.format,
        p.disposition.label()
    );

    if p == NormalizationPlan::passthrough() {
        let output = output_dir.join(file_name);
        transfer(source, &output, options.delete_original)?;
        return Ok(NormalizedAsset {
            output,
            plan: p,
            original,
            result: original,
            encoding: None,
            trials: 0,
        });
    }

    let rendered = render(backend, &asset, p, thresholds, options.fill_color)?;
    let output = output_dir.join(format!("{stem}.{}", rendered.encoding.extension()));
    backend.save(&rendered.image, rendered.encoding, &output)?;

    if options.delete_original && !same_file(source, &output) {
        std::fs::remove_file(source)?;
    }

    Ok(NormalizedAsset {
        output,
        plan: rendered.plan,
        original,
        result: Dimensions {
            width: rendered.image.width(),
            height: rendered.image.height(),
        },
        encoding: Some(rendered.encoding),
        trials: rendered.trials,
    })
}

/// Planner verdict for one source, produced without writing anything.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedAsset {
    pub source: PathBuf,
    pub format: SourceFormat,
    pub dimensions: Dimensions,
    pub transparent: bool,
    pub plan: NormalizationPlan,
}

/// Plan `source` the way [`normalize_file`] would, without touching the
/// output directory. JPEGs are planned from their header alone.
pub fn check_file(
    backend: &impl ImageBackend,
    source: &Path,
    thresholds: &ThresholdConfig,
) -> Result<CheckedAsset, NormalizeError> {
    let extension = source
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    let (format, dimensions, transparent) =
        if SourceFormat::from_extension(&extension) == Some(SourceFormat::Jpeg) {
            (SourceFormat::Jpeg, backend.identify(source)?, false)
        } else {
            let asset = backend.load(source)?;
            let info = inspect(&asset);
            let dims = Dimensions {
                width: info.width,
                height: info.height,
            };
            (asset.format, dims, info.has_real_transparency)
        };

    Ok(CheckedAsset {
        source: source.to_path_buf(),
        format,
        dimensions,
        transparent,
        plan: plan(
            dimensions.width,
            dimensions.height,
            format,
            transparent,
            thresholds,
        ),
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Move (or copy, when keeping originals) an unchanged cover to `output`.
fn transfer(source: &Path, output: &Path, delete_original: bool) -> std::io::Result<()> {
    if same_file(source, output) {
        return Ok(());
    }
    if !delete_original {
        std::fs::copy(source, output)?;
        return Ok(());
    }
    // rename fails across filesystems
    if std::fs::rename(source, output).is_err() {
        std::fs::copy(source, output)?;
        std::fs::remove_file(source)?;
    }
    Ok(())
}
