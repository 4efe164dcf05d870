//! Compression of normalized outputs.
//!
//! The second pass of a run. It starts only after every source has been
//! normalized and `manifest.json` written, and walks the manifest in order.
//! Afterwards [`still_pending`] gives the manifest to write back: only the
//! outputs whose compression failed, so a rerun retries those and nothing
//! else.
//!
//! | Output | Backend |
//! |---|---|
//! | `.jpg` / `.jpeg` | [`JpegOptim`]: lossless Huffman optimization, metadata stripped |
//! | `.png` (`remote`) | [`RemoteShrink`]: lossy shrink service with bounded retry |
//! | `.png` (`local`) | [`LocalPngPipeline`]: palette quantizer, then lossless optimizer |
//! | `.png` (`none`) | skipped |
//! | anything else | skipped |
//!
//! PNGs at or below `skip_compression_below_kb` are skipped before any
//! backend is invoked.
//!
//! Backends implement [`Compressor`] and report failures as
//! [`CompressError`]; the [`Dispatcher`] turns those into a
//! [`CompressionResult`] so a single bad file never aborts the batch. Every
//! backend compresses in place: the output file is replaced only when the
//! backend succeeds.

mod local;
mod remote;

pub use local::{JpegOptim, LocalPngPipeline};
pub use remote::{
    HttpTransport, RemoteShrink, RetryPolicy, ShrinkOutput, ShrinkResponse, ShrinkTransport,
    random_user_agent,
};

use crate::config::{NormalizerConfig, PngBackendKind};
use crate::imaging::kilobytes;
use crate::types::OutputManifest;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{tool} failed: {reason}")]
    ExternalTool { tool: String, reason: String },
    #[error("Remote shrink failed: {0}")]
    RemoteService(String),
}

/// Outcome of compressing one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionResult {
    /// Sizes in bytes before and after.
    Compressed { before: u64, after: u64 },
    Skipped(String),
    Failed(String),
}

/// A backend that compresses a file in place.
pub trait Compressor {
    /// Short name for log lines.
    fn name(&self) -> &str;

    fn compress(&self, path: &Path) -> Result<(), CompressError>;
}

/// Routes each output to the backend for its format.
pub struct Dispatcher {
    jpeg: Box<dyn Compressor>,
    png: Option<Box<dyn Compressor>>,
    skip_below_kb: u64,
}

impl Dispatcher {
    /// `png = None` disables PNG compression.
    pub fn new(
        jpeg: Box<dyn Compressor>,
        png: Option<Box<dyn Compressor>>,
        skip_below_kb: u64,
    ) -> Self {
        Self {
            jpeg,
            png,
            skip_below_kb,
        }
    }

    /// Build the configured backends.
    pub fn from_config(config: &NormalizerConfig) -> Result<Self, CompressError> {
        let compression = &config.compression;
        let jpeg: Box<dyn Compressor> = Box::new(JpegOptim::new(&compression.jpeg_optimizer));

        let png: Option<Box<dyn Compressor>> = match compression.png_backend {
            PngBackendKind::Remote => {
                let remote = &compression.remote;
                let transport = HttpTransport::new(remote.timeout_secs)?;
                Some(Box::new(RemoteShrink::new(
                    &remote.endpoint,
                    RetryPolicy::from_config(remote),
                    transport,
                )))
            }
            PngBackendKind::Local => Some(Box::new(LocalPngPipeline::from_config(
                &compression.local,
            ))),
            PngBackendKind::None => None,
        };

        Ok(Self::new(
            jpeg,
            png,
            config.thresholds.skip_compression_below_kb,
        ))
    }

    /// Compress one file. Never panics and never aborts: every problem is
    /// reported in the returned [`CompressionResult`].
    pub fn compress(&self, path: &Path) -> CompressionResult {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let backend: &dyn Compressor = match ext.as_str() {
            "jpg" | "jpeg" => self.jpeg.as_ref(),
            "png" => {
                let before = match std::fs::metadata(path) {
                    Ok(m) => m.len(),
                    Err(e) => return CompressionResult::Failed(e.to_string()),
                };
                if kilobytes(before) <= self.skip_below_kb {
                    return CompressionResult::Skipped(format!(
                        "under {}KB threshold",
                        self.skip_below_kb
                    ));
                }
                match &self.png {
                    Some(png) => png.as_ref(),
                    None => {
                        return CompressionResult::Skipped("PNG compression disabled".into());
                    }
                }
            }
            _ => return CompressionResult::Skipped("unsupported format".into()),
        };

        run_backend(backend, path)
    }
}

fn run_backend(backend: &dyn Compressor, path: &Path) -> CompressionResult {
    let before = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) => return CompressionResult::Failed(e.to_string()),
    };

    debug!("{}: compressing with {}", path.display(), backend.name());
    if let Err(e) = backend.compress(path) {
        warn!("{}: {e}", path.display());
        return CompressionResult::Failed(e.to_string());
    }

    match std::fs::metadata(path) {
        Ok(m) => CompressionResult::Compressed {
            before,
            after: m.len(),
        },
        Err(e) => CompressionResult::Failed(e.to_string()),
    }
}

/// Progress event emitted as each file finishes.
#[derive(Debug, Clone)]
pub enum CompressEvent {
    Finished {
        index: usize,
        total: usize,
        path: PathBuf,
        result: CompressionResult,
    },
}

/// Compress every path in order. Sequential: the remote service rate-limits
/// concurrent uploads.
pub fn compress_all(
    dispatcher: &Dispatcher,
    paths: &[PathBuf],
    progress: Option<Sender<CompressEvent>>,
) -> Vec<(PathBuf, CompressionResult)> {
    let total = paths.len();
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let result = dispatcher.compress(path);
            if let Some(tx) = &progress {
                tx.send(CompressEvent::Finished {
                    index: i + 1,
                    total,
                    path: path.clone(),
                    result: result.clone(),
                })
                .ok();
            }
            (path.clone(), result)
        })
        .collect()
}

/// The part of `manifest` left to do after `results`: outputs that failed
/// or were never attempted. Compressed and skipped outputs are done.
pub fn still_pending(
    manifest: &OutputManifest,
    output_dir: &Path,
    results: &[(PathBuf, CompressionResult)],
) -> OutputManifest {
    let mut pending = manifest.clone();
    pending.retain(|name| {
        let path = output_dir.join(name);
        !results
            .iter()
            .any(|(p, r)| *p == path && !matches!(r, CompressionResult::Failed(_)))
    });
    pending
}
