//! Normalization cache for repeated runs.
//!
//! Decoding, trial-encoding and re-encoding a cover is the expensive part of
//! a run: the adaptive resizer may encode the same image a dozen times. When
//! originals are kept (`--keep-originals`), running the tool again over the
//! same library would redo all of that work for covers that were already
//! normalized. This module lets the normalize stage skip them.
//!
//! # Design
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: lookups are by the combination of
//! `source_hash` and `params_hash`, not by source path. Renaming a source
//! file does not invalidate the cache; changing its bytes or the thresholds
//! does.
//!
//! - **`source_hash`**: SHA-256 of the source file contents. Content-based
//!   rather than mtime-based so it survives copies and checkouts.
//!
//! - **`params_hash`**: SHA-256 of every threshold that affects pixels or
//!   encoding (resolution bounds, tolerances, budget, step, JPEG quality)
//!   plus the pad fill color. `skip_compression_below_kb` is excluded: it
//!   only affects the compression pass.
//!
//! A cache hit requires:
//! 1. An entry with matching `source_hash` and `params_hash` exists
//! 2. The previously-written output file still exists on disk
//!
//! A hit yields [`Skipped`](crate::normalize::AssetStatus::Skipped): the
//! source is not decoded. Its output stays in `manifest.json` only while it
//! is still waiting for compression, so a finished output is not compressed
//! twice.
//!
//! ## Storage
//!
//! The cache manifest is a JSON file at `<output_dir>/.cache-manifest.json`.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `run` or `normalize`. This loads an empty manifest,
//! so every source is normalized again and its output overwritten.

use crate::config::ThresholdConfig;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the cache manifest file within the output directory.
const MANIFEST_FILENAME: &str = ".cache-manifest.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// A single cached output file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
}

/// On-disk cache manifest mapping output file names to their cache entries.
///
/// Lookups go through a runtime `content_index` that maps
/// `"{source_hash}:{params_hash}"` to the stored output name.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
    /// Runtime reverse index: `"{source_hash}:{params_hash}"` → output name.
    /// Built at load time, maintained on insert. Never serialized.
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

impl CacheManifest {
    /// Create an empty manifest (used for `--no-cache` or a first run).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from the output directory. Returns an empty manifest if the
    /// file doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(output_dir: &Path) -> Self {
        let path = output_dir.join(MANIFEST_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("ignoring unreadable cache manifest {}: {e}", path.display());
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest.content_index = build_content_index(&manifest.entries);
        manifest
    }

    /// Save to the output directory.
    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        let path = output_dir.join(MANIFEST_FILENAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Look up a previously normalized output by content hashes.
    ///
    /// Returns the stored output name if an entry with matching hashes
    /// exists **and** the file is still in `output_dir`.
    pub fn find_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        output_dir: &Path,
    ) -> Option<String> {
        let content_key = format!("{}:{}", source_hash, params_hash);
        let stored = self.content_index.get(&content_key)?;
        if output_dir.join(stored).exists() {
            Some(stored.clone())
        } else {
            None
        }
    }

    /// Record the output written for a source.
    ///
    /// If the same content was previously recorded under a different output
    /// name (e.g. the source was renamed), the old entry is dropped.
    pub fn insert(&mut self, output_name: String, source_hash: String, params_hash: String) {
        let content_key = format!("{}:{}", source_hash, params_hash);

        if let Some(old_name) = self.content_index.get(&content_key)
            && *old_name != output_name
        {
            self.entries.remove(old_name.as_str());
        }

        self.content_index.insert(content_key, output_name.clone());
        self.entries.insert(
            output_name,
            CacheEntry {
                source_hash,
                params_hash,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn build_content_index(entries: &HashMap<String, CacheEntry>) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(output_name, entry)| {
            let content_key = format!("{}:{}", entry.source_hash, entry.params_hash);
            (content_key, output_name.clone())
        })
        .collect()
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// SHA-256 hash of the parameters that determine a normalized output.
pub fn hash_normalize_params(thresholds: &ThresholdConfig, fill_color: [u8; 3]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"normalize\0");
    hasher.update(thresholds.max_resolution.to_le_bytes());
    hasher.update(thresholds.min_resolution.to_le_bytes());
    hasher.update(thresholds.pad_tolerance.to_le_bytes());
    hasher.update(thresholds.transparent_pad_threshold.to_le_bytes());
    hasher.update(thresholds.size_budget_kb.to_le_bytes());
    hasher.update(thresholds.resize_step.to_le_bytes());
    hasher.update(thresholds.jpeg_quality.to_le_bytes());
    hasher.update(fill_color);
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for a run.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} already normalized, {} normalized ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} normalized", self.misses)
        }
    }
}

/// Resolve the cache manifest path for an output directory.
pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join(MANIFEST_FILENAME)
}
