//! Source discovery and output directory preparation.
//!
//! The first step of every run. Turns the path given on the command line into
//! an ordered list of cover files:
//!
//! - a single `.png`, `.jpg` or `.jpeg` file (extension matched
//!   case-insensitively) is the whole batch;
//! - a directory is walked recursively and every supported file under it is
//!   collected, sorted by file name at each level so runs are reproducible.
//!
//! Hidden entries (names starting with `.`) and the output directory itself
//! are never descended into, so running the tool twice over the same library
//! does not pick up its own results.
//!
//! ## Collisions
//!
//! Outputs are written flat into the output directory, keyed by file stem:
//! `Artist/cover.png` and `Other/cover.jpg` both become `cover.*`. The later
//! one overwrites the earlier. [`find_collisions`] reports these so the CLI
//! can warn before any work is done.

use crate::imaging::SUPPORTED_EXTENSIONS;
use log::warn;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} does not exist")]
    NotFound(PathBuf),
    #[error("Unsupported file format: {0}")]
    Unsupported(PathBuf),
    #[error("{0} is not a valid output directory")]
    InvalidOutput(PathBuf),
}

/// Whether `path` has a supported cover extension.
pub fn is_supported(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Collect the covers under `path`, skipping `exclude` (the output directory).
pub fn discover(path: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>, ScanError> {
    if !path.exists() {
        return Err(ScanError::NotFound(path.to_path_buf()));
    }

    if path.is_file() {
        if !is_supported(path) {
            return Err(ScanError::Unsupported(path.to_path_buf()));
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let excluded = exclude.and_then(|p| p.canonicalize().ok());
    let mut sources = Vec::new();

    let walker = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() > 0 && is_hidden(e.path()) {
                return false;
            }
            if let Some(excluded) = &excluded
                && e.file_type().is_dir()
            {
                return e.path().canonicalize().ok().as_ref() != Some(excluded);
            }
            true
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if entry.file_type().is_file() && is_supported(entry.path()) {
            sources.push(entry.into_path());
        }
    }

    Ok(sources)
}

/// Groups of sources that map to the same output stem, in discovery order.
pub fn find_collisions(sources: &[PathBuf]) -> Vec<(String, Vec<PathBuf>)> {
    let mut by_stem: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for source in sources {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        by_stem.entry(stem).or_default().push(source.clone());
    }

    by_stem
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .collect()
}

/// Log a warning for every output-name collision.
pub fn warn_collisions(sources: &[PathBuf]) {
    for (stem, paths) in find_collisions(sources) {
        let names: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        warn!(
            "{} sources normalize to '{stem}.*'; later ones overwrite earlier: {}",
            paths.len(),
            names.join(", ")
        );
    }
}

/// Make sure `dir` exists and is a directory.
///
/// With `clean`, every regular file directly inside it is removed first so
/// that stale outputs from an earlier run cannot end up in the manifest.
/// Files listed in `sources` are never removed, even when a source was given
/// from inside the output directory. Returns the number of files removed.
pub fn prepare_output_dir(
    dir: &Path,
    clean: bool,
    sources: &[PathBuf],
) -> Result<usize, ScanError> {
    if dir.exists() && !dir.is_dir() {
        return Err(ScanError::InvalidOutput(dir.to_path_buf()));
    }
    fs::create_dir_all(dir)?;

    if !clean {
        return Ok(0);
    }

    let protected: Vec<PathBuf> = sources.iter().filter_map(|s| s.canonicalize().ok()).collect();

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if path.canonicalize().is_ok_and(|p| protected.contains(&p)) {
            warn!("not cleaning {}: it is a source of this run", path.display());
            continue;
        }
        fs::remove_file(&path)?;
        removed += 1;
    }
    Ok(removed)
}
