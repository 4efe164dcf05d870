//! Types shared between the normalize and compress passes.
//!
//! The [`OutputManifest`] is the hand-off between the two: normalization
//! appends to it, writes it to `<output>/manifest.json`, and compression reads
//! it back and rewrites it with whatever is still left to do. Keeping it on
//! disk lets the next run resume where an interrupted one stopped.

use log::warn;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Name of the output manifest within the output directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Ordered list of normalized outputs waiting for compression, stored as file
/// names relative to the output directory.
///
/// Names are unique: when two sources collide on the same output name the
/// file is overwritten, and it is listed once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputManifest {
    pub outputs: Vec<String>,
}

impl OutputManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an output name, ignoring duplicates.
    pub fn push(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.outputs.contains(&name) {
            self.outputs.push(name);
        }
    }

    /// Keep only the names for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.outputs.retain(|name| keep(name.as_str()));
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Full paths of every output, in manifest order.
    pub fn paths(&self, output_dir: &Path) -> Vec<PathBuf> {
        self.outputs.iter().map(|n| output_dir.join(n)).collect()
    }

    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(output_dir.join(MANIFEST_FILENAME), json)
    }

    pub fn load(output_dir: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(output_dir.join(MANIFEST_FILENAME))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Outputs an earlier run left uncompressed in `output_dir`.
    ///
    /// A missing or unreadable manifest means nothing is pending. Names whose
    /// file no longer exists are dropped.
    pub fn load_pending(output_dir: &Path) -> Self {
        let mut manifest = match Self::load(output_dir) {
            Ok(m) => m,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("ignoring unreadable {MANIFEST_FILENAME}: {e}");
                }
                return Self::new();
            }
        };
        manifest.retain(|name| output_dir.join(name).is_file());
        manifest
    }
}
