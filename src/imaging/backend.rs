//! Image backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four operations every backend must
//! support: identify, load, trial-encode, and save.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate's pure-Rust PNG and JPEG codecs.

use super::params::{Encoding, Quality, SourceFormat};
use image::{ColorType, DynamicImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("Failed to encode: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A decoded cover plus the facts about its source that later stages need.
///
/// Width and height always describe the in-memory image, not the file it
/// came from. Stages that change pixels return a new asset via
/// [`ImageAsset::with_image`] rather than mutating this one.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub image: DynamicImage,
    /// Quality recovered from the source's quantization tables (JPEG only).
    pub source_quality: Option<Quality>,
}

impl ImageAsset {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn color(&self) -> ColorType {
        self.image.color()
    }

    /// Whether the color mode carries an alpha channel, used or not.
    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    /// Same source, new pixels.
    pub fn with_image(&self, image: DynamicImage) -> Self {
        Self {
            path: self.path.clone(),
            format: self.format,
            image,
            source_quality: self.source_quality,
        }
    }
}

/// Trait for image backends.
///
/// Everything that touches codecs goes through here so that the planner,
/// resizer and compositor can be tested against a mock.
pub trait ImageBackend: Sync {
    /// Read dimensions from the file header without a full decode.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode a source file into an [`ImageAsset`].
    fn load(&self, path: &Path) -> Result<ImageAsset, BackendError>;

    /// Encode `image` as an optimized PNG in memory and return its byte length.
    fn png_size(&self, image: &DynamicImage) -> Result<u64, BackendError>;

    /// Write `image` to `path` with the given encoding.
    fn save(&self, image: &DynamicImage, encoding: Encoding, path: &Path)
    -> Result<(), BackendError>;
}
