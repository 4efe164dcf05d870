//! Parameter types for normalization decisions.
//!
//! These types describe *what* to do to an asset, not *how*. The planner in
//! [`calculations`](super::calculations) produces them from thresholds; the
//! [`operations`](super::operations) module executes them against a backend.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG encoding quality (1–100, default 85). Clamped on construction.
//! - [`SourceFormat`]: the container a source file was decoded from.
//! - [`Disposition`]: the planner's classification of one asset.
//! - [`FillMode`]: how the padded area of a square canvas is filled.
//! - [`NormalizationPlan`]: disposition + target dimension + fill mode.
//! - [`Encoding`]: the final on-disk encoding chosen by the format selector.

use serde::{Deserialize, Serialize};

/// Quality setting for JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Container format of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Png,
    Jpeg,
}

impl SourceFormat {
    /// Map a file extension (case-insensitive, without dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(SourceFormat::Png),
            "jpg" | "jpeg" => Some(SourceFormat::Jpeg),
            _ => None,
        }
    }
}

/// Outcome of the geometry planner for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Already square enough, within bounds, and in a suitable format.
    Passthrough,
    /// Near-square but larger than the maximum resolution.
    ResizeOnly,
    /// Aspect difference above tolerance; needs a square canvas.
    Pad,
    /// Square and in bounds, but stored as PNG with no real transparency.
    FormatOnly,
}

impl Disposition {
    pub fn label(self) -> &'static str {
        match self {
            Disposition::Passthrough => "pass-through",
            Disposition::ResizeOnly => "resize only",
            Disposition::Pad => "pad",
            Disposition::FormatOnly => "format only",
        }
    }
}

/// Background policy for the padded area of a square canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Solid fill in a non-alpha color mode; source alpha is discarded.
    Opaque,
    /// Fully transparent background in RGBA.
    Transparent,
    /// No canvas is composited.
    None,
}

/// Decision for one asset. Immutable once produced by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationPlan {
    pub disposition: Disposition,
    /// Target square dimension. For [`Disposition::Pad`] this is filled in
    /// by the adaptive resizer, so the planner leaves it `None`.
    pub target: Option<u32>,
    pub fill: FillMode,
}

impl NormalizationPlan {
    pub fn passthrough() -> Self {
        Self {
            disposition: Disposition::Passthrough,
            target: None,
            fill: FillMode::None,
        }
    }

    pub fn resize_only(target: u32) -> Self {
        Self {
            disposition: Disposition::ResizeOnly,
            target: Some(target),
            fill: FillMode::None,
        }
    }

    pub fn pad(fill: FillMode) -> Self {
        Self {
            disposition: Disposition::Pad,
            target: None,
            fill,
        }
    }

    pub fn format_only() -> Self {
        Self {
            disposition: Disposition::FormatOnly,
            target: None,
            fill: FillMode::None,
        }
    }
}

/// Final encoding written to the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Best-compression PNG with adaptive filtering.
    Png,
    Jpeg(Quality),
}

impl Encoding {
    /// File extension (without dot) used for outputs of this encoding.
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Png => "png",
            Encoding::Jpeg(_) => "jpg",
        }
    }
}
