//! Pure calculation functions for cover geometry.
//!
//! All functions here are pure and testable without any I/O or images. The
//! geometry planner lives here: it turns dimensions plus thresholds into a
//! [`NormalizationPlan`].

use super::params::{FillMode, NormalizationPlan, SourceFormat};
use crate::config::ThresholdConfig;

/// Absolute pixel difference between the two edges.
pub fn aspect_difference(width: u32, height: u32) -> u32 {
    width.abs_diff(height)
}

/// Classify a cover into a disposition.
///
/// First match wins:
/// 1. near-square, within bounds, and not a PNG that could be a JPEG → pass-through
/// 2. aspect difference above tolerance → pad (transparent above the
///    transparent-pad threshold, opaque otherwise)
/// 3. near-square but too large → resize only, target = `max_resolution`
/// 4. near-square, in bounds, PNG without real transparency → format only
///
/// # Examples
/// ```
/// # use album_art_normalizer::config::ThresholdConfig;
/// # use album_art_normalizer::imaging::{plan, Disposition, SourceFormat};
/// let t = ThresholdConfig::default();
/// let p = plan(1500, 1500, SourceFormat::Jpeg, false, &t);
/// assert_eq!(p.disposition, Disposition::Passthrough);
/// ```
pub fn plan(
    width: u32,
    height: u32,
    source: SourceFormat,
    has_real_transparency: bool,
    thresholds: &ThresholdConfig,
) -> NormalizationPlan {
    let diff = aspect_difference(width, height);
    let longest = width.max(height);
    let near_square = diff <= thresholds.pad_tolerance;
    let in_bounds = longest <= thresholds.max_resolution;
    let opaque_png = source == SourceFormat::Png && !has_real_transparency;

    if near_square && in_bounds && !opaque_png {
        return NormalizationPlan::passthrough();
    }

    if !near_square {
        let fill = if diff > thresholds.transparent_pad_threshold {
            FillMode::Transparent
        } else {
            FillMode::Opaque
        };
        return NormalizationPlan::pad(fill);
    }

    if !in_bounds {
        return NormalizationPlan::resize_only(thresholds.max_resolution);
    }

    NormalizationPlan::format_only()
}

/// Dimensions of an image downsampled to fit within a `bound × bound` box.
///
/// Preserves aspect ratio and never upscales: an image already inside the
/// box keeps its size. The shorter edge never drops below one pixel.
///
/// ```
/// # use album_art_normalizer::imaging::fit_within;
/// assert_eq!(fit_within((1800, 1200), 1500), (1500, 1000));
/// assert_eq!(fit_within((800, 600), 1500), (800, 600));
/// ```
pub fn fit_within(dims: (u32, u32), bound: u32) -> (u32, u32) {
    let (w, h) = dims;
    if w.max(h) <= bound {
        return (w, h);
    }

    if w >= h {
        let scaled = (h as f64 * bound as f64 / w as f64).round() as u32;
        (bound, scaled.max(1))
    } else {
        let scaled = (w as f64 * bound as f64 / h as f64).round() as u32;
        (scaled.max(1), bound)
    }
}

/// Top-left offset at which a `width × height` image is pasted on a square
/// canvas of side `max(width, height)`.
///
/// Integer division, so odd differences bias one pixel toward the top/left.
pub fn paste_offset(width: u32, height: u32) -> (u32, u32) {
    if width > height {
        (0, (width - height) / 2)
    } else {
        ((height - width) / 2, 0)
    }
}

/// Upper bound on trial encodes the adaptive resizer performs.
pub fn max_resize_trials(thresholds: &ThresholdConfig) -> u32 {
    (thresholds.max_resolution - thresholds.min_resolution) / thresholds.resize_step + 1
}

/// Whole kilobytes in a byte count, rounded down.
pub fn kilobytes(bytes: u64) -> u64 {
    bytes >> 10
}
