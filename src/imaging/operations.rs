//! High-level image operations.
//!
//! These functions combine calculations with backend execution: the adaptive
//! resizer, the canvas compositor, the format selector, and [`render`], which
//! applies a whole [`NormalizationPlan`] to an asset. Every function returns a
//! new image; the asset passed in is never modified.

use super::backend::{BackendError, ImageAsset, ImageBackend};
use super::calculations::{fit_within, kilobytes, paste_offset};
use super::inspect::has_real_transparency;
use super::params::{Disposition, Encoding, FillMode, NormalizationPlan, Quality, SourceFormat};
use crate::config::ThresholdConfig;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use log::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Lanczos3 downsample so the longer edge is at most `bound`. Never upscales.
pub fn resize_to_fit(image: &DynamicImage, bound: u32) -> DynamicImage {
    let current = (image.width(), image.height());
    let (w, h) = fit_within(current, bound);
    if (w, h) == current {
        return image.clone();
    }
    image.resize_exact(w, h, FilterType::Lanczos3)
}

/// Outcome of the adaptive resizer.
#[derive(Debug, Clone)]
pub struct AdaptiveResize {
    /// Longest edge of the accepted image. At most `max_resolution`; below
    /// `min_resolution` only when the source itself is smaller, since
    /// nothing is upscaled.
    pub dimension: u32,
    /// The image downsampled to fit `dimension × dimension`.
    pub image: DynamicImage,
    /// Trial encodes performed.
    pub trials: u32,
    /// Size of the last trial encode, in KB.
    pub size_kb: u64,
    /// False when the resolution floor was reached with the budget still exceeded.
    pub within_budget: bool,
}

/// Find the largest square working dimension whose PNG encode fits the budget.
///
/// Starts at `min(max_resolution, longest edge)` and steps down by
/// `resize_step`, trial-encoding a fresh downsample of `image` each time.
/// Stops when the encode fits `size_budget_kb` or when another step would go
/// below `min_resolution`. Performs at most
/// [`max_resize_trials`](super::calculations::max_resize_trials) encodes.
/// Hitting the floor over budget is accepted, not an error.
pub fn adaptive_dimension(
    backend: &impl ImageBackend,
    image: &DynamicImage,
    thresholds: &ThresholdConfig,
) -> Result<AdaptiveResize> {
    let longest = image.width().max(image.height());
    let mut dimension = thresholds.max_resolution.min(longest);
    let mut trials = 0;

    loop {
        let candidate = resize_to_fit(image, dimension);
        let size_kb = kilobytes(backend.png_size(&candidate)?);
        trials += 1;

        let within_budget = size_kb <= thresholds.size_budget_kb;
        let at_floor = dimension.saturating_sub(thresholds.resize_step) < thresholds.min_resolution;

        if within_budget || at_floor {
            return Ok(AdaptiveResize {
                dimension: candidate.width().max(candidate.height()),
                image: candidate,
                trials,
                size_kb,
                within_budget,
            });
        }

        debug!(
            "{dimension}px encodes to {size_kb}KB (budget {}KB), stepping down",
            thresholds.size_budget_kb
        );
        dimension -= thresholds.resize_step;
    }
}

/// Center `image` on a square canvas of side `max(width, height)`.
///
/// - [`FillMode::Transparent`]: RGBA canvas with an all-zero background.
/// - [`FillMode::Opaque`]: RGB canvas filled with `fill_color`; the source is
///   converted to RGB first, discarding alpha.
/// - [`FillMode::None`]: returns the image unchanged.
pub fn composite_square(image: &DynamicImage, fill: FillMode, fill_color: [u8; 3]) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    let side = w.max(h);
    let (x, y) = paste_offset(w, h);

    match fill {
        FillMode::Transparent => {
            let mut canvas = RgbaImage::new(side, side);
            imageops::replace(&mut canvas, &image.to_rgba8(), x as i64, y as i64);
            DynamicImage::ImageRgba8(canvas)
        }
        FillMode::Opaque => {
            let mut canvas = RgbImage::from_pixel(side, side, Rgb(fill_color));
            imageops::replace(&mut canvas, &image.to_rgb8(), x as i64, y as i64);
            DynamicImage::ImageRgb8(canvas)
        }
        FillMode::None => image.clone(),
    }
}

/// Decide the final encoding.
///
/// Padded covers are always PNG: their size budget was measured as PNG.
/// Otherwise PNG only when a pixel is actually transparent, else JPEG at the
/// source's own quality (JPEG sources) or `default_quality`.
pub fn select_encoding(
    disposition: Disposition,
    image: &DynamicImage,
    source: SourceFormat,
    source_quality: Option<Quality>,
    default_quality: Quality,
) -> Encoding {
    if disposition == Disposition::Pad || has_real_transparency(image) {
        return Encoding::Png;
    }

    let quality = match source {
        SourceFormat::Jpeg => source_quality.unwrap_or(default_quality),
        SourceFormat::Png => default_quality,
    };
    Encoding::Jpeg(quality)
}

/// A rendered cover, ready to be saved.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub image: DynamicImage,
    pub encoding: Encoding,
    /// The plan with its target dimension resolved.
    pub plan: NormalizationPlan,
    /// Adaptive resizer trial encodes (pad only).
    pub trials: u32,
}

/// Apply a plan to an asset and pick its encoding.
///
/// Pass-through assets are rendered unchanged; callers normally move those
/// files instead of re-encoding them.
pub fn render(
    backend: &impl ImageBackend,
    asset: &ImageAsset,
    plan: NormalizationPlan,
    thresholds: &ThresholdConfig,
    fill_color: [u8; 3],
) -> Result<Rendered> {
    let mut resolved = plan;
    let mut trials = 0;

    let image = match plan.disposition {
        Disposition::Pad => {
            let fit = adaptive_dimension(backend, &asset.image, thresholds)?;
            if !fit.within_budget {
                debug!(
                    "{}: floor of {}px reached at {}KB",
                    asset.path.display(),
                    thresholds.min_resolution,
                    fit.size_kb
                );
            }
            resolved.target = Some(fit.dimension);
            trials = fit.trials;
            composite_square(&fit.image, plan.fill, fill_color)
        }
        Disposition::ResizeOnly => {
            let target = plan.target.unwrap_or(thresholds.max_resolution);
            resize_to_fit(&asset.image, target)
        }
        Disposition::FormatOnly | Disposition::Passthrough => asset.image.clone(),
    };

    let encoding = select_encoding(
        plan.disposition,
        &image,
        asset.format,
        asset.source_quality,
        Quality::new(thresholds.jpeg_quality),
    );

    Ok(Rendered {
        image,
        encoding,
        plan: resolved,
        trials,
    })
}
