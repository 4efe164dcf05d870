//! Image inspection: dimensions and real transparency.
//!
//! A nominal alpha channel does not mean anything is see-through. Covers
//! exported from editors often carry an all-opaque alpha channel, and
//! forcing those to PNG wastes space. [`has_real_transparency`] only reports
//! `true` when at least one pixel is actually below full opacity.
//!
//! Palette PNGs are covered by the same check: the `image` crate expands a
//! palette with a `tRNS` chunk into an alpha channel on decode, so the
//! transparent index shows up as alpha below 255 exactly where a pixel uses it.

use super::backend::ImageAsset;
use image::DynamicImage;

/// What the planner needs to know about an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection {
    pub width: u32,
    pub height: u32,
    pub has_real_transparency: bool,
}

pub fn inspect(asset: &ImageAsset) -> Inspection {
    Inspection {
        width: asset.width(),
        height: asset.height(),
        has_real_transparency: has_real_transparency(&asset.image),
    }
}

/// True when the image has an alpha channel and some pixel is not fully opaque.
pub fn has_real_transparency(image: &DynamicImage) -> bool {
    if !image.color().has_alpha() {
        return false;
    }

    match image {
        DynamicImage::ImageRgba8(buf) => buf.pixels().any(|p| p.0[3] < u8::MAX),
        DynamicImage::ImageLumaA8(buf) => buf.pixels().any(|p| p.0[1] < u8::MAX),
        DynamicImage::ImageRgba16(buf) => buf.pixels().any(|p| p.0[3] < u16::MAX),
        DynamicImage::ImageLumaA16(buf) => buf.pixels().any(|p| p.0[1] < u16::MAX),
        other => other.to_rgba16().pixels().any(|p| p.0[3] < u16::MAX),
    }
}
