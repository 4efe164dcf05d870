//! Shared test utilities for the normalizer test suite.
//!
//! Writes synthetic covers to disk so tests can run the real backend without
//! checked-in fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_test_jpeg(&tmp.path().join("cover.jpg"), 1800, 1200, 90);
//! write_test_png(&tmp.path().join("logo.png"), &transparent_square(64));
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

// =========================================================================
// Synthetic images
// =========================================================================

/// Opaque RGB gradient. Smooth content, so encodes stay small.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

/// RGBA image whose alpha channel is present but fully opaque.
pub fn opaque_rgba(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 64, 255])
    }))
}

/// Square RGBA image with a transparent border and an opaque center.
pub fn transparent_square(side: u32) -> DynamicImage {
    let quarter = side / 4;
    DynamicImage::ImageRgba8(RgbaImage::from_fn(side, side, |x, y| {
        let inside = (quarter..side - quarter).contains(&x) && (quarter..side - quarter).contains(&y);
        if inside {
            Rgba([200, 40, 40, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    }))
}

/// Pseudo-random RGB noise. Compresses badly, for exercising size budgets.
pub fn noise(width: u32, height: u32, seed: u32) -> DynamicImage {
    let mut state = seed.max(1);
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    }))
}

// =========================================================================
// Writers
// =========================================================================

/// Write a gradient JPEG at the given quality.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32, quality: u8) {
    let file = std::fs::File::create(path).unwrap();
    gradient(width, height)
        .write_with_encoder(JpegEncoder::new_with_quality(file, quality))
        .unwrap();
}

/// Write `image` as a PNG.
pub fn write_test_png(path: &Path, image: &DynamicImage) {
    image.save_with_format(path, ImageFormat::Png).unwrap();
}

// =========================================================================
// Filesystem lookups
// =========================================================================

/// Sorted file names directly inside `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
