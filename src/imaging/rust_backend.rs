//! Pure Rust image backend on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG) | `image::ImageReader` with content-sniffed format |
//! | JPEG source quality | [`jpeg_quality`](super::jpeg_quality) DQT probe |
//! | Trial encode / save PNG | `PngEncoder` with `CompressionType::Best` + adaptive filtering |
//! | Save JPEG | `JpegEncoder::new_with_quality` on an RGB8 copy |

use super::backend::{BackendError, Dimensions, ImageAsset, ImageBackend};
use super::jpeg_quality::estimate_quality;
use super::params::{Encoding, SourceFormat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

/// Extensions accepted as cover sources.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(path: &Path, reason: impl ToString) -> BackendError {
    BackendError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn source_format(format: Option<ImageFormat>) -> Option<SourceFormat> {
    match format? {
        ImageFormat::Png => Some(SourceFormat::Png),
        ImageFormat::Jpeg => Some(SourceFormat::Jpeg),
        _ => None,
    }
}

/// Encode `image` as a best-compression PNG into `writer`.
fn write_png<W: Write>(image: &DynamicImage, writer: W) -> Result<(), BackendError> {
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, PngFilter::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("PNG: {e}")))
}

/// Encode `image` as RGB8 JPEG into `writer`. JPEG has no alpha, so any
/// alpha channel is dropped first.
fn write_jpeg<W: Write>(image: &DynamicImage, quality: u8, writer: W) -> Result<(), BackendError> {
    let rgb = match image {
        DynamicImage::ImageRgb8(_) => image.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };
    let encoder = JpegEncoder::new_with_quality(writer, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("JPEG: {e}")))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::open(path)?
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| decode_error(path, e))?;
        Ok(Dimensions { width, height })
    }

    fn load(&self, path: &Path) -> Result<ImageAsset, BackendError> {
        let bytes = std::fs::read(path)?;
        let reader = ImageReader::new(Cursor::new(&bytes)).with_guessed_format()?;
        let format = source_format(reader.format())
            .ok_or_else(|| decode_error(path, "not a PNG or JPEG file"))?;
        let image = reader.decode().map_err(|e| decode_error(path, e))?;

        let source_quality = match format {
            SourceFormat::Jpeg => estimate_quality(&bytes),
            SourceFormat::Png => None,
        };

        Ok(ImageAsset {
            path: path.to_path_buf(),
            format,
            image,
            source_quality,
        })
    }

    fn png_size(&self, image: &DynamicImage) -> Result<u64, BackendError> {
        let mut buf = Vec::new();
        write_png(image, &mut buf)?;
        Ok(buf.len() as u64)
    }

    fn save(
        &self,
        image: &DynamicImage,
        encoding: Encoding,
        path: &Path,
    ) -> Result<(), BackendError> {
        let mut writer = BufWriter::new(File::create(path)?);
        match encoding {
            Encoding::Png => write_png(image, &mut writer)?,
            Encoding::Jpeg(quality) => write_jpeg(image, quality.value(), &mut writer)?,
        }
        writer.flush()?;
        Ok(())
    }
}
