//! End-to-end runs through the public library API.
//!
//! Each test builds a small library of synthetic covers in a temp dir, then
//! drives discovery → normalize → manifest → compress the way the CLI does.

use album_art_normalizer::compress::{
    self, CompressError, CompressionResult, Compressor, Dispatcher,
};
use album_art_normalizer::config;
use album_art_normalizer::imaging::{Disposition, Encoding, FillMode, RustBackend};
use album_art_normalizer::normalize::{self, AssetStatus, NormalizeOptions};
use album_art_normalizer::scan;
use album_art_normalizer::types::OutputManifest;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 200) as u8 + 20, (y % 200) as u8 + 20, 90])
    }))
}

fn write_png(path: &Path, image: &DynamicImage) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    image.save_with_format(path, ImageFormat::Png).unwrap();
}

fn write_jpeg(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .encode_image(&gradient(width, height).to_rgb8())
        .unwrap();
    fs::write(path, bytes).unwrap();
}

fn keep_originals() -> NormalizeOptions {
    NormalizeOptions {
        delete_original: false,
        ..NormalizeOptions::default()
    }
}

/// Records every path it is asked to compress and leaves the file alone.
struct Recorder {
    seen: Arc<Mutex<Vec<PathBuf>>>,
}

impl Compressor for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn compress(&self, path: &Path) -> Result<(), CompressError> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

// =============================================================================
// Landscape cover, padded onto an opaque square
// =============================================================================

#[test]
fn landscape_png_is_padded_white_and_original_removed() {
    let tmp = TempDir::new().unwrap();
    let library = tmp.path().join("library");
    let source = library.join("Artist").join("Album").join("cover.png");
    write_png(&source, &gradient(1800, 1200));

    fs::write(
        tmp.path().join(config::CONFIG_FILENAME),
        "[thresholds]\npad_tolerance = 30\ntransparent_pad_threshold = 1000\n",
    )
    .unwrap();
    let config = config::load_config(tmp.path()).unwrap();
    assert!(config.output.delete_original);

    let out = tmp.path().join("_output");
    let sources = scan::discover(&library, Some(&out)).unwrap();
    assert_eq!(sources, vec![source.clone()]);
    scan::prepare_output_dir(&out, false, &sources).unwrap();

    let options = NormalizeOptions::from_config(&config);
    let result = normalize::normalize(&sources, &out, &options, None).unwrap();
    result.manifest.save(&out).unwrap();

    let AssetStatus::Normalized(asset) = &result.reports[0].status else {
        panic!("expected normalized cover, got {:?}", result.reports[0].status);
    };
    assert_eq!(asset.plan.disposition, Disposition::Pad);
    assert_eq!(asset.plan.fill, FillMode::Opaque);
    assert_eq!(asset.encoding, Some(Encoding::Png));
    assert_eq!(asset.output, out.join("cover.png"));

    let written = image::open(out.join("cover.png")).unwrap();
    assert_eq!((written.width(), written.height()), (1800, 1800));
    assert!(!written.color().has_alpha());

    // 300px white bands above and below the centered artwork
    let rgb = written.to_rgb8();
    assert_eq!(rgb.get_pixel(900, 10).0, [255, 255, 255]);
    assert_eq!(rgb.get_pixel(900, 1790).0, [255, 255, 255]);
    assert_ne!(rgb.get_pixel(900, 900).0, [255, 255, 255]);

    assert!(!source.exists());
    assert_eq!(
        OutputManifest::load(&out).unwrap().outputs,
        vec!["cover.png"]
    );
}

// =============================================================================
// Pass-through
// =============================================================================

#[test]
fn square_jpeg_passes_through_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("lib").join("front.jpg");
    write_jpeg(&source, 1000, 1000);
    let before = fs::read(&source).unwrap();
    let out = tmp.path().join("out");

    let result = normalize::normalize(&[source.clone()], &out, &keep_originals(), None).unwrap();

    let AssetStatus::Normalized(asset) = &result.reports[0].status else {
        panic!("expected pass-through");
    };
    assert_eq!(asset.plan.disposition, Disposition::Passthrough);
    assert_eq!(asset.encoding, None);
    assert_eq!(fs::read(out.join("front.jpg")).unwrap(), before);
    assert!(source.exists());
}

// =============================================================================
// Whole library: discovery, failures, manifest hand-off, compression
// =============================================================================

#[test]
fn library_run_then_resumed_compression() {
    let tmp = TempDir::new().unwrap();
    let library = tmp.path().join("library");
    let out = library.join("_output");

    write_jpeg(&library.join("A").join("back.jpeg"), 1000, 1000);
    write_png(&library.join("A").join("folder.png"), &gradient(600, 600));
    write_png(&library.join("B").join("wide.png"), &gradient(400, 300));
    fs::write(library.join("B").join("broken.png"), b"not really a png").unwrap();
    fs::write(library.join("B").join("notes.txt"), b"liner notes").unwrap();
    write_png(&library.join(".thumbs").join("hidden.png"), &gradient(10, 10));

    // Leftovers from an earlier run inside the library are never rediscovered
    write_png(&out.join("stale.png"), &gradient(20, 20));

    let sources = scan::discover(&library, Some(&out)).unwrap();
    let names: Vec<String> = sources
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["back.jpeg", "folder.png", "broken.png", "wide.png"]);

    assert_eq!(scan::prepare_output_dir(&out, true, &sources).unwrap(), 1);

    let (tx, rx) = std::sync::mpsc::channel();
    let result = normalize::normalize(&sources, &out, &keep_originals(), Some(tx)).unwrap();
    assert_eq!(rx.iter().count(), 4);
    assert_eq!(result.failures(), 1);
    assert!(matches!(result.reports[2].status, AssetStatus::Failed(_)));
    result.manifest.save(&out).unwrap();

    // folder.png is square and opaque: re-encoded as JPEG
    assert_eq!(
        result.manifest.outputs,
        vec!["back.jpeg", "folder.jpg", "wide.png"]
    );

    // A later `compress` only has the manifest to go on
    let manifest = OutputManifest::load(&out).unwrap();
    let jpeg_seen = Arc::new(Mutex::new(Vec::new()));
    let png_seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = Dispatcher::new(
        Box::new(Recorder {
            seen: Arc::clone(&jpeg_seen),
        }),
        Some(Box::new(Recorder {
            seen: Arc::clone(&png_seen),
        }) as Box<dyn Compressor>),
        0,
    );
    let results = compress::compress_all(&dispatcher, &manifest.paths(&out), None);

    assert_eq!(results.len(), 3);
    assert!(
        results
            .iter()
            .all(|(_, r)| matches!(r, CompressionResult::Compressed { .. }))
    );
    assert_eq!(
        *jpeg_seen.lock().unwrap(),
        vec![out.join("back.jpeg"), out.join("folder.jpg")]
    );
    assert_eq!(*png_seen.lock().unwrap(), vec![out.join("wide.png")]);

    // Everything compressed: nothing left for the next run
    compress::still_pending(&manifest, &out, &results)
        .save(&out)
        .unwrap();
    assert!(OutputManifest::load(&out).unwrap().is_empty());
}

fn recording_dispatcher() -> (Dispatcher, Arc<Mutex<Vec<PathBuf>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = Dispatcher::new(
        Box::new(Recorder {
            seen: Arc::clone(&seen),
        }),
        Some(Box::new(Recorder {
            seen: Arc::clone(&seen),
        }) as Box<dyn Compressor>),
        0,
    );
    (dispatcher, seen)
}

#[test]
fn run_aborted_before_compression_resumes_after_cache_hit() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("lib").join("cover.png");
    write_png(&source, &gradient(500, 300));
    let out = tmp.path().join("out");
    let sources = vec![source];

    // First run: normalized, manifest written, then stopped
    let first = normalize::normalize(&sources, &out, &keep_originals(), None).unwrap();
    first.manifest.save(&out).unwrap();
    assert_eq!(first.cache_stats.misses, 1);

    // Second run: cache hit, but the output still needs compressing
    let second = normalize::normalize(&sources, &out, &keep_originals(), None).unwrap();
    second.manifest.save(&out).unwrap();
    assert_eq!(second.cache_stats.hits, 1);
    assert!(matches!(
        second.reports[0].status,
        AssetStatus::Skipped { .. }
    ));
    assert_eq!(second.manifest.outputs, vec!["cover.png"]);

    let (dispatcher, seen) = recording_dispatcher();
    let manifest = OutputManifest::load(&out).unwrap();
    let results = compress::compress_all(&dispatcher, &manifest.paths(&out), None);
    assert_eq!(*seen.lock().unwrap(), vec![out.join("cover.png")]);
    compress::still_pending(&manifest, &out, &results)
        .save(&out)
        .unwrap();

    // Third run: cache hit on an output that is already compressed
    let third = normalize::normalize(&sources, &out, &keep_originals(), None).unwrap();
    assert_eq!(third.cache_stats.hits, 1);
    assert!(third.manifest.is_empty());
}

// =============================================================================
// Check
// =============================================================================

#[test]
fn check_plans_without_writing() {
    let tmp = TempDir::new().unwrap();
    let library = tmp.path().join("library");
    write_png(&library.join("cover.png"), &gradient(1800, 1200));
    write_jpeg(&library.join("square.jpg"), 800, 800);
    let out = tmp.path().join("_output");

    let sources = scan::discover(&library, Some(&out)).unwrap();
    let thresholds = config::NormalizerConfig::default().thresholds;
    let backend = RustBackend::new();
    let plans: Vec<Disposition> = sources
        .iter()
        .map(|s| {
            normalize::check_file(&backend, s, &thresholds)
                .unwrap()
                .plan
                .disposition
        })
        .collect();

    assert_eq!(plans, vec![Disposition::Pad, Disposition::Passthrough]);
    assert!(!out.exists());
}
