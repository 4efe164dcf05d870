//! CLI output formatting for both passes.
//!
//! Every cover gets a positional header line followed by indented context
//! lines. The header is the output identity (the file name); the source path
//! is secondary context, since many albums share a `cover.png`.
//!
//! # Output Format
//!
//! ## Normalize
//!
//! ```text
//! (1/3) cover.png
//!     Source: Artist/Album/cover.png
//!     1800x1200 → 1000x1000, pad (opaque), PNG
//! (2/3) back.jpg
//!     Source: Artist/Album/back.jpg
//!     already normalized
//! (3/3) broken.png
//!     Source: Other/broken.png
//!     FAILED: Image processing failed: ...
//!
//! Normalized 1 of 3 covers (1 failed)
//! Cache: 1 already normalized, 1 normalized (2 total)
//! ```
//!
//! ## Compress
//!
//! ```text
//! (1/2) cover.png
//!     1.2 MB → 412.0 KB (-66%)
//! (2/2) back.jpg
//!     skipped: under 50KB threshold
//!
//! Compressed 1 of 2 files: 1.2 MB → 412.0 KB
//! ```
//!
//! ## Check
//!
//! ```text
//! (1/2) cover.png
//!     Source: Artist/Album/cover.png
//!     PNG 1800x1200 → pad (opaque)
//! ```
//!
//! # Architecture
//!
//! Each pass has `format_*` functions (returning `Vec<String>`) for
//! testability and `print_*` wrappers that write to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::compress::{CompressEvent, CompressionResult};
use crate::imaging::{Disposition, Encoding, FillMode, NormalizationPlan, SourceFormat};
use crate::normalize::{
    AssetReport, AssetStatus, CheckedAsset, NormalizeError, NormalizeEvent, NormalizeResult,
};
use std::path::{Path, PathBuf};

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `(index/total) name`
fn progress_header(index: usize, total: usize, name: &str) -> String {
    format!("({index}/{total}) {name}")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Human-readable byte count, binary units.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn plan_label(plan: &NormalizationPlan) -> String {
    match (plan.disposition, plan.fill) {
        (Disposition::Pad, FillMode::Opaque) => "pad (opaque)".to_string(),
        (Disposition::Pad, FillMode::Transparent) => "pad (transparent)".to_string(),
        (disposition, _) => disposition.label().to_string(),
    }
}

fn encoding_label(encoding: Encoding) -> String {
    match encoding {
        Encoding::Png => "PNG".to_string(),
        Encoding::Jpeg(q) => format!("JPEG q{}", q.value()),
    }
}

fn format_label(format: SourceFormat) -> &'static str {
    match format {
        SourceFormat::Png => "PNG",
        SourceFormat::Jpeg => "JPEG",
    }
}

// ============================================================================
// Normalize pass
// ============================================================================

/// Detail lines for one report, without the header.
fn report_details(report: &AssetReport) -> Vec<String> {
    let mut lines = vec![format!("{}Source: {}", indent(1), report.source.display())];
    match &report.status {
        AssetStatus::Normalized(asset) => {
            let mut detail = format!(
                "{}{} → {}, {}",
                indent(1),
                asset.original,
                asset.result,
                plan_label(&asset.plan)
            );
            match asset.encoding {
                Some(encoding) => {
                    detail.push_str(", ");
                    detail.push_str(&encoding_label(encoding));
                }
                None => detail.push_str(", unchanged"),
            }
            lines.push(detail);
            if asset.trials > 1 {
                lines.push(format!("{}{} resize trials", indent(1), asset.trials));
            }
        }
        AssetStatus::Skipped { .. } => {
            lines.push(format!("{}already normalized", indent(1)));
        }
        AssetStatus::Failed(reason) => {
            lines.push(format!("{}FAILED: {reason}", indent(1)));
        }
    }
    lines
}

fn report_name(report: &AssetReport) -> String {
    match &report.status {
        AssetStatus::Normalized(asset) => file_name(&asset.output),
        AssetStatus::Skipped { output } => file_name(output),
        AssetStatus::Failed(_) => file_name(&report.source),
    }
}

/// Format a single normalize progress event as display lines.
pub fn format_normalize_event(event: &NormalizeEvent) -> Vec<String> {
    match event {
        NormalizeEvent::Finished {
            index,
            total,
            report,
        } => {
            let mut lines = vec![progress_header(*index, *total, &report_name(report))];
            lines.extend(report_details(report));
            lines
        }
    }
}

/// Closing lines of the normalize pass.
pub fn format_normalize_summary(result: &NormalizeResult) -> Vec<String> {
    let total = result.reports.len();
    let failed = result.failures();
    let done = total - failed;

    let mut headline = format!("Normalized {done} of {total} covers");
    if failed > 0 {
        headline.push_str(&format!(" ({failed} failed)"));
    }

    let mut lines = vec![String::new(), headline];
    if result.cache_stats.hits > 0 {
        lines.push(format!("Cache: {}", result.cache_stats));
    }
    lines
}

pub fn print_normalize_summary(result: &NormalizeResult) {
    for line in format_normalize_summary(result) {
        println!("{}", line);
    }
}

// ============================================================================
// Compress pass
// ============================================================================

fn compression_detail(result: &CompressionResult) -> String {
    match result {
        CompressionResult::Compressed { before, after } => {
            let change = if *before == 0 {
                0
            } else {
                ((*after as f64 / *before as f64 - 1.0) * 100.0).round() as i64
            };
            format!(
                "{}{} → {} ({change:+}%)",
                indent(1),
                human_size(*before),
                human_size(*after)
            )
        }
        CompressionResult::Skipped(reason) => format!("{}skipped: {reason}", indent(1)),
        CompressionResult::Failed(reason) => format!("{}FAILED: {reason}", indent(1)),
    }
}

/// Format a single compress progress event as display lines.
pub fn format_compress_event(event: &CompressEvent) -> Vec<String> {
    match event {
        CompressEvent::Finished {
            index,
            total,
            path,
            result,
        } => vec![
            progress_header(*index, *total, &file_name(path)),
            compression_detail(result),
        ],
    }
}

/// Closing lines of the compress pass.
pub fn format_compress_summary(results: &[(PathBuf, CompressionResult)]) -> Vec<String> {
    let mut compressed = 0;
    let mut failed = 0;
    let mut before_total = 0u64;
    let mut after_total = 0u64;

    for (_, result) in results {
        match result {
            CompressionResult::Compressed { before, after } => {
                compressed += 1;
                before_total += before;
                after_total += after;
            }
            CompressionResult::Failed(_) => failed += 1,
            CompressionResult::Skipped(_) => {}
        }
    }

    let mut headline = format!("Compressed {compressed} of {} files", results.len());
    if compressed > 0 {
        headline.push_str(&format!(
            ": {} → {}",
            human_size(before_total),
            human_size(after_total)
        ));
    }
    if failed > 0 {
        headline.push_str(&format!(" ({failed} failed)"));
    }
    vec![String::new(), headline]
}

pub fn print_compress_summary(results: &[(PathBuf, CompressionResult)]) {
    for line in format_compress_summary(results) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the planner verdict for every discovered source.
pub fn format_check_output(
    results: &[(PathBuf, Result<CheckedAsset, NormalizeError>)],
) -> Vec<String> {
    let total = results.len();
    let mut lines = Vec::new();
    let mut unchanged = 0;

    for (i, (source, result)) in results.iter().enumerate() {
        lines.push(progress_header(i + 1, total, &file_name(source)));
        lines.push(format!("{}Source: {}", indent(1), source.display()));
        match result {
            Ok(checked) => {
                if checked.plan.disposition == Disposition::Passthrough {
                    unchanged += 1;
                }
                let mut detail = format!(
                    "{}{} {} → {}",
                    indent(1),
                    format_label(checked.format),
                    checked.dimensions,
                    plan_label(&checked.plan)
                );
                if checked.transparent {
                    detail.push_str(", has transparency");
                }
                lines.push(detail);
            }
            Err(e) => lines.push(format!("{}FAILED: {e}", indent(1))),
        }
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    lines.push(String::new());
    lines.push(format!(
        "{total} covers: {} to normalize, {unchanged} already fine, {failed} unreadable",
        total - unchanged - failed
    ));
    lines
}

pub fn print_check_output(results: &[(PathBuf, Result<CheckedAsset, NormalizeError>)]) {
    for line in format_check_output(results) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;
    use crate::imaging::{BackendError, Dimensions, Quality};
    use crate::normalize::NormalizedAsset;
    use crate::types::OutputManifest;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn padded_report() -> AssetReport {
        AssetReport {
            source: PathBuf::from("Artist/Album/cover.png"),
            status: AssetStatus::Normalized(NormalizedAsset {
                output: PathBuf::from("_output/cover.png"),
                plan: NormalizationPlan {
                    disposition: Disposition::Pad,
                    target: Some(1000),
                    fill: FillMode::Opaque,
                },
                original: dims(1800, 1200),
                result: dims(1000, 1000),
                encoding: Some(Encoding::Png),
                trials: 1,
            }),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn human_size_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(1536 * 1024), "1.5 MB");
    }

    #[test]
    fn plan_labels() {
        assert_eq!(
            plan_label(&NormalizationPlan::pad(FillMode::Transparent)),
            "pad (transparent)"
        );
        assert_eq!(plan_label(&NormalizationPlan::resize_only(2000)), "resize only");
        assert_eq!(plan_label(&NormalizationPlan::passthrough()), "pass-through");
        assert_eq!(encoding_label(Encoding::Jpeg(Quality::new(85))), "JPEG q85");
    }

    // =========================================================================
    // Normalize
    // =========================================================================

    #[test]
    fn normalized_event_lines() {
        let event = NormalizeEvent::Finished {
            index: 1,
            total: 3,
            report: padded_report(),
        };
        assert_eq!(
            format_normalize_event(&event),
            vec![
                "(1/3) cover.png",
                "    Source: Artist/Album/cover.png",
                "    1800x1200 → 1000x1000, pad (opaque), PNG",
            ]
        );
    }

    #[test]
    fn passthrough_event_says_unchanged() {
        let event = NormalizeEvent::Finished {
            index: 2,
            total: 2,
            report: AssetReport {
                source: PathBuf::from("a/back.jpg"),
                status: AssetStatus::Normalized(NormalizedAsset {
                    output: PathBuf::from("_output/back.jpg"),
                    plan: NormalizationPlan::passthrough(),
                    original: dims(1000, 1000),
                    result: dims(1000, 1000),
                    encoding: None,
                    trials: 0,
                }),
            },
        };
        let lines = format_normalize_event(&event);
        assert_eq!(lines[2], "    1000x1000 → 1000x1000, pass-through, unchanged");
    }

    #[test]
    fn failed_and_skipped_events() {
        let failed = NormalizeEvent::Finished {
            index: 1,
            total: 2,
            report: AssetReport {
                source: PathBuf::from("x/broken.png"),
                status: AssetStatus::Failed("decode error".into()),
            },
        };
        let lines = format_normalize_event(&failed);
        assert_eq!(lines[0], "(1/2) broken.png");
        assert_eq!(lines[2], "    FAILED: decode error");

        let skipped = NormalizeEvent::Finished {
            index: 2,
            total: 2,
            report: AssetReport {
                source: PathBuf::from("x/folder.png"),
                status: AssetStatus::Skipped {
                    output: PathBuf::from("_output/folder.jpg"),
                },
            },
        };
        let lines = format_normalize_event(&skipped);
        assert_eq!(lines[0], "(2/2) folder.jpg");
        assert_eq!(lines[2], "    already normalized");
    }

    #[test]
    fn normalize_summary_counts_failures() {
        let result = NormalizeResult {
            reports: vec![
                padded_report(),
                AssetReport {
                    source: PathBuf::from("b.png"),
                    status: AssetStatus::Failed("boom".into()),
                },
            ],
            manifest: OutputManifest::new(),
            cache_stats: CacheStats::default(),
        };
        assert_eq!(
            format_normalize_summary(&result),
            vec!["", "Normalized 1 of 2 covers (1 failed)"]
        );
    }

    // =========================================================================
    // Compress
    // =========================================================================

    #[test]
    fn compress_event_shows_savings() {
        let event = CompressEvent::Finished {
            index: 1,
            total: 1,
            path: PathBuf::from("_output/cover.png"),
            result: CompressionResult::Compressed {
                before: 4096,
                after: 1024,
            },
        };
        assert_eq!(
            format_compress_event(&event),
            vec!["(1/1) cover.png", "    4.0 KB → 1.0 KB (-75%)"]
        );
    }

    #[test]
    fn compress_summary_totals() {
        let results = vec![
            (
                PathBuf::from("a.png"),
                CompressionResult::Compressed {
                    before: 2048,
                    after: 1024,
                },
            ),
            (
                PathBuf::from("b.png"),
                CompressionResult::Skipped("PNG compression disabled".into()),
            ),
            (
                PathBuf::from("c.jpg"),
                CompressionResult::Failed("jpegoptim failed".into()),
            ),
        ];
        assert_eq!(
            format_compress_summary(&results),
            vec!["", "Compressed 1 of 3 files: 2.0 KB → 1.0 KB (1 failed)"]
        );
    }

    // =========================================================================
    // Check
    // =========================================================================

    #[test]
    fn check_output_lists_plans_and_failures() {
        let results = vec![
            (
                PathBuf::from("a/cover.png"),
                Ok(CheckedAsset {
                    source: PathBuf::from("a/cover.png"),
                    format: SourceFormat::Png,
                    dimensions: dims(1800, 1200),
                    transparent: false,
                    plan: NormalizationPlan::pad(FillMode::Transparent),
                }),
            ),
            (
                PathBuf::from("a/logo.png"),
                Ok(CheckedAsset {
                    source: PathBuf::from("a/logo.png"),
                    format: SourceFormat::Png,
                    dimensions: dims(500, 500),
                    transparent: true,
                    plan: NormalizationPlan::passthrough(),
                }),
            ),
            (
                PathBuf::from("b/bad.jpg"),
                Err(NormalizeError::Imaging(BackendError::Decode {
                    path: PathBuf::from("b/bad.jpg"),
                    reason: "truncated".into(),
                })),
            ),
        ];
        let lines = format_check_output(&results);
        assert_eq!(lines[0], "(1/3) cover.png");
        assert_eq!(lines[2], "    PNG 1800x1200 → pad (transparent)");
        assert_eq!(lines[5], "    PNG 500x500 → pass-through, has transparency");
        assert!(lines[8].starts_with("    FAILED: "));
        assert_eq!(
            lines.last().unwrap(),
            "3 covers: 1 to normalize, 1 already fine, 1 unreadable"
        );
    }
}
