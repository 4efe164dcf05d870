//! # Album Art Normalizer
//!
//! Batch tool that turns a music library's cover images into square,
//! size-bounded files and hands them to compressors.
//!
//! # Architecture: Two Passes
//!
//! ```text
//! 1. Normalize   <path>          →  _output/*.png|jpg + manifest.json
//! 2. Compress    manifest.json   →  _output/* (rewritten in place)
//! ```
//!
//! Compression starts only after every cover has been normalized and the
//! manifest written, so an interrupted run can resume with
//! `album-art-normalizer compress`.
//!
//! For each source, normalization decides one of four dispositions:
//!
//! | Disposition | When | Result |
//! |---|---|---|
//! | pass-through | square enough, in bounds, suitable format | moved byte for byte |
//! | resize only | square enough, larger than `max_resolution` | downsampled |
//! | pad | `|w - h|` above `pad_tolerance` | centered on a square canvas |
//! | format only | square, in bounds, PNG without real transparency | re-encoded as JPEG |
//!
//! Padded covers go through the adaptive resizer first: the longest edge is
//! stepped down from `max_resolution` until a trial PNG encode fits the size
//! budget or `min_resolution` is reached.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Source discovery: single file or recursive directory walk |
//! | [`normalize`] | Pass 1: inspect, plan, resize, pad, select format, save |
//! | [`compress`] | Pass 2: JPEG optimizer, remote or local PNG compression |
//! | [`imaging`] | Planner, resizer, compositor and codecs on the `image` crate |
//! | [`config`] | `normalizer.toml` loading, merging over defaults, validation |
//! | [`cache`] | Content-addressed cache so unchanged covers are not redone |
//! | [`types`] | `manifest.json` handed from pass 1 to pass 2 |
//! | [`output`] | CLI output formatting for progress and summaries |

pub mod cache;
pub mod compress;
pub mod config;
pub mod imaging;
pub mod normalize;
pub mod output;
pub mod scan;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
