//! Image processing on the pure-Rust `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Transparency check** | [`has_real_transparency`] over decoded pixels |
//! | **JPEG quality probe** | DQT parser in `jpeg_quality` |
//! | **Adaptive resize** | Lanczos3 + in-memory PNG trial encodes |
//! | **Pad** | `imageops::replace` onto a square canvas |
//!
//! The module is split into:
//! - **Calculations**: the geometry planner and dimension math (unit testable)
//! - **Parameters**: data structures describing plans and encodings
//! - **Inspection**: dimensions and real transparency of a decoded asset
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: resizer, compositor, and format selector combining
//!   calculations + backend

pub mod backend;
mod calculations;
mod inspect;
mod jpeg_quality;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageAsset, ImageBackend};
pub use calculations::{
    aspect_difference, fit_within, kilobytes, max_resize_trials, paste_offset, plan,
};
pub use inspect::{Inspection, has_real_transparency, inspect};
pub use jpeg_quality::estimate_quality;
pub use operations::{
    AdaptiveResize, Rendered, adaptive_dimension, composite_square, render, resize_to_fit,
    select_encoding,
};
pub use params::{Disposition, Encoding, FillMode, NormalizationPlan, Quality, SourceFormat};
pub use rust_backend::{RustBackend, SUPPORTED_EXTENSIONS};
