//! Visual feature analysis
//!
//! Turns decoded pixel data into descriptive tags:
//! - Quantized color histogram for dominant colors (histogram.rs)
//! - Palette, tone and mood tagging rules (features.rs)

pub mod features;
pub mod histogram;

pub use features::{extract, extract_or_empty, Dimensions, Features, PixelBuffer, PixelStats};

use thiserror::Error;

/// An image could not be analyzed.
///
/// Always isolated to one image: callers fall back to [`Features::empty`].
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
}
