//! Image decoding module
//!
//! This module handles:
//! - Decoding image files (and embedded JPEG previews in RAW files)
//! - Downscaling to the analysis size
//! - Fanning feature extraction out over worker tasks

pub mod batch;
pub mod loader;

pub use batch::{analyze_batch, analyze_path, AnalysisJob, AnalysisOutcome};
pub use loader::{decode_file, is_supported, DecodedImage};
