//! # Gallery Curator
//!
//! Infers descriptive tags from raw images and uses a client's feedback to
//! narrow an artist's image pool down to a small set of loved images.
//!
//! - `analysis`: pixels → palette, tone and mood tags plus a dominant hue
//! - `curation`: ratings → tag pools → scores → three curation rounds
//! - `decode`: image files → RGBA buffers, parallel batch analysis
//! - `state`: image records, ratings and the SQLite catalog
//! - `config`: TOML configuration

pub mod analysis;
pub mod color;
pub mod config;
pub mod curation;
pub mod decode;
pub mod error;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
