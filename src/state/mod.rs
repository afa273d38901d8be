//! State management module
//!
//! This module handles all curation state, including:
//! - Shared data structures (data.rs)
//! - Client ratings and their revision counter (ratings.rs)
//! - Database connections and queries (library.rs)

pub mod data;
pub mod library;
pub mod ratings;

pub use data::{Eligibility, ImageId, ImageMetadata, ImageRecord, TagGroup};
pub use library::Library;
pub use ratings::{RatingBook, Sentiment, Tier, TierRound};
