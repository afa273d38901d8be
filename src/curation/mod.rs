//! Feedback-driven curation
//!
//! Turns a sparse set of client ratings into ranked gallery candidates:
//! - Sentiment tag pools built from rated samples (pool.rs)
//! - Signed relevance scores against a pool (score.rs)
//! - The three curation rounds and the stage machine (rounds.rs)

pub mod pool;
pub mod rounds;
pub mod score;

pub use pool::{aggregate, TagPool};
pub use rounds::{
    partition_tiers, CurationPipeline, ExplorePolicy, ExploratorySet, Stage, TierPolicy,
    TieredMatches,
};
pub use score::{score, score_all, ScoredCandidate, Weights};

use thiserror::Error;

use crate::state::{ImageId, TierRound};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurationError {
    /// The tag pool could not be built; the whole round is abandoned
    #[error("tag pool aggregation failed: {0}")]
    Aggregation(String),

    /// One candidate could not be scored; only that candidate is dropped
    #[error("cannot score image {id}: {reason}")]
    Scoring { id: ImageId, reason: String },

    #[error("this round needs stage '{needed}', curation is at '{current}'")]
    StageNotReached { current: Stage, needed: Stage },

    #[error("cannot leave stage '{stage}': {reason}")]
    Transition { stage: Stage, reason: String },

    /// A tier was given to an image that round never offered
    #[error("image {id} is not a {} candidate", .round.as_str())]
    NotCandidate { id: ImageId, round: TierRound },
}
