//! The three curation rounds
//!
//! Round 1 ranks every unrated gallery image against the sample pool and
//! splits the ranking into strong/medium/weak tiers. Round 2 surfaces a
//! shuffled handful of mid-score, veto-free images for a second look.
//! Round 3 collects everything the client said yes to.
//!
//! Every round is a pure function of (images, ratings). Results remember
//! the rating revision they were built from so callers can tell when they
//! have gone stale.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::pool::{aggregate, TagPool};
use super::score::{score_all, ScoredCandidate, Weights};
use super::CurationError;
use crate::state::{ImageId, ImageRecord, RatingBook, Sentiment, Tier, TierRound};

/// Where a curation session currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Client is rating sample images
    #[default]
    Sampling,
    TieredMatch,
    Exploration,
    Final,
    /// Terminal: the final gallery has been handed off
    Exported,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Sampling => "sampling",
            Stage::TieredMatch => "tiered_match",
            Stage::Exploration => "exploration",
            Stage::Final => "final",
            Stage::Exported => "exported",
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Sampling => Some(Stage::TieredMatch),
            Stage::TieredMatch => Some(Stage::Exploration),
            Stage::Exploration => Some(Stage::Final),
            Stage::Final => Some(Stage::Exported),
            Stage::Exported => None,
        }
    }

    /// Fail unless the session has reached `needed`
    pub fn require(&self, needed: Stage) -> Result<(), CurationError> {
        if *self >= needed {
            Ok(())
        } else {
            Err(CurationError::StageNotReached {
                current: *self,
                needed,
            })
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sampling" => Ok(Stage::Sampling),
            "tiered_match" => Ok(Stage::TieredMatch),
            "exploration" => Ok(Stage::Exploration),
            "final" => Ok(Stage::Final),
            "exported" => Ok(Stage::Exported),
            other => Err(format!("unknown curation stage '{}'", other)),
        }
    }
}

/// Round-1 tier thresholds and caps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
    /// Scores at or above this are strong
    pub strong_min: i64,
    /// Scores at or above this (and below `strong_min`) are medium
    pub medium_min: i64,
    pub strong_cap: usize,
    pub medium_cap: usize,
    pub weak_cap: usize,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            strong_min: 6,
            medium_min: 2,
            strong_cap: 8,
            medium_cap: 8,
            weak_cap: 4,
        }
    }
}

/// Round-2 score window and size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorePolicy {
    /// Inclusive lower bound
    pub min_score: i64,
    /// Exclusive upper bound
    pub max_score: i64,
    pub cap: usize,
}

impl Default for ExplorePolicy {
    fn default() -> Self {
        Self {
            min_score: 2,
            max_score: 6,
            cap: 15,
        }
    }
}

impl ExplorePolicy {
    pub fn admits(&self, score: i64) -> bool {
        score >= self.min_score && score < self.max_score
    }
}

/// Round-1 output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieredMatches {
    pub strong: Vec<ScoredCandidate>,
    pub medium: Vec<ScoredCandidate>,
    pub weak: Vec<ScoredCandidate>,
    /// Rating revision this ranking was computed from
    pub revision: u64,
}

impl TieredMatches {
    pub fn is_stale(&self, ratings: &RatingBook) -> bool {
        ratings.revision() != self.revision
    }

    pub fn len(&self) -> usize {
        self.strong.len() + self.medium.len() + self.weak.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every surfaced id, strong tier first
    pub fn ids(&self) -> impl Iterator<Item = ImageId> + '_ {
        self.strong
            .iter()
            .chain(&self.medium)
            .chain(&self.weak)
            .map(|c| c.image.id)
    }
}

/// Round-2 output: the surfaced items plus the client's tier for each
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExploratorySet {
    pub items: Vec<ScoredCandidate>,
    tiers: BTreeMap<ImageId, Tier>,
    pub revision: u64,
}

impl ExploratorySet {
    /// Tier for a surfaced item; maybe until the client says otherwise
    pub fn tier(&self, id: ImageId) -> Option<Tier> {
        if !self.items.iter().any(|c| c.image.id == id) {
            return None;
        }
        Some(self.tiers.get(&id).copied().unwrap_or_default())
    }

    pub fn is_stale(&self, ratings: &RatingBook) -> bool {
        ratings.revision() != self.revision
    }
}

/// Split a ranking into strong, medium and weak tiers.
///
/// The input is sorted by descending score (stable, so equal scores keep
/// their order) before each tier takes its first `cap` members.
pub fn partition_tiers(
    mut scored: Vec<ScoredCandidate>,
    policy: &TierPolicy,
) -> (Vec<ScoredCandidate>, Vec<ScoredCandidate>, Vec<ScoredCandidate>) {
    scored.sort_by(|a, b| b.score.cmp(&a.score));

    let mut strong = Vec::new();
    let mut medium = Vec::new();
    let mut weak = Vec::new();

    for candidate in scored {
        let (tier, cap) = if candidate.score >= policy.strong_min {
            (&mut strong, policy.strong_cap)
        } else if candidate.score >= policy.medium_min {
            (&mut medium, policy.medium_cap)
        } else {
            (&mut weak, policy.weak_cap)
        };
        if tier.len() < cap {
            tier.push(candidate);
        }
    }

    (strong, medium, weak)
}

/// Round configuration bundled with the scoring weights
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurationPipeline {
    pub weights: Weights,
    pub tiers: TierPolicy,
    pub explore: ExplorePolicy,
}

impl CurationPipeline {
    pub fn new(weights: Weights, tiers: TierPolicy, explore: ExplorePolicy) -> Self {
        Self {
            weights,
            tiers,
            explore,
        }
    }

    /// Pool built from the sample-eligible images and their sentiments
    pub fn tag_pool(&self, images: &[ImageRecord], ratings: &RatingBook) -> Result<TagPool, CurationError> {
        let samples: Vec<ImageRecord> = images
            .iter()
            .filter(|img| img.eligibility.sample_eligible)
            .cloned()
            .collect();
        aggregate(&samples, ratings.samples())
    }

    /// Round 1: rank unrated gallery images into tiers
    pub fn tiered_match(
        &self,
        images: &[ImageRecord],
        ratings: &RatingBook,
    ) -> Result<TieredMatches, CurationError> {
        let pool = self.tag_pool(images, ratings)?;

        let candidates = images
            .iter()
            .filter(|img| img.eligibility.gallery_eligible)
            .filter(|img| ratings.sentiment(img.id).is_none());

        let scored = score_all(candidates, &pool, &self.weights);
        let (strong, medium, weak) = partition_tiers(scored, &self.tiers);

        info!(
            strong = strong.len(),
            medium = medium.len(),
            weak = weak.len(),
            "Round 1 tiered match computed"
        );

        Ok(TieredMatches {
            strong,
            medium,
            weak,
            revision: ratings.revision(),
        })
    }

    /// Round 2 before the shuffle: veto-free, mid-score candidates in
    /// catalog order
    pub fn exploration_candidates(
        &self,
        images: &[ImageRecord],
        ratings: &RatingBook,
    ) -> Result<Vec<ScoredCandidate>, CurationError> {
        let pool = self.tag_pool(images, ratings)?;

        let candidates = images
            .iter()
            .filter(|img| img.eligibility.gallery_eligible)
            .filter(|img| ratings.sentiment(img.id).is_none())
            .filter(|img| ratings.tier(TierRound::Round1, img.id).is_none())
            .filter(|img| !pool.vetoes(img.metadata.provenance_tags()));

        let scored = score_all(candidates, &pool, &self.weights)
            .into_iter()
            .filter(|c| self.explore.admits(c.score))
            .collect();

        Ok(scored)
    }

    /// Round 2: shuffle the exploration candidates with `rng` and keep
    /// at most `explore.cap` of them
    pub fn explore<R: Rng + ?Sized>(
        &self,
        images: &[ImageRecord],
        ratings: &RatingBook,
        rng: &mut R,
    ) -> Result<ExploratorySet, CurationError> {
        let mut items = self.exploration_candidates(images, ratings)?;
        let eligible = items.len();

        items.shuffle(rng);
        items.truncate(self.explore.cap);

        let tiers = items
            .iter()
            .filter_map(|c| {
                ratings
                    .tier(TierRound::Round2, c.image.id)
                    .map(|tier| (c.image.id, tier))
            })
            .collect();

        info!(eligible, surfaced = items.len(), "Round 2 exploration computed");

        Ok(ExploratorySet {
            items,
            tiers,
            revision: ratings.revision(),
        })
    }

    /// Round 2 as shown to the client: `explore`, then every surfaced item
    /// without a tier is recorded in `ratings` as maybe. The returned set
    /// carries the revision after that write.
    pub fn surface<R: Rng + ?Sized>(
        &self,
        images: &[ImageRecord],
        ratings: &mut RatingBook,
        rng: &mut R,
    ) -> Result<ExploratorySet, CurationError> {
        let mut set = self.explore(images, ratings, rng)?;

        let surfaced: Vec<ImageId> = set.items.iter().map(|c| c.image.id).collect();
        ratings.default_tiers(TierRound::Round2, surfaced.iter().copied(), Tier::Maybe);

        set.tiers = surfaced
            .into_iter()
            .filter_map(|id| ratings.tier(TierRound::Round2, id).map(|tier| (id, tier)))
            .collect();
        set.revision = ratings.revision();
        Ok(set)
    }

    /// Record the client's tier for a candidate of round 1 or round 2.
    ///
    /// Round 1 only accepts ids in the current tiered match. Round 2 only
    /// accepts ids that were surfaced, which `surface` marks with a tier.
    pub fn rate_tier(
        &self,
        images: &[ImageRecord],
        ratings: &mut RatingBook,
        round: TierRound,
        id: ImageId,
        tier: Tier,
    ) -> Result<(), CurationError> {
        let offered = match round {
            TierRound::Round1 => self.tiered_match(images, ratings)?.ids().any(|c| c == id),
            TierRound::Round2 => ratings.tier(TierRound::Round2, id).is_some(),
        };
        if !offered {
            return Err(CurationError::NotCandidate { id, round });
        }

        ratings.set_tier(round, id, tier);
        Ok(())
    }

    /// Round 3: loved samples plus every yes from rounds 1 and 2.
    ///
    /// No scoring and no eligibility checks; catalog order, one entry per id.
    pub fn final_selection(&self, images: &[ImageRecord], ratings: &RatingBook) -> Vec<ImageRecord> {
        let mut seen = HashSet::new();

        let selected: Vec<ImageRecord> = images
            .iter()
            .filter(|img| {
                ratings.sentiment(img.id) == Some(Sentiment::Love)
                    || ratings.tier(TierRound::Round1, img.id) == Some(Tier::Yes)
                    || ratings.tier(TierRound::Round2, img.id) == Some(Tier::Yes)
            })
            .filter(|img| seen.insert(img.id))
            .cloned()
            .collect();

        info!(selected = selected.len(), "Round 3 final selection assembled");
        selected
    }

    /// Move to the next stage after the client confirms the current one
    pub fn confirm(&self, stage: Stage, ratings: &RatingBook) -> Result<Stage, CurationError> {
        if stage == Stage::Sampling && ratings.samples().is_empty() {
            return Err(CurationError::Transition {
                stage,
                reason: "rate at least one sample first".to_string(),
            });
        }

        stage.next().ok_or_else(|| CurationError::Transition {
            stage,
            reason: "the gallery has already been exported".to_string(),
        })
    }
}
