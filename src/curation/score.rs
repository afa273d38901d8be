//! Candidate scoring against a tag pool

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::pool::TagPool;
use super::CurationError;
use crate::state::ImageRecord;

/// Contribution of one tag per pool it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub love: i64,
    pub like: i64,
    pub less: i64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            love: 3,
            like: 1,
            less: -5,
        }
    }
}

/// A candidate together with its score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub image: ImageRecord,
    pub score: i64,
}

/// Signed relevance of `candidate` against `pool`.
///
/// Each distinct tag adds the weight of every pool that contains it, so a
/// tag that is both loved and disliked counts both ways. The dominant hue
/// is not a tag and never contributes.
pub fn score(candidate: &ImageRecord, pool: &TagPool, weights: &Weights) -> Result<i64, CurationError> {
    let mut total = 0i64;

    for tag in candidate.metadata.tags() {
        if tag.trim().is_empty() {
            return Err(CurationError::Scoring {
                id: candidate.id,
                reason: "blank tag in metadata".to_string(),
            });
        }
        if pool.love.contains(tag) {
            total += weights.love;
        }
        if pool.like.contains(tag) {
            total += weights.like;
        }
        if pool.less.contains(tag) {
            total += weights.less;
        }
    }

    Ok(total)
}

/// Score every candidate, keeping input order.
///
/// Candidates that fail to score are logged and left out.
pub fn score_all<'a, I>(candidates: I, pool: &TagPool, weights: &Weights) -> Vec<ScoredCandidate>
where
    I: IntoIterator<Item = &'a ImageRecord>,
{
    candidates
        .into_iter()
        .filter_map(|image| match score(image, pool, weights) {
            Ok(score) => Some(ScoredCandidate {
                image: image.clone(),
                score,
            }),
            Err(e) => {
                warn!("Dropping candidate from ranking: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ImageId, TagGroup};
    use std::collections::BTreeSet;

    fn candidate(id: i64, tags: &[&str]) -> ImageRecord {
        let mut record = ImageRecord::new(ImageId(id), "x", "x");
        record.metadata.set_group(TagGroup::Image, tags.iter().copied());
        record
    }

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_loved_and_disliked_tags_sum() {
        let pool = TagPool {
            love: set(&["sunset", "warm"]),
            like: set(&[]),
            less: set(&["crowd"]),
        };
        let image = candidate(1, &["sunset", "crowd"]);

        assert_eq!(score(&image, &pool, &Weights::default()), Ok(-2));
    }

    #[test]
    fn test_overlapping_pools_count_twice() {
        let pool = TagPool {
            love: set(&["sea"]),
            like: set(&["sea"]),
            less: set(&["sea"]),
        };
        assert_eq!(score(&candidate(1, &["sea"]), &pool, &Weights::default()), Ok(3 + 1 - 5));
    }

    #[test]
    fn test_unknown_tags_score_zero() {
        let pool = TagPool {
            love: set(&["sunset"]),
            ..Default::default()
        };
        assert_eq!(score(&candidate(1, &["forest"]), &pool, &Weights::default()), Ok(0));
    }

    #[test]
    fn test_more_loved_tags_never_lower_the_score() {
        let pool = TagPool {
            love: set(&["a", "b", "c"]),
            like: set(&["x"]),
            less: set(&["y"]),
        };
        let weights = Weights::default();
        let mut previous = i64::MIN;
        for loved in [&[][..], &["a"][..], &["a", "b"][..], &["a", "b", "c"][..]] {
            let mut tags = vec!["x", "y", "z"];
            tags.extend_from_slice(loved);
            let s = score(&candidate(1, &tags), &pool, &weights).unwrap();
            assert!(s >= previous);
            previous = s;
        }
        assert_eq!(previous, 9 + 1 - 5);
    }

    #[test]
    fn test_custom_weights() {
        let pool = TagPool {
            like: set(&["a"]),
            ..Default::default()
        };
        let weights = Weights {
            love: 10,
            like: 4,
            less: -1,
        };
        assert_eq!(score(&candidate(1, &["a"]), &pool, &weights), Ok(4));
    }

    #[test]
    fn test_malformed_candidate_is_dropped() {
        let pool = TagPool {
            love: set(&["a"]),
            ..Default::default()
        };
        let good = candidate(1, &["a"]);
        let bad = candidate(2, &["a", ""]);

        assert!(matches!(score(&bad, &pool, &Weights::default()), Err(CurationError::Scoring { .. })));

        let scored = score_all([&good, &bad], &pool, &Weights::default());
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].image.id, ImageId(1));
        assert_eq!(scored[0].score, 3);
    }
}
