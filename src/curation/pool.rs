//! Sentiment tag pools

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;

use super::CurationError;
use crate::state::{ImageId, ImageRecord, Sentiment};

/// Every tag seen on rated samples, split by the sentiment of the sample.
///
/// The three sets are not forced to be disjoint: a tag found on both a
/// loved and a disliked sample sits in both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagPool {
    pub love: BTreeSet<String>,
    pub like: BTreeSet<String>,
    pub less: BTreeSet<String>,
}

impl TagPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_mut(&mut self, sentiment: Sentiment) -> &mut BTreeSet<String> {
        match sentiment {
            Sentiment::Love => &mut self.love,
            Sentiment::Like => &mut self.like,
            Sentiment::Less => &mut self.less,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.love.is_empty() && self.like.is_empty() && self.less.is_empty()
    }

    /// True when any of `tags` is disliked
    pub fn vetoes<'a>(&self, mut tags: impl Iterator<Item = &'a String>) -> bool {
        tags.any(|tag| self.less.contains(tag))
    }
}

/// Build a fresh pool from a snapshot of samples and their ratings.
///
/// Unrated samples are ignored. Fails when the snapshot is inconsistent:
/// the same sample id listed twice, or a rated sample carrying a blank tag.
pub fn aggregate(
    samples: &[ImageRecord],
    ratings: &BTreeMap<ImageId, Sentiment>,
) -> Result<TagPool, CurationError> {
    let mut pool = TagPool::new();
    let mut seen = HashSet::with_capacity(samples.len());

    for sample in samples {
        if !seen.insert(sample.id) {
            return Err(CurationError::Aggregation(format!(
                "sample {} appears more than once",
                sample.id
            )));
        }

        let Some(&sentiment) = ratings.get(&sample.id) else {
            continue;
        };

        for tag in sample.metadata.provenance_tags() {
            if tag.trim().is_empty() {
                return Err(CurationError::Aggregation(format!(
                    "sample {} carries a blank tag",
                    sample.id
                )));
            }
            pool.set_mut(sentiment).insert(tag.clone());
        }
    }

    debug!(
        love = pool.love.len(),
        like = pool.like.len(),
        less = pool.less.len(),
        "tag pool aggregated"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TagGroup;

    fn sample(id: i64, tags: &[&str]) -> ImageRecord {
        let mut record = ImageRecord::new(ImageId(id), format!("{}", id), format!("/s/{}", id));
        record.metadata.set_group(TagGroup::Image, tags.iter().copied());
        record
    }

    #[test]
    fn test_tags_land_in_their_sentiment_pool() {
        let samples = vec![
            sample(1, &["sunset", "warm"]),
            sample(2, &["crowd"]),
            sample(3, &["beach"]),
            sample(4, &["ignored"]),
        ];
        let ratings = BTreeMap::from([
            (ImageId(1), Sentiment::Love),
            (ImageId(2), Sentiment::Less),
            (ImageId(3), Sentiment::Like),
        ]);

        let pool = aggregate(&samples, &ratings).unwrap();

        assert_eq!(pool.love, BTreeSet::from(["sunset".to_string(), "warm".to_string()]));
        assert_eq!(pool.like, BTreeSet::from(["beach".to_string()]));
        assert_eq!(pool.less, BTreeSet::from(["crowd".to_string()]));
        assert!(!pool.love.contains("ignored"));
    }

    #[test]
    fn test_tag_can_sit_in_several_pools() {
        let samples = vec![sample(1, &["sea"]), sample(2, &["sea"])];
        let ratings = BTreeMap::from([(ImageId(1), Sentiment::Love), (ImageId(2), Sentiment::Less)]);

        let pool = aggregate(&samples, &ratings).unwrap();
        assert!(pool.love.contains("sea"));
        assert!(pool.less.contains("sea"));
    }

    #[test]
    fn test_no_ratings_gives_empty_pool() {
        let pool = aggregate(&[sample(1, &["sea"])], &BTreeMap::new()).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_duplicate_sample_fails() {
        let samples = vec![sample(1, &["a"]), sample(1, &["b"])];
        let err = aggregate(&samples, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, CurationError::Aggregation(_)));
    }

    #[test]
    fn test_blank_tag_on_rated_sample_fails() {
        let samples = vec![sample(1, &["ok", "  "])];
        let ratings = BTreeMap::from([(ImageId(1), Sentiment::Like)]);
        assert!(aggregate(&samples, &ratings).is_err());

        // Unrated samples are never inspected
        assert!(aggregate(&samples, &BTreeMap::new()).is_ok());
    }
}
