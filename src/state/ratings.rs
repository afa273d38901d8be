//! Client feedback on images
//!
//! Stores every human judgement made during curation:
//! - Sentiment (love/like/less) on sample images
//! - Tier codes (0/1/2) given to Round-1 and Round-2 candidates
//!
//! The book is a plain snapshot. Every mutation bumps `revision`, which
//! round results use to detect that they were computed from stale input.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::data::ImageId;

/// A client's judgement on a sample image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Love,
    Like,
    Less,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Love => "love",
            Sentiment::Like => "like",
            Sentiment::Less => "less",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "love" => Ok(Sentiment::Love),
            "like" => Ok(Sentiment::Like),
            "less" => Ok(Sentiment::Less),
            other => Err(format!("unknown sentiment '{}' (expected love, like or less)", other)),
        }
    }
}

/// Coarse rating given to a gallery candidate: 0 = less, 1 = maybe, 2 = yes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    Less = 0,
    #[default]
    Maybe = 1,
    Yes = 2,
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Tier::Less),
            1 => Ok(Tier::Maybe),
            2 => Ok(Tier::Yes),
            other => Err(format!("tier code must be 0, 1 or 2 (got {})", other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier as u8
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::Less => "less",
            Tier::Maybe => "maybe",
            Tier::Yes => "yes",
        };
        write!(f, "{} ({})", u8::from(*self), label)
    }
}

/// The two rounds that collect tier ratings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierRound {
    Round1,
    Round2,
}

impl TierRound {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierRound::Round1 => "round1",
            TierRound::Round2 => "round2",
        }
    }
}

impl FromStr for TierRound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round1" | "1" | "match" => Ok(TierRound::Round1),
            "round2" | "2" | "explore" => Ok(TierRound::Round2),
            other => Err(format!("unknown round '{}' (expected round1 or round2)", other)),
        }
    }
}

/// All ratings collected so far
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RatingBook {
    #[serde(default)]
    samples: BTreeMap<ImageId, Sentiment>,
    #[serde(default)]
    round1: BTreeMap<ImageId, Tier>,
    #[serde(default)]
    round2: BTreeMap<ImageId, Tier>,
    #[serde(default)]
    revision: u64,
}

impl RatingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the sentiment for a sample
    pub fn rate_sample(&mut self, id: ImageId, sentiment: Sentiment) {
        self.samples.insert(id, sentiment);
        self.revision += 1;
    }

    pub fn sentiment(&self, id: ImageId) -> Option<Sentiment> {
        self.samples.get(&id).copied()
    }

    pub fn samples(&self) -> &BTreeMap<ImageId, Sentiment> {
        &self.samples
    }

    /// Record (or overwrite) a tier rating for a round
    pub fn set_tier(&mut self, round: TierRound, id: ImageId, tier: Tier) {
        self.tiers_mut(round).insert(id, tier);
        self.revision += 1;
    }

    /// Give `tier` to every id that has no rating yet in `round`
    pub fn default_tiers<I>(&mut self, round: TierRound, ids: I, tier: Tier) -> usize
    where
        I: IntoIterator<Item = ImageId>,
    {
        let map = self.tiers_mut(round);
        let mut added = 0;
        for id in ids {
            if let std::collections::btree_map::Entry::Vacant(slot) = map.entry(id) {
                slot.insert(tier);
                added += 1;
            }
        }
        if added > 0 {
            self.revision += 1;
        }
        added
    }

    pub fn tier(&self, round: TierRound, id: ImageId) -> Option<Tier> {
        self.tiers(round).get(&id).copied()
    }

    pub fn tiers(&self, round: TierRound) -> &BTreeMap<ImageId, Tier> {
        match round {
            TierRound::Round1 => &self.round1,
            TierRound::Round2 => &self.round2,
        }
    }

    fn tiers_mut(&mut self, round: TierRound) -> &mut BTreeMap<ImageId, Tier> {
        match round {
            TierRound::Round1 => &mut self.round1,
            TierRound::Round2 => &mut self.round2,
        }
    }

    /// Monotonic change counter
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    /// True when no rating of any kind has been recorded
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.round1.is_empty() && self.round2.is_empty()
    }

    /// Convert to JSON string for storage or hand-off
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rerating_overwrites() {
        let mut book = RatingBook::new();
        book.rate_sample(ImageId(1), Sentiment::Like);
        book.rate_sample(ImageId(1), Sentiment::Love);

        assert_eq!(book.sentiment(ImageId(1)), Some(Sentiment::Love));
        assert_eq!(book.samples().len(), 1);
        assert_eq!(book.revision(), 2);
    }

    #[test]
    fn test_default_tiers_do_not_overwrite() {
        let mut book = RatingBook::new();
        book.set_tier(TierRound::Round2, ImageId(3), Tier::Yes);

        let added = book.default_tiers(
            TierRound::Round2,
            [ImageId(3), ImageId(4)],
            Tier::Maybe,
        );

        assert_eq!(added, 1);
        assert_eq!(book.tier(TierRound::Round2, ImageId(3)), Some(Tier::Yes));
        assert_eq!(book.tier(TierRound::Round2, ImageId(4)), Some(Tier::Maybe));
        assert_eq!(book.tier(TierRound::Round1, ImageId(4)), None);
    }

    #[test]
    fn test_json_round_trip() {
        let mut book = RatingBook::new();
        book.rate_sample(ImageId(10), Sentiment::Less);
        book.set_tier(TierRound::Round1, ImageId(11), Tier::Yes);

        let json = book.to_json().unwrap();
        assert!(json.contains("\"less\""));
        let restored = RatingBook::from_json(&json).unwrap();
        assert_eq!(book, restored);
    }

    #[test]
    fn test_tier_codes() {
        assert_eq!(Tier::try_from(2u8), Ok(Tier::Yes));
        assert!(Tier::try_from(3u8).is_err());
        assert_eq!(Tier::default(), Tier::Maybe);
        assert!(RatingBook::from_json(r#"{"round1":{"1":7}}"#).is_err());
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("LOVE".parse::<Sentiment>(), Ok(Sentiment::Love));
        assert!("meh".parse::<Sentiment>().is_err());
        assert_eq!("explore".parse::<TierRound>(), Ok(TierRound::Round2));
    }
}
