//! Shared data structures for the curation state
//!
//! These structs represent the data model that flows between
//! the catalog database, the analysis layer and the curation rounds.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::Features;

/// Stable identity of an image across the whole pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub i64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which producer a group of tags came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagGroup {
    /// Supplied by a tagging service or entered by hand
    Image,
    /// Derived from the display name
    Text,
    Tone,
    Mood,
    Palette,
}

/// Gates controlling which pipeline stages may consider an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub scrape_eligible: bool,
    pub gallery_eligible: bool,
    pub sample_eligible: bool,
}

impl Default for Eligibility {
    fn default() -> Self {
        Self {
            scrape_eligible: true,
            gallery_eligible: true,
            sample_eligible: false,
        }
    }
}

/// Descriptive metadata attached to an image.
///
/// `tags` always mirrors the union of the five provenance groups; the
/// groups are only changed through methods that keep it in sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    image_tags: Vec<String>,
    #[serde(default)]
    text_tags: Vec<String>,
    #[serde(default)]
    tone_tags: Vec<String>,
    #[serde(default)]
    mood_tags: Vec<String>,
    #[serde(default)]
    palette_tags: Vec<String>,
    #[serde(default)]
    dominant_hue: Option<u16>,
}

impl ImageMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of all provenance groups
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn dominant_hue(&self) -> Option<u16> {
        self.dominant_hue
    }

    pub fn group(&self, group: TagGroup) -> &[String] {
        match group {
            TagGroup::Image => &self.image_tags,
            TagGroup::Text => &self.text_tags,
            TagGroup::Tone => &self.tone_tags,
            TagGroup::Mood => &self.mood_tags,
            TagGroup::Palette => &self.palette_tags,
        }
    }

    /// True once an extraction has left palette, tone, mood or hue data
    pub fn has_visual_tags(&self) -> bool {
        !self.palette_tags.is_empty()
            || !self.tone_tags.is_empty()
            || !self.mood_tags.is_empty()
            || self.dominant_hue.is_some()
    }

    /// Every tag from every provenance group, in group order (may repeat)
    pub fn provenance_tags(&self) -> impl Iterator<Item = &String> {
        self.image_tags
            .iter()
            .chain(&self.text_tags)
            .chain(&self.tone_tags)
            .chain(&self.mood_tags)
            .chain(&self.palette_tags)
    }

    /// Replace one provenance group (explicit re-tag)
    pub fn set_group<I, S>(&mut self, group: TagGroup, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slot = self.group_mut(group);
        slot.clear();
        for tag in tags {
            push_unique(slot, tag.into());
        }
        self.rebuild_union();
    }

    /// Add tags to a group without dropping what is already there
    pub fn extend_group<I, S>(&mut self, group: TagGroup, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slot = self.group_mut(group);
        for tag in tags {
            push_unique(slot, tag.into());
        }
        self.rebuild_union();
    }

    /// Merge a fresh extraction result.
    ///
    /// The palette, tone and mood groups and the dominant hue are overwritten;
    /// image and text tags are kept.
    pub fn apply_features(&mut self, features: &Features) {
        self.palette_tags = dedup(&features.dimensions.color_palette);
        self.tone_tags = dedup(&features.dimensions.visual_tone);
        self.mood_tags = dedup(&features.dimensions.mood);
        self.dominant_hue = features.dominant_hue;
        self.rebuild_union();
    }

    fn group_mut(&mut self, group: TagGroup) -> &mut Vec<String> {
        match group {
            TagGroup::Image => &mut self.image_tags,
            TagGroup::Text => &mut self.text_tags,
            TagGroup::Tone => &mut self.tone_tags,
            TagGroup::Mood => &mut self.mood_tags,
            TagGroup::Palette => &mut self.palette_tags,
        }
    }

    fn rebuild_union(&mut self) {
        self.tags = self.provenance_tags().cloned().collect();
    }

    /// Restore the union after deserializing data written elsewhere
    pub fn normalized(mut self) -> Self {
        for group in [
            TagGroup::Image,
            TagGroup::Text,
            TagGroup::Tone,
            TagGroup::Mood,
            TagGroup::Palette,
        ] {
            let deduped = dedup(self.group(group));
            *self.group_mut(group) = deduped;
        }
        self.rebuild_union();
        self
    }
}

/// One image in the artist's pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: ImageId,
    /// Display name (e.g., "sunset_beach.jpg")
    pub name: String,
    /// Lookup key for the pixel data; the record never owns the bytes
    pub source: String,
    pub metadata: ImageMetadata,
    #[serde(flatten)]
    pub eligibility: Eligibility,
}

impl ImageRecord {
    pub fn new(id: ImageId, name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        let mut metadata = ImageMetadata::new();
        metadata.set_group(TagGroup::Text, text_tags_from_name(&name));
        Self {
            id,
            name,
            source: source.into(),
            metadata,
            eligibility: Eligibility::default(),
        }
    }

    pub fn with_eligibility(mut self, eligibility: Eligibility) -> Self {
        self.eligibility = eligibility;
        self
    }
}

/// Camera and export prefixes that carry no meaning as tags
const NAME_STOPWORDS: &[&str] = &[
    "img", "dsc", "dscn", "dscf", "pxl", "jpg", "jpeg", "png", "webp", "tif", "tiff", "gif",
    "bmp", "raw", "nef", "dng", "cr2", "cr3", "arw", "raf", "orf", "rw2", "edit", "copy",
    "final", "the", "and",
];

/// Keywords from a display name: lower-cased words of 3+ letters,
/// without the extension, digits-only chunks or camera prefixes.
pub fn text_tags_from_name(name: &str) -> Vec<String> {
    let stem = match name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => name,
    };

    let mut tags = Vec::new();
    for word in stem.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() < 3
            || word.chars().all(|c| c.is_ascii_digit())
            || NAME_STOPWORDS.contains(&word.as_str())
        {
            continue;
        }
        push_unique(&mut tags, word);
    }
    tags
}

fn push_unique(tags: &mut Vec<String>, tag: String) {
    if !tags.contains(&tag) {
        tags.push(tag);
    }
}

fn dedup(tags: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        push_unique(&mut out, tag.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Dimensions;

    fn features(palette: &[&str], tone: &[&str], mood: &[&str], hue: Option<u16>) -> Features {
        let dimensions = Dimensions {
            color_palette: palette.iter().map(|s| s.to_string()).collect(),
            visual_tone: tone.iter().map(|s| s.to_string()).collect(),
            mood: mood.iter().map(|s| s.to_string()).collect(),
        };
        Features {
            tags: palette.iter().chain(tone).chain(mood).map(|s| s.to_string()).collect(),
            dimensions,
            dominant_hue: hue,
        }
    }

    #[test]
    fn test_default_eligibility() {
        let e = Eligibility::default();
        assert!(e.scrape_eligible);
        assert!(e.gallery_eligible);
        assert!(!e.sample_eligible);
    }

    #[test]
    fn test_text_tags_from_name() {
        assert_eq!(
            text_tags_from_name("Sunset_beach-2021.JPG"),
            vec!["sunset".to_string(), "beach".to_string()]
        );
        assert_eq!(text_tags_from_name("IMG_0042.jpg"), Vec::<String>::new());
        assert_eq!(text_tags_from_name("fog fog forest"), vec!["fog", "forest"]);
    }

    #[test]
    fn test_union_tracks_groups() {
        let mut meta = ImageMetadata::new();
        meta.set_group(TagGroup::Image, ["portrait", "studio", "portrait"]);
        meta.extend_group(TagGroup::Text, ["studio", "ink"]);

        assert_eq!(meta.group(TagGroup::Image), ["portrait", "studio"]);
        let union: Vec<&str> = meta.tags().iter().map(String::as_str).collect();
        assert_eq!(union, vec!["ink", "portrait", "studio"]);
    }

    #[test]
    fn test_apply_features_keeps_image_and_text_groups() {
        let mut meta = ImageMetadata::new();
        meta.set_group(TagGroup::Image, ["portrait"]);
        meta.set_group(TagGroup::Text, ["sunset"]);
        meta.apply_features(&features(&["warm tones"], &["grainy"], &["calm"], Some(20)));

        // Re-tag replaces the extraction groups only
        meta.apply_features(&features(&["cool tones"], &[], &[], None));

        assert_eq!(meta.group(TagGroup::Palette), ["cool tones"]);
        assert!(meta.group(TagGroup::Tone).is_empty());
        assert_eq!(meta.dominant_hue(), None);
        assert!(meta.tags().contains("portrait"));
        assert!(meta.tags().contains("sunset"));
        assert!(!meta.tags().contains("grainy"));
    }

    #[test]
    fn test_normalized_rebuilds_union() {
        let json = r#"{"tags":[],"imageTags":["a","a","b"],"moodTags":["calm"]}"#;
        let meta: ImageMetadata = serde_json::from_str(json).unwrap();
        let meta = meta.normalized();

        assert_eq!(meta.group(TagGroup::Image), ["a", "b"]);
        assert_eq!(meta.tags().len(), 3);
    }

    #[test]
    fn test_new_record_derives_text_tags() {
        let record = ImageRecord::new(ImageId(7), "misty_harbor.png", "/art/misty_harbor.png");
        assert_eq!(record.metadata.group(TagGroup::Text), ["misty", "harbor"]);
        assert!(record.metadata.tags().contains("harbor"));
    }
}
