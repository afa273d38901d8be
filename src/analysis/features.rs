//! Deterministic feature extraction
//!
//! One pass over the pixels collects brightness/saturation statistics and a
//! quantized color histogram. Fixed-threshold rules then map those numbers
//! onto palette, tone and mood tags.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::histogram::ColorHistogram;
use super::ExtractionError;
use crate::color::{self, Rgb};

pub const LOW_KEY: &str = "low-key";
pub const HIGH_KEY: &str = "high-key";
pub const BLACK_DOMINANT: &str = "black-dominant";
pub const WHITE_DOMINANT: &str = "white-dominant";
pub const MONOCHROME: &str = "monochrome";
pub const BLACK_AND_WHITE: &str = "black and white";
pub const WARM_TONES: &str = "warm tones";
pub const COOL_TONES: &str = "cool tones";
pub const NEUTRAL: &str = "neutral";

pub const HIGH_CONTRAST: &str = "high contrast";
pub const SOFT_FOCUS: &str = "soft-focus";
pub const GRAINY: &str = "grainy";
pub const BACKLIT: &str = "backlit";

pub const CALM: &str = "calm";
pub const LONELY: &str = "lonely";
pub const EERIE: &str = "eerie";
pub const ROMANTIC: &str = "romantic";
pub const ENERGETIC: &str = "energetic";
pub const NOSTALGIC: &str = "nostalgic";

// Per-pixel classification
const BLACK_BRIGHTNESS: f64 = 40.0;
const WHITE_BRIGHTNESS: f64 = 220.0;
const COLORFUL_SATURATION: f64 = 0.1;

// Palette
const DOMINANT_RATIO: f64 = 0.7;
const KEYED_MAX_COLORFUL: f64 = 0.05;
const MONOCHROME_MAX_COLORFUL: f64 = 0.1;
const BW_RATIO: f64 = 0.7;
const TOP_BUCKETS: usize = 3;
const BUCKET_MIN_SATURATION: f64 = 0.1;

// Tone
const HIGH_CONTRAST_STD: f64 = 50.0;
const SOFT_FOCUS_STD: f64 = 20.0;
const GRAINY_MAX_MEAN: f64 = 100.0;
const GRAINY_MIN_STD: f64 = 35.0;
const BACKLIT_MARGIN: f64 = 30.0;

// Mood
const BRIGHT_MEAN: f64 = 150.0;
const DARK_MEAN: f64 = 80.0;
const DIM_MEAN: f64 = 100.0;
const LOW_VARIANCE_STD: f64 = 30.0;
const HIGH_VARIANCE_STD: f64 = 50.0;
const LOW_SATURATION: f64 = 0.3;
const HIGH_SATURATION: f64 = 0.5;
const NOSTALGIC_HUES: std::ops::RangeInclusive<u16> = 30..=70;

/// Borrowed RGBA8 pixel data, row-major
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    width: u32,
    height: u32,
    data: &'a [u8],
}

impl<'a> PixelBuffer<'a> {
    /// Wrap raw RGBA bytes, checking that the length matches the dimensions
    pub fn new(width: u32, height: u32, data: &'a [u8]) -> Result<Self, ExtractionError> {
        if width == 0 || height == 0 {
            return Err(ExtractionError::EmptyImage { width, height });
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .unwrap_or(usize::MAX);
        if data.len() != expected {
            return Err(ExtractionError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Color at (x, y); alpha is ignored
    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Rgb::new(self.data[i], self.data[i + 1], self.data[i + 2])
    }

    fn pixels(&self) -> impl Iterator<Item = Rgb> + '_ {
        self.data
            .chunks_exact(4)
            .map(|px| Rgb::new(px[0], px[1], px[2]))
    }
}

/// Whole-image statistics gathered in one pass
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelStats {
    pub mean_brightness: f64,
    /// Population standard deviation of brightness
    pub std_dev: f64,
    pub black_ratio: f64,
    pub white_ratio: f64,
    pub colorful_ratio: f64,
    pub bw_ratio: f64,
    /// Average brightness of the outermost rows and columns
    pub border_brightness: f64,
    /// Brightness of the exact center pixel
    pub center_brightness: f64,
}

/// Tags grouped by the dimension that produced them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub color_palette: Vec<String>,
    pub visual_tone: Vec<String>,
    pub mood: Vec<String>,
}

/// Result of analyzing one image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    /// De-duplicated union of every dimension
    pub tags: BTreeSet<String>,
    pub dimensions: Dimensions,
    /// Degrees in [0, 360), None when no bucket carries a reliable hue
    pub dominant_hue: Option<u16>,
}

impl Features {
    /// Neutral result used when an image cannot be analyzed
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.dominant_hue.is_none()
    }

    fn from_dimensions(dimensions: Dimensions, dominant_hue: Option<u16>) -> Self {
        let tags = dimensions
            .color_palette
            .iter()
            .chain(&dimensions.visual_tone)
            .chain(&dimensions.mood)
            .cloned()
            .collect();
        Self {
            tags,
            dimensions,
            dominant_hue,
        }
    }
}

/// Analyze one image
pub fn extract(buf: &PixelBuffer<'_>) -> Result<Features, ExtractionError> {
    let (stats, histogram) = measure(buf);

    let (color_palette, dominant_hue) = palette_tags(&stats, &histogram);
    let visual_tone = tone_tags(&stats);
    let mood = mood_tags(&stats, dominant_hue);

    debug!(
        width = buf.width(),
        height = buf.height(),
        mean = stats.mean_brightness,
        std_dev = stats.std_dev,
        ?dominant_hue,
        "extracted features"
    );

    Ok(Features::from_dimensions(
        Dimensions {
            color_palette,
            visual_tone,
            mood,
        },
        dominant_hue,
    ))
}

/// Analyze raw RGBA bytes, falling back to an empty result on bad input
pub fn extract_or_empty(width: u32, height: u32, data: &[u8]) -> Features {
    match PixelBuffer::new(width, height, data).and_then(|buf| extract(&buf)) {
        Ok(features) => features,
        Err(e) => {
            warn!("feature extraction failed, using empty tags: {}", e);
            Features::empty()
        }
    }
}

/// Collect statistics and the color histogram in a single pass
pub fn measure(buf: &PixelBuffer<'_>) -> (PixelStats, ColorHistogram) {
    let mut histogram = ColorHistogram::new();
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut black = 0u64;
    let mut white = 0u64;
    let mut colorful = 0u64;
    let mut bw = 0u64;

    for px in buf.pixels() {
        let brightness = px.brightness();
        sum += brightness;
        sum_sq += brightness * brightness;

        if brightness < BLACK_BRIGHTNESS {
            black += 1;
        }
        if brightness > WHITE_BRIGHTNESS {
            white += 1;
        }
        if px.saturation() > COLORFUL_SATURATION {
            colorful += 1;
        }
        if color::is_near_neutral(px.r, px.g, px.b) {
            bw += 1;
        }
        histogram.add(px.r, px.g, px.b);
    }

    let n = histogram.total().max(1) as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);

    let stats = PixelStats {
        mean_brightness: mean,
        std_dev: variance.sqrt(),
        black_ratio: black as f64 / n,
        white_ratio: white as f64 / n,
        colorful_ratio: colorful as f64 / n,
        bw_ratio: bw as f64 / n,
        border_brightness: border_brightness(buf),
        center_brightness: buf.pixel(buf.width() / 2, buf.height() / 2).brightness(),
    };

    (stats, histogram)
}

/// Mean brightness over the one-pixel frame around the image
fn border_brightness(buf: &PixelBuffer<'_>) -> f64 {
    let (w, h) = (buf.width(), buf.height());
    let mut sum = 0.0;
    let mut count = 0u64;

    let mut add = |x: u32, y: u32| {
        sum += buf.pixel(x, y).brightness();
        count += 1;
    };

    for y in 0..h {
        if y == 0 || y == h - 1 {
            for x in 0..w {
                add(x, y);
            }
        } else {
            add(0, y);
            if w > 1 {
                add(w - 1, y);
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Palette tags plus the dominant hue
pub fn palette_tags(stats: &PixelStats, histogram: &ColorHistogram) -> (Vec<String>, Option<u16>) {
    let mut tags = Vec::new();
    let black_dominant = stats.black_ratio > DOMINANT_RATIO;
    let white_dominant = stats.white_ratio > DOMINANT_RATIO;

    if black_dominant && stats.colorful_ratio < KEYED_MAX_COLORFUL {
        push_unique(&mut tags, LOW_KEY);
    }
    if white_dominant && stats.colorful_ratio < KEYED_MAX_COLORFUL {
        push_unique(&mut tags, HIGH_KEY);
    }
    if black_dominant {
        push_unique(&mut tags, BLACK_DOMINANT);
    }
    if white_dominant {
        push_unique(&mut tags, WHITE_DOMINANT);
    }
    if stats.colorful_ratio < MONOCHROME_MAX_COLORFUL {
        push_unique(&mut tags, MONOCHROME);
    }
    if stats.bw_ratio > BW_RATIO {
        push_unique(&mut tags, BLACK_AND_WHITE);
    }

    let mut dominant_hue = None;
    if !black_dominant && !white_dominant && stats.colorful_ratio >= MONOCHROME_MAX_COLORFUL {
        for (bucket, _) in histogram.top(TOP_BUCKETS) {
            if bucket.saturation() < BUCKET_MIN_SATURATION {
                continue;
            }
            let hue = bucket.hue();
            push_unique(&mut tags, hue_family(hue));
            if dominant_hue.is_none() {
                dominant_hue = Some(round_hue(hue));
            }
        }
    }

    (tags, dominant_hue)
}

fn hue_family(hue: f64) -> &'static str {
    if (0.0..50.0).contains(&hue) {
        WARM_TONES
    } else if (180.0..260.0).contains(&hue) {
        COOL_TONES
    } else {
        NEUTRAL
    }
}

/// Nearest whole degree, wrapping 360 back to 0
fn round_hue(hue: f64) -> u16 {
    (hue.round() as u16) % 360
}

pub fn tone_tags(stats: &PixelStats) -> Vec<String> {
    let mut tags = Vec::new();

    if stats.std_dev > HIGH_CONTRAST_STD {
        push_unique(&mut tags, HIGH_CONTRAST);
    }
    if stats.std_dev < SOFT_FOCUS_STD {
        push_unique(&mut tags, SOFT_FOCUS);
    }
    if stats.mean_brightness < GRAINY_MAX_MEAN && stats.std_dev > GRAINY_MIN_STD {
        push_unique(&mut tags, GRAINY);
    }
    if stats.border_brightness - stats.center_brightness > BACKLIT_MARGIN {
        push_unique(&mut tags, BACKLIT);
    }

    tags
}

/// Independent mood rules; any number may fire
pub fn mood_tags(stats: &PixelStats, dominant_hue: Option<u16>) -> Vec<String> {
    let mut tags = Vec::new();

    let bright = stats.mean_brightness > BRIGHT_MEAN;
    let dark = stats.mean_brightness < DARK_MEAN;
    let dim = stats.mean_brightness < DIM_MEAN;
    let low_variance = stats.std_dev < LOW_VARIANCE_STD;
    let high_variance = stats.std_dev > HIGH_VARIANCE_STD;
    let low_saturation = stats.colorful_ratio < LOW_SATURATION;
    let saturated = stats.colorful_ratio > HIGH_SATURATION;

    if bright && low_variance && low_saturation {
        push_unique(&mut tags, CALM);
    }
    if dark && low_variance && low_saturation {
        push_unique(&mut tags, LONELY);
    }
    if high_variance && dim && low_saturation {
        push_unique(&mut tags, EERIE);
    }
    if saturated && bright && low_variance {
        push_unique(&mut tags, ROMANTIC);
    }
    if high_variance && saturated {
        push_unique(&mut tags, ENERGETIC);
    }
    if dominant_hue.is_some_and(|h| NOSTALGIC_HUES.contains(&h)) {
        push_unique(&mut tags, NOSTALGIC);
    }

    tags
}

fn push_unique(tags: &mut Vec<String>, tag: &str) {
    if !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
}
