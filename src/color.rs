//! Pixel color math
//!
//! All helpers work on 8-bit sRGB channels in [0, 255]:
//! - brightness is the plain channel mean
//! - hue follows the standard RGB → HSL formula, in degrees [0, 360)
//! - saturation is the chroma ratio (max - min) / max

use serde::{Deserialize, Serialize};

/// Width of one quantization step per channel
pub const QUANT_STEP: u8 = 32;

/// Number of quantized levels per channel (0, 32, ..., 256 → clamped to 255)
pub const QUANT_LEVELS: usize = 9;

/// A single 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn brightness(&self) -> f64 {
        brightness(self.r, self.g, self.b)
    }

    pub fn hue(&self) -> f64 {
        hue(self.r, self.g, self.b)
    }

    pub fn saturation(&self) -> f64 {
        saturation(self.r, self.g, self.b)
    }

    /// Snap every channel to the nearest multiple of [`QUANT_STEP`]
    pub fn quantized(&self) -> Self {
        Self {
            r: quantize_channel(self.r),
            g: quantize_channel(self.g),
            b: quantize_channel(self.b),
        }
    }
}

/// Mean of the three channels
pub fn brightness(r: u8, g: u8, b: u8) -> f64 {
    (r as f64 + g as f64 + b as f64) / 3.0
}

/// Hue in degrees using the HSL formula.
///
/// Achromatic colors (max == min) have no defined hue and report 0.
pub fn hue(r: u8, g: u8, b: u8) -> f64 {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    if delta == 0.0 {
        return 0.0;
    }

    let sector = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    (sector * 60.0).rem_euclid(360.0)
}

/// Chroma ratio (max - min) / max, 0 for pure black
pub fn saturation(r: u8, g: u8, b: u8) -> f64 {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == 0 {
        return 0.0;
    }
    (max - min) as f64 / max as f64
}

/// True when all channels sit within 10 of each other (grey-ish pixel)
pub fn is_near_neutral(r: u8, g: u8, b: u8) -> bool {
    (r as i16 - g as i16).abs() < 10 && (g as i16 - b as i16).abs() < 10
}

/// Quantized level index in `0..QUANT_LEVELS`
pub fn quant_level(c: u8) -> usize {
    ((c as f64 / QUANT_STEP as f64).round()) as usize
}

/// Round a channel to the nearest multiple of 32, clamped to 255
pub fn quantize_channel(c: u8) -> u8 {
    (quant_level(c) * QUANT_STEP as usize).min(255) as u8
}
