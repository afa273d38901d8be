//! Quantized color histogram used for dominant-color extraction

use crate::color::{quant_level, Rgb, QUANT_LEVELS, QUANT_STEP};

const BUCKETS: usize = QUANT_LEVELS * QUANT_LEVELS * QUANT_LEVELS;

/// Histogram over quantized (R, G, B) buckets.
///
/// Each channel is rounded to the nearest multiple of 32, giving 9 levels
/// per channel and 729 buckets overall.
#[derive(Debug, Clone)]
pub struct ColorHistogram {
    counts: Vec<u32>,
    total: u64,
}

impl Default for ColorHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorHistogram {
    pub fn new() -> Self {
        Self {
            counts: vec![0; BUCKETS],
            total: 0,
        }
    }

    /// Count one pixel
    pub fn add(&mut self, r: u8, g: u8, b: u8) {
        let idx = quant_level(r) * QUANT_LEVELS * QUANT_LEVELS
            + quant_level(g) * QUANT_LEVELS
            + quant_level(b);
        self.counts[idx] += 1;
        self.total += 1;
    }

    /// Number of pixels counted so far
    pub fn total(&self) -> u64 {
        self.total
    }

    /// The `n` most frequent buckets, most frequent first.
    ///
    /// Ties are broken by bucket color (ascending) so the ranking never
    /// depends on iteration order.
    pub fn top(&self, n: usize) -> Vec<(Rgb, u32)> {
        let mut used: Vec<(Rgb, u32)> = self
            .counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(idx, &count)| (bucket_color(idx), count))
            .collect();

        used.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        used.truncate(n);
        used
    }
}

fn bucket_color(idx: usize) -> Rgb {
    let level = |l: usize| (l * QUANT_STEP as usize).min(255) as u8;
    let r = idx / (QUANT_LEVELS * QUANT_LEVELS);
    let g = (idx / QUANT_LEVELS) % QUANT_LEVELS;
    let b = idx % QUANT_LEVELS;
    Rgb::new(level(r), level(g), level(b))
}
