//! Image provider
//!
//! Turns an image file into a decoded RGBA buffer ready for analysis.
//! Ordinary formats go through the `image` crate directly; camera RAW files
//! are read through the largest JPEG preview embedded in them.

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;
use tracing::debug;

use crate::analysis::{ExtractionError, PixelBuffer};

/// Formats decoded directly
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"];

/// Supported RAW file extensions (common formats)
pub const RAW_EXTENSIONS: &[&str] = &[
    "nef", "dng", "cr2", "cr3", "arw", "raf", "orf", "rw2", "pef", "srw", "erf", "kdc", "dcr",
    "mos", "raw", "rwl",
];

/// Embedded previews smaller than this are usually tiny thumbnails
const MIN_PREVIEW_BYTES: usize = 10_000;

/// An owned, decoded RGBA8 image
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    pub fn pixels(&self) -> Result<PixelBuffer<'_>, ExtractionError> {
        PixelBuffer::new(self.width, self.height, &self.rgba)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

pub fn is_raw(path: &Path) -> bool {
    extension(path).is_some_and(|ext| RAW_EXTENSIONS.contains(&ext.as_str()))
}

/// True for files the loader knows how to decode
pub fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| {
        IMAGE_EXTENSIONS.contains(&ext.as_str()) || RAW_EXTENSIONS.contains(&ext.as_str())
    })
}

/// Decode `path` and shrink it so neither side exceeds `max_dimension`
/// (0 keeps the original size)
pub fn decode_file(path: &Path, max_dimension: u32) -> Result<DecodedImage, ExtractionError> {
    let decode_err = |reason: String| ExtractionError::Decode {
        path: path.display().to_string(),
        reason,
    };

    let img = if is_raw(path) {
        let data = std::fs::read(path).map_err(|e| decode_err(e.to_string()))?;
        let jpeg = scan_for_largest_jpeg(&data, MIN_PREVIEW_BYTES)
            .ok_or_else(|| decode_err("no embedded JPEG preview found".to_string()))?;
        image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .map_err(|e| decode_err(e.to_string()))?
    } else {
        image::open(path).map_err(|e| decode_err(e.to_string()))?
    };

    Ok(to_rgba(img, max_dimension))
}

/// Downscale (keeping aspect ratio) and flatten to RGBA8
pub fn to_rgba(img: DynamicImage, max_dimension: u32) -> DecodedImage {
    let (w, h) = img.dimensions();
    let img = if max_dimension > 0 && (w > max_dimension || h > max_dimension) {
        img.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        img
    };

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    debug!("Decoded {}x{} (source {}x{})", width, height, w, h);

    DecodedImage {
        width,
        height,
        rgba: rgba.into_raw(),
    }
}

/// Scan a buffer for JPEG markers and return the largest complete JPEG
/// of at least `min_size` bytes
pub fn scan_for_largest_jpeg(buffer: &[u8], min_size: usize) -> Option<&[u8]> {
    let jpeg_start = b"\xff\xd8\xff"; // JPEG Start Of Image (SOI)
    let jpeg_end = b"\xff\xd9"; // JPEG End Of Image (EOI)

    let mut largest: Option<&[u8]> = None;
    let mut pos = 0;

    while pos + jpeg_start.len() <= buffer.len() {
        if !buffer[pos..].starts_with(jpeg_start) {
            pos += 1;
            continue;
        }

        // Find the corresponding EOI
        match buffer[pos..]
            .windows(2)
            .position(|w| w == jpeg_end)
            .map(|p| pos + p + 2)
        {
            Some(end) => {
                let candidate = &buffer[pos..end];
                if candidate.len() >= min_size && largest.map_or(true, |l| candidate.len() > l.len()) {
                    largest = Some(candidate);
                }
                pos = end;
            }
            None => break,
        }
    }

    largest
}
