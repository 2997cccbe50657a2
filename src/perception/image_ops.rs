//! Pixel-level helpers: change detection, average hashing, PNG blobs

use crate::core::error::Result;
use crate::core::types::{BoundingBox, Screen};
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, GrayImage, ImageEncoder, ImageFormat};

/// Fraction of pixels whose grayscale value moved by more than `pixel_delta`
///
/// Frames of different sizes count as entirely changed.
pub fn change_ratio(before: &Screen, after: &Screen, pixel_delta: u8) -> f64 {
    if before.dimensions() != after.dimensions() {
        return 1.0;
    }
    let total = before.width() as u64 * before.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let a = imageops::grayscale(before);
    let b = imageops::grayscale(after);
    let changed = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .filter(|(x, y)| x.abs_diff(**y) > pixel_delta)
        .count() as u64;
    changed as f64 / total as f64
}

/// 64-bit average hash: 8x8 grayscale, bit set where the pixel beats the mean
///
/// Bits are packed row-major, first pixel in the most significant bit.
pub fn average_hash(image: &Screen) -> u64 {
    if image.width() == 0 || image.height() == 0 {
        return 0;
    }
    let normalized = imageops::resize(image, 32, 32, FilterType::Triangle);
    let gray = imageops::grayscale(&normalized);
    let small = imageops::resize(&gray, 8, 8, FilterType::Triangle);
    let pixels = small.as_raw();
    let mean = pixels.iter().map(|p| *p as f64).sum::<f64>() / pixels.len() as f64;
    pixels
        .iter()
        .fold(0u64, |acc, p| (acc << 1) | u64::from(*p as f64 > mean))
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Standard deviation of grayscale values after a 32x32 resize
pub fn contrast(image: &Screen) -> f64 {
    if image.width() == 0 || image.height() == 0 {
        return 0.0;
    }
    let resized = imageops::resize(image, 32, 32, FilterType::Triangle);
    let gray = imageops::grayscale(&resized);
    std_dev(&gray)
}

fn std_dev(gray: &GrayImage) -> f64 {
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }
    let n = pixels.len() as f64;
    let mean = pixels.iter().map(|p| *p as f64).sum::<f64>() / n;
    let var = pixels
        .iter()
        .map(|p| {
            let d = *p as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

/// Copy of the region, clipped to the screen
pub fn crop(screen: &Screen, bbox: &BoundingBox) -> Screen {
    let x = bbox.x.min(screen.width());
    let y = bbox.y.min(screen.height());
    let w = bbox.width.min(screen.width() - x);
    let h = bbox.height.min(screen.height() - y);
    imageops::crop_imm(screen, x, y, w, h).to_image()
}

pub fn encode_png(image: &Screen) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;
    Ok(buf)
}

pub fn decode_png(bytes: &[u8]) -> Result<Screen> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgb8())
}
