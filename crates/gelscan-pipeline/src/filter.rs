//! Noise removal applied to the selected channels only.
//!
//! Each channel is filtered as an independent plane. 8-bit planes are
//! handed to [`imageproc::filter::median_filter`]; 16-bit planes, which
//! `imageproc` does not accept, use an equivalent window median with the
//! same edge clamping.

use image::{GrayImage, Luma};

use crate::types::{BitDepth, GelImage, NoiseFilter};

/// Half-width of the square median window (a 7×7 neighbourhood).
pub const MEDIAN_RADIUS: u32 = 3;

/// Apply `filters` in order to the channels listed in `channels`.
///
/// Channels not listed are copied unchanged. An empty filter list returns
/// the image as-is.
#[must_use = "returns the filtered image"]
pub fn apply_filters(image: &GelImage, filters: &[NoiseFilter], channels: &[usize]) -> GelImage {
    let mut filtered = image.clone();
    for filter in filters {
        filtered = match filter {
            NoiseFilter::Median => median(&filtered, channels, MEDIAN_RADIUS),
        };
    }
    filtered
}

/// Median-filter the listed channels with a square window of `radius`.
#[must_use = "returns the filtered image"]
pub fn median(image: &GelImage, channels: &[usize], radius: u32) -> GelImage {
    let mut out = image.clone();
    let stride = usize::from(image.channels());

    for &c in channels.iter().filter(|&&c| c < stride) {
        let plane: Vec<u16> = image.samples().iter().skip(c).step_by(stride).copied().collect();
        let filtered = match image.bit_depth() {
            BitDepth::Eight => median_u8(&plane, image.width(), image.height(), radius),
            BitDepth::Sixteen => median_u16(&plane, image.width(), image.height(), radius),
        };
        for (dst, v) in out.samples_mut().iter_mut().skip(c).step_by(stride).zip(filtered) {
            *dst = v;
        }
    }
    out
}

fn median_u8(plane: &[u16], width: u32, height: u32, radius: u32) -> Vec<u16> {
    let gray = GrayImage::from_fn(width, height, |x, y| {
        let v = plane[(y * width + x) as usize];
        Luma([u8::try_from(v).unwrap_or(u8::MAX)])
    });
    imageproc::filter::median_filter(&gray, radius, radius)
        .into_raw()
        .into_iter()
        .map(u16::from)
        .collect()
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn median_u16(plane: &[u16], width: u32, height: u32, radius: u32) -> Vec<u16> {
    let (w, h) = (i64::from(width), i64::from(height));
    let r = i64::from(radius);
    let mut window = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    let mut out = Vec::with_capacity(plane.len());

    for y in 0..h {
        for x in 0..w {
            window.clear();
            for dy in -r..=r {
                let sy = (y + dy).clamp(0, h - 1);
                for dx in -r..=r {
                    let sx = (x + dx).clamp(0, w - 1);
                    window.push(plane[(sy * w + sx) as usize]);
                }
            }
            let mid = window.len() / 2;
            let (_, m, _) = window.select_nth_unstable(mid);
            out.push(*m);
        }
    }
    out
}
