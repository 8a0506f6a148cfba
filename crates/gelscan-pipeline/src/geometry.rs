//! Geometry and polarity: clockwise quarter-turn rotation and inversion.
//!
//! Both operations are the first stage of preprocessing and return new
//! images; the source is never mutated.

use crate::types::{GelImage, Rotation};

/// Rotate an image clockwise by the given number of quarter turns.
///
/// Follows the same coordinate convention as
/// [`image::imageops::rotate90`]: a 90° turn maps source pixel `(x, y)`
/// to `(height - 1 - y, x)`.
#[must_use = "returns the rotated image"]
pub fn rotate(image: &GelImage, rotation: Rotation) -> GelImage {
    let (w, h) = (image.width(), image.height());
    let dims = rotation.rotated(image.dimensions());

    match rotation {
        Rotation::None => image.clone(),
        Rotation::Quarter => remap(image, dims.width, dims.height, |x, y| (y, h - 1 - x)),
        Rotation::Half => remap(image, dims.width, dims.height, |x, y| (w - 1 - x, h - 1 - y)),
        Rotation::ThreeQuarter => remap(image, dims.width, dims.height, |x, y| (w - 1 - y, x)),
    }
}

/// Build a `width × height` image whose pixel `(x, y)` is copied from
/// `source(x, y)` in the input.
fn remap(
    image: &GelImage,
    width: u32,
    height: u32,
    source: impl Fn(u32, u32) -> (u32, u32),
) -> GelImage {
    GelImage::from_fn(width, height, image.channels(), image.bit_depth(), |x, y, c| {
        let (sx, sy) = source(x, y);
        image.sample(sx, sy, c)
    })
    .with_alpha(image.has_alpha())
}

/// Invert every color sample: `v -> max_value - v`.
#[must_use = "returns the inverted image"]
pub fn invert(image: &GelImage) -> GelImage {
    let max = image.max_value();
    let mut inverted = image.clone();
    for v in inverted.samples_mut() {
        *v = max - *v;
    }
    inverted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BitDepth;

    /// 3×2 single-channel image with distinct values:
    ///
    /// ```text
    /// 1 2 3
    /// 4 5 6
    /// ```
    fn numbered() -> GelImage {
        GelImage::from_fn(3, 2, 1, BitDepth::Eight, |x, y, _| {
            u16::try_from(y * 3 + x + 1).unwrap_or(0)
        })
    }

    fn rows(image: &GelImage) -> Vec<Vec<u16>> {
        (0..image.height()).map(|y| image.row(y).to_vec()).collect()
    }

    #[test]
    fn no_rotation_is_identity() {
        let img = numbered();
        assert_eq!(rotate(&img, Rotation::None), img);
    }

    #[test]
    fn quarter_turn_is_clockwise() {
        let rotated = rotate(&numbered(), Rotation::Quarter);
        assert_eq!(rotated.width(), 2);
        assert_eq!(rotated.height(), 3);
        assert_eq!(rows(&rotated), vec![vec![4, 1], vec![5, 2], vec![6, 3]]);
    }

    #[test]
    fn half_turn_reverses_both_axes() {
        let rotated = rotate(&numbered(), Rotation::Half);
        assert_eq!(rows(&rotated), vec![vec![6, 5, 4], vec![3, 2, 1]]);
    }

    #[test]
    fn three_quarter_turn_is_counter_clockwise() {
        let rotated = rotate(&numbered(), Rotation::ThreeQuarter);
        assert_eq!(rows(&rotated), vec![vec![3, 6], vec![2, 5], vec![1, 4]]);
    }

    #[test]
    fn four_quarter_turns_restore_the_image() {
        let img = numbered();
        let mut turned = img.clone();
        for _ in 0..4 {
            turned = rotate(&turned, Rotation::Quarter);
        }
        assert_eq!(turned, img);
    }

    #[test]
    fn rotation_keeps_channels_together() {
        let img = GelImage::from_fn(2, 1, 3, BitDepth::Eight, |x, _, c| {
            u16::try_from(x * 10 + u32::try_from(c).unwrap_or(0)).unwrap_or(0)
        });
        let rotated = rotate(&img, Rotation::Quarter);
        assert_eq!(rows(&rotated), vec![vec![0, 1, 2], vec![10, 11, 12]]);
    }

    #[test]
    fn invert_uses_bit_depth_maximum() {
        let eight = GelImage::from_fn(2, 1, 1, BitDepth::Eight, |x, _, _| if x == 0 { 0 } else { 55 });
        assert_eq!(invert(&eight).samples(), &[255, 200]);

        let sixteen = GelImage::from_fn(1, 1, 1, BitDepth::Sixteen, |_, _, _| 65000);
        assert_eq!(invert(&sixteen).samples(), &[535]);
    }

    #[test]
    fn double_inversion_is_identity() {
        let img = numbered();
        assert_eq!(invert(&invert(&img)), img);
    }
}
