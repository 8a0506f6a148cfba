//! Threshold cutoff and optional contrast normalization.
//!
//! Samples strictly below `threshold × max_value` are zeroed. With
//! normalization enabled, the surviving range `[true_min, max]` is then
//! stretched to `[0, max_value]`, where `true_min` is the smallest sample
//! at or above the cutoff. Using the raw image minimum instead would map
//! the (already removed) sub-threshold band to zero and waste part of the
//! output range.
//!
//! When every surviving sample has the same value (`true_min == max`), or
//! nothing survives, the stretch factor is infinite and the arithmetic
//! produces NaN or negative infinity; those are stored as 0, so the whole
//! image becomes black. Downstream display code relies on that output.

use crate::types::{GelImage, PipelineError};

/// Check that `threshold` is a fraction in `[0, 1]`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidThreshold`] otherwise (including NaN).
pub fn check_threshold(threshold: f64) -> Result<(), PipelineError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(PipelineError::InvalidThreshold(threshold))
    }
}

/// Apply the threshold cutoff and, if `normalization` is set, rescale the
/// surviving values to the full sample range.
///
/// Every color channel is processed; channel selection only affects later
/// stages.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidThreshold`] if `threshold` is outside
/// `[0, 1]`.
pub fn apply_threshold_and_normalize(
    image: &GelImage,
    threshold: f64,
    normalization: bool,
) -> Result<GelImage, PipelineError> {
    check_threshold(threshold)?;

    let max_value = image.max_value();
    let cutoff = threshold * f64::from(max_value);
    let mut out = image.clone();

    if normalization {
        let true_min = image
            .samples()
            .iter()
            .map(|&v| f64::from(v))
            .filter(|&v| v >= cutoff)
            .fold(f64::INFINITY, f64::min);
        let max = f64::from(image.samples().iter().copied().max().unwrap_or(0));
        let scaling = f64::from(max_value) / (max - true_min);

        for v in out.samples_mut() {
            let mut stretched = (f64::from(*v) - true_min) * scaling;
            if stretched < 0.0 {
                stretched = 0.0;
            }
            *v = to_sample(stretched, max_value);
        }
    } else {
        for v in out.samples_mut() {
            if f64::from(*v) < cutoff {
                *v = 0;
            }
        }
    }

    Ok(out)
}

/// Round to the nearest integer sample, saturating at `max_value`.
/// NaN is stored as 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_sample(value: f64, max_value: u16) -> u16 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, f64::from(max_value)) as u16
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::BitDepth;

    /// The 6×5 single-channel gel with uniform rows 0, 50, 100, 150, 255.
    fn banded() -> GelImage {
        let rows = [0, 50, 100, 150, 255];
        GelImage::from_fn(6, 5, 1, BitDepth::Eight, |_, y, _| rows[y as usize])
    }

    fn column(image: &GelImage) -> Vec<u16> {
        (0..image.height()).map(|y| image.sample(0, y, 0)).collect()
    }

    fn assert_rows_uniform(image: &GelImage) {
        for y in 0..image.height() {
            let row = image.row(y);
            assert!(row.iter().all(|&v| v == row[0]), "row {y} not uniform: {row:?}");
        }
    }

    #[test]
    fn threshold_only_zeroes_lower_rows() {
        let out = apply_threshold_and_normalize(&banded(), 0.5, false).unwrap();
        assert_eq!(column(&out), vec![0, 0, 0, 150, 255]);
        assert_rows_uniform(&out);
    }

    #[test]
    fn threshold_half_with_normalization() {
        // cutoff 127.5 -> true_min = 150, so 150 -> 0 and 255 -> 255.
        let out = apply_threshold_and_normalize(&banded(), 0.5, true).unwrap();
        assert_eq!(column(&out), vec![0, 0, 0, 0, 255]);
    }

    #[test]
    fn normalization_uses_smallest_surviving_value() {
        // cutoff 76.5 -> true_min = 100, scaling = 255 / 155.
        let out = apply_threshold_and_normalize(&banded(), 0.3, true).unwrap();
        assert_eq!(column(&out), vec![0, 0, 0, 82, 255]);
        assert_rows_uniform(&out);
    }

    #[test]
    fn zero_threshold_without_normalization_is_identity() {
        let img = banded();
        let out = apply_threshold_and_normalize(&img, 0.0, false).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn full_threshold_keeps_only_maximum() {
        let out = apply_threshold_and_normalize(&banded(), 1.0, false).unwrap();
        assert_eq!(column(&out), vec![0, 0, 0, 0, 255]);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        for t in [-0.01, 1.01, f64::NAN] {
            let result = apply_threshold_and_normalize(&banded(), t, false);
            assert!(
                matches!(result, Err(PipelineError::InvalidThreshold(_))),
                "threshold {t} should be rejected",
            );
        }
    }

    #[test]
    fn degenerate_range_turns_image_black() {
        // Every surviving sample equals the maximum: (v - max) * inf is NaN
        // for v == max and -inf below it; both are stored as 0.
        let img = GelImage::from_fn(4, 3, 1, BitDepth::Eight, |x, _, _| if x < 2 { 10 } else { 200 });
        let out = apply_threshold_and_normalize(&img, 0.5, true).unwrap();
        assert!(out.samples().iter().all(|&v| v == 0), "got {:?}", out.samples());
    }

    #[test]
    fn nothing_surviving_turns_image_black() {
        let img = GelImage::from_fn(3, 3, 1, BitDepth::Eight, |_, _, _| 20);
        let out = apply_threshold_and_normalize(&img, 0.9, true).unwrap();
        assert!(out.samples().iter().all(|&v| v == 0));
    }

    #[test]
    fn monotonic_ramp_property() {
        // A row-monotonic ramp covering the full 8-bit range.
        let img = GelImage::from_fn(3, 256, 1, BitDepth::Eight, |_, y, _| u16::try_from(y).unwrap());
        for step in 0..=10 {
            let t = f64::from(step) / 10.0;
            let cutoff = t * 255.0;

            let plain = apply_threshold_and_normalize(&img, t, false).unwrap();
            for (&before, &after) in img.samples().iter().zip(plain.samples()) {
                if f64::from(before) < cutoff {
                    assert_eq!(after, 0, "t={t}: {before} should be zeroed");
                } else {
                    assert_eq!(after, before, "t={t}: {before} should survive");
                }
            }

            let normalized = apply_threshold_and_normalize(&img, t, true).unwrap();
            let true_min = img
                .samples()
                .iter()
                .copied()
                .find(|&v| f64::from(v) >= cutoff)
                .unwrap();
            if true_min < 255 {
                let min_index = img.samples().iter().position(|&v| v == true_min).unwrap();
                assert_eq!(normalized.samples()[min_index], 0, "t={t}");
                assert_eq!(*normalized.samples().last().unwrap(), 255, "t={t}");
            }
        }
    }

    #[test]
    fn sixteen_bit_normalization_fills_range() {
        let img = GelImage::from_fn(1, 3, 1, BitDepth::Sixteen, |_, y, _| [1000, 2000, 3000][y as usize]);
        let out = apply_threshold_and_normalize(&img, 0.0, true).unwrap();
        let values = column(&out);
        assert_eq!(values[0], 0);
        assert!((32767..=32768).contains(&values[1]), "got {}", values[1]);
        assert_eq!(values[2], 65535);
    }
}
