//! Evenly spaced default lane placement.

use crate::types::{LaneBorder, PipelineError};

/// Fraction of the image width covered by lanes when the caller gives a
/// coverage outside `(0, 1)`.
pub const DEFAULT_COVERAGE: f64 = 0.8;

/// Place `count` lanes evenly across an image `width` pixels wide.
///
/// Lanes together cover `coverage` of the width; the rest is split into
/// equal margins, half a margin at each outer edge and a full margin
/// between neighbours. Borders are rounded to the nearest column.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidLaneBorder`] if the image is too narrow
/// for `count` lanes, so that a lane rounds to zero width.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn default_lane_borders(
    width: u32,
    count: usize,
    coverage: f64,
) -> Result<Vec<LaneBorder>, PipelineError> {
    let coverage = if coverage > 0.0 && coverage < 1.0 {
        coverage
    } else {
        DEFAULT_COVERAGE
    };

    let per_lane = f64::from(width) / count as f64;
    let lane_width = coverage * per_lane;
    let half_margin = (1.0 - coverage) / 2.0 * per_lane;

    (0..count)
        .map(|i| {
            let i = i as f64;
            let start = (2.0f64.mul_add(i, 1.0) * half_margin + i * lane_width).round();
            let end = (2.0f64.mul_add(i, 1.0) * half_margin + (i + 1.0) * lane_width).round();
            LaneBorder::new(start as u32, end as u32)
        })
        .collect()
}
