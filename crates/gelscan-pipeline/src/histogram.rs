//! Per-lane intensity profiles.

use crate::types::{GelImage, LaneBorder, LaneHistogram, PipelineError};

/// Sum each row of `image` over the columns of `lane`, one value per
/// channel in `channels`.
///
/// Each value is divided by `max_value × lane width × channels.len()`, so
/// a lane that is saturated in every active channel sums to 1 across a
/// row. The result has one row per pixel row and one column per active
/// channel.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRange`] if the lane extends past the
/// right edge of the image.
#[allow(clippy::cast_precision_loss)]
pub fn extract_histogram(
    image: &GelImage,
    lane: LaneBorder,
    channels: &[usize],
) -> Result<LaneHistogram, PipelineError> {
    if !lane.fits_within(image.width()) {
        return Err(PipelineError::InvalidRange {
            start: lane.start(),
            end: lane.end(),
            width: image.width(),
        });
    }

    let factor = f64::from(image.max_value())
        * f64::from(lane.width())
        * channels.len() as f64;

    let rows = (0..image.height())
        .map(|y| {
            channels
                .iter()
                .map(|&c| {
                    let sum: u64 = (lane.start()..lane.end())
                        .map(|x| u64::from(image.sample(x, y, c)))
                        .sum();
                    sum as f64 / factor
                })
                .collect()
        })
        .collect();

    Ok(LaneHistogram::new(rows))
}

/// Extract one histogram per lane, in lane order.
///
/// # Errors
///
/// Fails on the first lane that does not fit the image; see
/// [`extract_histogram`].
pub fn extract_lanes(
    image: &GelImage,
    lanes: &[LaneBorder],
    channels: &[usize],
) -> Result<Vec<LaneHistogram>, PipelineError> {
    lanes
        .iter()
        .map(|&lane| extract_histogram(image, lane, channels))
        .collect()
}

/// Whether every lane lies inside an image `width` pixels wide.
#[must_use]
pub fn lanes_fit(lanes: &[LaneBorder], width: u32) -> bool {
    lanes.iter().all(|lane| lane.fits_within(width))
}
