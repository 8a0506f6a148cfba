//! gelscan-pipeline: pure gel image transforms (sans-IO).
//!
//! Turns a decoded gel image into lane-density data through:
//! rotate -> invert -> noise filter -> threshold/normalize ->
//! grey preview and channel split -> per-lane histograms.
//!
//! This crate has **no I/O or scheduling** -- it operates on in-memory
//! rasters and returns structured data. Job arbitration, cancellation
//! and publication live in `gelscan-worker`.

pub mod channels;
pub mod decode;
pub mod encode;
pub mod filter;
pub mod geometry;
pub mod histogram;
pub mod lanes;
pub mod pipeline;
pub mod threshold;
pub mod types;

pub use decode::{decode, image_parameters};
pub use encode::encode_png;
pub use lanes::default_lane_borders;
pub use pipeline::{Filtered, Inverted, Preprocess, Processed, Rotated};
pub use threshold::apply_threshold_and_normalize;
pub use types::{
    BitDepth, ChannelSelection, Dimensions, GelImage, ImageParameters, LaneBorder, LaneHistogram,
    NoiseFilter, PipelineError, PreprocessingSettings, Rotation,
};

/// Everything derived from one source image, settings and lane set.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutputs {
    /// The processed image with all selected transforms applied.
    pub processed: GelImage,
    /// Single-channel average of the active channels.
    pub preview: GelImage,
    /// Per-channel planes, present only for three-channel sources.
    pub channels: Option<[GelImage; 3]>,
    /// One histogram per lane, or `None` when a lane lies outside the
    /// processed image and extraction was skipped.
    pub histograms: Option<Vec<LaneHistogram>>,
}

/// Run every preprocessing stage and derive all outputs in one call.
///
/// # Pipeline steps
///
/// 1. Rotate clockwise, then invert if enabled
/// 2. Noise filters on the selected channels
/// 3. Threshold cutoff and optional normalization
/// 4. Grey preview of the selected channels
/// 5. Channel split (three-channel sources only)
/// 6. Lane histograms, skipped if any lane lies outside the image
///
/// # Errors
///
/// Returns [`PipelineError::InvalidThreshold`] if the threshold is outside
/// `[0, 1]` and [`PipelineError::NoActiveChannels`] if no selected channel
/// exists in `source`.
pub fn process(
    source: &GelImage,
    settings: &PreprocessingSettings,
    lanes: &[LaneBorder],
) -> Result<ProcessOutputs, PipelineError> {
    let processed = Preprocess::new(source, settings)?
        .rotate()
        .invert()
        .filter()
        .threshold()?;

    let preview = processed.grey_preview();
    let channels = processed.split_channels();
    let histograms = if processed.lanes_fit(lanes) {
        Some(processed.lane_histograms(lanes)?)
    } else {
        None
    };

    Ok(ProcessOutputs {
        processed: processed.into_image(),
        preview,
        channels,
        histograms,
    })
}
