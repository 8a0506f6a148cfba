//! Incremental preprocessing: advance stage-by-stage so a caller can
//! pause (or give up) between stages.
//!
//! [`crate::process`] runs every stage in one call. [`Preprocess`] lets
//! the caller drive execution one step at a time, which is what the
//! worker coordinator does to check for superseding edits between
//! stages:
//!
//! ```rust
//! # use gelscan_pipeline::{GelImage, Preprocess, PreprocessingSettings, PipelineError};
//! # fn run(source: &GelImage) -> Result<(), PipelineError> {
//! let settings = PreprocessingSettings::default();
//! let processed = Preprocess::new(source, &settings)?
//!     .rotate()
//!     .invert()
//!     .filter()
//!     .threshold()?;
//!
//! let _preview = processed.grey_preview();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state. Only the
//! latest intermediate raster is kept; earlier ones are dropped as soon as
//! the next stage has been computed.

use crate::types::{
    GelImage, LaneBorder, LaneHistogram, PipelineError, PreprocessingSettings,
};

// ───────────────────────── Stage 0: Preprocess ───────────────────────

/// Preprocessing state before any transform has run.
///
/// Holds a borrowed source image and a snapshot of the settings. Call
/// [`rotate`](Self::rotate) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .rotate() to continue"]
#[derive(Debug)]
pub struct Preprocess<'a> {
    source: &'a GelImage,
    settings: PreprocessingSettings,
    channels: Vec<usize>,
}

impl<'a> Preprocess<'a> {
    /// Validate `settings` against `source` and start a run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidThreshold`] if the threshold is
    /// outside `[0, 1]`, and [`PipelineError::NoActiveChannels`] if no
    /// selected channel exists in `source`.
    pub fn new(source: &'a GelImage, settings: &PreprocessingSettings) -> Result<Self, PipelineError> {
        crate::threshold::check_threshold(settings.threshold)?;
        let channels =
            crate::channels::effective_channels(&settings.selected_channels, source.channels())?;
        Ok(Self {
            source,
            settings: settings.clone(),
            channels,
        })
    }

    /// The channel indices later stages operate on.
    #[must_use]
    pub fn active_channels(&self) -> &[usize] {
        &self.channels
    }

    /// Rotate the source clockwise by `settings.rotation`.
    pub fn rotate(self) -> Rotated {
        let image = crate::geometry::rotate(self.source, self.settings.rotation);
        Rotated {
            settings: self.settings,
            channels: self.channels,
            image,
        }
    }
}

// ───────────────────────── Stage 1a: Rotated ─────────────────────────

/// State after rotation. Call [`invert`](Self::invert) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .invert() to continue"]
#[derive(Debug)]
pub struct Rotated {
    settings: PreprocessingSettings,
    channels: Vec<usize>,
    image: GelImage,
}

impl Rotated {
    /// The rotated image.
    #[must_use]
    pub const fn image(&self) -> &GelImage {
        &self.image
    }

    /// Invert sample values if `settings.inversion` is set; otherwise pass
    /// the image through.
    pub fn invert(self) -> Inverted {
        let image = if self.settings.inversion {
            crate::geometry::invert(&self.image)
        } else {
            self.image
        };
        Inverted {
            settings: self.settings,
            channels: self.channels,
            image,
        }
    }
}

// ───────────────────────── Stage 1b: Inverted ────────────────────────

/// State after the geometry stage. Call [`filter`](Self::filter) to
/// advance.
#[must_use = "pipeline stages are consumed by advancing — call .filter() to continue"]
#[derive(Debug)]
pub struct Inverted {
    settings: PreprocessingSettings,
    channels: Vec<usize>,
    image: GelImage,
}

impl Inverted {
    /// The oriented (and possibly inverted) image.
    #[must_use]
    pub const fn image(&self) -> &GelImage {
        &self.image
    }

    /// Apply the configured noise filters to the active channels.
    pub fn filter(self) -> Filtered {
        let image = if self.settings.noise_filters.is_empty() {
            self.image
        } else {
            crate::filter::apply_filters(&self.image, &self.settings.noise_filters, &self.channels)
        };
        Filtered {
            settings: self.settings,
            channels: self.channels,
            image,
        }
    }
}

// ───────────────────────── Stage 2: Filtered ─────────────────────────

/// State after noise filtering. Call [`threshold`](Self::threshold) to
/// advance.
#[must_use = "pipeline stages are consumed by advancing — call .threshold() to continue"]
#[derive(Debug)]
pub struct Filtered {
    settings: PreprocessingSettings,
    channels: Vec<usize>,
    image: GelImage,
}

impl Filtered {
    /// The filtered image.
    #[must_use]
    pub const fn image(&self) -> &GelImage {
        &self.image
    }

    /// Apply the threshold cutoff and optional normalization.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidThreshold`] if the threshold is
    /// outside `[0, 1]`. [`Preprocess::new`] already rejects such
    /// settings, so this only fails if that check is bypassed.
    pub fn threshold(self) -> Result<Processed, PipelineError> {
        let image = crate::threshold::apply_threshold_and_normalize(
            &self.image,
            self.settings.threshold,
            self.settings.normalization,
        )?;
        Ok(Processed {
            channels: self.channels,
            image,
        })
    }
}

// ───────────────────────── Stage 3: Processed ────────────────────────

/// The fully preprocessed image together with the channels selected for
/// display and measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    channels: Vec<usize>,
    image: GelImage,
}

impl Processed {
    /// The processed image.
    #[must_use]
    pub const fn image(&self) -> &GelImage {
        &self.image
    }

    /// The active channel indices.
    #[must_use]
    pub fn active_channels(&self) -> &[usize] {
        &self.channels
    }

    /// Average the active channels into a single grey plane.
    #[must_use]
    pub fn grey_preview(&self) -> GelImage {
        crate::channels::grey_preview(&self.image, &self.channels)
    }

    /// Split into three grey planes, or `None` unless the image has
    /// exactly three channels.
    #[must_use]
    pub fn split_channels(&self) -> Option<[GelImage; 3]> {
        crate::channels::split_channels(&self.image)
    }

    /// Whether every lane fits inside the processed image.
    #[must_use]
    pub fn lanes_fit(&self, lanes: &[LaneBorder]) -> bool {
        crate::histogram::lanes_fit(lanes, self.image.width())
    }

    /// Extract one histogram per lane over the active channels.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRange`] if a lane does not fit the
    /// image; check [`lanes_fit`](Self::lanes_fit) first to skip instead.
    pub fn lane_histograms(
        &self,
        lanes: &[LaneBorder],
    ) -> Result<Vec<LaneHistogram>, PipelineError> {
        crate::histogram::extract_lanes(&self.image, lanes, &self.channels)
    }

    /// Extract the histogram of a single lane.
    ///
    /// # Errors
    ///
    /// See [`lane_histograms`](Self::lane_histograms).
    pub fn lane_histogram(&self, lane: LaneBorder) -> Result<LaneHistogram, PipelineError> {
        crate::histogram::extract_histogram(&self.image, lane, &self.channels)
    }

    /// Consume and return the processed image.
    #[must_use]
    pub fn into_image(self) -> GelImage {
        self.image
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BitDepth, ChannelSelection, NoiseFilter, Rotation};

    fn banded() -> GelImage {
        let rows = [0, 50, 100, 150, 255];
        GelImage::from_fn(6, 5, 1, BitDepth::Eight, |_, y, _| rows[y as usize])
    }

    #[test]
    fn default_settings_leave_image_unchanged() {
        let src = banded();
        let processed = Preprocess::new(&src, &PreprocessingSettings::default())
            .unwrap()
            .rotate()
            .invert()
            .filter()
            .threshold()
            .unwrap();
        assert_eq!(processed.image(), &src);
        assert_eq!(processed.active_channels(), &[0]);
    }

    #[test]
    fn invalid_threshold_is_rejected_up_front() {
        let settings = PreprocessingSettings {
            threshold: -0.5,
            ..PreprocessingSettings::default()
        };
        assert!(matches!(
            Preprocess::new(&banded(), &settings),
            Err(PipelineError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn rgb_with_no_existing_channel_is_rejected() {
        let src = GelImage::from_fn(2, 2, 3, BitDepth::Eight, |_, _, _| 1);
        let settings = PreprocessingSettings {
            selected_channels: ChannelSelection::new(vec![false, false, false]),
            ..PreprocessingSettings::default()
        };
        assert!(matches!(
            Preprocess::new(&src, &settings),
            Err(PipelineError::NoActiveChannels)
        ));
    }

    #[test]
    fn stages_apply_in_order() {
        // Rotate a quarter turn, invert, then threshold at 0.5: rows of the
        // source become columns, and inversion flips which end survives.
        let settings = PreprocessingSettings {
            rotation: Rotation::Quarter,
            inversion: true,
            threshold: 0.5,
            ..PreprocessingSettings::default()
        };
        let src = banded();
        let rotated = Preprocess::new(&src, &settings).unwrap().rotate();
        assert_eq!(rotated.image().width(), 5);
        assert_eq!(rotated.image().height(), 6);

        let inverted = rotated.invert();
        // Column 0 of the rotated image is the bottom source row (255).
        assert_eq!(inverted.image().sample(0, 0, 0), 0);
        assert_eq!(inverted.image().sample(4, 0, 0), 255);

        let processed = inverted.filter().threshold().unwrap();
        assert_eq!(processed.image().row(0), &[0, 0, 155, 205, 255]);
    }

    #[test]
    fn median_filter_runs_only_when_configured() {
        let src = GelImage::from_fn(9, 9, 1, BitDepth::Eight, |x, y, _| {
            if x == 4 && y == 4 { 255 } else { 10 }
        });
        let settings = PreprocessingSettings {
            noise_filters: vec![NoiseFilter::Median],
            ..PreprocessingSettings::default()
        };
        let processed = Preprocess::new(&src, &settings)
            .unwrap()
            .rotate()
            .invert()
            .filter()
            .threshold()
            .unwrap();
        assert_eq!(processed.image().sample(4, 4, 0), 10);
    }

    #[test]
    fn processed_exposes_derived_outputs() {
        let src = GelImage::from_fn(4, 2, 3, BitDepth::Eight, |_, _, c| [90, 30, 60][c]);
        let settings = PreprocessingSettings {
            selected_channels: ChannelSelection::new(vec![true, true, false]),
            ..PreprocessingSettings::default()
        };
        let processed = Preprocess::new(&src, &settings)
            .unwrap()
            .rotate()
            .invert()
            .filter()
            .threshold()
            .unwrap();

        assert!(processed.grey_preview().samples().iter().all(|&v| v == 60));
        assert!(processed.split_channels().is_some());

        let lanes = [LaneBorder::new(0, 2).unwrap(), LaneBorder::new(2, 4).unwrap()];
        assert!(processed.lanes_fit(&lanes));
        let hists = processed.lane_histograms(&lanes).unwrap();
        assert_eq!(hists.len(), 2);
        assert_eq!(hists[0].channel_count(), 2);
        assert_eq!(hists[0].height(), 2);
        assert!(!processed.lanes_fit(&[LaneBorder::new(3, 5).unwrap()]));
    }
}
