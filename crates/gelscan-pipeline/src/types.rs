//! Shared types for the gelscan transform library.

use serde::{Deserialize, Serialize};

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Sample bit depth of a raster.
///
/// Serialized as the number of bits (`8` or `16`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BitDepth {
    /// 8 bits per sample, maximum value 255.
    Eight,
    /// 16 bits per sample, maximum value 65535.
    Sixteen,
}

impl BitDepth {
    /// The largest value a sample of this depth can hold.
    #[must_use]
    pub const fn max_value(self) -> u16 {
        match self {
            Self::Eight => 0x00FF,
            Self::Sixteen => u16::MAX,
        }
    }

    /// Number of bits per sample.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }
}

impl From<BitDepth> for u8 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            other => Err(format!("unsupported bit depth: {other}")),
        }
    }
}

/// An in-memory raster with interleaved color samples.
///
/// Samples are stored row-major, `channels` values per pixel, widened to
/// `u16` regardless of [`BitDepth`]. Alpha is never stored; whether the
/// decoded source carried an alpha plane is kept in `has_alpha` so it can
/// be reported back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GelImage {
    width: u32,
    height: u32,
    channels: u8,
    has_alpha: bool,
    bit_depth: BitDepth,
    samples: Vec<u16>,
}

impl GelImage {
    /// Wrap an interleaved sample buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BufferSize`] if `samples.len()` is not
    /// `width * height * channels`.
    pub fn from_samples(
        width: u32,
        height: u32,
        channels: u8,
        bit_depth: BitDepth,
        samples: Vec<u16>,
    ) -> Result<Self, PipelineError> {
        let expected = sample_count(width, height, channels);
        if samples.len() != expected {
            return Err(PipelineError::BufferSize {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            has_alpha: false,
            bit_depth,
            samples,
        })
    }

    /// Build an image by evaluating `f(x, y, channel)` for every sample.
    #[must_use]
    pub fn from_fn(
        width: u32,
        height: u32,
        channels: u8,
        bit_depth: BitDepth,
        mut f: impl FnMut(u32, u32, usize) -> u16,
    ) -> Self {
        let mut samples = Vec::with_capacity(sample_count(width, height, channels));
        for y in 0..height {
            for x in 0..width {
                for c in 0..usize::from(channels) {
                    samples.push(f(x, y, c));
                }
            }
        }
        Self {
            width,
            height,
            channels,
            has_alpha: false,
            bit_depth,
            samples,
        }
    }

    /// Mark whether the decoded source carried an alpha plane.
    #[must_use]
    pub const fn with_alpha(mut self, has_alpha: bool) -> Self {
        self.has_alpha = has_alpha;
        self
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Width and height.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Number of color channels (alpha excluded).
    #[must_use]
    pub const fn channels(&self) -> u8 {
        self.channels
    }

    /// Whether the decoded source had an alpha plane.
    #[must_use]
    pub const fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Sample bit depth.
    #[must_use]
    pub const fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    /// Maximum representable sample value for this image's bit depth.
    #[must_use]
    pub const fn max_value(&self) -> u16 {
        self.bit_depth.max_value()
    }

    /// All samples, interleaved and row-major.
    #[must_use]
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Mutable access to the interleaved samples.
    pub fn samples_mut(&mut self) -> &mut [u16] {
        &mut self.samples
    }

    /// The sample at column `x`, row `y`, channel `c`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[must_use]
    pub fn sample(&self, x: u32, y: u32, c: usize) -> u16 {
        self.samples[self.index(x, y, c)]
    }

    /// One row of interleaved samples.
    #[must_use]
    pub fn row(&self, y: u32) -> &[u16] {
        let stride = self.width as usize * usize::from(self.channels);
        let start = y as usize * stride;
        &self.samples[start..start + stride]
    }

    fn index(&self, x: u32, y: u32, c: usize) -> usize {
        (y as usize * self.width as usize + x as usize) * usize::from(self.channels) + c
    }
}

fn sample_count(width: u32, height: u32, channels: u8) -> usize {
    width as usize * height as usize * usize::from(channels)
}

/// Descriptive parameters of a freshly loaded source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageParameters {
    /// Source dimensions before rotation.
    pub size: Dimensions,
    /// Number of color channels.
    pub channel_count: u8,
    /// Whether the source had an alpha plane.
    pub has_alpha: bool,
    /// Sample bit depth.
    pub bit_depth: BitDepth,
}

/// Clockwise rotation in quarter turns.
///
/// Serialized as the quarter-turn index `0..=3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rotation {
    /// No rotation.
    #[default]
    None,
    /// 90° clockwise.
    Quarter,
    /// 180°.
    Half,
    /// 270° clockwise.
    ThreeQuarter,
}

impl Rotation {
    /// Parse a rotation given in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedRotation`] for anything other
    /// than 0, 90, 180 or 270.
    pub fn from_degrees(degrees: u16) -> Result<Self, PipelineError> {
        match degrees {
            0 => Ok(Self::None),
            90 => Ok(Self::Quarter),
            180 => Ok(Self::Half),
            270 => Ok(Self::ThreeQuarter),
            other => Err(PipelineError::UnsupportedRotation(other)),
        }
    }

    /// The rotation in degrees.
    #[must_use]
    pub const fn degrees(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Quarter => 90,
            Self::Half => 180,
            Self::ThreeQuarter => 270,
        }
    }

    /// Whether this rotation swaps width and height.
    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Quarter | Self::ThreeQuarter)
    }

    /// Dimensions of an image of size `dims` after this rotation.
    #[must_use]
    pub const fn rotated(self, dims: Dimensions) -> Dimensions {
        if self.swaps_axes() {
            Dimensions {
                width: dims.height,
                height: dims.width,
            }
        } else {
            dims
        }
    }
}

impl From<Rotation> for u8 {
    fn from(rotation: Rotation) -> Self {
        match rotation {
            Rotation::None => 0,
            Rotation::Quarter => 1,
            Rotation::Half => 2,
            Rotation::ThreeQuarter => 3,
        }
    }
}

impl TryFrom<u8> for Rotation {
    type Error = PipelineError;

    fn try_from(quarter_turns: u8) -> Result<Self, Self::Error> {
        match quarter_turns {
            0 => Ok(Self::None),
            1 => Ok(Self::Quarter),
            2 => Ok(Self::Half),
            3 => Ok(Self::ThreeQuarter),
            other => Err(PipelineError::UnsupportedRotation(u16::from(other) * 90)),
        }
    }
}

/// A noise-removal filter applied to the selected channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoiseFilter {
    /// Median filter with a square window of radius [`MEDIAN_RADIUS`](crate::filter::MEDIAN_RADIUS).
    Median,
}

/// Channel-selection flags indexed by channel (`[red, green, blue]` for
/// color images).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSelection(Vec<bool>);

impl ChannelSelection {
    /// Create a selection from per-channel flags.
    #[must_use]
    pub const fn new(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    /// The raw flags.
    #[must_use]
    pub fn flags(&self) -> &[bool] {
        &self.0
    }

    /// Whether channel `index` is selected.
    #[must_use]
    pub fn is_selected(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    /// Whether any channel is selected at all.
    #[must_use]
    pub fn any(&self) -> bool {
        self.0.iter().any(|&f| f)
    }
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self(vec![true, true, true])
    }
}

/// Preprocessing options applied to the source image.
///
/// Replaced wholesale on every settings edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingSettings {
    /// Channels that contribute to the preview and lane histograms.
    pub selected_channels: ChannelSelection,
    /// Clockwise rotation applied first.
    pub rotation: Rotation,
    /// Whether sample values are inverted after rotation.
    pub inversion: bool,
    /// Whether surviving values are stretched to the full range.
    pub normalization: bool,
    /// Cutoff as a fraction of the maximum sample value, in `[0, 1]`.
    pub threshold: f64,
    /// Filters applied in order to the selected channels.
    pub noise_filters: Vec<NoiseFilter>,
}

impl Default for PreprocessingSettings {
    fn default() -> Self {
        Self {
            selected_channels: ChannelSelection::default(),
            rotation: Rotation::None,
            inversion: false,
            normalization: false,
            threshold: 0.0,
            noise_filters: Vec::new(),
        }
    }
}

impl PreprocessingSettings {
    /// Check the settings for contract violations.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidThreshold`] if `threshold` is
    /// outside `[0, 1]` (or NaN), and [`PipelineError::NoActiveChannels`]
    /// if no channel is selected.
    pub fn validate(&self) -> Result<(), PipelineError> {
        crate::threshold::check_threshold(self.threshold)?;
        if !self.selected_channels.any() {
            return Err(PipelineError::NoActiveChannels);
        }
        Ok(())
    }
}

/// A half-open `[start, end)` column interval marking one lane.
///
/// Serialized as a two-element array `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u32; 2]", into = "[u32; 2]")]
pub struct LaneBorder {
    start: u32,
    end: u32,
}

impl LaneBorder {
    /// Create a lane border.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidLaneBorder`] unless `start < end`.
    pub fn new(start: u32, end: u32) -> Result<Self, PipelineError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(PipelineError::InvalidLaneBorder { start, end })
        }
    }

    /// First column of the lane.
    #[must_use]
    pub const fn start(self) -> u32 {
        self.start
    }

    /// One past the last column of the lane.
    #[must_use]
    pub const fn end(self) -> u32 {
        self.end
    }

    /// Number of columns covered.
    #[must_use]
    pub const fn width(self) -> u32 {
        self.end - self.start
    }

    /// Whether the lane lies within an image `width` pixels wide.
    #[must_use]
    pub const fn fits_within(self, width: u32) -> bool {
        self.end <= width
    }
}

impl From<LaneBorder> for [u32; 2] {
    fn from(border: LaneBorder) -> Self {
        [border.start, border.end]
    }
}

impl TryFrom<[u32; 2]> for LaneBorder {
    type Error = PipelineError;

    fn try_from([start, end]: [u32; 2]) -> Result<Self, Self::Error> {
        Self::new(start, end)
    }
}

/// Per-row intensity profile of one lane.
///
/// `rows[y][k]` is the normalized intensity of the `k`-th active channel
/// at pixel row `y`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneHistogram {
    rows: Vec<Vec<f64>>,
}

impl LaneHistogram {
    /// Wrap per-row channel values.
    #[must_use]
    pub const fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    /// The per-row values.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of rows (the image height).
    #[must_use]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Number of channel columns per row.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

/// Errors raised by the transform library.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Encoding a displayable raster failed.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// Threshold outside `[0, 1]`.
    #[error("threshold should be between 0 and 1, got {0}")]
    InvalidThreshold(f64),

    /// Rotation that is not a multiple of 90°.
    #[error("unsupported rotation: {0} degrees")]
    UnsupportedRotation(u16),

    /// Lane border with `start >= end`.
    #[error("invalid lane border [{start}, {end})")]
    InvalidLaneBorder {
        /// First column.
        start: u32,
        /// One past the last column.
        end: u32,
    },

    /// Histogram column range outside the image.
    #[error("invalid histogram range [{start}, {end}) for image width {width}")]
    InvalidRange {
        /// First column.
        start: u32,
        /// One past the last column.
        end: u32,
        /// Image width.
        width: u32,
    },

    /// None of the selected channels exists in the image.
    #[error("no active channels selected")]
    NoActiveChannels,

    /// Sample buffer length does not match the declared geometry.
    #[error("sample buffer holds {actual} values, expected {expected}")]
    BufferSize {
        /// Samples implied by width, height and channel count.
        expected: usize,
        /// Samples actually supplied.
        actual: usize,
    },
}

impl PipelineError {
    /// Whether the error is a caller contract violation rather than an
    /// environment failure (decode/encode).
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        match self {
            Self::InvalidThreshold(_)
            | Self::UnsupportedRotation(_)
            | Self::InvalidLaneBorder { .. }
            | Self::InvalidRange { .. }
            | Self::NoActiveChannels
            | Self::BufferSize { .. } => true,
            Self::ImageDecode(_) | Self::EmptyInput | Self::ImageEncode(_) => false,
        }
    }
}
