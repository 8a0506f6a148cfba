//! Inbound edits and outbound publications exchanged with the host.
//!
//! Both directions are tagged unions serialized as
//! `{"kind": "...", "value": ...}`, optionally correlated by an
//! `interaction_id`.

use gelscan_pipeline::{ImageParameters, LaneBorder, LaneHistogram, PipelineError, PreprocessingSettings};
use serde::{Deserialize, Serialize};

use crate::handle::ImageHandle;
use crate::job::EditKind;

/// A user edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Edit {
    /// Raw bytes of a new gel image.
    OriginalImage(Vec<u8>),
    /// Replacement preprocessing settings.
    SettingsChange(PreprocessingSettings),
    /// Replacement lane borders.
    LaneChange(Vec<LaneBorder>),
}

impl Edit {
    /// The kind of this edit.
    #[must_use]
    pub const fn kind(&self) -> EditKind {
        match self {
            Self::OriginalImage(_) => EditKind::OriginalImage,
            Self::SettingsChange(_) => EditKind::SettingsChange,
            Self::LaneChange(_) => EditKind::LaneChange,
        }
    }
}

/// An edit as submitted by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// The edit itself.
    pub edit: Edit,
    /// Correlation id echoed on the resulting publications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<u64>,
}

/// Kinds of output a host can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Parameters of a newly loaded image.
    ImageParameters,
    /// Grey preview of the processed image.
    ProcessedImage,
    /// Per-channel grey images of a three-channel processed image.
    ProcessedChannels,
    /// Lane histograms.
    ProcessedLanes,
    /// An edit that could not be applied.
    Rejected,
}

/// A derived output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Publication {
    /// Emitted once per image edit, before any processing.
    ImageParameters(ImageParameters),
    /// Handle to the grey preview PNG.
    ProcessedImage(ImageHandle),
    /// Handles to the red, green and blue planes.
    ProcessedChannels([ImageHandle; 3]),
    /// One row × channel matrix per lane, in lane order.
    ProcessedLanes(Vec<LaneHistogram>),
    /// Why an edit was refused.
    Rejected(Rejection),
}

impl Publication {
    /// Which subscription kind receives this publication.
    #[must_use]
    pub const fn kind(&self) -> OutputKind {
        match self {
            Self::ImageParameters(_) => OutputKind::ImageParameters,
            Self::ProcessedImage(_) => OutputKind::ProcessedImage,
            Self::ProcessedChannels(_) => OutputKind::ProcessedChannels,
            Self::ProcessedLanes(_) => OutputKind::ProcessedLanes,
            Self::Rejected(_) => OutputKind::Rejected,
        }
    }
}

/// A publication with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The output.
    pub publication: Publication,
    /// Id of the edit that produced it, if the edit carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<u64>,
}

/// Broad class of a rejected edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionCategory {
    /// The caller sent something invalid (bad threshold, bad range, ...).
    ContractViolation,
    /// The input could not be processed (undecodable image, encoder
    /// failure).
    EnvironmentFailure,
}

impl RejectionCategory {
    /// Classify a pipeline error.
    #[must_use]
    pub const fn of(err: &PipelineError) -> Self {
        if err.is_contract_violation() {
            Self::ContractViolation
        } else {
            Self::EnvironmentFailure
        }
    }
}

/// Details of a refused edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Kind of the refused edit.
    pub edit: EditKind,
    /// Contract violation or environment failure.
    pub category: RejectionCategory,
    /// Human-readable reason.
    pub message: String,
}

impl Rejection {
    /// Describe why an edit of `kind` failed with `err`.
    #[must_use]
    pub fn new(kind: EditKind, err: &PipelineError) -> Self {
        Self {
            edit: kind,
            category: RejectionCategory::of(err),
            message: err.to_string(),
        }
    }
}
