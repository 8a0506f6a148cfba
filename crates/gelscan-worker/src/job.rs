//! Job tags: what kind of edit started a job, how recent it is and how
//! much it matters.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of user edit that starts a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditKind {
    /// A new source gel image.
    OriginalImage,
    /// New preprocessing settings.
    SettingsChange,
    /// New lane borders.
    LaneChange,
}

impl EditKind {
    /// Arbitration priority of jobs started by this kind of edit.
    ///
    /// Image and settings edits invalidate everything downstream, so they
    /// outrank lane edits, which only need the already-processed image.
    #[must_use]
    pub const fn priority(self) -> Priority {
        match self {
            Self::OriginalImage | Self::SettingsChange => Priority::UPSTREAM,
            Self::LaneChange => Priority::DOWNSTREAM,
        }
    }

    /// Which pipeline stages a job of this kind runs.
    #[must_use]
    pub const fn route(self) -> Route {
        match self {
            Self::OriginalImage | Self::SettingsChange => Route::Full,
            Self::LaneChange => Route::LanesOnly,
        }
    }

    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OriginalImage => "original-image",
            Self::SettingsChange => "settings-change",
            Self::LaneChange => "lane-change",
        }
    }
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arbitration priority; larger values win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Band shared by image and settings edits.
    pub const UPSTREAM: Self = Self(20);
    /// Band for lane edits.
    pub const DOWNSTREAM: Self = Self(10);

    /// The numeric priority.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Stages run by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Geometry through lane histograms.
    Full,
    /// Lane histograms only, against the current processed image.
    LanesOnly,
}

/// Identity and rank of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTag {
    /// Edit that started the job.
    pub kind: EditKind,
    /// Caller-supplied correlation id, echoed on publications.
    pub interaction_id: Option<u64>,
    /// Submission order; strictly increasing, never reused.
    pub sequence: u64,
    /// Derived from `kind`.
    pub priority: Priority,
}

impl JobTag {
    /// Whether `self` and `other` tag the same job.
    #[must_use]
    pub const fn same_job(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

/// Hands out strictly increasing submission sequence numbers.
#[derive(Debug, Default)]
pub struct JobCounter {
    next: Cell<u64>,
}

impl JobCounter {
    /// Create a counter starting at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a new job of `kind`, consuming the next sequence number.
    pub fn tag(&self, kind: EditKind, interaction_id: Option<u64>) -> JobTag {
        let sequence = self.next.get();
        self.next.set(sequence.saturating_add(1));
        JobTag {
            kind,
            interaction_id,
            sequence,
            priority: kind.priority(),
        }
    }
}
