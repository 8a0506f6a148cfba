//! The stateful coordinator: owns the source image, settings, lane borders
//! and every derived output, and runs the preprocessing pipeline with a
//! checkpoint before each stage.
//!
//! Edits are applied to the coordinator's inputs as soon as they arrive
//! ([`Coordinator::admit`]); the returned [`JobTag`] is then driven by
//! [`Coordinator::run`], typically as a local task. Jobs interleave only at
//! checkpoints, so every borrow of the shared state is released before a
//! job suspends.
//!
//! # Stages
//!
//! | stage | work                                    | publishes            |
//! |-------|-----------------------------------------|----------------------|
//! | 1     | rotate, then invert                     |                      |
//! | 2     | noise filters on the active channels    |                      |
//! | 3     | threshold and normalization             |                      |
//! | 4     | store processed image, grey preview     | `processed-image`    |
//! | 5     | channel split (three-channel only)      | `processed-channels` |
//! | 6     | lane histograms                         | `processed-lanes`    |
//!
//! Image and settings edits run all six stages; lane edits run stage 6
//! against whatever processed image exists.

use std::cell::RefCell;
use std::rc::Rc;

use gelscan_pipeline::{
    GelImage, LaneBorder, PipelineError, Preprocess, PreprocessingSettings, Processed,
};
use tracing::{debug, error, warn};

use crate::checkpoint::{Arbiter, Backoff, Checkpoint, checkpoint};
use crate::config::WorkerConfig;
use crate::handle::{HandleStore, ImageHandle};
use crate::job::{JobCounter, JobTag, Route};
use crate::message::{Edit, Envelope, Publication, Rejection, RejectionCategory, Submission};
use crate::subscription::Publisher;

/// Which inputs the coordinator has received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No source image yet.
    AwaitingImage,
    /// Image present, no settings yet.
    AwaitingSettings,
    /// Image and settings present; edits run the pipeline.
    Ready,
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every routed stage ran (stage 6 may have been skipped because a
    /// lane lies outside the image).
    Completed,
    /// A checkpoint found newer work; nothing further was published.
    Abandoned,
    /// The inputs the route needs were missing.
    Skipped,
    /// A stage failed and a rejection was published.
    Rejected,
}

#[derive(Debug, Default)]
struct State {
    source: Option<Rc<GelImage>>,
    settings: Option<PreprocessingSettings>,
    lanes: Vec<LaneBorder>,
    processed: Option<Rc<Processed>>,
    preview: Option<ImageHandle>,
    channels: Option<[ImageHandle; 3]>,
}

/// Single-threaded job coordinator.
///
/// `P` receives publications and `H` stores the PNGs behind published
/// image handles.
#[derive(Debug)]
pub struct Coordinator<P, H> {
    state: RefCell<State>,
    arbiter: Arbiter,
    counter: JobCounter,
    backoff: Backoff,
    publisher: P,
    handles: H,
}

#[allow(clippy::future_not_send)] // runs on a LocalSet; Send is not needed
impl<P: Publisher, H: HandleStore> Coordinator<P, H> {
    /// A coordinator with no inputs.
    #[must_use]
    pub fn new(publisher: P, handles: H, config: &WorkerConfig) -> Self {
        Self {
            state: RefCell::new(State::default()),
            arbiter: Arbiter::new(),
            counter: JobCounter::new(),
            backoff: config.backoff(),
            publisher,
            handles,
        }
    }

    /// Current input phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        let state = self.state.borrow();
        match (&state.source, &state.settings) {
            (None, _) => Phase::AwaitingImage,
            (Some(_), None) => Phase::AwaitingSettings,
            (Some(_), Some(_)) => Phase::Ready,
        }
    }

    /// The arbiter holding the reference job.
    #[must_use]
    pub const fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    /// The most recently stored processed image.
    #[must_use]
    pub fn processed(&self) -> Option<Rc<Processed>> {
        self.state.borrow().processed.clone()
    }

    /// The current lane borders.
    #[must_use]
    pub fn lanes(&self) -> Vec<LaneBorder> {
        self.state.borrow().lanes.clone()
    }

    /// Apply an edit to the inputs and tag the job it starts.
    ///
    /// Returns `None` when no job needs to run: the edit was rejected (a
    /// `rejected` publication has been made), or the image or settings are
    /// still missing. Otherwise the new job is arbitrated right away, so
    /// older work in flight sees it at its next checkpoint.
    pub fn admit(&self, submission: Submission) -> Option<JobTag> {
        let Submission {
            edit,
            interaction_id,
        } = submission;
        let tag = self.counter.tag(edit.kind(), interaction_id);
        debug!(
            sequence = tag.sequence,
            kind = %tag.kind,
            interaction_id = ?tag.interaction_id,
            "edit received",
        );

        if let Err(err) = self.apply(&tag, edit) {
            self.reject(&tag, &err);
            return None;
        }

        let phase = self.phase();
        if phase != Phase::Ready {
            debug!(sequence = tag.sequence, ?phase, "inputs incomplete, not processing");
            return None;
        }

        let verdict = self.arbiter.evaluate(&tag);
        debug!(sequence = tag.sequence, ?verdict, "job admitted");
        Some(tag)
    }

    fn apply(&self, tag: &JobTag, edit: Edit) -> Result<(), PipelineError> {
        match edit {
            Edit::OriginalImage(bytes) => {
                let image = gelscan_pipeline::decode(&bytes)?;
                let parameters = gelscan_pipeline::image_parameters(&image);
                {
                    let mut state = self.state.borrow_mut();
                    state.source = Some(Rc::new(image));
                    state.processed = None;
                }
                self.publish(tag, Publication::ImageParameters(parameters));
            }
            Edit::SettingsChange(settings) => {
                settings.validate()?;
                let channel_count = self.state.borrow().source.as_ref().map(|s| s.channels());
                if let Some(count) = channel_count {
                    // The selection must name a channel the current image has.
                    gelscan_pipeline::channels::effective_channels(
                        &settings.selected_channels,
                        count,
                    )?;
                }
                self.state.borrow_mut().settings = Some(settings);
            }
            Edit::LaneChange(lanes) => {
                self.state.borrow_mut().lanes = lanes;
            }
        }
        Ok(())
    }

    /// Run the stages routed for `tag`, then clear the reference if it is
    /// still this job.
    pub async fn run(&self, tag: JobTag) -> JobOutcome {
        let result = match tag.kind.route() {
            Route::Full => self.run_full(&tag).await,
            Route::LanesOnly => self.run_lanes(&tag).await,
        };
        let outcome = result.unwrap_or_else(|err| {
            self.reject(&tag, &err);
            JobOutcome::Rejected
        });
        self.arbiter.release(&tag);
        debug!(sequence = tag.sequence, kind = %tag.kind, ?outcome, "job finished");
        outcome
    }

    async fn proceed(&self, tag: &JobTag) -> bool {
        checkpoint(&self.arbiter, tag, self.backoff).await == Checkpoint::Proceed
    }

    async fn run_full(&self, tag: &JobTag) -> Result<JobOutcome, PipelineError> {
        // Stage 1: geometry.
        if !self.proceed(tag).await {
            return Ok(JobOutcome::Abandoned);
        }
        let Some((source, settings)) = self.inputs() else {
            debug!(sequence = tag.sequence, "image or settings missing, skipping");
            return Ok(JobOutcome::Skipped);
        };
        let oriented = Preprocess::new(&source, &settings)?.rotate().invert();

        // Stage 2: noise filters.
        if !self.proceed(tag).await {
            return Ok(JobOutcome::Abandoned);
        }
        let filtered = oriented.filter();

        // Stage 3: threshold and normalization.
        if !self.proceed(tag).await {
            return Ok(JobOutcome::Abandoned);
        }
        let processed = Rc::new(filtered.threshold()?);

        // Stage 4: grey preview.
        if !self.proceed(tag).await {
            return Ok(JobOutcome::Abandoned);
        }
        let preview = gelscan_pipeline::encode_png(&processed.grey_preview())?;
        if !self.proceed(tag).await {
            return Ok(JobOutcome::Abandoned);
        }
        self.state.borrow_mut().processed = Some(Rc::clone(&processed));
        self.publish_preview(tag, preview);

        // Stage 5: channel images.
        if !self.proceed(tag).await {
            return Ok(JobOutcome::Abandoned);
        }
        if let Some([red, green, blue]) = processed.split_channels() {
            let pngs = [
                gelscan_pipeline::encode_png(&red)?,
                gelscan_pipeline::encode_png(&green)?,
                gelscan_pipeline::encode_png(&blue)?,
            ];
            if !self.proceed(tag).await {
                return Ok(JobOutcome::Abandoned);
            }
            self.publish_channels(tag, pngs);
        } else {
            self.release_channels();
        }

        // Stage 6: lane histograms.
        self.lane_stage(tag, &processed).await
    }

    async fn run_lanes(&self, tag: &JobTag) -> Result<JobOutcome, PipelineError> {
        if !self.proceed(tag).await {
            return Ok(JobOutcome::Abandoned);
        }
        let Some(processed) = self.processed() else {
            debug!(sequence = tag.sequence, "no processed image yet, skipping lanes");
            return Ok(JobOutcome::Skipped);
        };
        self.lane_stage(tag, &processed).await
    }

    async fn lane_stage(
        &self,
        tag: &JobTag,
        processed: &Processed,
    ) -> Result<JobOutcome, PipelineError> {
        if !self.proceed(tag).await {
            return Ok(JobOutcome::Abandoned);
        }
        let lanes = self.lanes();
        if !processed.lanes_fit(&lanes) {
            debug!(
                sequence = tag.sequence,
                width = processed.image().width(),
                "lane borders outside processed image, skipping lanes",
            );
            return Ok(JobOutcome::Completed);
        }

        let mut histograms = Vec::with_capacity(lanes.len());
        for lane in lanes {
            histograms.push(processed.lane_histogram(lane)?);
            if !self.proceed(tag).await {
                return Ok(JobOutcome::Abandoned);
            }
        }

        self.publish(tag, Publication::ProcessedLanes(histograms));
        Ok(JobOutcome::Completed)
    }

    fn inputs(&self) -> Option<(Rc<GelImage>, PreprocessingSettings)> {
        let state = self.state.borrow();
        Some((Rc::clone(state.source.as_ref()?), state.settings.clone()?))
    }

    fn publish_preview(&self, tag: &JobTag, png: Vec<u8>) {
        let handle = self.handles.create(png);
        let previous = self.state.borrow_mut().preview.replace(handle.clone());
        self.publish(tag, Publication::ProcessedImage(handle));
        if let Some(old) = previous {
            self.handles.revoke(&old);
        }
    }

    fn publish_channels(&self, tag: &JobTag, pngs: [Vec<u8>; 3]) {
        let handles = pngs.map(|png| self.handles.create(png));
        let previous = self.state.borrow_mut().channels.replace(handles.clone());
        self.publish(tag, Publication::ProcessedChannels(handles));
        for old in previous.iter().flatten() {
            self.handles.revoke(old);
        }
    }

    /// Release channel images left over from a three-channel source once
    /// a processed image without channels has replaced them.
    fn release_channels(&self) {
        let previous = self.state.borrow_mut().channels.take();
        for old in previous.iter().flatten() {
            self.handles.revoke(old);
        }
    }

    fn reject(&self, tag: &JobTag, err: &PipelineError) {
        let rejection = Rejection::new(tag.kind, err);
        match rejection.category {
            RejectionCategory::ContractViolation => warn!(
                sequence = tag.sequence,
                kind = %tag.kind,
                interaction_id = ?tag.interaction_id,
                error = %err,
                "edit rejected",
            ),
            RejectionCategory::EnvironmentFailure => error!(
                sequence = tag.sequence,
                kind = %tag.kind,
                interaction_id = ?tag.interaction_id,
                error = %err,
                "edit failed",
            ),
        }
        self.publish(tag, Publication::Rejected(rejection));
    }

    fn publish(&self, tag: &JobTag, publication: Publication) {
        debug!(
            sequence = tag.sequence,
            output = ?publication.kind(),
            interaction_id = ?tag.interaction_id,
            "publishing",
        );
        self.publisher.publish(Envelope {
            publication,
            interaction_id: tag.interaction_id,
        });
    }
}
