//! gelscan-worker: background coordinator for gel processing jobs.
//!
//! Every user edit (new image, new settings, new lanes) becomes a job
//! tagged with a submission sequence number and a priority. Jobs run on a
//! single cooperative thread and call a checkpoint before each pipeline
//! stage; the checkpoint compares the job against the most relevant job
//! seen so far and lets it continue, wait or quietly stop.
//!
//! - [`job`] and [`checkpoint`]: tags, priorities and the arbitration rule.
//! - [`coordinator`]: inputs, derived outputs and the staged pipeline.
//! - [`host`]: the thread, runtime and message boundary around it.

pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handle;
pub mod host;
pub mod job;
pub mod message;
pub mod subscription;

pub use checkpoint::{Arbiter, Backoff, Checkpoint, Verdict, arbitrate, checkpoint};
pub use config::WorkerConfig;
pub use coordinator::{Coordinator, JobOutcome, Phase};
pub use error::WorkerError;
pub use handle::{HandleStore, ImageHandle, MemoryHandles};
pub use host::Host;
pub use job::{EditKind, JobCounter, JobTag, Priority, Route};
pub use message::{
    Edit, Envelope, OutputKind, Publication, Rejection, RejectionCategory, Submission,
};
pub use subscription::{Publisher, Subscribers, SubscriptionId};
