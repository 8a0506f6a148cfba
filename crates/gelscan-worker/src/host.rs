//! Host boundary adapter.
//!
//! [`Host`] runs a [`Coordinator`] on a dedicated thread with a
//! single-threaded tokio runtime and a [`LocalSet`], so jobs interleave
//! only at their checkpoints. The interactive side submits edits without
//! blocking and receives outputs through subscriptions.

use std::rc::Rc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tokio::task::{JoinSet, LocalSet};
use tracing::{debug, error, info};

use crate::config::WorkerConfig;
use crate::coordinator::{Coordinator, JobOutcome};
use crate::error::WorkerError;
use crate::handle::{HandleStore, ImageHandle, MemoryHandles};
use crate::message::{Edit, Envelope, OutputKind, Submission};
use crate::subscription::{Publisher, Subscribers, SubscriptionId};

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct Host {
    sender: Option<mpsc::UnboundedSender<Submission>>,
    worker: Option<JoinHandle<()>>,
    subscribers: Subscribers,
    handles: MemoryHandles,
}

impl Host {
    /// Start the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] if the runtime or the thread cannot
    /// be created.
    pub fn spawn(config: WorkerConfig) -> Result<Self, WorkerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(WorkerError::Spawn)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let subscribers = Subscribers::new();
        let handles = MemoryHandles::new();

        let publisher = subscribers.clone();
        let store = handles.clone();
        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let coordinator = Rc::new(Coordinator::new(publisher, store, &config));
                LocalSet::new().block_on(&runtime, serve(receiver, coordinator));
            })
            .map_err(WorkerError::Spawn)?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            subscribers,
            handles,
        })
    }

    /// Queue an edit and return immediately.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] if the worker thread has
    /// stopped.
    pub fn submit(&self, edit: Edit, interaction_id: Option<u64>) -> Result<(), WorkerError> {
        let sender = self.sender.as_ref().ok_or(WorkerError::Disconnected)?;
        sender
            .send(Submission {
                edit,
                interaction_id,
            })
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Call `callback` for every publication of `kind`.
    ///
    /// Callbacks run on the worker thread, in publish order.
    pub fn subscribe(
        &self,
        kind: OutputKind,
        callback: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(kind, callback)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// The store behind published image handles.
    #[must_use]
    pub const fn handles(&self) -> &MemoryHandles {
        &self.handles
    }

    /// PNG bytes behind a published handle, while it is live.
    #[must_use]
    pub fn resolve(&self, handle: &ImageHandle) -> Option<std::sync::Arc<[u8]>> {
        self.handles.resolve(handle)
    }

    /// Stop accepting edits, let queued and in-flight jobs finish, and
    /// join the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] if the worker thread panicked.
    pub fn shutdown(mut self) -> Result<(), WorkerError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), WorkerError> {
        drop(self.sender.take());
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| WorkerError::Disconnected),
            None => Ok(()),
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!(%err, "worker thread did not stop cleanly");
        }
    }
}

/// Admit submissions in arrival order and run each admitted job as a local
/// task until the channel closes.
#[allow(clippy::future_not_send)] // runs on a LocalSet; Send is not needed
async fn serve<P, H>(
    mut receiver: mpsc::UnboundedReceiver<Submission>,
    coordinator: Rc<Coordinator<P, H>>,
) where
    P: Publisher + 'static,
    H: HandleStore + 'static,
{
    info!("worker started");
    let mut jobs: JoinSet<JobOutcome> = JoinSet::new();

    while let Some(submission) = receiver.recv().await {
        if let Some(tag) = coordinator.admit(submission) {
            let coordinator = Rc::clone(&coordinator);
            jobs.spawn_local(async move { coordinator.run(tag).await });
        }
        while let Some(finished) = jobs.try_join_next() {
            reap(finished);
        }
    }

    debug!(in_flight = jobs.len(), "channel closed, draining jobs");
    while let Some(finished) = jobs.join_next().await {
        reap(finished);
    }
    info!("worker stopped");
}

fn reap(finished: Result<JobOutcome, tokio::task::JoinError>) {
    if let Err(err) = finished {
        error!(%err, "job task failed");
    }
}
