//! Fan-out of publications to host callbacks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::message::{Envelope, OutputKind};

/// Receives every publication the coordinator makes.
pub trait Publisher {
    /// Deliver one publication.
    fn publish(&self, envelope: Envelope);
}

/// Identifies a registered callback so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&Envelope) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next: u64,
    entries: Vec<(SubscriptionId, OutputKind, Callback)>,
}

/// Per-kind subscriber lists.
///
/// Cloning shares the registry. Callbacks run on the publishing thread,
/// outside the registry lock, so a callback may itself subscribe or
/// unsubscribe.
#[derive(Clone, Default)]
pub struct Subscribers {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.lock().entries.len())
            .finish()
    }
}

impl Subscribers {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every publication of `kind`.
    pub fn subscribe(
        &self,
        kind: OutputKind,
        callback: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut registry = self.lock();
        let id = SubscriptionId(registry.next);
        registry.next = registry.next.saturating_add(1);
        registry.entries.push((id, kind, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.entries.len();
        registry.entries.retain(|(entry, _, _)| *entry != id);
        registry.entries.len() != before
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Publisher for Subscribers {
    fn publish(&self, envelope: Envelope) {
        let kind = envelope.publication.kind();
        let targets: Vec<Callback> = self
            .lock()
            .entries
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect();
        for callback in targets {
            callback(&envelope);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gelscan_pipeline::PipelineError;

    use super::*;
    use crate::job::EditKind;
    use crate::message::{Publication, Rejection};

    fn rejected() -> Envelope {
        Envelope {
            publication: Publication::Rejected(Rejection::new(
                EditKind::LaneChange,
                &PipelineError::NoActiveChannels,
            )),
            interaction_id: None,
        }
    }

    fn lanes() -> Envelope {
        Envelope {
            publication: Publication::ProcessedLanes(Vec::new()),
            interaction_id: Some(1),
        }
    }

    #[test]
    fn delivers_only_matching_kind() {
        let subs = Subscribers::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        subs.subscribe(OutputKind::Rejected, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subs.publish(lanes());
        subs.publish(rejected());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_subscribers_per_kind() {
        let subs = Subscribers::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&hits);
            subs.subscribe(OutputKind::ProcessedLanes, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        subs.publish(lanes());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let subs = Subscribers::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = subs.subscribe(OutputKind::ProcessedLanes, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        subs.publish(lanes());
        assert!(subs.unsubscribe(id));
        assert!(!subs.unsubscribe(id));
        subs.publish(lanes());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let subs = Subscribers::new();
        let inner = subs.clone();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::default();
        let slot_in_cb = Arc::clone(&slot);
        let id = subs.subscribe(OutputKind::ProcessedLanes, move |_| {
            if let Some(id) = *slot_in_cb.lock().unwrap() {
                inner.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);
        subs.publish(lanes());
        assert!(!subs.unsubscribe(id));
    }
}
