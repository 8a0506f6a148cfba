//! Cooperative cancellation checkpoints.
//!
//! A running job periodically asks whether it is still the most relevant
//! piece of work by comparing its [`JobTag`] against the single
//! *reference* tag held by the [`Arbiter`]:
//!
//! ```text
//! incoming vs reference   priority          outcome
//!
//! newer                   higher or equal   continue
//! newer                   lower             wait, then re-evaluate
//! same job                higher or equal   continue
//! same job                lower             terminate
//! older                   higher            continue
//! older                   equal or lower    terminate
//! (no reference)                            continue
//! ```
//!
//! Every `continue` makes the incoming job the new reference. Upstream
//! edits (image, settings) therefore reset the pipeline immediately, while
//! a newer downstream edit (lanes) waits for upstream work it depends on
//! to finish.
//!
//! Waiting sleeps for `base × 2^attempt` and evaluates again from
//! scratch. There is no attempt cap: a waiting job only ever leaves the
//! loop through `continue` or `terminate`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::time::Duration;

use crate::job::JobTag;

/// Result of comparing an incoming job against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Proceed and become the reference.
    Continue,
    /// Back off and evaluate again later.
    Wait,
    /// Abandon the job silently.
    Terminate,
}

/// Pure arbitration rule between `incoming` and the current `reference`.
#[must_use]
pub fn arbitrate(incoming: &JobTag, reference: Option<&JobTag>) -> Verdict {
    let Some(reference) = reference else {
        return Verdict::Continue;
    };

    let priority = incoming.priority.cmp(&reference.priority);
    match incoming.sequence.cmp(&reference.sequence) {
        Ordering::Greater => match priority {
            Ordering::Greater | Ordering::Equal => Verdict::Continue,
            Ordering::Less => Verdict::Wait,
        },
        Ordering::Equal => match priority {
            Ordering::Greater | Ordering::Equal => Verdict::Continue,
            Ordering::Less => Verdict::Terminate,
        },
        Ordering::Less => match priority {
            Ordering::Greater => Verdict::Continue,
            Ordering::Equal | Ordering::Less => Verdict::Terminate,
        },
    }
}

/// Holder of the reference job.
///
/// Evaluation reads and updates the reference without suspending, so on a
/// single-threaded executor no other job can observe a half-made decision.
#[derive(Debug, Default)]
pub struct Arbiter {
    reference: RefCell<Option<JobTag>>,
}

impl Arbiter {
    /// An arbiter with no reference job.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current reference job, if any.
    #[must_use]
    pub fn reference(&self) -> Option<JobTag> {
        *self.reference.borrow()
    }

    /// Arbitrate `tag` against the reference; on [`Verdict::Continue`]
    /// `tag` becomes the reference.
    pub fn evaluate(&self, tag: &JobTag) -> Verdict {
        let mut reference = self.reference.borrow_mut();
        let verdict = arbitrate(tag, reference.as_ref());
        if verdict == Verdict::Continue {
            *reference = Some(*tag);
        }
        verdict
    }

    /// Clear the reference if it is still `tag`. Returns whether it was.
    pub fn release(&self, tag: &JobTag) -> bool {
        let mut reference = self.reference.borrow_mut();
        if reference.is_some_and(|r| r.same_job(tag)) {
            *reference = None;
            true
        } else {
            false
        }
    }
}

/// Exponential backoff schedule for waiting jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
}

impl Backoff {
    /// A schedule whose first wait is `base`.
    #[must_use]
    pub const fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Delay before re-evaluating on retry `attempt` (starting at 0).
    #[must_use]
    pub fn delay(self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

/// Outcome of a checkpoint from the job's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Run the next stage.
    Proceed,
    /// Stop without publishing anything further.
    Abandon,
}

/// Yield to other jobs, then arbitrate `tag` until it may proceed or must
/// be abandoned.
pub async fn checkpoint(arbiter: &Arbiter, tag: &JobTag, backoff: Backoff) -> Checkpoint {
    tokio::task::yield_now().await;
    settle(arbiter, tag, backoff).await
}

/// Arbitrate `tag` without yielding first, sleeping between attempts while
/// the verdict is [`Verdict::Wait`].
async fn settle(arbiter: &Arbiter, tag: &JobTag, backoff: Backoff) -> Checkpoint {
    let mut attempt: u32 = 0;
    loop {
        match arbiter.evaluate(tag) {
            Verdict::Continue => {
                tracing::trace!(sequence = tag.sequence, kind = %tag.kind, "checkpoint: continue");
                return Checkpoint::Proceed;
            }
            Verdict::Terminate => {
                tracing::debug!(
                    sequence = tag.sequence,
                    kind = %tag.kind,
                    interaction_id = ?tag.interaction_id,
                    "checkpoint: superseded",
                );
                return Checkpoint::Abandon;
            }
            Verdict::Wait => {
                let delay = backoff.delay(attempt);
                tracing::debug!(
                    sequence = tag.sequence,
                    kind = %tag.kind,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "checkpoint: waiting",
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::job::{EditKind, JobCounter};

    fn tag(kind: EditKind, sequence: u64) -> JobTag {
        JobTag {
            kind,
            interaction_id: None,
            sequence,
            priority: kind.priority(),
        }
    }

    const HIGH: EditKind = EditKind::SettingsChange;
    const LOW: EditKind = EditKind::LaneChange;

    #[test]
    fn arbitration_table() {
        let cases = [
            // (incoming kind, incoming seq, reference kind, reference seq, verdict)
            (HIGH, 5, LOW, 3, Verdict::Continue),  // newer, higher
            (HIGH, 5, HIGH, 3, Verdict::Continue), // newer, equal
            (LOW, 5, HIGH, 3, Verdict::Wait),      // newer, lower
            (HIGH, 3, LOW, 3, Verdict::Continue),  // same, higher
            (HIGH, 3, HIGH, 3, Verdict::Continue), // same, equal
            (LOW, 3, HIGH, 3, Verdict::Terminate), // same, lower
            (HIGH, 1, LOW, 3, Verdict::Continue),  // older, higher
            (HIGH, 1, HIGH, 3, Verdict::Terminate), // older, equal
            (LOW, 1, HIGH, 3, Verdict::Terminate), // older, lower
        ];
        for (in_kind, in_seq, ref_kind, ref_seq, expected) in cases {
            let verdict = arbitrate(&tag(in_kind, in_seq), Some(&tag(ref_kind, ref_seq)));
            assert_eq!(
                verdict, expected,
                "{in_kind}#{in_seq} against {ref_kind}#{ref_seq}"
            );
        }
    }

    #[test]
    fn no_reference_always_continues() {
        assert_eq!(arbitrate(&tag(LOW, 0), None), Verdict::Continue);
        assert_eq!(arbitrate(&tag(HIGH, 9), None), Verdict::Continue);
    }

    #[test]
    fn continue_claims_the_reference() {
        let arbiter = Arbiter::new();
        let first = tag(HIGH, 1);
        assert_eq!(arbiter.evaluate(&first), Verdict::Continue);
        assert_eq!(arbiter.reference(), Some(first));

        let newer = tag(HIGH, 2);
        assert_eq!(arbiter.evaluate(&newer), Verdict::Continue);
        assert_eq!(arbiter.reference(), Some(newer));

        // The older job is now superseded and does not touch the reference.
        assert_eq!(arbiter.evaluate(&first), Verdict::Terminate);
        assert_eq!(arbiter.reference(), Some(newer));
    }

    #[test]
    fn wait_leaves_the_reference_alone() {
        let arbiter = Arbiter::new();
        let upstream = tag(HIGH, 1);
        arbiter.evaluate(&upstream);
        assert_eq!(arbiter.evaluate(&tag(LOW, 2)), Verdict::Wait);
        assert_eq!(arbiter.reference(), Some(upstream));
    }

    #[test]
    fn release_only_clears_own_tag() {
        let arbiter = Arbiter::new();
        let a = tag(HIGH, 1);
        let b = tag(HIGH, 2);
        arbiter.evaluate(&a);
        arbiter.evaluate(&b);
        assert!(!arbiter.release(&a));
        assert_eq!(arbiter.reference(), Some(b));
        assert!(arbiter.release(&b));
        assert_eq!(arbiter.reference(), None);
    }

    #[test]
    fn lower_priority_job_mid_pipeline_yields_to_newer_upstream_edit() {
        let counter = JobCounter::new();
        let arbiter = Arbiter::new();

        let lanes = counter.tag(LOW, None);
        assert_eq!(arbiter.evaluate(&lanes), Verdict::Continue);

        let settings = counter.tag(HIGH, None);
        assert_eq!(arbiter.evaluate(&settings), Verdict::Continue);

        assert_ne!(arbiter.evaluate(&lanes), Verdict::Continue);
    }

    #[test]
    fn backoff_doubles_from_base() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_millis(10));
        assert_eq!(backoff.delay(1), Duration::from_millis(20));
        assert_eq!(backoff.delay(4), Duration::from_millis(160));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let backoff = Backoff::new(Duration::from_secs(1));
        assert_eq!(backoff.delay(200), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_job_retries_with_exponential_backoff() {
        let arbiter = Arbiter::new();
        let upstream = tag(HIGH, 1);
        let lanes = tag(LOW, 2);
        arbiter.evaluate(&upstream);

        let start = tokio::time::Instant::now();
        let (outcome, ()) = tokio::join!(
            checkpoint(&arbiter, &lanes, Backoff::default()),
            async {
                tokio::time::sleep(Duration::from_millis(35)).await;
                arbiter.release(&upstream);
            },
        );

        // Waits of 10, 20 and 40 ms: the release at 35 ms is noticed on the
        // third re-evaluation.
        assert_eq!(outcome, Checkpoint::Proceed);
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(70) && elapsed < Duration::from_millis(80),
            "elapsed {elapsed:?}"
        );
        assert_eq!(arbiter.reference(), Some(lanes));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_waiting_job_terminates() {
        let arbiter = Arbiter::new();
        let counter = JobCounter::new();
        let first = counter.tag(HIGH, None);
        let lanes = counter.tag(LOW, None);
        let later = counter.tag(HIGH, None);
        arbiter.evaluate(&first);

        let (outcome, ()) = tokio::join!(
            checkpoint(&arbiter, &lanes, Backoff::default()),
            async {
                tokio::time::sleep(Duration::from_millis(15)).await;
                arbiter.evaluate(&later);
            },
        );

        // Once `later` has claimed the reference, the waiting lane job is
        // older and lower priority than it.
        assert_eq!(outcome, Checkpoint::Abandon);
        assert_eq!(arbiter.reference(), Some(later));
    }
}
