//! Worker error types.

/// Errors surfaced by the host adapter.
///
/// Pipeline failures never reach the caller this way; they are published
/// as `rejected` outputs instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker thread has exited; no more edits can be submitted.
    #[error("worker thread is no longer running")]
    Disconnected,

    /// The worker thread or its runtime could not be started.
    #[error("failed to start worker: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn spawn_failure_keeps_its_cause() {
        let err = WorkerError::Spawn(std::io::Error::other("no threads left"));
        assert_eq!(err.to_string(), "failed to start worker: no threads left");
        assert!(err.source().is_some());
        assert!(WorkerError::Disconnected.source().is_none());
    }
}
