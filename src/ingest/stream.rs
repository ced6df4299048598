use tokio::sync::{mpsc, oneshot};

use super::{IngestError, ProgressSnapshot};

/// Ordered snapshots of one batch, ending with exactly one terminal
/// snapshot (`progress == 100`).
///
/// Dropping the stream early is fine: the producer keeps running to
/// completion and discards what nobody reads.
pub struct ProgressStream {
    total: usize,
    snapshots: mpsc::UnboundedReceiver<ProgressSnapshot>,
    outcome: oneshot::Receiver<Result<(), IngestError>>,
    last: Option<ProgressSnapshot>,
}

impl ProgressStream {
    pub(crate) fn new(
        total: usize,
        snapshots: mpsc::UnboundedReceiver<ProgressSnapshot>,
        outcome: oneshot::Receiver<Result<(), IngestError>>,
    ) -> Self {
        Self {
            total,
            snapshots,
            outcome,
            last: None,
        }
    }

    /// Number of items in the submitted batch.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Wait for the next snapshot; `None` once the stream is closed.
    pub async fn next(&mut self) -> Option<ProgressSnapshot> {
        let snapshot = self.snapshots.recv().await?;
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Drain to closure and return the terminal snapshot, or the error that
    /// ended the batch early.
    pub async fn finish(mut self) -> Result<ProgressSnapshot, IngestError> {
        while self.next().await.is_some() {}

        match self.outcome.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(IngestError::WorkerStopped(
                    "producer exited without reporting an outcome".to_string(),
                ));
            }
        }

        match self.last {
            Some(snapshot) if snapshot.is_complete() => Ok(snapshot),
            _ => Err(IngestError::WorkerStopped(
                "stream closed without a terminal snapshot".to_string(),
            )),
        }
    }
}
