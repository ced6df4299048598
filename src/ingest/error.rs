use thiserror::Error;

use crate::jobs::JobId;
use crate::store::StoreError;

/// Failures that end a submission or a whole batch. Per-record problems are
/// not errors at this level; they travel inside the snapshots.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    #[error("ingestion cancelled")]
    Cancelled,
    #[error("ingestion worker stopped: {0}")]
    WorkerStopped(String),
    #[error("job {0} is already registered")]
    DuplicateJob(JobId),
}
