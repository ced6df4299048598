use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::JobId;
use crate::ingest::{IngestError, ProgressSnapshot, ProgressStream};

pub const DEFAULT_JOB_EXPIRY: Duration = Duration::from_secs(60);

struct Inner {
    snapshots: DashMap<JobId, ProgressSnapshot>,
    cancellers: DashMap<JobId, CancellationToken>,
    expiry: Duration,
}

/// Latest progress of every asynchronous job, keyed by [`JobId`].
///
/// Each entry is written only by the drain task spawned in
/// [`register`](Self::register); any number of pollers may read concurrently.
/// Completed entries are removed `expiry` after completion was observed, so
/// an unknown id and an expired one look the same to callers.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

impl JobRegistry {
    pub fn new(expiry: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                snapshots: DashMap::new(),
                cancellers: DashMap::new(),
                expiry,
            }),
        }
    }

    /// Number of entries currently held, completed ones included.
    pub fn len(&self) -> usize {
        self.inner.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.snapshots.is_empty()
    }

    /// Track `stream` under `job_id`. The entry is visible immediately with a
    /// pending snapshot; a background task then keeps it at the latest value.
    pub fn register(&self, job_id: JobId, stream: ProgressStream) -> Result<(), IngestError> {
        self.register_cancellable(job_id, stream, None)
    }

    /// Like [`register`](Self::register), keeping `cancel` so the job can be
    /// stopped through [`cancel`](Self::cancel) while it runs.
    pub fn register_cancellable(
        &self,
        job_id: JobId,
        stream: ProgressStream,
        cancel: Option<CancellationToken>,
    ) -> Result<(), IngestError> {
        match self.inner.snapshots.entry(job_id) {
            Entry::Occupied(_) => return Err(IngestError::DuplicateJob(job_id)),
            Entry::Vacant(slot) => {
                slot.insert(ProgressSnapshot::pending(stream.total()));
            }
        }

        if let Some(token) = cancel {
            self.inner.cancellers.insert(job_id, token);
        }

        log::debug!("job {} registered ({} records)", job_id, stream.total());

        let registry = self.clone();
        tokio::spawn(async move { registry.drain(job_id, stream).await });
        Ok(())
    }

    /// Latest snapshot of `job_id`, if the job is known and not yet expired.
    pub fn get(&self, job_id: &JobId) -> Option<ProgressSnapshot> {
        self.inner
            .snapshots
            .get(job_id)
            .map(|entry| entry.value().clone())
    }

    /// Request cancellation of a running job. Returns false when the job is
    /// unknown, already finished or was registered without a token.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.inner.cancellers.get(job_id) {
            Some(token) => {
                token.cancel();
                log::info!("job {} cancellation requested", job_id);
                true
            }
            None => false,
        }
    }

    /// Schedule removal of a completed entry after the grace period.
    pub fn expire(&self, job_id: JobId) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.expiry).await;
            if inner
                .snapshots
                .remove_if(&job_id, |_, snapshot| snapshot.is_complete())
                .is_some()
            {
                log::debug!("job {} expired", job_id);
            }
        });
    }

    async fn drain(self, job_id: JobId, mut stream: ProgressStream) {
        let total = stream.total();
        let mut completed = false;

        while let Some(snapshot) = stream.next().await {
            completed = snapshot.is_complete();
            self.inner.snapshots.insert(job_id, snapshot);
        }

        if !completed {
            log::error!("job {} stream closed before completion", job_id);
            let mut last = self
                .get(&job_id)
                .unwrap_or_else(|| ProgressSnapshot::pending(total));
            last.progress = 100;
            last.errors
                .push("ingestion aborted: worker stopped before completion".to_string());
            self.inner.snapshots.insert(job_id, last);
        }

        self.inner.cancellers.remove(&job_id);
        log::info!("job {} complete, expiring in {:?}", job_id, self.inner.expiry);
        self.expire(job_id);
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_JOB_EXPIRY)
    }
}
