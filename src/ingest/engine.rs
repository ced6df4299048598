use rayon::ThreadPool;
use rayon::prelude::*;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::progress::ProgressTracker;
use super::{IngestError, ProgressSnapshot, ProgressStream};
use crate::models::{BatchItem, Member, OrgAddress};
use crate::store::MemberStore;
use crate::validation::{RecordValidator, ValidationError, ValidationPolicy};

/// Bulk ingestion engine.
///
/// Every submission gets one producer task that validates and persists the
/// batch group by group and reports a [`ProgressSnapshot`] after each group.
/// Validation (including password hashing) runs on a dedicated rayon pool so
/// the async runtime never does CPU-bound work.
#[derive(Clone)]
pub struct IngestEngine {
    store: Arc<dyn MemberStore>,
    validator: Arc<RecordValidator>,
    pool: Arc<ThreadPool>,
    group_size: usize,
}

impl IngestEngine {
    pub fn new(
        store: Arc<dyn MemberStore>,
        validator: Arc<RecordValidator>,
        pool: Arc<ThreadPool>,
        group_size: usize,
    ) -> Self {
        Self {
            store,
            validator,
            pool,
            group_size: group_size.max(1),
        }
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Start ingesting `items` into `org`. Must be called inside a tokio
    /// runtime; the batch runs to completion even if the stream is dropped.
    pub fn submit(
        &self,
        org: OrgAddress,
        items: Vec<BatchItem>,
        policy: ValidationPolicy,
    ) -> ProgressStream {
        self.submit_with_cancel(org, items, policy, CancellationToken::new())
    }

    /// Like [`submit`](Self::submit), but stops before the next group once
    /// `cancel` fires.
    pub fn submit_with_cancel(
        &self,
        org: OrgAddress,
        items: Vec<BatchItem>,
        policy: ValidationPolicy,
        cancel: CancellationToken,
    ) -> ProgressStream {
        let total = items.len();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let run = BatchRun {
            org,
            policy,
            cancel,
            store: Arc::clone(&self.store),
            validator: Arc::clone(&self.validator),
            pool: Arc::clone(&self.pool),
            group_size: self.group_size,
            snapshots: snapshot_tx,
        };

        tokio::spawn(async move {
            let outcome = run.run(items).await;
            // Nobody listening is fine.
            let _ = outcome_tx.send(outcome);
        });

        ProgressStream::new(total, snapshot_rx, outcome_rx)
    }
}

type Validated = Vec<(usize, Result<Member, ValidationError>)>;

/// State owned by the producer task of one batch.
struct BatchRun {
    org: OrgAddress,
    policy: ValidationPolicy,
    cancel: CancellationToken,
    store: Arc<dyn MemberStore>,
    validator: Arc<RecordValidator>,
    pool: Arc<ThreadPool>,
    group_size: usize,
    snapshots: mpsc::UnboundedSender<ProgressSnapshot>,
}

impl BatchRun {
    async fn run(self, items: Vec<BatchItem>) -> Result<(), IngestError> {
        let total = items.len();
        let num_groups = total.div_ceil(self.group_size);
        let mut tracker = ProgressTracker::new(total);

        log::info!(
            "ingesting {} members into {} in {} groups of up to {}",
            total,
            self.org,
            num_groups,
            self.group_size
        );

        let mut remaining = items.into_iter().enumerate().peekable();
        if remaining.peek().is_none() {
            self.emit(tracker.finish());
            return Ok(());
        }

        let mut group_idx = 0;
        loop {
            if self.cancel.is_cancelled() {
                log::warn!(
                    "ingestion into {} cancelled before group {}/{}",
                    self.org,
                    group_idx + 1,
                    num_groups
                );
                self.emit(tracker.abort(IngestError::Cancelled.to_string()));
                return Err(IngestError::Cancelled);
            }

            let group: Vec<(usize, BatchItem)> =
                remaining.by_ref().take(self.group_size).collect();
            let is_last = remaining.peek().is_none();

            if let Err(err) = self.process_group(group, &mut tracker).await {
                log::error!(
                    "ingestion into {} aborted at group {}/{}: {}",
                    self.org,
                    group_idx + 1,
                    num_groups,
                    err
                );
                self.emit(tracker.abort(format!("ingestion aborted: {err}")));
                return Err(err);
            }

            group_idx += 1;
            log::debug!(
                "group {}/{} done for {}: {} added, {} errors",
                group_idx,
                num_groups,
                self.org,
                tracker.added(),
                tracker.error_count()
            );

            if is_last {
                break;
            }
            self.emit(tracker.snapshot());
        }

        log::info!(
            "ingestion into {} finished: {}/{} added, {} errors",
            self.org,
            tracker.added(),
            total,
            tracker.error_count()
        );
        self.emit(tracker.finish());
        Ok(())
    }

    /// Validate and persist one group. Per-record failures are recorded in
    /// input order; only store-level failures are returned.
    async fn process_group(
        &self,
        group: Vec<(usize, BatchItem)>,
        tracker: &mut ProgressTracker,
    ) -> Result<(), IngestError> {
        let mut failures = Vec::new();
        let mut indexes = Vec::with_capacity(group.len());
        let mut members = Vec::with_capacity(group.len());

        for (index, result) in self.validate_group(group).await? {
            match result {
                Ok(member) => {
                    indexes.push(index);
                    members.push(member);
                }
                Err(err) => {
                    log::debug!("record {} rejected for {}: {}", index, self.org, err);
                    failures.push((index, err.to_string()));
                }
            }
        }

        let persisted = if members.is_empty() {
            Ok(())
        } else {
            match self.store.persist_group(&self.org, &members).await {
                Ok(outcome) => {
                    tracker.record_added(outcome.added);
                    for (position, reason) in outcome.rejected {
                        if let Some(&index) = indexes.get(position) {
                            log::debug!("record {} refused by store: {}", index, reason);
                            failures.push((index, reason));
                        }
                    }
                    Ok(())
                }
                Err(err) => Err(IngestError::from(err)),
            }
        };

        failures.sort_by_key(|(index, _)| *index);
        tracker.record_failures(failures);
        persisted
    }

    async fn validate_group(&self, group: Vec<(usize, BatchItem)>) -> Result<Validated, IngestError> {
        let pool = Arc::clone(&self.pool);
        let validator = Arc::clone(&self.validator);
        let org = self.org.clone();
        let policy = self.policy.clone();

        tokio::task::spawn_blocking(move || {
            pool.install(|| {
                group
                    .into_par_iter()
                    .map(|(index, item)| (index, validator.validate(&org, &policy, item)))
                    .collect::<Validated>()
            })
        })
        .await
        .map_err(|err| IngestError::WorkerStopped(err.to_string()))
    }

    fn emit(&self, snapshot: ProgressSnapshot) {
        // The reader may have gone away; keep going regardless.
        let _ = self.snapshots.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMemberStore;
    use crate::validation::{PasswordError, PasswordHashing};

    struct PlainHasher;

    impl PasswordHashing for PlainHasher {
        fn hash_password(&self, _org: &OrgAddress, password: &str) -> Result<String, PasswordError> {
            Ok(format!("hashed:{}", password.len()))
        }
    }

    fn engine(store: Arc<InMemoryMemberStore>, group_size: usize) -> IngestEngine {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .expect("thread pool");
        IngestEngine::new(
            store,
            Arc::new(RecordValidator::new(Arc::new(PlainHasher))),
            Arc::new(pool),
            group_size,
        )
    }

    fn org() -> OrgAddress {
        OrgAddress::parse("acme").unwrap()
    }

    fn valid(n: usize) -> BatchItem {
        BatchItem {
            name: Some(format!("Member {n}")),
            email: Some(format!("member{n}@example.org")),
            ..BatchItem::default()
        }
    }

    async fn collect(mut stream: ProgressStream) -> Vec<ProgressSnapshot> {
        let mut seen = Vec::new();
        while let Some(snapshot) = stream.next().await {
            seen.push(snapshot);
        }
        seen
    }

    #[tokio::test]
    async fn empty_batch_yields_a_single_terminal_snapshot() {
        let engine = engine(Arc::new(InMemoryMemberStore::new()), 10);
        let seen = collect(engine.submit(org(), Vec::new(), ValidationPolicy::default())).await;

        assert_eq!(
            seen,
            vec![ProgressSnapshot {
                total: 0,
                added: 0,
                progress: 100,
                errors: Vec::new(),
            }]
        );
    }

    #[tokio::test]
    async fn invalid_records_are_reported_in_input_order() {
        let store = Arc::new(InMemoryMemberStore::new());
        let engine = engine(Arc::clone(&store), 2);
        let items = vec![
            valid(0),
            BatchItem {
                email: Some("not-an-email".to_string()),
                ..valid(1)
            },
            valid(2),
            BatchItem {
                phone: Some("12ab".to_string()),
                ..valid(3)
            },
            BatchItem {
                birth_date: Some("31/31/2000".to_string()),
                ..valid(4)
            },
        ];

        let done = engine
            .submit(org(), items, ValidationPolicy::default())
            .finish()
            .await
            .expect("batch completes");

        assert_eq!(done.total, 5);
        assert_eq!(done.added, 2);
        assert_eq!(done.progress, 100);
        assert_eq!(done.errors.len(), 3);
        assert!(done.errors[0].starts_with("record 1: "));
        assert!(done.errors[1].starts_with("record 3: "));
        assert!(done.errors[2].starts_with("record 4: "));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn snapshots_are_monotonic_and_end_exactly_once() {
        let engine = engine(Arc::new(InMemoryMemberStore::new()), 3);
        let items: Vec<_> = (0..10).map(valid).collect();

        let seen = collect(engine.submit(org(), items, ValidationPolicy::default())).await;

        assert_eq!(seen.len(), 4);
        assert_eq!(seen.iter().filter(|s| s.is_complete()).count(), 1);
        assert!(seen.last().unwrap().is_complete());
        for pair in seen.windows(2) {
            assert!(pair[0].added <= pair[1].added);
            assert!(pair[0].progress <= pair[1].progress);
            assert!(pair[0].errors.len() <= pair[1].errors.len());
        }
        for snapshot in &seen[..seen.len() - 1] {
            assert_eq!(snapshot.progress as usize, snapshot.added * 100 / snapshot.total);
        }
        assert_eq!(seen.last().unwrap().added, 10);
    }

    #[tokio::test]
    async fn store_conflicts_count_as_record_errors() {
        let store = Arc::new(InMemoryMemberStore::new());
        let engine = engine(Arc::clone(&store), 10);
        let items = vec![valid(0), valid(0), valid(1)];

        let done = engine
            .submit(org(), items, ValidationPolicy::default())
            .finish()
            .await
            .unwrap();

        assert_eq!(done.added, 2);
        assert_eq!(done.errors.len(), 1);
        assert!(done.errors[0].starts_with("record 1: "));
    }

    #[tokio::test]
    async fn unavailable_store_aborts_with_a_synthetic_entry() {
        let store = Arc::new(InMemoryMemberStore::new());
        store.set_available(false);
        let engine = engine(Arc::clone(&store), 2);
        let items = vec![valid(0), BatchItem::default(), valid(2)];

        let mut stream = engine.submit(org(), items, ValidationPolicy::default());
        let mut last = None;
        while let Some(snapshot) = stream.next().await {
            last = Some(snapshot);
        }
        let last = last.expect("terminal snapshot");
        assert_eq!(last.progress, 100);
        assert_eq!(last.added, 0);
        assert!(last.errors[0].starts_with("record 1: "));
        assert!(last.errors.last().unwrap().starts_with("ingestion aborted: store unavailable"));

        let store_down = engine
            .submit(org(), vec![valid(3)], ValidationPolicy::default())
            .finish()
            .await;
        assert!(matches!(store_down, Err(IngestError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn cancelled_batches_stop_between_groups() {
        let engine = engine(Arc::new(InMemoryMemberStore::new()), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut stream = engine.submit_with_cancel(
            org(),
            vec![valid(0), valid(1)],
            ValidationPolicy::default(),
            cancel,
        );
        let only = stream.next().await.expect("terminal snapshot");
        assert!(stream.next().await.is_none());
        assert_eq!(only.added, 0);
        assert_eq!(only.progress, 100);
        assert_eq!(only.errors, vec!["ingestion cancelled".to_string()]);
        assert!(matches!(stream.finish().await, Err(IngestError::Cancelled)));
    }

    #[tokio::test]
    async fn abandoned_streams_still_complete() {
        let store = Arc::new(InMemoryMemberStore::new());
        let engine = engine(Arc::clone(&store), 2);
        let items: Vec<_> = (0..5).map(valid).collect();

        drop(engine.submit(org(), items, ValidationPolicy::default()));

        for _ in 0..200 {
            if store.len() == 5 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(store.len(), 5);
    }
}
