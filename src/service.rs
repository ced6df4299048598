//! Entry point for the request-handling layer.
//!
//! [`IngestService`] ties the engine, the job registry and the field
//! aggregator together behind the operations the HTTP routes and the import
//! CLI call.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ConfigError, IngestConfig};
use crate::fields::{FieldAggregator, FieldCheckError, FieldReport};
use crate::ingest::{IngestEngine, IngestError, ProgressSnapshot, ProgressStream};
use crate::jobs::{JobId, JobIdGenerator, JobRegistry, RandomJobIds};
use crate::models::{BatchItem, MemberField, OrgAddress};
use crate::store::MemberStore;
use crate::validation::{PasswordHashing, PasswordService, RecordValidator, ValidationPolicy};

pub struct IngestService {
    engine: IngestEngine,
    registry: JobRegistry,
    fields: FieldAggregator,
    job_ids: Arc<dyn JobIdGenerator>,
    policy: ValidationPolicy,
}

impl IngestService {
    /// Wire a service from configuration: argon2 hashing with the configured
    /// costs and a rayon pool of `validation_threads` workers.
    pub fn from_config(
        config: &IngestConfig,
        store: Arc<dyn MemberStore>,
    ) -> Result<Self, ConfigError> {
        let hasher = PasswordService::with_costs(
            config.argon2_m_cost_kib,
            config.argon2_t_cost,
            config.argon2_p_cost,
            config.password_pepper.as_deref(),
        )?;
        Self::with_hasher(config, store, Arc::new(hasher))
    }

    pub fn with_hasher(
        config: &IngestConfig,
        store: Arc<dyn MemberStore>,
        hasher: Arc<dyn PasswordHashing>,
    ) -> Result<Self, ConfigError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.validation_threads)
            .thread_name(|idx| format!("ingest-validate-{idx}"))
            .build()
            .map_err(|err| ConfigError::ThreadPool(err.to_string()))?;

        let engine = IngestEngine::new(
            Arc::clone(&store),
            Arc::new(RecordValidator::new(hasher)),
            Arc::new(pool),
            config.group_size,
        );

        log::info!(
            "ingest service ready: group size {}, {} validation threads, jobs expire after {:?}",
            engine.group_size(),
            config.validation_threads,
            config.job_expiry
        );

        Ok(Self {
            engine,
            registry: JobRegistry::new(config.job_expiry),
            fields: FieldAggregator::new(store),
            job_ids: Arc::new(RandomJobIds),
            policy: config.validation_policy(),
        })
    }

    pub fn with_job_ids(mut self, job_ids: Arc<dyn JobIdGenerator>) -> Self {
        self.job_ids = job_ids;
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Start a batch and hand back its progress stream. The caller is
    /// expected to drain it; see [`run_batch`](Self::run_batch).
    pub fn submit_batch(
        &self,
        org: &str,
        items: Vec<BatchItem>,
    ) -> Result<ProgressStream, IngestError> {
        let org = parse_org(org)?;
        Ok(self.engine.submit(org, items, self.policy.clone()))
    }

    /// Submit and wait for the terminal snapshot.
    pub async fn run_batch(
        &self,
        org: &str,
        items: Vec<BatchItem>,
    ) -> Result<ProgressSnapshot, IngestError> {
        self.submit_batch(org, items)?.finish().await
    }

    /// Start a batch tracked by the job registry and return its id without
    /// waiting for any work.
    pub fn submit_batch_async(
        &self,
        org: &str,
        items: Vec<BatchItem>,
    ) -> Result<JobId, IngestError> {
        let org = parse_org(org)?;

        let mut job_id = self.job_ids.generate();
        while self.registry.get(&job_id).is_some() {
            job_id = self.job_ids.generate();
        }

        let cancel = CancellationToken::new();
        let stream = self
            .engine
            .submit_with_cancel(org, items, self.policy.clone(), cancel.clone());

        if let Err(err) = self
            .registry
            .register_cancellable(job_id, stream, Some(cancel.clone()))
        {
            cancel.cancel();
            return Err(err);
        }

        Ok(job_id)
    }

    pub fn poll_job(&self, job_id: &JobId) -> Option<ProgressSnapshot> {
        self.registry.get(job_id)
    }

    pub fn cancel_job(&self, job_id: &JobId) -> bool {
        self.registry.cancel(job_id)
    }

    pub async fn check_fields(
        &self,
        org: &str,
        grouping: &str,
        member_ids: &[Uuid],
        auth_fields: &[MemberField],
        two_factor_fields: &[MemberField],
    ) -> Result<FieldReport, FieldCheckError> {
        let org = OrgAddress::parse(org)
            .ok_or_else(|| FieldCheckError::MalformedRequest(format!("invalid organization '{org}'")))?;
        let grouping = grouping.trim();
        if grouping.is_empty() {
            return Err(FieldCheckError::MalformedRequest(
                "grouping name must not be empty".to_string(),
            ));
        }

        self.fields
            .check(&org, grouping, member_ids, auth_fields, two_factor_fields)
            .await
    }
}

fn parse_org(raw: &str) -> Result<OrgAddress, IngestError> {
    OrgAddress::parse(raw)
        .ok_or_else(|| IngestError::MalformedRequest(format!("invalid organization '{raw}'")))
}
