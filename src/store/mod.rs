//! Persistence collaborator for member records.
//!
//! The ingestion engine only ever talks to a [`MemberStore`]; the in-memory
//! adapter backs tests and dry runs, the Postgres adapter backs production.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rocket_db_pools::sqlx;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Member, OrgAddress};

pub use memory::InMemoryMemberStore;
pub use postgres::PgMemberStore;

/// Store-level failures. Per-record conflicts are reported through
/// [`GroupOutcome::rejected`] instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("corrupt member data: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Database(err),
        }
    }
}

/// Result of persisting one group of validated members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupOutcome {
    /// Number of members actually written.
    pub added: usize,
    /// Members the store refused, as (position within the group, reason).
    pub rejected: Vec<(usize, String)>,
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Persist one group of an ingestion batch. Safe to call repeatedly with
    /// disjoint groups of the same batch.
    async fn persist_group(
        &self,
        org: &OrgAddress,
        members: &[Member],
    ) -> Result<GroupOutcome, StoreError>;

    /// Load the members of `grouping` whose ids are in `member_ids`.
    async fn load_grouping(
        &self,
        org: &OrgAddress,
        grouping: &str,
        member_ids: &[Uuid],
    ) -> Result<Vec<Member>, StoreError>;
}
