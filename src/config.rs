use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::models::MemberField;
use crate::validation::{PasswordError, ValidationPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("password hashing setup failed: {0}")]
    Password(#[from] PasswordError),
    #[error("failed to build validation thread pool: {0}")]
    ThreadPool(String),
}

/// Which [`MemberStore`](crate::store::MemberStore) backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StoreKind::Memory),
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            _ => Err(()),
        }
    }
}

/// Runtime configuration of the ingestion service.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub group_size: usize,
    pub job_expiry: Duration,
    pub validation_threads: usize,
    pub password_pepper: Option<String>,
    pub argon2_m_cost_kib: u32,
    pub argon2_t_cost: u32,
    pub argon2_p_cost: u32,
    pub store: StoreKind,
    pub required_fields: Vec<MemberField>,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match lookup("INGEST_STORE") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "INGEST_STORE",
                value,
            })?,
            None => StoreKind::default(),
        };

        let required_fields = match lookup("INGEST_REQUIRED_FIELDS") {
            Some(value) => parse_field_list(&value).map_err(|_| ConfigError::Invalid {
                key: "INGEST_REQUIRED_FIELDS",
                value,
            })?,
            None => vec![MemberField::Name],
        };

        Ok(Self {
            group_size: env_usize(&lookup, "INGEST_GROUP_SIZE", 100).max(1),
            job_expiry: Duration::from_secs(env_u64(&lookup, "INGEST_JOB_EXPIRY_SECS", 60)),
            validation_threads: env_usize(&lookup, "INGEST_VALIDATION_THREADS", num_cpus::get())
                .max(1),
            password_pepper: lookup("INGEST_PASSWORD_PEPPER").filter(|p| !p.is_empty()),
            argon2_m_cost_kib: env_u32(&lookup, "INGEST_ARGON2_M_COST_KIB", 19 * 1024),
            argon2_t_cost: env_u32(&lookup, "INGEST_ARGON2_T_COST", 2),
            argon2_p_cost: env_u32(&lookup, "INGEST_ARGON2_P_COST", 1),
            store,
            required_fields,
        })
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy::new(self.required_fields.iter().cloned())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            group_size: 100,
            job_expiry: Duration::from_secs(60),
            validation_threads: num_cpus::get(),
            password_pepper: None,
            argon2_m_cost_kib: 19 * 1024,
            argon2_t_cost: 2,
            argon2_p_cost: 1,
            store: StoreKind::Memory,
            required_fields: vec![MemberField::Name],
        }
    }
}

fn env_usize<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u64<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

/// Comma-separated field names; blank entries are ignored.
pub fn parse_field_list(raw: &str) -> Result<Vec<MemberField>, <MemberField as FromStr>::Err> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse)
        .collect()
}
