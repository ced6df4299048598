use rand::RngCore;
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const JOB_ID_LEN: usize = 16;

/// Opaque handle of an asynchronous ingestion job, rendered as 32 lowercase
/// hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId([u8; JOB_ID_LEN]);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("job id must be {expected} hex characters")]
pub struct JobIdParseError {
    expected: usize,
}

impl JobId {
    pub fn from_bytes(bytes: [u8; JOB_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; JOB_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({self})")
    }
}

impl FromStr for JobId {
    type Err = JobIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; JOB_ID_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|_| JobIdParseError {
            expected: JOB_ID_LEN * 2,
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for JobId {
    fn schema_name() -> String {
        "JobId".to_string()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(generator)
    }
}

/// Source of fresh job identifiers.
pub trait JobIdGenerator: Send + Sync {
    fn generate(&self) -> JobId;
}

/// Draws identifiers from the thread-local CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJobIds;

impl JobIdGenerator for RandomJobIds {
    fn generate(&self) -> JobId {
        let mut bytes = [0u8; JOB_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        JobId(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_as_fixed_width_hex() {
        let id = JobId::from_bytes([0xab; JOB_ID_LEN]);
        assert_eq!(id.to_string(), "ab".repeat(JOB_ID_LEN));
        assert_eq!(id.to_string().parse::<JobId>(), Ok(id));
    }

    #[test]
    fn rejects_wrong_length_or_non_hex() {
        assert!("abcd".parse::<JobId>().is_err());
        assert!("zz".repeat(JOB_ID_LEN).parse::<JobId>().is_err());
    }

    #[test]
    fn random_ids_differ() {
        let generator = RandomJobIds;
        assert_ne!(generator.generate(), generator.generate());
    }

    #[test]
    fn serializes_as_a_string() {
        let id = JobId::from_bytes([1; JOB_ID_LEN]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(JOB_ID_LEN)));
        assert_eq!(serde_json::from_str::<JobId>(&json).unwrap(), id);
    }
}
