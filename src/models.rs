use chrono::{DateTime, NaiveDate, Utc};
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ===== Response Envelope =====

/// Envelope wrapping every successful JSON body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

// ===== Organization =====

/// Address of the organization that owns a batch of members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct OrgAddress(String);

impl OrgAddress {
    /// Parse a caller-supplied address. Empty addresses and addresses with
    /// whitespace or path separators are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(|c| c.is_whitespace() || c == '/') {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ===== Member Fields =====

/// A member attribute addressable by name, used for required-field policies
/// and for the authentication-field checks on groupings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberField {
    Name,
    Surname,
    Email,
    Phone,
    NationalId,
    MemberNumber,
    BirthDate,
    /// Free-form metadata key.
    Attribute(String),
}

impl MemberField {
    pub fn as_str(&self) -> &str {
        match self {
            MemberField::Name => "name",
            MemberField::Surname => "surname",
            MemberField::Email => "email",
            MemberField::Phone => "phone",
            MemberField::NationalId => "national_id",
            MemberField::MemberNumber => "member_number",
            MemberField::BirthDate => "birth_date",
            MemberField::Attribute(key) => key,
        }
    }
}

impl FromStr for MemberField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("field name must not be empty".to_string());
        }

        let field = match trimmed.to_ascii_lowercase().as_str() {
            "name" => MemberField::Name,
            "surname" => MemberField::Surname,
            "email" => MemberField::Email,
            "phone" => MemberField::Phone,
            "national_id" | "nationalid" => MemberField::NationalId,
            "member_number" | "membernumber" => MemberField::MemberNumber,
            "birth_date" | "birthdate" => MemberField::BirthDate,
            _ => match trimmed.strip_prefix("attr:") {
                Some(key) if !key.is_empty() => MemberField::Attribute(key.to_string()),
                Some(_) => return Err("attribute field needs a key after 'attr:'".to_string()),
                None => MemberField::Attribute(trimmed.to_string()),
            },
        };

        Ok(field)
    }
}

impl fmt::Display for MemberField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MemberField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MemberField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for MemberField {
    fn schema_name() -> String {
        "MemberField".to_string()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(generator)
    }
}

// ===== Batch Items =====

/// One caller-supplied member record, as received in a batch.
#[derive(Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    /// Pre-assigned identifier; generated when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub member_number: Option<String>,
    /// Calendar date, `YYYY-MM-DD` preferred.
    #[serde(default)]
    pub birth_date: Option<String>,
    /// Raw password; hashed before persistence and never echoed back.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Named groupings the member joins.
    #[serde(default)]
    pub groupings: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl fmt::Debug for BatchItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchItem")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("surname", &self.surname)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("national_id", &self.national_id)
            .field("member_number", &self.member_number)
            .field("birth_date", &self.birth_date)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("groupings", &self.groupings)
            .field("metadata", &self.metadata)
            .finish()
    }
}

// ===== Persisted Members =====

/// A validated, normalized member ready for (or loaded from) the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: Uuid,
    pub org: OrgAddress,
    pub name: String,
    pub surname: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub national_id: String,
    pub member_number: String,
    pub birth_date: Option<NaiveDate>,
    pub password_hash: Option<String>,
    pub groupings: BTreeSet<String>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Stored value of `field` rendered as text; empty when unset.
    pub fn field_value(&self, field: &MemberField) -> String {
        match field {
            MemberField::Name => self.name.clone(),
            MemberField::Surname => self.surname.clone(),
            MemberField::Email => self.email.clone().unwrap_or_default(),
            MemberField::Phone => self.phone.clone().unwrap_or_default(),
            MemberField::NationalId => self.national_id.clone(),
            MemberField::MemberNumber => self.member_number.clone(),
            MemberField::BirthDate => self
                .birth_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            MemberField::Attribute(key) => self.metadata.get(key).cloned().unwrap_or_default(),
        }
    }
}
