use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

use super::passwords::PasswordHashing;
use super::rules::{self, ValidationError};
use crate::models::{BatchItem, Member, MemberField, OrgAddress};

/// Identity fields a caller context insists on, on top of the rule that
/// every member must be reachable by email or phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    required: BTreeSet<MemberField>,
}

impl ValidationPolicy {
    pub fn new(required: impl IntoIterator<Item = MemberField>) -> Self {
        Self {
            required: required.into_iter().collect(),
        }
    }

    /// Policy with no required identity fields.
    pub fn permissive() -> Self {
        Self {
            required: BTreeSet::new(),
        }
    }

    pub fn required(&self) -> impl Iterator<Item = &MemberField> {
        self.required.iter()
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::new([MemberField::Name])
    }
}

/// Turns one batch item into a persistable [`Member`] or a descriptive error.
///
/// Validation is pure apart from password hashing; nothing is written here.
pub struct RecordValidator {
    hasher: Arc<dyn PasswordHashing>,
}

impl RecordValidator {
    pub fn new(hasher: Arc<dyn PasswordHashing>) -> Self {
        Self { hasher }
    }

    pub fn validate(
        &self,
        org: &OrgAddress,
        policy: &ValidationPolicy,
        item: BatchItem,
    ) -> Result<Member, ValidationError> {
        let email = match item.email.as_deref() {
            Some(raw) => rules::normalize_email(raw)?,
            None => None,
        };
        let phone = match item.phone.as_deref() {
            Some(raw) => rules::normalize_phone(raw)?,
            None => None,
        };
        let birth_date = match item.birth_date.as_deref() {
            Some(raw) => rules::parse_birth_date(raw)?,
            None => None,
        };

        if email.is_none() && phone.is_none() {
            return Err(ValidationError::NoContact);
        }

        let mut metadata = BTreeMap::new();
        for (key, value) in item.metadata {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            rules::reject_control_chars("metadata", key)?;
            let value = value.trim();
            rules::reject_control_chars(key, value)?;
            metadata.insert(key.to_string(), value.to_string());
        }

        let mut groupings = BTreeSet::new();
        for grouping in &item.groupings {
            if let Some(grouping) = rules::clean_text("groupings", Some(grouping))? {
                groupings.insert(grouping);
            }
        }

        let mut member = Member {
            id: item.id.unwrap_or_else(Uuid::new_v4),
            org: org.clone(),
            name: rules::clean_text("name", item.name.as_deref())?.unwrap_or_default(),
            surname: rules::clean_text("surname", item.surname.as_deref())?.unwrap_or_default(),
            email,
            phone,
            national_id: rules::clean_text("national_id", item.national_id.as_deref())?
                .unwrap_or_default(),
            member_number: rules::clean_text("member_number", item.member_number.as_deref())?
                .unwrap_or_default(),
            birth_date,
            password_hash: None,
            groupings,
            metadata,
            created_at: Utc::now(),
        };

        if let Some(missing) = policy
            .required()
            .find(|field| member.field_value(field).is_empty())
        {
            return Err(ValidationError::MissingField(missing.clone()));
        }

        if let Some(password) = item.password.as_deref().filter(|p| !p.is_empty()) {
            let hash = self
                .hasher
                .hash_password(org, password)
                .map_err(|err| ValidationError::PasswordHash(err.to_string()))?;
            member.password_hash = Some(hash);
        }

        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::passwords::PasswordError;

    struct ReversingHasher;

    impl PasswordHashing for ReversingHasher {
        fn hash_password(&self, org: &OrgAddress, password: &str) -> Result<String, PasswordError> {
            Ok(format!("{}:{}", org, password.chars().rev().collect::<String>()))
        }
    }

    fn validator() -> RecordValidator {
        RecordValidator::new(Arc::new(ReversingHasher))
    }

    fn org() -> OrgAddress {
        OrgAddress::parse("acme").unwrap()
    }

    fn item() -> BatchItem {
        BatchItem {
            name: Some(" Ada ".to_string()),
            email: Some("Ada@Example.org".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn normalizes_a_complete_record() {
        let id = Uuid::new_v4();
        let mut raw = item();
        raw.id = Some(id);
        raw.phone = Some("+1 (555) 010-9999".to_string());
        raw.birth_date = Some("1990-04-21".to_string());
        raw.password = Some("secret".to_string());
        raw.groupings = vec![" board ".to_string(), "".to_string()];
        raw.metadata.insert(" badge ".to_string(), " 42 ".to_string());

        let member = validator()
            .validate(&org(), &ValidationPolicy::default(), raw)
            .expect("valid record");

        assert_eq!(member.id, id);
        assert_eq!(member.name, "Ada");
        assert_eq!(member.surname, "");
        assert_eq!(member.email.as_deref(), Some("ada@example.org"));
        assert_eq!(member.phone.as_deref(), Some("+15550109999"));
        assert_eq!(member.password_hash.as_deref(), Some("acme:terces"));
        assert_eq!(member.groupings.iter().collect::<Vec<_>>(), vec!["board"]);
        assert_eq!(member.metadata.get("badge").map(String::as_str), Some("42"));
    }

    #[test]
    fn accepts_missing_optional_fields() {
        let member = validator()
            .validate(&org(), &ValidationPolicy::default(), item())
            .expect("valid record");
        assert!(member.national_id.is_empty());
        assert!(member.member_number.is_empty());
        assert!(member.password_hash.is_none());
    }

    #[test]
    fn requires_a_contact_channel() {
        let raw = BatchItem {
            name: Some("Ada".to_string()),
            ..Default::default()
        };
        assert_eq!(
            validator().validate(&org(), &ValidationPolicy::default(), raw),
            Err(ValidationError::NoContact)
        );
    }

    #[test]
    fn enforces_policy_required_fields() {
        let policy = ValidationPolicy::new([MemberField::Name, MemberField::MemberNumber]);
        assert_eq!(
            validator().validate(&org(), &policy, item()),
            Err(ValidationError::MissingField(MemberField::MemberNumber))
        );

        let mut nameless = item();
        nameless.name = None;
        assert!(validator()
            .validate(&org(), &ValidationPolicy::permissive(), nameless)
            .is_ok());
    }

    #[test]
    fn refuses_control_characters_in_text_and_metadata() {
        let mut raw = item();
        raw.name = Some("Nul\u{0}Name".to_string());
        assert_eq!(
            validator().validate(&org(), &ValidationPolicy::default(), raw),
            Err(ValidationError::ControlCharacter("name".to_string()))
        );

        let mut raw = item();
        raw.metadata.insert("badge".to_string(), "4\u{0}2".to_string());
        assert_eq!(
            validator().validate(&org(), &ValidationPolicy::default(), raw),
            Err(ValidationError::ControlCharacter("badge".to_string()))
        );

        let mut raw = item();
        raw.groupings = vec!["vot\u{0}ers".to_string()];
        assert_eq!(
            validator().validate(&org(), &ValidationPolicy::default(), raw),
            Err(ValidationError::ControlCharacter("groupings".to_string()))
        );
    }

    #[test]
    fn reports_the_first_bad_field() {
        let mut raw = item();
        raw.phone = Some("nope".to_string());
        assert!(matches!(
            validator().validate(&org(), &ValidationPolicy::default(), raw),
            Err(ValidationError::InvalidPhone(_))
        ));
    }
}
