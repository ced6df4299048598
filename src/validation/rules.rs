//! Field-level validation and normalization rules.
//!
//! Each rule takes the raw caller value and either returns the normalized
//! form that gets persisted or a [`ValidationError`] describing why the value
//! was refused.

use chrono::{NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::MemberField;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();

/// Date layouts accepted for birth dates, tried in order.
const BIRTH_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Why a single record was refused. Rendered into the progress snapshot's
/// error list; never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid email address '{0}'")]
    InvalidEmail(String),
    #[error("invalid phone number '{0}'")]
    InvalidPhone(String),
    #[error("invalid birth date '{0}', expected a calendar date such as 1990-04-21")]
    InvalidBirthDate(String),
    #[error("birth date {0} is in the future")]
    FutureBirthDate(NaiveDate),
    #[error("missing required field '{0}'")]
    MissingField(MemberField),
    #[error("member has neither an email address nor a phone number")]
    NoContact,
    #[error("password could not be hashed: {0}")]
    PasswordHash(String),
    #[error("field '{0}' contains control characters")]
    ControlCharacter(String),
}

/// WHATWG-style address grammar: a permissive local part, then one or more
/// dot-separated DNS labels.
fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$",
        )
        .expect("Invalid email regex")
    })
}

/// Dial-able number after separators are stripped: optional `+`, then 7 to
/// 15 digits not starting with zero when international.
fn phone_regex() -> &'static Regex {
    PHONE_REGEX.get_or_init(|| {
        Regex::new(r"^(?:\+[1-9][0-9]{6,14}|[0-9]{7,15})$").expect("Invalid phone regex")
    })
}

/// Refuse values carrying control characters such as NUL, which the
/// database cannot store in text columns.
pub fn reject_control_chars(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacter(field.to_string()));
    }
    Ok(())
}

/// Trim a free-text field, mapping absent and blank values to `None`.
pub fn clean_text(field: &str, value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(trimmed) = value.map(str::trim).filter(|trimmed| !trimmed.is_empty()) else {
        return Ok(None);
    };
    reject_control_chars(field, trimmed)?;
    Ok(Some(trimmed.to_string()))
}

/// Normalize and validate an email address. Blank input counts as absent.
pub fn normalize_email(raw: &str) -> Result<Option<String>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    reject_control_chars("email", trimmed)?;
    let lowered = trimmed.to_lowercase();
    if lowered.len() > 254 || !email_regex().is_match(&lowered) {
        return Err(ValidationError::InvalidEmail(trimmed.to_string()));
    }

    Ok(Some(lowered))
}

/// Normalize and validate a phone number. Spaces, dashes, dots and
/// parentheses are dropped; a leading `+` is kept.
pub fn normalize_phone(raw: &str) -> Result<Option<String>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    reject_control_chars("phone", trimmed)?;

    let compact: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if !phone_regex().is_match(&compact) {
        return Err(ValidationError::InvalidPhone(trimmed.to_string()));
    }

    Ok(Some(compact))
}

/// Parse a birth date in one of the accepted layouts.
pub fn parse_birth_date(raw: &str) -> Result<Option<NaiveDate>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let date = BIRTH_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| ValidationError::InvalidBirthDate(trimmed.to_string()))?;

    if date > Utc::now().date_naive() {
        return Err(ValidationError::FutureBirthDate(date));
    }

    Ok(Some(date))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_valid_emails() {
        assert_eq!(
            normalize_email("  Jane.Doe+club@Example.ORG "),
            Ok(Some("jane.doe+club@example.org".to_string()))
        );
        assert_eq!(normalize_email("   "), Ok(None));
    }

    #[test]
    fn rejects_malformed_emails() {
        for raw in ["jane", "jane@", "@example.org", "jane@example", "ja ne@example.org"] {
            assert!(
                matches!(normalize_email(raw), Err(ValidationError::InvalidEmail(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn strips_phone_separators() {
        assert_eq!(
            normalize_phone("+44 (20) 7946-0958"),
            Ok(Some("+442079460958".to_string()))
        );
        assert_eq!(normalize_phone("555.123.4567"), Ok(Some("5551234567".to_string())));
    }

    #[test]
    fn rejects_undialable_phones() {
        for raw in ["12345", "+0123456789", "call me", "+1 555 CALL NOW"] {
            assert!(
                matches!(normalize_phone(raw), Err(ValidationError::InvalidPhone(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn parses_birth_dates_in_accepted_layouts() {
        let expected = NaiveDate::from_ymd_opt(1990, 4, 21);
        assert_eq!(parse_birth_date("1990-04-21"), Ok(expected));
        assert_eq!(parse_birth_date("1990/04/21"), Ok(expected));
        assert_eq!(parse_birth_date("21/04/1990"), Ok(expected));
        assert_eq!(parse_birth_date(""), Ok(None));
    }

    #[test]
    fn rejects_impossible_and_future_birth_dates() {
        assert!(matches!(
            parse_birth_date("1990-02-30"),
            Err(ValidationError::InvalidBirthDate(_))
        ));
        assert!(matches!(
            parse_birth_date("yesterday"),
            Err(ValidationError::InvalidBirthDate(_))
        ));
        assert!(matches!(
            parse_birth_date("2999-01-01"),
            Err(ValidationError::FutureBirthDate(_))
        ));
    }

    #[test]
    fn clean_text_drops_blank_values() {
        assert_eq!(clean_text("name", Some("  Ada ")), Ok(Some("Ada".to_string())));
        assert_eq!(clean_text("name", Some("   ")), Ok(None));
        assert_eq!(clean_text("name", None), Ok(None));
    }

    #[test]
    fn refuses_nul_and_other_control_characters() {
        assert_eq!(
            clean_text("name", Some("Nul\u{0}Name")),
            Err(ValidationError::ControlCharacter("name".to_string()))
        );
        assert_eq!(
            clean_text("surname", Some("Love\u{7}lace")),
            Err(ValidationError::ControlCharacter("surname".to_string()))
        );
        assert_eq!(
            normalize_email("ada\u{0}@example.org"),
            Err(ValidationError::ControlCharacter("email".to_string()))
        );
        assert_eq!(
            normalize_phone("+1555\u{0}0109999"),
            Err(ValidationError::ControlCharacter("phone".to_string()))
        );
    }
}
