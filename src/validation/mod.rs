//! Per-record validation: field rules, caller policies and password hashing.
//!
//! A bad record produces a [`ValidationError`] value; it never aborts the
//! batch it belongs to.

pub mod passwords;
pub mod rules;
pub mod validator;

pub use passwords::{PasswordError, PasswordHashing, PasswordService};
pub use rules::ValidationError;
pub use validator::{RecordValidator, ValidationPolicy};
