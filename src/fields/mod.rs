//! Pre-flight check of a field combination over the members of a grouping.
//!
//! Callers run this before relying on a set of authentication fields: it
//! reports members that would be indistinguishable and members that lack a
//! value for one of the fields. Nothing is written.

use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Member, MemberField, OrgAddress};
use crate::store::{MemberStore, StoreError};

#[derive(Debug, Error)]
pub enum FieldCheckError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("at least one authentication or two-factor field is required")]
    NoFields,
    #[error("field '{0}' is listed as both an authentication and a two-factor field")]
    OverlappingField(MemberField),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Members sharing the same non-empty values for every authentication field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub fields: Vec<MemberField>,
    pub values: Vec<String>,
    pub member_ids: Vec<Uuid>,
}

/// A member with no value for some of the checked fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MissingField {
    pub member_id: Uuid,
    pub fields: Vec<MemberField>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldReport {
    pub duplicates: Vec<DuplicateGroup>,
    pub missing_data: Vec<MissingField>,
    /// Requested ids that are not members of the grouping.
    pub unknown_members: Vec<Uuid>,
}

impl FieldReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty() && self.missing_data.is_empty()
    }
}

pub struct FieldAggregator {
    store: Arc<dyn MemberStore>,
}

impl FieldAggregator {
    pub fn new(store: Arc<dyn MemberStore>) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        org: &OrgAddress,
        grouping: &str,
        member_ids: &[Uuid],
        auth_fields: &[MemberField],
        two_factor_fields: &[MemberField],
    ) -> Result<FieldReport, FieldCheckError> {
        if auth_fields.is_empty() && two_factor_fields.is_empty() {
            return Err(FieldCheckError::NoFields);
        }
        if let Some(field) = auth_fields.iter().find(|f| two_factor_fields.contains(f)) {
            return Err(FieldCheckError::OverlappingField(field.clone()));
        }

        let mut seen = HashSet::new();
        let requested: Vec<Uuid> = member_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let members = self.store.load_grouping(org, grouping, &requested).await?;
        let report = aggregate(&requested, &members, auth_fields, two_factor_fields);

        log::debug!(
            "field check on {}/{}: {} members, {} duplicate groups, {} with missing data",
            org,
            grouping,
            members.len(),
            report.duplicates.len(),
            report.missing_data.len()
        );

        Ok(report)
    }
}

fn value_of(member: &Member, field: &MemberField) -> String {
    member.field_value(field).trim().to_string()
}

fn aggregate(
    requested: &[Uuid],
    members: &[Member],
    auth_fields: &[MemberField],
    two_factor_fields: &[MemberField],
) -> FieldReport {
    let found: HashSet<Uuid> = members.iter().map(|m| m.id).collect();
    let unknown_members = requested
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect();

    let mut missing_data = Vec::new();
    let mut tuples: Vec<(Vec<String>, Vec<Uuid>)> = Vec::new();
    let mut tuple_index: HashMap<Vec<String>, usize> = HashMap::new();

    for member in members {
        let missing: Vec<MemberField> = auth_fields
            .iter()
            .chain(two_factor_fields)
            .filter(|field| value_of(member, field).is_empty())
            .cloned()
            .collect();
        if !missing.is_empty() {
            missing_data.push(MissingField {
                member_id: member.id,
                fields: missing,
            });
        }

        if auth_fields.is_empty() {
            continue;
        }
        let tuple: Vec<String> = auth_fields.iter().map(|f| value_of(member, f)).collect();
        if tuple.iter().any(String::is_empty) {
            continue;
        }
        match tuple_index.get(&tuple) {
            Some(&slot) => tuples[slot].1.push(member.id),
            None => {
                tuple_index.insert(tuple.clone(), tuples.len());
                tuples.push((tuple, vec![member.id]));
            }
        }
    }

    let duplicates = tuples
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(values, member_ids)| DuplicateGroup {
            fields: auth_fields.to_vec(),
            values,
            member_ids,
        })
        .collect();

    FieldReport {
        duplicates,
        missing_data,
        unknown_members,
    }
}
