//! Postgres-backed member store.
//!
//! Each group is written in one transaction with a single UNNEST insert;
//! rows skipped by `ON CONFLICT DO NOTHING` become per-record rejections.
//! When the database refuses the bulk insert because of the data in some row,
//! the group is retried member by member.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rocket_db_pools::sqlx::{self, PgPool, types::Json};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use super::{GroupOutcome, MemberStore, StoreError};
use crate::models::{Member, OrgAddress};

#[derive(Debug, Clone)]
pub struct PgMemberStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    org_address: String,
    name: String,
    surname: String,
    email: Option<String>,
    phone: Option<String>,
    national_id: String,
    member_number: String,
    birth_date: Option<NaiveDate>,
    password_hash: Option<String>,
    metadata: Json<BTreeMap<String, String>>,
    created_at: DateTime<Utc>,
    groupings: Vec<String>,
}

impl TryFrom<MemberRow> for Member {
    type Error = StoreError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let org = OrgAddress::parse(&row.org_address).ok_or_else(|| {
            StoreError::Corrupt(format!("member {} has org '{}'", row.id, row.org_address))
        })?;

        Ok(Member {
            id: row.id,
            org,
            name: row.name,
            surname: row.surname,
            email: row.email,
            phone: row.phone,
            national_id: row.national_id,
            member_number: row.member_number,
            birth_date: row.birth_date,
            password_hash: row.password_hash,
            groupings: row.groupings.into_iter().collect(),
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

/// Columnar layout of one group, ready for UNNEST.
#[derive(Default)]
struct MembersData {
    ids: Vec<Uuid>,
    names: Vec<String>,
    surnames: Vec<String>,
    emails: Vec<Option<String>>,
    phones: Vec<Option<String>>,
    national_ids: Vec<String>,
    member_numbers: Vec<String>,
    birth_dates: Vec<Option<NaiveDate>>,
    password_hashes: Vec<Option<String>>,
    metadata: Vec<String>,
    created_ats: Vec<DateTime<Utc>>,
}

impl MembersData {
    fn build<'a>(members: impl IntoIterator<Item = &'a Member>) -> Result<Self, StoreError> {
        let mut data = MembersData::default();
        for member in members {
            let metadata = serde_json::to_string(&member.metadata)
                .map_err(|err| StoreError::Corrupt(err.to_string()))?;

            data.ids.push(member.id);
            data.names.push(member.name.clone());
            data.surnames.push(member.surname.clone());
            data.emails.push(member.email.clone());
            data.phones.push(member.phone.clone());
            data.national_ids.push(member.national_id.clone());
            data.member_numbers.push(member.member_number.clone());
            data.birth_dates.push(member.birth_date);
            data.password_hashes.push(member.password_hash.clone());
            data.metadata.push(metadata);
            data.created_ats.push(member.created_at);
        }
        Ok(data)
    }
}

/// SQLSTATE classes 22 (data exception) and 23 (integrity constraint
/// violation) blame the rows being written, not the database.
fn is_row_error(err: &StoreError) -> bool {
    let StoreError::Database(err) = err else {
        return false;
    };
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code.starts_with("22") || code.starts_with("23"))
}

fn conflict_reason(member: &Member, org: &OrgAddress) -> String {
    format!(
        "member {} conflicts with an existing id or email in {}",
        member.id, org
    )
}

impl PgMemberStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert `members` and their groupings in one transaction, returning the
    /// ids that were actually written.
    async fn insert_members(
        &self,
        org: &OrgAddress,
        members: &[&Member],
    ) -> Result<HashSet<Uuid>, StoreError> {
        let data = MembersData::build(members.iter().copied())?;
        let org_addresses = vec![org.as_str().to_string(); members.len()];

        let mut tx = self.pool.begin().await?;

        let inserted: Vec<Uuid> = sqlx::query_scalar(
            r#"INSERT INTO members (id, org_address, name, surname, email, phone, national_id,
                                    member_number, birth_date, password_hash, metadata, created_at)
               SELECT id, org_address, name, surname, email, phone, national_id,
                      member_number, birth_date, password_hash, metadata::jsonb, created_at
               FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[],
                           $7::text[], $8::text[], $9::date[], $10::text[], $11::text[], $12::timestamptz[])
                    AS t(id, org_address, name, surname, email, phone, national_id,
                         member_number, birth_date, password_hash, metadata, created_at)
               ON CONFLICT DO NOTHING
               RETURNING id"#,
        )
        .bind(&data.ids)
        .bind(&org_addresses)
        .bind(&data.names)
        .bind(&data.surnames)
        .bind(&data.emails)
        .bind(&data.phones)
        .bind(&data.national_ids)
        .bind(&data.member_numbers)
        .bind(&data.birth_dates)
        .bind(&data.password_hashes)
        .bind(&data.metadata)
        .bind(&data.created_ats)
        .fetch_all(&mut *tx)
        .await?;

        let inserted: HashSet<Uuid> = inserted.into_iter().collect();

        let mut grouping_member_ids = Vec::new();
        let mut grouping_names = Vec::new();
        for member in members.iter().filter(|m| inserted.contains(&m.id)) {
            for grouping in &member.groupings {
                grouping_member_ids.push(member.id);
                grouping_names.push(grouping.clone());
            }
        }

        if !grouping_member_ids.is_empty() {
            sqlx::query(
                r#"INSERT INTO member_groupings (member_id, grouping_name)
                   SELECT * FROM UNNEST($1::uuid[], $2::text[])
                   ON CONFLICT DO NOTHING"#,
            )
            .bind(&grouping_member_ids)
            .bind(&grouping_names)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Retry a group one member at a time so a row the database refuses only
    /// rejects that member.
    async fn insert_one_by_one(
        &self,
        org: &OrgAddress,
        candidates: &[(usize, &Member)],
        rejected: &mut Vec<(usize, String)>,
    ) -> Result<usize, StoreError> {
        let mut added = 0;
        for &(position, member) in candidates {
            match self.insert_members(org, &[member]).await {
                Ok(inserted) if inserted.contains(&member.id) => added += 1,
                Ok(_) => rejected.push((position, conflict_reason(member, org))),
                Err(err) if is_row_error(&err) => {
                    log::debug!("database refused member {} for {}: {}", member.id, org, err);
                    rejected.push((
                        position,
                        format!("member {} refused by the database: {}", member.id, err),
                    ));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(added)
    }
}

#[async_trait]
impl MemberStore for PgMemberStore {
    async fn persist_group(
        &self,
        org: &OrgAddress,
        members: &[Member],
    ) -> Result<GroupOutcome, StoreError> {
        if members.is_empty() {
            return Ok(GroupOutcome::default());
        }

        // A repeated id would collapse into one inserted row, hiding the rest.
        let mut seen = HashSet::with_capacity(members.len());
        let mut candidates = Vec::with_capacity(members.len());
        let mut rejected = Vec::new();
        for (position, member) in members.iter().enumerate() {
            if seen.insert(member.id) {
                candidates.push((position, member));
            } else {
                rejected.push((
                    position,
                    format!("member {} appears more than once in the batch", member.id),
                ));
            }
        }

        let batch: Vec<&Member> = candidates.iter().map(|&(_, member)| member).collect();
        let added = match self.insert_members(org, &batch).await {
            Ok(inserted) => {
                rejected.extend(
                    candidates
                        .iter()
                        .filter(|(_, member)| !inserted.contains(&member.id))
                        .map(|&(position, member)| (position, conflict_reason(member, org))),
                );
                inserted.len()
            }
            Err(err) if is_row_error(&err) => {
                log::warn!(
                    "bulk insert of {} members for {} refused ({}); retrying one by one",
                    batch.len(),
                    org,
                    err
                );
                self.insert_one_by_one(org, &candidates, &mut rejected).await?
            }
            Err(err) => return Err(err),
        };

        rejected.sort_by_key(|(position, _)| *position);

        log::trace!("persisted {} of {} members for {}", added, members.len(), org);

        Ok(GroupOutcome { added, rejected })
    }

    async fn load_grouping(
        &self,
        org: &OrgAddress,
        grouping: &str,
        member_ids: &[Uuid],
    ) -> Result<Vec<Member>, StoreError> {
        if member_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<MemberRow> = sqlx::query_as(
            r#"SELECT m.id, m.org_address, m.name, m.surname, m.email, m.phone, m.national_id,
                      m.member_number, m.birth_date, m.password_hash, m.metadata, m.created_at,
                      ARRAY(SELECT g2.grouping_name FROM member_groupings g2
                            WHERE g2.member_id = m.id ORDER BY g2.grouping_name) AS groupings
               FROM members m
               JOIN member_groupings g ON g.member_id = m.id
               WHERE m.org_address = $1 AND g.grouping_name = $2 AND m.id = ANY($3)"#,
        )
        .bind(org.as_str())
        .bind(grouping)
        .bind(member_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: HashMap<Uuid, Member> = HashMap::with_capacity(rows.len());
        for row in rows {
            let member = Member::try_from(row)?;
            by_id.insert(member.id, member);
        }

        Ok(member_ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
