use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::{GroupOutcome, MemberStore, StoreError};
use crate::models::{Member, OrgAddress};

#[derive(Default)]
struct Inner {
    members: HashMap<Uuid, Member>,
    emails: HashSet<(OrgAddress, String)>,
}

/// Process-local member store.
///
/// Enforces the same uniqueness rules as the Postgres schema: member ids are
/// global, email addresses are unique per organization.
pub struct InMemoryMemberStore {
    inner: RwLock<Inner>,
    available: AtomicBool,
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every call fails with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.read().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".to_string()))
        }
    }
}

impl Default for InMemoryMemberStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn persist_group(
        &self,
        org: &OrgAddress,
        members: &[Member],
    ) -> Result<GroupOutcome, StoreError> {
        self.ensure_available()?;

        let mut inner = self.inner.write();
        let mut outcome = GroupOutcome::default();

        for (position, member) in members.iter().enumerate() {
            if inner.members.contains_key(&member.id) {
                outcome
                    .rejected
                    .push((position, format!("member {} already exists", member.id)));
                continue;
            }

            if let Some(email) = &member.email {
                let key = (org.clone(), email.clone());
                if inner.emails.contains(&key) {
                    outcome.rejected.push((
                        position,
                        format!("email {email} is already registered in {org}"),
                    ));
                    continue;
                }
                inner.emails.insert(key);
            }

            let mut stored = member.clone();
            stored.org = org.clone();
            inner.members.insert(stored.id, stored);
            outcome.added += 1;
        }

        Ok(outcome)
    }

    async fn load_grouping(
        &self,
        org: &OrgAddress,
        grouping: &str,
        member_ids: &[Uuid],
    ) -> Result<Vec<Member>, StoreError> {
        self.ensure_available()?;

        let inner = self.inner.read();
        let members = member_ids
            .iter()
            .filter_map(|id| inner.members.get(id))
            .filter(|member| &member.org == org && member.groupings.contains(grouping))
            .cloned()
            .collect();

        Ok(members)
    }
}
