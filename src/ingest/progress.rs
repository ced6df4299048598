//! Progress snapshots and the tracker that produces them.

use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Point-in-time progress of one batch.
///
/// `added <= total` always holds and `errors` only ever grows between
/// snapshots of the same batch. `progress` is `floor(100 * added / total)`
/// except on the terminal snapshot, which is the only one carrying 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub added: usize,
    pub progress: u8,
    pub errors: Vec<String>,
}

impl ProgressSnapshot {
    /// Snapshot of a batch that has not persisted anything yet.
    pub fn pending(total: usize) -> Self {
        Self {
            total,
            added: 0,
            progress: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress == 100
    }
}

/// Cumulative counters for one batch. Owned by the batch's producer task.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: usize,
    added: usize,
    errors: Vec<String>,
}

impl ProgressTracker {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            added: 0,
            errors: Vec::new(),
        }
    }

    pub(crate) fn record_added(&mut self, count: usize) {
        self.added = (self.added + count).min(self.total);
    }

    /// Append per-record failures, which must already be in input order.
    pub(crate) fn record_failures(&mut self, failures: Vec<(usize, String)>) {
        self.errors.extend(
            failures
                .into_iter()
                .map(|(index, reason)| format!("record {index}: {reason}")),
        );
    }

    pub(crate) fn added(&self) -> usize {
        self.added
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Intermediate snapshot. Never reports 100; that value is reserved for
    /// the terminal snapshot.
    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        let percent = if self.total == 0 {
            0
        } else {
            (self.added * 100 / self.total).min(99)
        };

        ProgressSnapshot {
            total: self.total,
            added: self.added,
            progress: percent as u8,
            errors: self.errors.clone(),
        }
    }

    /// Terminal snapshot.
    pub(crate) fn finish(self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            added: self.added,
            progress: 100,
            errors: self.errors,
        }
    }

    /// Terminal snapshot for a batch that stopped early; `reason` is appended
    /// as a synthetic error entry.
    pub(crate) fn abort(mut self, reason: String) -> ProgressSnapshot {
        self.errors.push(reason);
        self.finish()
    }
}
