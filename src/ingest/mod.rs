//! Bulk ingestion engine.
//!
//! [`IngestEngine::submit`] hands back a [`ProgressStream`] straight away and
//! persists the batch in the background, one group per store round-trip.
//! Per-record failures never stop a batch; they are reported as
//! `record <index>: <reason>` entries in the snapshots. Only a store failure
//! or cancellation ends a batch early, and even then the stream closes with
//! a terminal snapshot at `progress == 100`.

mod engine;
mod error;
mod progress;
mod stream;

pub use engine::IngestEngine;
pub use error::IngestError;
pub use progress::ProgressSnapshot;
pub use stream::ProgressStream;
