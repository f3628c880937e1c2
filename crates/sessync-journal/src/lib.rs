//! sessync-journal: Append-only session log.
//!
//! Every `update` invocation leaves exactly one [`SessionLogEntry`]: the
//! summary, its extracted references, and the outcome of every integration,
//! including skipped and failed ones. Entries are content-hashed with BLAKE3
//! so edits to the log file are detectable, and stored one JSON document per
//! line in `session-log.jsonl`.

pub mod hash;
pub mod lock;
pub mod session;
pub mod store;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sessync_core::extract::CategoryMatch;
use sessync_core::{AdapterReport, AggregateStatus, ReferenceSet};

pub use lock::WriterLock;
pub use session::EntryRecorder;
pub use store::{JournalQuery, JournalStore, JsonlJournal, StoreError};

// ── Core Types ───────────────────────────────────────────────────

/// Unique identifier for a session log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The durable record of one session update.
///
/// Written once, never modified. The record exists even when every
/// integration failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionLogEntry {
    pub id: EntryId,
    /// Project name at the time of the update.
    pub project: String,
    /// When the summary was captured.
    pub timestamp: DateTime<Utc>,
    /// The summary exactly as given.
    pub summary: String,
    pub references: ReferenceSet,
    #[serde(default)]
    pub categories: Vec<CategoryMatch>,
    /// One report per enabled integration.
    pub outcomes: Vec<AdapterReport>,
    /// Pipeline-level warnings (e.g. context artifacts not written).
    #[serde(default)]
    pub warnings: Vec<String>,
    pub status: AggregateStatus,
    /// BLAKE3 content hash (hex), set on finalization.
    pub content_hash: Option<String>,
}

impl SessionLogEntry {
    /// BLAKE3 hash over every field except `content_hash`.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        hash::compute_entry_hash(self)
    }

    /// Whether the stored hash matches the entry's content.
    pub fn verify_integrity(&self) -> bool {
        match (&self.content_hash, self.compute_hash()) {
            (Some(stored), Ok(computed)) => stored == &computed,
            _ => false,
        }
    }

    /// Time elapsed since the session was captured.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Whether the entry is older than a retention window of `days`.
    pub fn is_past_retention(&self, now: DateTime<Utc>, days: u32) -> bool {
        self.age(now) > Duration::days(i64::from(days))
    }

    /// First non-blank line of the summary.
    pub fn headline(&self) -> &str {
        sessync_core::types::headline(&self.summary)
    }
}
