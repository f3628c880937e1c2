//! BLAKE3 content hashing for tamper evidence.
//!
//! Hashes the canonical JSON of every entry field except `content_hash`,
//! so any modification of a stored entry is detectable.

use chrono::{DateTime, Utc};
use serde::Serialize;

use sessync_core::extract::CategoryMatch;
use sessync_core::{AdapterReport, AggregateStatus, ReferenceSet};

use crate::{EntryId, SessionLogEntry};

/// Hashable view of an entry (excludes `content_hash`).
#[derive(Serialize)]
struct HashableEntry<'a> {
    id: &'a EntryId,
    project: &'a str,
    timestamp: &'a DateTime<Utc>,
    summary: &'a str,
    references: &'a ReferenceSet,
    categories: &'a [CategoryMatch],
    outcomes: &'a [AdapterReport],
    warnings: &'a [String],
    status: &'a AggregateStatus,
}

/// Hex-encoded BLAKE3 hash of an entry's content.
pub fn compute_entry_hash(entry: &SessionLogEntry) -> Result<String, serde_json::Error> {
    let hashable = HashableEntry {
        id: &entry.id,
        project: &entry.project,
        timestamp: &entry.timestamp,
        summary: &entry.summary,
        references: &entry.references,
        categories: &entry.categories,
        outcomes: &entry.outcomes,
        warnings: &entry.warnings,
        status: &entry.status,
    };

    let json = serde_json::to_vec(&hashable)?;
    Ok(blake3::hash(&json).to_hex().to_string())
}
