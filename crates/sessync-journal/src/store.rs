//! Session log storage: trait + JSON Lines implementation.
//!
//! The log is one file per project, `session-log.jsonl`, holding one
//! finalized entry per line. Appends are a single write under an exclusive
//! lock on the log file, so a line is never interleaved with another. A
//! failed write is truncated away, and a torn tail left by a crash is closed
//! off with a newline before the next entry so it only costs its own line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;

use crate::{EntryId, SessionLogEntry};

pub const LOG_FILE: &str = "session-log.jsonl";

/// Errors that can occur during session log operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session log entry not found: {0}")]
    NotFound(EntryId),

    #[error("Integrity check failed for entry {0}: stored hash does not match content")]
    IntegrityViolation(EntryId),

    #[error("Session log entry has no content hash (not finalized)")]
    NotFinalized,

    #[error("Could not lock session log: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Query parameters for listing entries.
#[derive(Debug, Default, Clone)]
pub struct JournalQuery {
    /// Return at most this many entries.
    pub limit: Option<usize>,
    /// Only include entries captured at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only include entries captured at or before this time.
    pub to: Option<DateTime<Utc>>,
}

impl JournalQuery {
    /// The `count` most recent entries.
    pub fn recent(count: usize) -> Self {
        Self {
            limit: Some(count),
            ..Default::default()
        }
    }
}

/// Trait for session log backends.
pub trait JournalStore {
    /// Append a finalized entry. Returns an error if it has no content hash.
    fn append(&self, entry: &SessionLogEntry) -> Result<(), StoreError>;

    /// Retrieve an entry by ID, verifying integrity.
    fn get(&self, id: EntryId) -> Result<SessionLogEntry, StoreError>;

    /// List intact entries matching the query, most recent first.
    fn list(&self, query: &JournalQuery) -> Result<Vec<SessionLogEntry>, StoreError>;

    /// The most recent intact entry, if any.
    fn latest(&self) -> Result<Option<SessionLogEntry>, StoreError> {
        Ok(self.list(&JournalQuery::recent(1))?.into_iter().next())
    }
}

/// A log line that could not be returned as an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number in the log file.
    pub line: usize,
    /// Set when the line parsed but failed its integrity check.
    pub id: Option<EntryId>,
    pub reason: String,
}

/// Everything read from the log file, in file order.
#[derive(Debug, Default)]
pub struct Scan {
    pub entries: Vec<SessionLogEntry>,
    pub rejected: Vec<RejectedLine>,
}

/// JSON Lines session log.
///
/// ```text
/// {journal_dir}/
///   session-log.jsonl     one entry per line, append-only
///   .session-log.lock     invocation lock (see [`crate::lock`])
/// ```
pub struct JsonlJournal {
    dir: PathBuf,
    path: PathBuf,
}

impl JsonlJournal {
    /// Open the journal in `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let path = dir.join(LOG_FILE);
        Ok(Self { dir, path })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every line, separating intact entries from malformed or
    /// tampered ones.
    pub fn scan(&self) -> Result<Scan, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Scan::default()),
            Err(e) => return Err(e.into()),
        };
        FileExt::lock_shared(&file)
            .map_err(|e| StoreError::Lock(format!("{}: {e}", self.path.display())))?;

        let mut scan = Scan::default();
        for (idx, line) in BufReader::new(&file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionLogEntry>(&line) {
                Ok(entry) if entry.verify_integrity() => scan.entries.push(entry),
                Ok(entry) => scan.rejected.push(RejectedLine {
                    line: idx + 1,
                    id: Some(entry.id),
                    reason: "content hash mismatch".to_string(),
                }),
                Err(e) => scan.rejected.push(RejectedLine {
                    line: idx + 1,
                    id: None,
                    reason: e.to_string(),
                }),
            }
        }

        let _ = FileExt::unlock(&file);
        Ok(scan)
    }
}

impl JournalStore for JsonlJournal {
    fn append(&self, entry: &SessionLogEntry) -> Result<(), StoreError> {
        if entry.content_hash.is_none() {
            return Err(StoreError::NotFinalized);
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| StoreError::Lock(format!("{}: {e}", self.path.display())))?;

        let written = append_line(&mut file, &line);
        let _ = FileExt::unlock(&file);
        written?;

        tracing::debug!(
            entry_id = %entry.id,
            path = %self.path.display(),
            "Session log entry appended"
        );

        Ok(())
    }

    fn get(&self, id: EntryId) -> Result<SessionLogEntry, StoreError> {
        let scan = self.scan()?;
        if let Some(entry) = scan.entries.into_iter().find(|e| e.id == id) {
            return Ok(entry);
        }
        if scan.rejected.iter().any(|r| r.id == Some(id)) {
            return Err(StoreError::IntegrityViolation(id));
        }
        Err(StoreError::NotFound(id))
    }

    fn list(&self, query: &JournalQuery) -> Result<Vec<SessionLogEntry>, StoreError> {
        let scan = self.scan()?;

        for rejected in &scan.rejected {
            tracing::warn!(
                path = %self.path.display(),
                line = rejected.line,
                reason = %rejected.reason,
                "Skipping unreadable session log entry"
            );
        }

        let mut results: Vec<SessionLogEntry> = scan
            .entries
            .into_iter()
            .filter(|e| matches_query(e, query))
            .collect();

        // Equal timestamps: later append first.
        results.reverse();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }
}

/// Append `line` to a locked log file. On failure the file is cut back to
/// its previous length so no partial line is left behind.
fn append_line(file: &mut File, line: &str) -> io::Result<()> {
    let len = file.metadata()?.len();
    let mut bytes = Vec::with_capacity(line.len() + 1);
    if len > 0 && !ends_with_newline(file, len)? {
        tracing::warn!("Session log ends in a partial line; closing it off");
        bytes.push(b'\n');
    }
    bytes.extend_from_slice(line.as_bytes());

    let written = file.write_all(&bytes).and_then(|()| file.sync_data());
    if let Err(e) = written {
        if let Err(truncate) = file.set_len(len) {
            tracing::error!(error = %truncate, "Could not remove partial session log line");
        }
        return Err(e);
    }
    Ok(())
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Check whether an entry matches the given query filters.
fn matches_query(entry: &SessionLogEntry, query: &JournalQuery) -> bool {
    if let Some(from) = &query.from {
        if &entry.timestamp < from {
            return false;
        }
    }
    if let Some(to) = &query.to {
        if &entry.timestamp > to {
            return false;
        }
    }
    true
}
