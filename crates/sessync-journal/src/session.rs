//! Builder-pattern recorder for one session log entry.
//!
//! The orchestrator records as the pipeline advances and finalizes once
//! every integration has reported:
//!
//! ```
//! # use sessync_journal::session::EntryRecorder;
//! # use sessync_core::{SessionSummary, ReferenceSet};
//! let summary = SessionSummary::new("Fixed ABC-12 in src/login.rs");
//! let mut recorder = EntryRecorder::new("Atlas", &summary);
//! recorder.set_references(ReferenceSet::default());
//! recorder.add_warning("context artifacts not written: disk full");
//! let entry = recorder.finalize().unwrap();
//! assert!(entry.verify_integrity());
//! assert!(!entry.status.is_success());
//! ```

use sessync_core::extract::CategoryMatch;
use sessync_core::{AdapterReport, AggregateStatus, ReferenceSet, SessionSummary};

use crate::store::StoreError;
use crate::{EntryId, SessionLogEntry};

/// Accumulates the pieces of an entry before it is sealed.
pub struct EntryRecorder {
    entry: SessionLogEntry,
}

impl EntryRecorder {
    pub fn new(project: &str, summary: &SessionSummary) -> Self {
        Self {
            entry: SessionLogEntry {
                id: EntryId::new(),
                project: project.to_string(),
                timestamp: summary.timestamp(),
                summary: summary.raw_text().to_string(),
                references: ReferenceSet::default(),
                categories: Vec::new(),
                outcomes: Vec::new(),
                warnings: Vec::new(),
                status: AggregateStatus::Success,
                content_hash: None,
            },
        }
    }

    pub fn set_references(&mut self, references: ReferenceSet) {
        self.entry.references = references;
    }

    pub fn set_categories(&mut self, categories: Vec<CategoryMatch>) {
        self.entry.categories = categories;
    }

    /// Record one integration's outcome.
    pub fn add_outcome(&mut self, report: AdapterReport) {
        self.entry.outcomes.push(report);
    }

    /// Record a pipeline-level warning.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.entry.warnings.push(warning.into());
    }

    pub fn id(&self) -> EntryId {
        self.entry.id
    }

    /// Derive the aggregate status and seal the entry with its content hash.
    pub fn finalize(mut self) -> Result<SessionLogEntry, StoreError> {
        self.entry
            .outcomes
            .sort_by(|a, b| a.integration_id.cmp(&b.integration_id));
        self.entry.status = AggregateStatus::from_reports(&self.entry.outcomes, &self.entry.warnings);
        let hash = self.entry.compute_hash()?;
        self.entry.content_hash = Some(hash);
        Ok(self.entry)
    }
}
