//! Core domain types for a session update.
//!
//! These types flow from the extractor through the adapters into the
//! session log, and are shared by every sessync crate.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Session Summary ───────────────────────────────────────────────

/// The free-text summary of one work session.
///
/// Created once per `update` invocation and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    raw_text: String,
    timestamp: DateTime<Utc>,
}

impl SessionSummary {
    /// Capture a summary stamped with the current time.
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self::at(raw_text, Utc::now())
    }

    /// Capture a summary with an explicit timestamp.
    pub fn at(raw_text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            raw_text: raw_text.into(),
            timestamp,
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// First non-blank line of the summary, trimmed.
    pub fn headline(&self) -> &str {
        headline(&self.raw_text)
    }
}

/// First non-blank line of `text`, trimmed. Empty when `text` is blank.
pub fn headline(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

// ── Reference Set ─────────────────────────────────────────────────

/// Structured references pulled out of a summary.
///
/// Work items keep first-seen order with duplicates collapsed; files are
/// an unordered set (kept sorted for stable output).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceSet {
    pub work_items: Vec<String>,
    pub files: BTreeSet<String>,
}

impl ReferenceSet {
    pub fn is_empty(&self) -> bool {
        self.work_items.is_empty() && self.files.is_empty()
    }

    /// Append a work item unless it was already seen.
    pub fn add_work_item(&mut self, item: &str) {
        if !self.work_items.iter().any(|existing| existing == item) {
            self.work_items.push(item.to_string());
        }
    }

    pub fn add_file(&mut self, path: &str) {
        self.files.insert(path.to_string());
    }
}

// ── Integrations ──────────────────────────────────────────────────

/// The closed set of external systems a session update can be published to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    IssueTracker,
    Wiki,
    SourceHost,
    ChatNotifier,
    NoteDatabase,
}

impl IntegrationKind {
    pub const ALL: [IntegrationKind; 5] = [
        Self::IssueTracker,
        Self::Wiki,
        Self::SourceHost,
        Self::ChatNotifier,
        Self::NoteDatabase,
    ];

    /// Secret fields the vault must hold before this kind can publish.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::IssueTracker | Self::Wiki => &["username", "api_token"],
            Self::SourceHost | Self::ChatNotifier | Self::NoteDatabase => &["token"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IssueTracker => "issue_tracker",
            Self::Wiki => "wiki",
            Self::SourceHost => "source_host",
            Self::ChatNotifier => "chat_notifier",
            Self::NoteDatabase => "note_database",
        }
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Outcomes ──────────────────────────────────────────────────────

/// Why a publish attempt failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or protocol failure before a response was received.
    Transport,
    /// The remote system rejected the credentials.
    Auth,
    /// The call exceeded its timeout and was cancelled.
    Timeout,
    /// The remote system answered with a non-success status.
    Rejected,
    /// The credential backend could not be reached.
    Vault,
    /// The adapter task itself crashed or was misconfigured.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transport => "transport",
            Self::Auth => "auth",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::Vault => "vault",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Result of one publish attempt against one integration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The remote system accepted the update. `external_reference` names
    /// what was created (comment ID, page ID, message timestamp).
    Succeeded { external_reference: String },
    /// Nothing was attempted, e.g. credentials are not configured.
    Skipped { reason: String },
    /// The attempt was made and failed.
    Failed { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { external_reference } => write!(f, "succeeded ({external_reference})"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Failed { kind, message } => write!(f, "failed ({kind}): {message}"),
        }
    }
}

/// One integration's outcome within an invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdapterReport {
    pub integration_id: String,
    pub kind: IntegrationKind,
    pub outcome: Outcome,
    pub elapsed_ms: u64,
}

// ── Aggregate status ──────────────────────────────────────────────

/// Something that kept an invocation from being a full success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shortfall {
    /// Integration ID, or `context` for artifact regeneration.
    pub subject: String,
    pub detail: String,
}

/// Overall result of an `update` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregateStatus {
    Success,
    PartialFailure { shortfalls: Vec<Shortfall> },
}

impl AggregateStatus {
    /// `Success` only when every report succeeded and no pipeline warning
    /// was raised; otherwise every non-success is listed by name.
    pub fn from_reports(reports: &[AdapterReport], pipeline_warnings: &[String]) -> Self {
        let mut shortfalls: Vec<Shortfall> = reports
            .iter()
            .filter(|r| !r.outcome.is_success())
            .map(|r| Shortfall {
                subject: r.integration_id.clone(),
                detail: r.outcome.to_string(),
            })
            .collect();

        shortfalls.extend(pipeline_warnings.iter().map(|w| Shortfall {
            subject: "context".to_string(),
            detail: w.clone(),
        }));

        if shortfalls.is_empty() {
            Self::Success
        } else {
            Self::PartialFailure { shortfalls }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

// ── Categories ────────────────────────────────────────────────────

/// Coarse classification of the work described in a summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Feature,
    Bugfix,
    Architecture,
    Documentation,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Self::Feature,
        Self::Bugfix,
        Self::Architecture,
        Self::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bugfix => "bugfix",
            Self::Architecture => "architecture",
            Self::Documentation => "documentation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, outcome: Outcome) -> AdapterReport {
        AdapterReport {
            integration_id: id.to_string(),
            kind: IntegrationKind::ChatNotifier,
            outcome,
            elapsed_ms: 3,
        }
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = Outcome::failed(FailureKind::Timeout, "no answer after 10s");
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("\"kind\":\"timeout\""));
    }

    #[test]
    fn aggregate_success_requires_every_adapter() {
        let reports = vec![
            report("slack", Outcome::Succeeded { external_reference: "1.2".into() }),
            report("jira", Outcome::skipped("credentials not configured")),
        ];

        match AggregateStatus::from_reports(&reports, &[]) {
            AggregateStatus::PartialFailure { shortfalls } => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].subject, "jira");
                assert!(shortfalls[0].detail.contains("credentials not configured"));
            }
            AggregateStatus::Success => panic!("skipped adapter must not count as success"),
        }
    }

    #[test]
    fn aggregate_reports_pipeline_warnings() {
        let reports = vec![report("slack", Outcome::Succeeded { external_reference: "1".into() })];
        let status = AggregateStatus::from_reports(&reports, &["disk full".to_string()]);
        assert!(!status.is_success());
    }

    #[test]
    fn aggregate_with_no_adapters_is_success() {
        assert!(AggregateStatus::from_reports(&[], &[]).is_success());
    }

    #[test]
    fn work_items_deduplicate_in_first_seen_order() {
        let mut refs = ReferenceSet::default();
        refs.add_work_item("PROJ-12");
        refs.add_work_item("PROJ-5");
        refs.add_work_item("PROJ-12");
        assert_eq!(refs.work_items, vec!["PROJ-12", "PROJ-5"]);
    }

    #[test]
    fn headline_skips_blank_lines() {
        let summary = SessionSummary::new("\n\n  Fixed login flow  \nmore detail");
        assert_eq!(summary.headline(), "Fixed login flow");
    }

    #[test]
    fn required_fields_per_kind() {
        assert_eq!(IntegrationKind::Wiki.required_fields(), &["username", "api_token"]);
        assert_eq!(IntegrationKind::SourceHost.required_fields(), &["token"]);
    }
}
