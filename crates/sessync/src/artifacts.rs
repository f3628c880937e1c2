//! Context Artifact Manager.
//!
//! Maintains two generated files for AI assistants:
//! - **Quick**: a single-paragraph digest (project, current focus, recent
//!   work items, active integrations)
//! - **Full**: a Markdown document with project metadata, integrations,
//!   active work items and recent sessions, most recent first
//!
//! Both are composed deterministically from a fixed schema
//! ([`SCHEMA_VERSION`]) and bounded in characters. When content exceeds its
//! bound, whole sessions (or work items, for Quick) are dropped oldest first
//! and a truncation marker is appended. If the fixed parts alone still do not
//! fit, the text is cut at a character boundary and ends with an ellipsis.
//!
//! Files are replaced via temp file + rename, so a failed write leaves the
//! previous artifact in place.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use sessync_core::config::SessyncConfig;
use sessync_core::extract::CategoryMatch;
use sessync_core::types::{headline, Category};
use sessync_core::{IntegrationKind, ReferenceSet, SessionSummary};
use sessync_journal::SessionLogEntry;

/// Schema marker written at the top of the Full artifact.
pub const SCHEMA_VERSION: &str = "sessync-context/v1";

const ELLIPSIS: char = '…';

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ── Inputs ────────────────────────────────────────────────────────

/// An integration as listed in the artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationSummary {
    pub id: String,
    pub kind: IntegrationKind,
    pub enabled: bool,
}

/// Project facts the artifacts are composed from.
#[derive(Debug, Clone)]
pub struct ProjectState {
    pub name: String,
    pub description: String,
    pub kind: String,
    pub version: String,
    pub tags: Vec<String>,
    pub integrations: Vec<IntegrationSummary>,
    pub mandatory_session_updates: bool,
    pub require_work_item_references: bool,
    pub journal_dir: String,
    pub context_dir: String,
}

impl ProjectState {
    pub fn from_config(config: &SessyncConfig) -> Self {
        Self {
            name: config.project.name.clone(),
            description: config.project.description.clone(),
            kind: config.project.kind.clone(),
            version: config.project.version.clone(),
            tags: config.project.tags.clone(),
            integrations: config
                .integrations
                .iter()
                .map(|(id, c)| IntegrationSummary {
                    id: id.clone(),
                    kind: c.settings.kind(),
                    enabled: c.enabled,
                })
                .collect(),
            mandatory_session_updates: config.workflow.mandatory_session_updates,
            require_work_item_references: config.workflow.require_work_item_references,
            journal_dir: config.journal.directory.clone(),
            context_dir: config.context.directory.clone(),
        }
    }
}

/// A session as shown in the artifacts.
#[derive(Debug, Clone)]
pub struct RecentSession {
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    pub work_items: Vec<String>,
    pub files: Vec<String>,
    pub categories: Vec<Category>,
    /// `(integration_id, outcome)`; `None` while the session is still publishing.
    pub outcomes: Option<Vec<(String, String)>>,
}

impl RecentSession {
    /// The session currently being synced, before any outcome is known.
    pub fn pending(
        summary: &SessionSummary,
        references: &ReferenceSet,
        categories: &[CategoryMatch],
    ) -> Self {
        Self {
            timestamp: summary.timestamp(),
            summary: summary.raw_text().to_string(),
            work_items: references.work_items.clone(),
            files: references.files.iter().cloned().collect(),
            categories: categories.iter().map(|c| c.category).collect(),
            outcomes: None,
        }
    }
}

impl From<&SessionLogEntry> for RecentSession {
    fn from(entry: &SessionLogEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            summary: entry.summary.clone(),
            work_items: entry.references.work_items.clone(),
            files: entry.references.files.iter().cloned().collect(),
            categories: entry.categories.iter().map(|c| c.category).collect(),
            outcomes: Some(
                entry
                    .outcomes
                    .iter()
                    .map(|r| (r.integration_id.clone(), r.outcome.to_string()))
                    .collect(),
            ),
        }
    }
}

// ── Outputs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Quick,
    Full,
}

/// One generated artifact. `content` never exceeds `max_length` characters.
#[derive(Debug, Clone)]
pub struct ContextArtifact {
    pub kind: ArtifactKind,
    pub content: String,
    pub max_length: usize,
    pub generated_at: DateTime<Utc>,
    /// Sessions (Full) or work items (Quick) left out to fit the bound.
    pub omitted_entries: usize,
}

impl ContextArtifact {
    /// Length in characters.
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ContextArtifacts {
    pub quick: ContextArtifact,
    pub full: ContextArtifact,
}

/// Size limits for regeneration, all in characters.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactBounds {
    pub quick_max_length: usize,
    pub max_length: usize,
    /// Work items listed in the Quick digest.
    pub recent_work_items: usize,
}

// ── Composition ───────────────────────────────────────────────────

/// Compose both artifacts. Pure: same inputs and `now` give the same text.
///
/// `recent` must be ordered most recent first.
pub fn regenerate(
    state: &ProjectState,
    recent: &[RecentSession],
    bounds: &ArtifactBounds,
    now: DateTime<Utc>,
) -> ContextArtifacts {
    let (quick, quick_omitted) = compose_quick(state, recent, bounds);
    let (full, full_omitted) = compose_full(state, recent, bounds.max_length, now);

    ContextArtifacts {
        quick: ContextArtifact {
            kind: ArtifactKind::Quick,
            content: quick,
            max_length: bounds.quick_max_length,
            generated_at: now,
            omitted_entries: quick_omitted,
        },
        full: ContextArtifact {
            kind: ArtifactKind::Full,
            content: full,
            max_length: bounds.max_length,
            generated_at: now,
            omitted_entries: full_omitted,
        },
    }
}

fn truncation_marker(omitted: usize) -> String {
    let noun = if omitted == 1 { "entry" } else { "entries" };
    format!("{ELLIPSIS}truncated, {omitted} earlier {noun} omitted")
}

/// Cut `text` to at most `max` characters, ending with an ellipsis when cut.
fn hard_truncate(text: String, max: usize) -> String {
    if text.chars().count() <= max {
        return text;
    }
    if max == 0 {
        return String::new();
    }
    let mut cut: String = text.chars().take(max - 1).collect();
    cut.push(ELLIPSIS);
    cut
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Work items across sessions, most recent first, duplicates collapsed.
fn active_work_items(recent: &[RecentSession]) -> Vec<&str> {
    let mut items: Vec<&str> = Vec::new();
    for item in recent.iter().flat_map(|s| s.work_items.iter()) {
        if !items.contains(&item.as_str()) {
            items.push(item);
        }
    }
    items
}

fn enabled_integrations(state: &ProjectState) -> Vec<&str> {
    state
        .integrations
        .iter()
        .filter(|i| i.enabled)
        .map(|i| i.id.as_str())
        .collect()
}

fn compose_quick(
    state: &ProjectState,
    recent: &[RecentSession],
    bounds: &ArtifactBounds,
) -> (String, usize) {
    let mut lead = format!("{} ({}, v{})", state.name, state.kind, state.version);
    if !state.description.is_empty() {
        lead.push_str(": ");
        lead.push_str(state.description.trim_end_matches('.'));
    }
    lead.push('.');

    match recent.first() {
        Some(latest) => {
            lead.push_str(" Current focus: ");
            lead.push_str(headline(&latest.summary));
            lead.push('.');
        }
        None => lead.push_str(" No sessions recorded yet."),
    }

    let integrations = enabled_integrations(state);
    let tail = if integrations.is_empty() {
        String::new()
    } else {
        format!(" Integrations: {}.", integrations.join(", "))
    };

    let items: Vec<&str> = active_work_items(recent)
        .into_iter()
        .take(bounds.recent_work_items)
        .collect();

    let render = |kept: usize| -> String {
        let mut text = lead.clone();
        if kept > 0 {
            text.push_str(" Recent work items: ");
            text.push_str(&items[..kept].join(", "));
            text.push('.');
        }
        if kept < items.len() {
            text.push_str(&format!(" ({})", truncation_marker(items.len() - kept)));
        }
        text.push_str(&tail);
        text
    };

    let max = bounds.quick_max_length;
    for kept in (0..=items.len()).rev() {
        let text = render(kept);
        if char_len(&text) <= max {
            return (text, items.len() - kept);
        }
    }

    (hard_truncate(render(0), max), items.len())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn session_block(session: &RecentSession) -> String {
    let status = match &session.outcomes {
        None => "publishing",
        Some(outcomes) if outcomes.iter().all(|(_, o)| o.starts_with("succeeded")) => "synced",
        Some(_) => "partially synced",
    };

    let mut block = format!(
        "### {} ({status})\n\n{}\n\n",
        session.timestamp.format("%Y-%m-%d %H:%M UTC"),
        session.summary.trim()
    );

    if !session.work_items.is_empty() {
        block.push_str(&format!("- Work items: {}\n", session.work_items.join(", ")));
    }
    if !session.files.is_empty() {
        block.push_str(&format!("- Files: {}\n", session.files.join(", ")));
    }
    if !session.categories.is_empty() {
        let names: Vec<&str> = session.categories.iter().map(Category::as_str).collect();
        block.push_str(&format!("- Categories: {}\n", names.join(", ")));
    }
    if let Some(outcomes) = &session.outcomes {
        for (id, outcome) in outcomes {
            block.push_str(&format!("- {id}: {outcome}\n"));
        }
    }
    block.push('\n');
    block
}

fn compose_full(
    state: &ProjectState,
    recent: &[RecentSession],
    max: usize,
    now: DateTime<Utc>,
) -> (String, usize) {
    let mut head = format!("<!-- {SCHEMA_VERSION} -->\n# {} - AI Context\n\n", state.name);
    head.push_str(&format!(
        "**Generated:** {}\n**Project Type:** {}\n\n",
        now.format("%Y-%m-%d %H:%M:%S UTC"),
        state.kind
    ));

    head.push_str("## Project Overview\n\n");
    head.push_str(&format!("**Name:** {}\n", state.name));
    if !state.description.is_empty() {
        head.push_str(&format!("**Description:** {}\n", state.description));
    }
    head.push_str(&format!("**Version:** {}\n", state.version));
    if !state.tags.is_empty() {
        head.push_str(&format!("**Tags:** {}\n", state.tags.join(", ")));
    }
    head.push('\n');

    head.push_str("## Integrations\n\n");
    let enabled: Vec<&IntegrationSummary> =
        state.integrations.iter().filter(|i| i.enabled).collect();
    if enabled.is_empty() {
        head.push_str("- No integrations currently enabled\n");
    }
    for integration in enabled {
        head.push_str(&format!("- **{}** ({})\n", integration.id, integration.kind));
    }
    head.push('\n');

    let items = active_work_items(recent);
    if !items.is_empty() {
        head.push_str("## Active Work Items\n\n");
        for item in items {
            head.push_str(&format!("- {item}\n"));
        }
        head.push('\n');
    }

    head.push_str("## Workflow\n\n");
    head.push_str(&format!(
        "- Mandatory session updates: {}\n- Work item references required: {}\n- Session logs: {}\n- Context directory: {}\n\n",
        yes_no(state.mandatory_session_updates),
        yes_no(state.require_work_item_references),
        state.journal_dir,
        state.context_dir,
    ));

    head.push_str("## Recent Sessions\n\n");
    if recent.is_empty() {
        head.push_str("_No sessions recorded yet._\n\n");
    }

    let tail = "---\n\n*Generated by sessync. Run `sessync context --refresh` to update.*\n";

    let blocks: Vec<String> = recent.iter().map(session_block).collect();
    let block_lens: Vec<usize> = blocks.iter().map(|b| char_len(b)).collect();
    let fixed = char_len(&head) + char_len(tail);

    let size = |kept: usize| -> usize {
        let marker = if kept < blocks.len() {
            char_len(&truncation_marker(blocks.len() - kept)) + 2
        } else {
            0
        };
        fixed + block_lens[..kept].iter().sum::<usize>() + marker
    };

    let mut kept = blocks.len();
    while kept > 0 && size(kept) > max {
        kept -= 1;
    }

    let mut content = head;
    for block in &blocks[..kept] {
        content.push_str(block);
    }
    if kept < blocks.len() {
        content.push_str(&truncation_marker(blocks.len() - kept));
        content.push_str("\n\n");
    }
    content.push_str(tail);

    (hard_truncate(content, max), blocks.len() - kept)
}

// ── Manager ───────────────────────────────────────────────────────

/// Owns the artifact paths and bounds for one project.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    quick_path: PathBuf,
    full_path: PathBuf,
    bounds: ArtifactBounds,
}

impl ArtifactManager {
    pub fn new(quick_path: PathBuf, full_path: PathBuf, bounds: ArtifactBounds) -> Self {
        Self {
            quick_path,
            full_path,
            bounds,
        }
    }

    pub fn from_config(config: &SessyncConfig) -> Self {
        Self::new(
            config.quick_context_path(),
            config.full_context_path(),
            ArtifactBounds {
                quick_max_length: config.context.quick_max_length,
                max_length: config.context.max_length,
                recent_work_items: config.context.recent_work_items,
            },
        )
    }

    pub fn quick_path(&self) -> &Path {
        &self.quick_path
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    pub fn bounds(&self) -> &ArtifactBounds {
        &self.bounds
    }

    /// Compose both artifacts and replace the files on disk.
    pub fn refresh(
        &self,
        state: &ProjectState,
        recent: &[RecentSession],
        now: DateTime<Utc>,
    ) -> Result<ContextArtifacts, ArtifactError> {
        let artifacts = regenerate(state, recent, &self.bounds, now);
        self.write(&artifacts)?;
        Ok(artifacts)
    }

    /// Replace both files. Each file is either fully replaced or untouched.
    ///
    /// Both contents are staged and synced before either file is renamed
    /// into place, and Full is renamed before Quick, so a failure leaves the
    /// previous pair intact. Only a failed Quick rename after a successful
    /// Full rename can leave the two from different generations.
    pub fn write(&self, artifacts: &ContextArtifacts) -> Result<(), ArtifactError> {
        let full = stage(&self.full_path, &artifacts.full.content)?;
        let quick = match stage(&self.quick_path, &artifacts.quick.content) {
            Ok(staged) => staged,
            Err(e) => {
                full.discard();
                return Err(e);
            }
        };
        if let Err(e) = full.commit() {
            quick.discard();
            return Err(e);
        }
        quick.commit()?;

        tracing::debug!(
            quick = %self.quick_path.display(),
            quick_len = artifacts.quick.len(),
            full = %self.full_path.display(),
            full_len = artifacts.full.len(),
            "Context artifacts written"
        );
        Ok(())
    }

    /// Current content of an artifact, if it has been generated.
    pub fn read(&self, kind: ArtifactKind) -> std::io::Result<Option<String>> {
        let path = match kind {
            ArtifactKind::Quick => &self.quick_path,
            ArtifactKind::Full => &self.full_path,
        };
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// When the older of the two artifacts was last written.
    pub fn last_written(&self) -> Option<DateTime<Utc>> {
        let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
        let quick = modified(&self.quick_path)?;
        let full = modified(&self.full_path)?;
        Some(DateTime::<Utc>::from(quick.min(full)))
    }
}

/// Content written and synced beside its target, not yet renamed over it.
struct Staged<'a> {
    tmp_path: PathBuf,
    path: &'a Path,
}

impl Staged<'_> {
    fn commit(self) -> Result<(), ArtifactError> {
        fs::rename(&self.tmp_path, self.path).map_err(|source| {
            let _ = fs::remove_file(&self.tmp_path);
            ArtifactError::Write {
                path: self.path.to_path_buf(),
                source,
            }
        })
    }

    fn discard(self) {
        let _ = fs::remove_file(&self.tmp_path);
    }
}

fn stage<'a>(path: &'a Path, content: &str) -> Result<Staged<'a>, ArtifactError> {
    let err = |source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(err)?;
    }

    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(path.file_name().unwrap_or_default());
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let write = || -> std::io::Result<()> {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(content.as_bytes())?;
        tmp.sync_all()
    };

    match write() {
        Ok(()) => Ok(Staged { tmp_path, path }),
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(err(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn state() -> ProjectState {
        ProjectState {
            name: "Atlas".to_string(),
            description: "Mapping service".to_string(),
            kind: "web-app".to_string(),
            version: "2.1.0".to_string(),
            tags: vec!["maps".to_string()],
            integrations: vec![
                IntegrationSummary {
                    id: "jira".to_string(),
                    kind: IntegrationKind::IssueTracker,
                    enabled: true,
                },
                IntegrationSummary {
                    id: "wiki".to_string(),
                    kind: IntegrationKind::Wiki,
                    enabled: false,
                },
            ],
            mandatory_session_updates: true,
            require_work_item_references: false,
            journal_dir: "session-logs".to_string(),
            context_dir: "ai-context".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    fn session(i: i64, summary: &str, items: &[&str]) -> RecentSession {
        RecentSession {
            timestamp: now() - Duration::hours(i),
            summary: summary.to_string(),
            work_items: items.iter().map(|s| s.to_string()).collect(),
            files: vec!["src/map.rs".to_string()],
            categories: vec![Category::Bugfix],
            outcomes: Some(vec![("jira".to_string(), "succeeded (10001)".to_string())]),
        }
    }

    fn bounds(quick: usize, full: usize) -> ArtifactBounds {
        ArtifactBounds {
            quick_max_length: quick,
            max_length: full,
            recent_work_items: 5,
        }
    }

    #[test]
    fn quick_is_single_paragraph_digest() {
        let recent = vec![
            session(0, "Fixed tile cache ATL-9\nlong detail", &["ATL-9"]),
            session(1, "Added routing ATL-4", &["ATL-4", "ATL-9"]),
        ];
        let out = regenerate(&state(), &recent, &bounds(1500, 10_000), now());

        assert_eq!(
            out.quick.content,
            "Atlas (web-app, v2.1.0): Mapping service. Current focus: Fixed tile cache ATL-9. \
             Recent work items: ATL-9, ATL-4. Integrations: jira."
        );
        assert!(!out.quick.content.contains('\n'));
        assert_eq!(out.quick.omitted_entries, 0);
    }

    #[test]
    fn full_lists_sessions_most_recent_first() {
        let recent = vec![
            session(0, "Newest session", &["ATL-2"]),
            session(5, "Older session", &["ATL-1"]),
        ];
        let out = regenerate(&state(), &recent, &bounds(1500, 10_000), now());
        let full = &out.full.content;

        assert!(full.starts_with("<!-- sessync-context/v1 -->\n# Atlas - AI Context"));
        assert!(full.contains("**Generated:** 2026-03-14 09:30:00 UTC"));
        assert!(full.contains("- **jira** (issue_tracker)"));
        assert!(!full.contains("**wiki**"));
        let newest = full.find("Newest session").unwrap();
        let older = full.find("Older session").unwrap();
        assert!(newest < older);
        assert!(full.contains("- jira: succeeded (10001)"));
    }

    #[test]
    fn regeneration_is_deterministic() {
        let recent = vec![session(0, "Fixed ATL-1", &["ATL-1"])];
        let a = regenerate(&state(), &recent, &bounds(1500, 10_000), now());
        let b = regenerate(&state(), &recent, &bounds(1500, 10_000), now());
        assert_eq!(a.quick.content, b.quick.content);
        assert_eq!(a.full.content, b.full.content);
    }

    #[test]
    fn full_truncates_at_session_boundary() {
        let recent: Vec<RecentSession> = (0..20)
            .map(|i| session(i, &format!("Session number {i} {}", "detail ".repeat(20)), &[]))
            .collect();
        let out = regenerate(&state(), &recent, &bounds(1500, 2_000), now());

        assert!(out.full.len() <= 2_000);
        assert!(out.full.omitted_entries > 0);
        let marker = truncation_marker(out.full.omitted_entries);
        assert!(out.full.content.contains(&marker));
        assert!(out.full.content.contains("Session number 0 "));
        // Kept sessions are whole.
        let kept = 20 - out.full.omitted_entries;
        assert_eq!(out.full.content.matches("### ").count(), kept);
        assert!(out.full.content.ends_with("to update.*\n"));
    }

    #[test]
    fn single_oversized_session_is_dropped_whole() {
        let huge = "x".repeat(50_000);
        let recent = vec![session(0, &huge, &["ATL-1"])];
        let out = regenerate(&state(), &recent, &bounds(300, 3_000), now());

        assert!(out.full.len() <= 3_000);
        assert_eq!(out.full.omitted_entries, 1);
        assert!(out.full.content.contains("earlier entry omitted"));

        assert!(out.quick.len() <= 300);
        assert!(out.quick.content.ends_with(ELLIPSIS));
    }

    #[test]
    fn bounds_hold_for_tiny_limits() {
        let recent = vec![session(0, "Fixed ATL-1", &["ATL-1", "ATL-2"])];
        for max in [1, 2, 10, 57, 120] {
            let out = regenerate(&state(), &recent, &bounds(max, max), now());
            assert!(out.quick.len() <= max, "quick over bound at {max}");
            assert!(out.full.len() <= max, "full over bound at {max}");
        }
    }

    #[test]
    fn quick_drops_oldest_work_items_first() {
        let items: Vec<String> = (1..=5).map(|i| format!("ATLAS-{i:04}")).collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        let recent = vec![session(0, "Fixed", &refs)];
        let full = regenerate(&state(), &recent, &bounds(10_000, 10_000), now());
        let limit = full.quick.len() - 5;

        let out = regenerate(&state(), &recent, &bounds(limit, 10_000), now());
        assert!(out.quick.len() <= limit);
        assert!(out.quick.omitted_entries >= 1);
        assert!(out.quick.content.contains("ATLAS-0001"));
        assert!(!out.quick.content.contains("ATLAS-0005"));
        assert!(out.quick.content.contains("truncated"));
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundary() {
        let recent = vec![session(0, &"é".repeat(5_000), &[])];
        let out = regenerate(&state(), &recent, &bounds(100, 10_000), now());
        assert!(out.quick.len() <= 100);
    }

    #[test]
    fn manager_writes_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(
            dir.path().join("ctx/QUICK.txt"),
            dir.path().join("ctx/FULL.md"),
            bounds(1500, 10_000),
        );

        manager.refresh(&state(), &[], now()).unwrap();
        let first = manager.read(ArtifactKind::Full).unwrap().unwrap();
        assert!(first.contains("_No sessions recorded yet._"));

        manager
            .refresh(&state(), &[session(0, "Fixed ATL-3", &["ATL-3"])], now())
            .unwrap();
        let second = manager.read(ArtifactKind::Full).unwrap().unwrap();
        assert!(!second.contains("_No sessions recorded yet._"));
        assert!(manager.last_written().is_some());

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("ctx"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_rename_leaves_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let quick = dir.path().join("QUICK.txt");
        fs::write(&quick, "previous quick").unwrap();
        // A directory where the full artifact should go makes the rename fail.
        let full = dir.path().join("FULL.md");
        fs::create_dir_all(full.join("occupied")).unwrap();

        let manager = ArtifactManager::new(quick.clone(), full.clone(), bounds(1500, 10_000));
        let artifacts = regenerate(&state(), &[], &manager.bounds, now());
        let err = manager.write(&artifacts).unwrap_err();

        assert!(matches!(err, ArtifactError::Write { path, .. } if path == full));
        assert!(full.join("occupied").is_dir());
        assert_eq!(fs::read_to_string(&quick).unwrap(), "previous quick");
        assert!(!dir.path().join(".FULL.md.tmp").exists());
        assert!(!dir.path().join(".QUICK.txt.tmp").exists());
    }

    #[test]
    fn failed_staging_leaves_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let quick = dir.path().join("QUICK.txt");
        let full = dir.path().join("FULL.md");
        fs::write(&quick, "previous quick").unwrap();
        fs::write(&full, "previous full").unwrap();
        // The quick artifact cannot be staged: its temp path is a directory.
        fs::create_dir_all(dir.path().join(".QUICK.txt.tmp").join("x")).unwrap();

        let manager = ArtifactManager::new(quick.clone(), full.clone(), bounds(1500, 10_000));
        let artifacts = regenerate(&state(), &[], &manager.bounds, now());
        let err = manager.write(&artifacts).unwrap_err();

        assert!(matches!(err, ArtifactError::Write { path, .. } if path == quick));
        assert_eq!(fs::read_to_string(&full).unwrap(), "previous full");
        assert_eq!(fs::read_to_string(&quick).unwrap(), "previous quick");
        assert!(!dir.path().join(".FULL.md.tmp").exists());
    }

    #[test]
    fn missing_artifact_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(
            dir.path().join("q"),
            dir.path().join("f"),
            bounds(10, 10),
        );
        assert!(manager.read(ArtifactKind::Quick).unwrap().is_none());
        assert!(manager.last_written().is_none());
    }
}
