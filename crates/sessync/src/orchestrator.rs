//! Session Sync Orchestrator.
//!
//! One `update` runs `Extracting → ArtifactsRegenerating + Publishing →
//! Logged → Done` under the journal's writer lock. Artifact regeneration and
//! the adapter fan-out run side by side; neither can abort the other, and
//! only a failure to append the log entry ends the invocation with an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::Semaphore;

use sessync_core::extract::categorize;
use sessync_core::workflow::{validate_summary, Validation};
use sessync_core::{
    extract, AdapterReport, ExtractionPatterns, FailureKind, Outcome, ReferenceSet,
    SessionSummary, SessyncConfig, SessyncError,
};
use sessync_journal::{
    EntryRecorder, JournalQuery, JournalStore, JsonlJournal, SessionLogEntry, WriterLock,
};
use sessync_vault::{CredentialListing, CredentialVault, FieldSelector, VaultBackend};

use crate::adapters::{self, http, IntegrationAdapter, SessionUpdate};
use crate::artifacts::{ArtifactManager, ContextArtifacts, ProjectState, RecentSession};
use crate::error::{Result, SyncError};
use crate::status::StatusReport;

/// Pipeline stage of one `update` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extracting,
    ArtifactsRegenerating,
    Publishing,
    Logged,
    Done,
}

/// What an `update` produced.
#[derive(Debug)]
pub struct SyncReport {
    /// The entry as appended to the session log.
    pub entry: SessionLogEntry,
    /// `None` when regeneration is disabled or failed (see the entry's warnings).
    pub artifacts: Option<ContextArtifacts>,
    pub vault_backend: VaultBackend,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.entry.status.is_success()
    }
}

struct Publisher {
    adapter: IntegrationAdapter,
    timeout: Duration,
}

/// Runs session updates for one project.
pub struct SessionSync {
    config: SessyncConfig,
    vault: Arc<dyn CredentialVault>,
    patterns: ExtractionPatterns,
    publishers: Vec<Publisher>,
    artifacts: ArtifactManager,
    journal: Arc<JsonlJournal>,
    concurrency: Arc<Semaphore>,
}

fn enter(stage: Stage) {
    tracing::debug!(stage = ?stage, "Session update stage");
}

impl SessionSync {
    /// Build the orchestrator. Rejects invalid configuration (including
    /// malformed extraction patterns) before any session runs.
    pub fn new(config: SessyncConfig, vault: Arc<dyn CredentialVault>) -> Result<Self> {
        let client = http::build_client()
            .map_err(|e| SyncError::Config(SessyncError::Config(e.to_string())))?;
        Self::with_client(config, vault, client)
    }

    pub fn with_client(
        config: SessyncConfig,
        vault: Arc<dyn CredentialVault>,
        client: reqwest::Client,
    ) -> Result<Self> {
        config.validate()?;
        let patterns = config.extraction_patterns()?;
        let publishers = adapters::from_config(&config, &client)
            .into_iter()
            .map(|adapter| {
                let timeout = config
                    .integrations
                    .get(adapter.id())
                    .map(|c| config.adapter_timeout(c))
                    .unwrap_or(Duration::from_secs(config.sync.adapter_timeout_secs));
                Publisher { adapter, timeout }
            })
            .collect();
        let artifacts = ArtifactManager::from_config(&config);
        let journal = Arc::new(JsonlJournal::open(config.journal_dir())?);
        let concurrency = Arc::new(Semaphore::new(config.sync.max_concurrent_publishes));

        Ok(Self {
            config,
            vault,
            patterns,
            publishers,
            artifacts,
            journal,
            concurrency,
        })
    }

    pub fn config(&self) -> &SessyncConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    pub fn vault_backend(&self) -> VaultBackend {
        self.vault.backend()
    }

    /// References the configured patterns find in `text`.
    pub fn references(&self, text: &str) -> ReferenceSet {
        extract(text, &self.patterns)
    }

    /// Workflow checks for a summary. Advisory: `update` never rejects.
    pub fn validate(&self, text: &str) -> Validation {
        validate_summary(text, &self.references(text), &self.config.workflow)
    }

    /// Sync one session summary.
    ///
    /// Waits for any other `update` against the same project to finish.
    /// Returns `Err` only when the session log entry could not be written.
    pub async fn update(&self, text: &str) -> Result<SyncReport> {
        let lock_dir = self.journal.dir().to_path_buf();
        let _lock = tokio::task::spawn_blocking(move || WriterLock::acquire(&lock_dir)).await??;

        enter(Stage::Extracting);
        let summary = SessionSummary::new(text);
        let references = extract(summary.raw_text(), &self.patterns);
        let categories = categorize(summary.raw_text());
        tracing::info!(
            work_items = references.work_items.len(),
            files = references.files.len(),
            categories = categories.len(),
            "References extracted"
        );

        let update = Arc::new(SessionUpdate {
            project: self.config.project.name.clone(),
            summary: summary.clone(),
            references: references.clone(),
            categories: categories.clone(),
        });

        let (artifacts, reports) =
            tokio::join!(self.regenerate(&update), self.publish_all(update.clone()));

        let mut recorder = EntryRecorder::new(&self.config.project.name, &summary);
        recorder.set_references(references);
        recorder.set_categories(categories);
        for report in reports {
            recorder.add_outcome(report);
        }
        let artifacts = match artifacts {
            Ok(a) => a,
            Err(warning) => {
                recorder.add_warning(warning);
                None
            }
        };
        let entry = recorder.finalize()?;

        let journal = self.journal.clone();
        let appended = entry.clone();
        tokio::task::spawn_blocking(move || journal.append(&appended)).await??;
        enter(Stage::Logged);

        tracing::info!(
            entry_id = %entry.id,
            success = entry.status.is_success(),
            integrations = entry.outcomes.len(),
            "Session update logged"
        );
        enter(Stage::Done);

        Ok(SyncReport {
            entry,
            artifacts,
            vault_backend: self.vault.backend(),
        })
    }

    /// Regenerate both artifacts including the session being synced.
    /// A failure comes back as the warning text to record.
    async fn regenerate(
        &self,
        update: &SessionUpdate,
    ) -> std::result::Result<Option<ContextArtifacts>, String> {
        if !self.config.context.auto_refresh {
            tracing::debug!("Context auto-refresh disabled");
            return Ok(None);
        }
        enter(Stage::ArtifactsRegenerating);

        let pending =
            RecentSession::pending(&update.summary, &update.references, &update.categories);
        let journal = self.journal.clone();
        let manager = self.artifacts.clone();
        let state = ProjectState::from_config(&self.config);
        let earlier = self.config.context.recent_sessions.saturating_sub(1);

        let result = tokio::task::spawn_blocking(move || {
            let mut recent = vec![pending];
            recent.extend(load_recent(&journal, earlier));
            manager.refresh(&state, &recent, Utc::now())
        })
        .await;

        match result {
            Ok(Ok(artifacts)) => Ok(Some(artifacts)),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Context artifacts not refreshed");
                Err(format!("context artifacts not refreshed: {e}"))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Context regeneration task failed");
                Err(format!("context regeneration task failed: {e}"))
            }
        }
    }

    /// Publish to every enabled integration, one task each, bounded by the
    /// concurrency limit. Always yields one report per integration.
    async fn publish_all(&self, update: Arc<SessionUpdate>) -> Vec<AdapterReport> {
        enter(Stage::Publishing);

        let mut handles = Vec::with_capacity(self.publishers.len());
        for publisher in &self.publishers {
            let adapter = publisher.adapter.clone();
            let timeout = publisher.timeout;
            let vault = self.vault.clone();
            let update = update.clone();
            let semaphore = self.concurrency.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Instant::now();
                let outcome =
                    match tokio::time::timeout(timeout, adapter.publish(&update, vault)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Outcome::failed(
                            FailureKind::Timeout,
                            format!("no response within {}s", timeout.as_secs_f64()),
                        ),
                    };
                AdapterReport {
                    integration_id: adapter.id().to_string(),
                    kind: adapter.kind(),
                    outcome,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            });
            handles.push((publisher.adapter.id().to_string(), publisher.adapter.kind(), handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (id, kind, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(integration = %id, error = %e, "Publish task panicked");
                    AdapterReport {
                        integration_id: id,
                        kind,
                        outcome: Outcome::failed(FailureKind::Internal, e.to_string()),
                        elapsed_ms: 0,
                    }
                }
            };
            log_report(&report);
            reports.push(report);
        }
        reports
    }

    /// Regenerate the artifacts from the log alone. Unlike `update`, a write
    /// failure is returned to the caller.
    pub async fn refresh_context(&self) -> Result<ContextArtifacts> {
        let lock_dir = self.journal.dir().to_path_buf();
        let journal = self.journal.clone();
        let manager = self.artifacts.clone();
        let state = ProjectState::from_config(&self.config);
        let count = self.config.context.recent_sessions;

        let artifacts = tokio::task::spawn_blocking(move || -> Result<ContextArtifacts> {
            let _lock = WriterLock::acquire(&lock_dir)?;
            let recent = load_recent(&journal, count);
            Ok(manager.refresh(&state, &recent, Utc::now())?)
        })
        .await??;

        tracing::info!(
            quick_len = artifacts.quick.len(),
            full_len = artifacts.full.len(),
            "Context artifacts refreshed"
        );
        Ok(artifacts)
    }

    /// Last entry, per-integration health, statistics and maintenance hints.
    pub async fn status(&self) -> Result<StatusReport> {
        let journal = self.journal.clone();
        let scan = tokio::task::spawn_blocking(move || journal.scan()).await??;
        if !scan.rejected.is_empty() {
            tracing::warn!(rejected = scan.rejected.len(), "Session log has unreadable lines");
        }

        let vault = self.vault.clone();
        let listings = tokio::task::spawn_blocking(move || vault.list())
            .await?
            .map_err(|e| e.to_string());
        let credentials = listings.as_deref().map_err(String::as_str);

        Ok(StatusReport::compile(
            &self.config,
            &scan.entries,
            scan.rejected.len(),
            credentials,
            self.artifacts.last_written(),
            self.vault.backend(),
            Utc::now(),
        ))
    }

    /// Up to `count` entries, most recent first, optionally limited to the
    /// last `within_days` days.
    pub async fn recent_entries(
        &self,
        count: usize,
        within_days: Option<u32>,
    ) -> Result<Vec<SessionLogEntry>> {
        let query = JournalQuery {
            limit: Some(count),
            from: within_days.map(|d| Utc::now() - chrono::Duration::days(i64::from(d))),
            to: None,
        };
        let journal = self.journal.clone();
        Ok(tokio::task::spawn_blocking(move || journal.list(&query)).await??)
    }

    // ── Credentials ───────────────────────────────────────────────

    /// Store credential fields for a configured integration. Every field
    /// name must be one the integration's kind requires.
    pub fn setup(&self, integration_id: &str, fields: Vec<(String, SecretString)>) -> Result<()> {
        let kind = self
            .config
            .integrations
            .get(integration_id)
            .map(|c| c.settings.kind())
            .ok_or_else(|| SyncError::UnknownIntegration(integration_id.to_string()))?;

        let required = kind.required_fields();
        if let Some((field, _)) = fields.iter().find(|(f, _)| !required.contains(&f.as_str())) {
            return Err(SyncError::UnknownField {
                integration: integration_id.to_string(),
                field: field.clone(),
                expected: required.join(", "),
            });
        }

        for (field, secret) in fields {
            self.vault.set(integration_id, &field, secret)?;
            tracing::info!(integration = %integration_id, field = %field, "Credential stored");
        }
        Ok(())
    }

    /// Delete every stored field of an integration. Absent credentials are
    /// not an error, and the integration need not still be configured.
    pub fn remove_credentials(&self, integration_id: &str) -> Result<()> {
        self.vault.delete(integration_id, FieldSelector::All)?;
        tracing::info!(integration = %integration_id, "Credentials removed");
        Ok(())
    }

    /// Stored credential names. Never includes values.
    pub fn list_credentials(&self) -> Result<Vec<CredentialListing>> {
        Ok(self.vault.list()?)
    }
}

fn load_recent(journal: &JsonlJournal, count: usize) -> Vec<RecentSession> {
    if count == 0 {
        return Vec::new();
    }
    match journal.list(&JournalQuery::recent(count)) {
        Ok(entries) => entries.iter().map(RecentSession::from).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read recent sessions for context");
            Vec::new()
        }
    }
}

fn log_report(report: &AdapterReport) {
    match &report.outcome {
        Outcome::Failed { kind, message } => tracing::warn!(
            integration = %report.integration_id,
            kind = %kind,
            elapsed_ms = report.elapsed_ms,
            error = %message,
            "Publish failed"
        ),
        outcome => tracing::info!(
            integration = %report.integration_id,
            outcome = %outcome,
            elapsed_ms = report.elapsed_ms,
            "Publish finished"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessync_core::config::{IntegrationConfig, IntegrationSettings};
    use sessync_vault::EncryptedFileVault;

    fn setup_sync(dir: &std::path::Path) -> SessionSync {
        let mut config = SessyncConfig::default();
        config.root = dir.to_path_buf();
        config.integrations.insert(
            "gh".to_string(),
            IntegrationConfig {
                enabled: true,
                timeout_secs: None,
                settings: IntegrationSettings::SourceHost {
                    repository: "acme/atlas".to_string(),
                    api_url: "http://127.0.0.1:9".to_string(),
                },
            },
        );
        let vault = Arc::new(EncryptedFileVault::with_key(dir.join("vault.json"), [3; 32]));
        SessionSync::with_client(config, vault, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn setup_rejects_unknown_integration_and_field() {
        let dir = tempfile::tempdir().unwrap();
        let sync = setup_sync(dir.path());

        let err = sync
            .setup("jira", vec![("token".to_string(), SecretString::from("x".to_string()))])
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownIntegration(id) if id == "jira"));

        let err = sync
            .setup("gh", vec![("password".to_string(), SecretString::from("x".to_string()))])
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownField { field, .. } if field == "password"));
        assert!(sync.list_credentials().unwrap().is_empty());
    }

    #[test]
    fn setup_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let sync = setup_sync(dir.path());

        sync.setup("gh", vec![("token".to_string(), SecretString::from("ghp".to_string()))])
            .unwrap();
        let listed = sync.list_credentials().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fields, vec!["token".to_string()]);

        sync.remove_credentials("gh").unwrap();
        sync.remove_credentials("gh").unwrap();
        assert!(sync.list_credentials().unwrap().is_empty());
    }

    #[test]
    fn malformed_pattern_rejected_before_any_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SessyncConfig::default();
        config.root = dir.path().to_path_buf();
        config.extraction.patterns = vec![sessync_core::extract::PatternSpec::new(
            sessync_core::extract::PatternTag::WorkItem,
            "([A-Z]+",
        )];
        let vault = Arc::new(EncryptedFileVault::with_key(dir.path().join("v.json"), [1; 32]));

        let err = SessionSync::with_client(config, vault, reqwest::Client::new()).err();
        assert!(matches!(
            err,
            Some(SyncError::Config(SessyncError::ExtractionPatternInvalid { .. }))
        ));
    }

    #[tokio::test]
    async fn update_without_credentials_is_logged_as_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let sync = setup_sync(dir.path());

        let report = sync.update("Fixed #12 in src/tiles.rs").await.unwrap();
        assert!(!report.is_success());
        assert_eq!(report.entry.outcomes.len(), 1);
        assert_eq!(
            report.entry.outcomes[0].outcome,
            Outcome::skipped("credentials not configured")
        );
        assert!(report.artifacts.is_some());

        let logged = sync.recent_entries(10, None).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].id, report.entry.id);
    }

    #[tokio::test]
    async fn status_after_update() {
        let dir = tempfile::tempdir().unwrap();
        let sync = setup_sync(dir.path());
        sync.update("Implemented ATL-3").await.unwrap();

        let status = sync.status().await.unwrap();
        assert_eq!(status.stats.total, 1);
        assert!(status.last_entry.is_some());
        assert!(!status.maintenance.refresh_recommended);
        assert!(status.is_vault_degraded());
    }
}
