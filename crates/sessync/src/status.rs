//! Project status: last session, integration health, statistics, maintenance.
//!
//! [`StatusReport::compile`] is pure over already-loaded inputs; the
//! orchestrator gathers the journal scan, the vault listing and the artifact
//! timestamps and passes them in.

use chrono::{DateTime, Duration, Utc};

use sessync_core::{IntegrationKind, Outcome, SessyncConfig};
use sessync_journal::SessionLogEntry;
use sessync_vault::{CredentialListing, VaultBackend};

/// Artifacts older than this should be refreshed.
pub const REFRESH_AFTER_DAYS: i64 = 7;

const STATS_WINDOW_DAYS: i64 = 30;
const WEEKLY_AVERAGE_WEEKS: i64 = 8;

/// Whether the vault holds every field an integration needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    Configured,
    Missing { fields: Vec<String> },
    /// The vault could not be listed.
    Unknown { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationHealth {
    pub id: String,
    pub kind: IntegrationKind,
    pub enabled: bool,
    pub credentials: CredentialState,
    /// Outcome from the most recent entry that attempted this integration.
    pub last_outcome: Option<(DateTime<Utc>, Outcome)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub total: usize,
    pub last_30_days: usize,
    pub weekly_average: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Maintenance {
    pub retention_days: u32,
    /// Entries older than the retention window. Reported, never deleted.
    pub past_retention: usize,
    /// Log lines that were malformed or failed their integrity check.
    pub rejected_lines: usize,
    pub artifacts_written: Option<DateTime<Utc>>,
    pub refresh_recommended: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub project: String,
    pub generated_at: DateTime<Utc>,
    pub last_entry: Option<SessionLogEntry>,
    pub integrations: Vec<IntegrationHealth>,
    pub stats: SessionStats,
    pub maintenance: Maintenance,
    pub vault_backend: VaultBackend,
}

impl StatusReport {
    /// Build the report. `entries` may be in any order.
    pub fn compile(
        config: &SessyncConfig,
        entries: &[SessionLogEntry],
        rejected_lines: usize,
        credentials: Result<&[CredentialListing], &str>,
        artifacts_written: Option<DateTime<Utc>>,
        vault_backend: VaultBackend,
        now: DateTime<Utc>,
    ) -> Self {
        let mut by_recency: Vec<&SessionLogEntry> = entries.iter().collect();
        by_recency.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let integrations = config
            .integrations
            .iter()
            .map(|(id, c)| {
                let kind = c.settings.kind();
                let last_outcome = by_recency.iter().find_map(|e| {
                    e.outcomes
                        .iter()
                        .find(|r| &r.integration_id == id)
                        .map(|r| (e.timestamp, r.outcome.clone()))
                });
                IntegrationHealth {
                    id: id.clone(),
                    kind,
                    enabled: c.enabled,
                    credentials: credential_state(id, kind, credentials),
                    last_outcome,
                }
            })
            .collect();

        let within = |days: i64| {
            entries
                .iter()
                .filter(|e| e.age(now) <= Duration::days(days))
                .count()
        };
        let stats = SessionStats {
            total: entries.len(),
            last_30_days: within(STATS_WINDOW_DAYS),
            weekly_average: within(WEEKLY_AVERAGE_WEEKS * 7) as f64 / WEEKLY_AVERAGE_WEEKS as f64,
        };

        let retention_days = config.journal.retention_days;
        let refresh_recommended = match artifacts_written {
            Some(at) => now - at > Duration::days(REFRESH_AFTER_DAYS),
            None => true,
        };
        let maintenance = Maintenance {
            retention_days,
            past_retention: entries
                .iter()
                .filter(|e| e.is_past_retention(now, retention_days))
                .count(),
            rejected_lines,
            artifacts_written,
            refresh_recommended,
        };

        Self {
            project: config.project.name.clone(),
            generated_at: now,
            last_entry: by_recency.first().map(|e| (*e).clone()),
            integrations,
            stats,
            maintenance,
            vault_backend,
        }
    }

    pub fn is_vault_degraded(&self) -> bool {
        self.vault_backend.is_degraded()
    }
}

fn credential_state(
    id: &str,
    kind: IntegrationKind,
    credentials: Result<&[CredentialListing], &str>,
) -> CredentialState {
    let listings = match credentials {
        Ok(l) => l,
        Err(reason) => {
            return CredentialState::Unknown {
                reason: reason.to_string(),
            }
        }
    };
    let stored: &[String] = listings
        .iter()
        .find(|l| l.integration_id == id)
        .map(|l| l.fields.as_slice())
        .unwrap_or(&[]);

    let missing: Vec<String> = kind
        .required_fields()
        .iter()
        .filter(|f| !stored.iter().any(|s| s == *f))
        .map(|f| f.to_string())
        .collect();

    if missing.is_empty() {
        CredentialState::Configured
    } else {
        CredentialState::Missing { fields: missing }
    }
}
