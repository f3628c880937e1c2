//! Integration Adapters.
//!
//! Each external system is one variant of the closed [`Adapter`] enum,
//! chosen from the integration's `kind` when configuration is loaded.
//! [`IntegrationAdapter::publish`] is the single capability the orchestrator
//! uses: it resolves credentials from the vault, makes one attempt against
//! the remote system, and always returns an [`Outcome`].

pub mod chat;
pub mod http;
pub mod issue_tracker;
pub mod notes;
pub mod render;
pub mod source_host;
pub mod wiki;

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use sessync_core::config::{IntegrationConfig, IntegrationSettings};
use sessync_core::extract::CategoryMatch;
use sessync_core::{FailureKind, IntegrationKind, Outcome, ReferenceSet, SessionSummary};
use sessync_vault::{CredentialVault, VaultError};

pub use chat::ChatNotifierAdapter;
pub use issue_tracker::IssueTrackerAdapter;
pub use notes::NoteDatabaseAdapter;
pub use source_host::SourceHostAdapter;
pub use wiki::WikiAdapter;

/// Errors from a single publish attempt. Never fatal to the invocation.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("request timed out")]
    Timeout,

    #[error("remote rejected the update ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid integration settings: {0}")]
    Config(String),
}

impl AdapterError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Transport,
            Self::Auth(_) => FailureKind::Auth,
            Self::Timeout => FailureKind::Timeout,
            Self::Rejected { .. } => FailureKind::Rejected,
            Self::Config(_) => FailureKind::Internal,
        }
    }
}

impl AdapterError {
    /// Prefix the message with the work item the request was about.
    fn for_item(self, item: &str) -> Self {
        match self {
            Self::Transport(m) => Self::Transport(format!("{item}: {m}")),
            Self::Auth(m) => Self::Auth(format!("{item}: {m}")),
            Self::Rejected { status, message } => Self::Rejected {
                status,
                message: format!("{item}: {message}"),
            },
            Self::Timeout | Self::Config(_) => self,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<AdapterError> for Outcome {
    fn from(e: AdapterError) -> Self {
        Outcome::failed(e.failure_kind(), e.to_string())
    }
}

/// Everything an adapter may publish. Shared read-only between adapters.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub project: String,
    pub summary: SessionSummary,
    pub references: ReferenceSet,
    pub categories: Vec<CategoryMatch>,
}

/// What a successful publish call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Published {
    /// Created something remote; the reference names it.
    Created(String),
    /// The update had nothing for this integration (e.g. no matching work items).
    NothingToDo(String),
}

/// Per-item results of an adapter that makes one request per work item.
///
/// Every item is attempted once; a failed item never stops the ones after it.
#[derive(Debug, Default)]
pub(crate) struct ItemResults {
    created: Vec<String>,
    failed: Vec<AdapterError>,
}

impl ItemResults {
    pub(crate) fn record(&mut self, item: &str, result: Result<String, AdapterError>) {
        match result {
            Ok(reference) => self.created.push(reference),
            Err(e) => {
                tracing::warn!(item = %item, error = %e, "Work item update failed");
                self.failed.push(e.for_item(item));
            }
        }
    }

    /// `Created` when at least one item went through, listing the failed
    /// ones after the created references. Otherwise the first error.
    pub(crate) fn finish(self) -> Result<Published, AdapterError> {
        let created = self.created.join(", ");
        let mut failed = self.failed.into_iter();
        match failed.next() {
            None => Ok(Published::Created(created)),
            Some(first) if created.is_empty() => Err(first),
            Some(first) => {
                let notes: Vec<String> = std::iter::once(first)
                    .chain(failed)
                    .map(|e| e.to_string())
                    .collect();
                Ok(Published::Created(format!(
                    "{created}; failed: {}",
                    notes.join("; ")
                )))
            }
        }
    }
}

// ── Credentials ───────────────────────────────────────────────────

/// Secrets for one publish call. Dropped (and zeroized) when the call ends.
pub struct Credentials {
    fields: HashMap<&'static str, SecretString>,
}

/// Result of looking up an integration's required fields.
pub enum CredentialLookup {
    Found(Credentials),
    Missing { field: &'static str },
}

impl Credentials {
    /// Fetch every field `kind` requires. The first absent field short-circuits.
    pub fn resolve(
        vault: &dyn CredentialVault,
        integration_id: &str,
        kind: IntegrationKind,
    ) -> Result<CredentialLookup, VaultError> {
        let mut fields = HashMap::new();
        for &field in kind.required_fields() {
            match vault.get(integration_id, field)? {
                Some(secret) => {
                    fields.insert(field, secret);
                }
                None => return Ok(CredentialLookup::Missing { field }),
            }
        }
        Ok(CredentialLookup::Found(Self { fields }))
    }

    /// Expose one resolved field for the duration of a request.
    pub fn expose(&self, field: &str) -> Result<&str, AdapterError> {
        self.fields
            .get(field)
            .map(|s| s.expose_secret())
            .ok_or_else(|| AdapterError::Config(format!("credential field `{field}` not resolved")))
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(&'static str, &str)]) -> Self {
        Self {
            fields: pairs
                .iter()
                .map(|(k, v)| (*k, SecretString::from(v.to_string())))
                .collect(),
        }
    }
}

// ── Adapter variants ──────────────────────────────────────────────

/// The closed set of adapters, one per integration kind.
#[derive(Debug, Clone)]
pub enum Adapter {
    IssueTracker(IssueTrackerAdapter),
    Wiki(WikiAdapter),
    SourceHost(SourceHostAdapter),
    ChatNotifier(ChatNotifierAdapter),
    NoteDatabase(NoteDatabaseAdapter),
}

impl Adapter {
    pub fn from_settings(settings: &IntegrationSettings, client: reqwest::Client) -> Self {
        match settings.clone() {
            IntegrationSettings::IssueTracker {
                base_url,
                project_key,
            } => Self::IssueTracker(IssueTrackerAdapter::new(client, base_url, project_key)),
            IntegrationSettings::Wiki {
                base_url,
                space_key,
                parent_page_id,
                title_prefix,
            } => Self::Wiki(WikiAdapter::new(
                client,
                base_url,
                space_key,
                parent_page_id,
                title_prefix,
            )),
            IntegrationSettings::SourceHost {
                repository,
                api_url,
            } => Self::SourceHost(SourceHostAdapter::new(client, api_url, repository)),
            IntegrationSettings::ChatNotifier { channel, api_url } => {
                Self::ChatNotifier(ChatNotifierAdapter::new(client, api_url, channel))
            }
            IntegrationSettings::NoteDatabase {
                database_id,
                title_property,
                api_url,
            } => Self::NoteDatabase(NoteDatabaseAdapter::new(
                client,
                api_url,
                database_id,
                title_property,
            )),
        }
    }

    pub fn kind(&self) -> IntegrationKind {
        match self {
            Self::IssueTracker(_) => IntegrationKind::IssueTracker,
            Self::Wiki(_) => IntegrationKind::Wiki,
            Self::SourceHost(_) => IntegrationKind::SourceHost,
            Self::ChatNotifier(_) => IntegrationKind::ChatNotifier,
            Self::NoteDatabase(_) => IntegrationKind::NoteDatabase,
        }
    }

    /// One attempt against the remote system. No retries.
    pub async fn send(
        &self,
        update: &SessionUpdate,
        credentials: &Credentials,
    ) -> Result<Published, AdapterError> {
        match self {
            Self::IssueTracker(a) => a.send(update, credentials).await,
            Self::Wiki(a) => a.send(update, credentials).await,
            Self::SourceHost(a) => a.send(update, credentials).await,
            Self::ChatNotifier(a) => a.send(update, credentials).await,
            Self::NoteDatabase(a) => a.send(update, credentials).await,
        }
    }
}

/// A configured integration bound to its adapter.
#[derive(Debug, Clone)]
pub struct IntegrationAdapter {
    id: String,
    adapter: Adapter,
}

impl IntegrationAdapter {
    pub fn new(id: impl Into<String>, adapter: Adapter) -> Self {
        Self {
            id: id.into(),
            adapter,
        }
    }

    pub fn from_config(id: &str, config: &IntegrationConfig, client: reqwest::Client) -> Self {
        Self::new(id, Adapter::from_settings(&config.settings, client))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> IntegrationKind {
        self.adapter.kind()
    }

    /// Publish a session update, mapping every result to an [`Outcome`].
    ///
    /// Credentials live only inside this call; a missing field yields
    /// `Skipped`, an unreachable vault `Failed(Vault)`.
    pub async fn publish(
        &self,
        update: &SessionUpdate,
        vault: Arc<dyn CredentialVault>,
    ) -> Outcome {
        let id = self.id.clone();
        let kind = self.kind();
        let lookup =
            tokio::task::spawn_blocking(move || Credentials::resolve(vault.as_ref(), &id, kind))
                .await;

        let credentials = match lookup {
            Ok(Ok(CredentialLookup::Found(c))) => c,
            Ok(Ok(CredentialLookup::Missing { field })) => {
                tracing::debug!(integration = %self.id, field = field, "Credential field not configured");
                return Outcome::skipped("credentials not configured");
            }
            Ok(Err(e)) => return Outcome::failed(FailureKind::Vault, e.to_string()),
            Err(e) => {
                return Outcome::failed(FailureKind::Internal, format!("credential lookup: {e}"))
            }
        };

        match self.adapter.send(update, &credentials).await {
            Ok(Published::Created(reference)) => Outcome::Succeeded {
                external_reference: reference,
            },
            Ok(Published::NothingToDo(reason)) => Outcome::skipped(reason),
            Err(e) => e.into(),
        }
    }
}

/// Build an adapter for every enabled integration, in ID order.
pub fn from_config(
    config: &sessync_core::SessyncConfig,
    client: &reqwest::Client,
) -> Vec<IntegrationAdapter> {
    config
        .enabled_integrations()
        .map(|(id, c)| IntegrationAdapter::from_config(id, c, client.clone()))
        .collect()
}
