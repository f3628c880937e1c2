//! Invocation-fatal errors for the sessync orchestrator.
//!
//! Adapter and artifact failures during `update` never appear here: they are
//! recorded as outcomes and warnings on the session log entry instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Session log error: {0}")]
    Journal(#[from] sessync_journal::StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] sessync_core::SessyncError),

    #[error("Credential vault error: {0}")]
    Vault(#[from] sessync_vault::VaultError),

    #[error("Context artifacts could not be written: {0}")]
    Artifact(#[from] crate::artifacts::ArtifactError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Unknown integration `{0}`")]
    UnknownIntegration(String),

    #[error("Integration `{integration}` has no credential field `{field}` (expected one of: {expected})")]
    UnknownField {
        integration: String,
        field: String,
        expected: String,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
