//! sessync: keep AI working context and external trackers in step with each
//! work session.
//!
//! An `update` takes a free-text session summary, extracts work-item and file
//! references, regenerates the Quick and Full context artifacts, publishes
//! the update to every enabled integration with per-integration failure
//! isolation, and appends a session log entry recording every outcome.

pub mod adapters;
pub mod artifacts;
pub mod error;
pub mod orchestrator;
pub mod status;

pub use artifacts::{ArtifactKind, ArtifactManager, ContextArtifact, ContextArtifacts};
pub use error::{Result, SyncError};
pub use orchestrator::{SessionSync, Stage, SyncReport};
pub use status::{CredentialState, StatusReport};
