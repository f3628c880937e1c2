//! sessync-core: Shared types, configuration, and error handling for sessync.
//!
//! This crate provides the foundational pieces used across all sessync components:
//! - Session summaries, reference sets, and per-integration outcomes
//! - The pure Reference Extractor and summary categorization
//! - Workflow validation of session summaries
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod extract;
pub mod types;
pub mod workflow;

pub use config::SessyncConfig;
pub use error::{Result, SessyncError};
pub use extract::{extract, ExtractionPatterns};
pub use types::{
    AdapterReport, AggregateStatus, FailureKind, IntegrationKind, Outcome, ReferenceSet,
    SessionSummary,
};
