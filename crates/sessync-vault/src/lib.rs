//! sessync-vault: Credential storage for sessync integrations.
//!
//! Secrets are stored under a namespaced key `(product, integration_id, field)`
//! and never in project configuration. Two backends implement
//! [`CredentialVault`]:
//! - [`KeystoreVault`] — the platform keystore (macOS Keychain, Windows
//!   Credential Manager, Linux Secret Service). Entries persist until
//!   removed; when no keystore answers, [`open_vault`] falls back.
//! - [`EncryptedFileVault`] — a local file encrypted with a machine-derived
//!   key. Weaker: anyone with access to the machine can derive the key.
//!
//! The backend is chosen once at process start by [`open_vault`] and passed
//! explicitly to every caller. Vault operations never retry.

pub mod crypto;
pub mod file;
mod fsutil;
pub mod keystore;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;

use sessync_core::config::{VaultBackendChoice, VaultConfig};

pub use file::EncryptedFileVault;
pub use keystore::KeystoreVault;

/// Product namespace for every stored secret.
pub const PRODUCT: &str = "sessync";

/// Errors from credential storage.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Credential vault unavailable ({backend}): {reason}")]
    Unavailable { backend: VaultBackend, reason: String },

    #[error("Credential store is corrupt: {0}")]
    Corrupt(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Invalid credential name `{0}`: must be non-empty and contain no '/'")]
    InvalidName(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// Which backend a vault writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultBackend {
    Keystore,
    EncryptedFile,
}

impl VaultBackend {
    /// The encrypted file is weaker than the OS keystore.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::EncryptedFile)
    }
}

impl fmt::Display for VaultBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keystore => f.write_str("os-keystore"),
            Self::EncryptedFile => f.write_str("encrypted-file"),
        }
    }
}

/// Which fields of an integration to delete.
#[derive(Debug, Clone, Copy)]
pub enum FieldSelector<'a> {
    One(&'a str),
    All,
}

/// Names of stored credentials for one integration. Never carries values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialListing {
    pub integration_id: String,
    pub fields: Vec<String>,
}

/// Secret storage keyed by `(integration_id, field)`.
pub trait CredentialVault: Send + Sync {
    fn backend(&self) -> VaultBackend;

    /// Store a secret, replacing any previous value.
    fn set(&self, integration_id: &str, field: &str, secret: SecretString) -> Result<()>;

    /// Fetch a secret. A missing secret is `Ok(None)`, not an error.
    fn get(&self, integration_id: &str, field: &str) -> Result<Option<SecretString>>;

    /// Delete one field or every field of an integration. Deleting something
    /// absent succeeds.
    fn delete(&self, integration_id: &str, fields: FieldSelector<'_>) -> Result<()>;

    /// Stored credential names, sorted by integration ID.
    fn list(&self) -> Result<Vec<CredentialListing>>;
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(VaultError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Default directory for vault state (keystore name index, fallback file).
pub fn default_state_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", PRODUCT, PRODUCT).map(|d| d.data_local_dir().to_path_buf())
}

/// Open the configured backend.
///
/// With `auto`, the OS keystore is probed and the encrypted file is used when
/// the keystore cannot be reached and `allow_degraded` is set. The caller can
/// tell a degraded vault apart through [`VaultBackend::is_degraded`].
pub fn open_vault(config: &VaultConfig) -> Result<Arc<dyn CredentialVault>> {
    let state_dir = default_state_dir().ok_or_else(|| VaultError::Unavailable {
        backend: VaultBackend::EncryptedFile,
        reason: "no home directory to keep vault state in".to_string(),
    })?;
    let file_path = config
        .file_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| state_dir.join("credentials.enc.json"));

    match config.backend {
        VaultBackendChoice::File => {
            tracing::warn!(
                path = %file_path.display(),
                "Using encrypted-file credential store (degraded security)"
            );
            Ok(Arc::new(EncryptedFileVault::open(file_path)?))
        }
        VaultBackendChoice::Keystore => {
            let vault = KeystoreVault::new(state_dir.join("credential-index.json"));
            vault.probe()?;
            Ok(Arc::new(vault))
        }
        VaultBackendChoice::Auto => {
            let vault = KeystoreVault::new(state_dir.join("credential-index.json"));
            match vault.probe() {
                Ok(()) => Ok(Arc::new(vault)),
                Err(e) if config.allow_degraded => {
                    tracing::warn!(
                        error = %e,
                        path = %file_path.display(),
                        "OS keystore unreachable, falling back to encrypted-file store (degraded security)"
                    );
                    Ok(Arc::new(EncryptedFileVault::open(file_path)?))
                }
                Err(e) => Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_validated() {
        assert!(check_name("jira").is_ok());
        assert!(matches!(check_name(""), Err(VaultError::InvalidName(_))));
        assert!(matches!(check_name("a/b"), Err(VaultError::InvalidName(_))));
    }

    #[test]
    fn only_file_backend_is_degraded() {
        assert!(VaultBackend::EncryptedFile.is_degraded());
        assert!(!VaultBackend::Keystore.is_degraded());
    }
}
