//! Encrypted-file credential store.
//!
//! Fallback for machines without a reachable OS keystore. Credential names
//! are stored in clear so `list` never has to decrypt; values are sealed
//! individually by [`crate::crypto`].
//!
//! ```text
//! {
//!   "version": 1,
//!   "entries": { "jira": { "api_token": "<base64 nonce+ciphertext>", ... } }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretBox, SecretString};
use serde::{Deserialize, Serialize};

use crate::{
    check_name, crypto, fsutil, CredentialListing, CredentialVault, FieldSelector, Result,
    VaultBackend,
};

const FORMAT_VERSION: u32 = 1;
const BACKEND: VaultBackend = VaultBackend::EncryptedFile;

#[derive(Debug, Serialize, Deserialize)]
struct VaultFile {
    version: u32,
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for VaultFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// File-backed vault sealed with a machine-derived key.
pub struct EncryptedFileVault {
    path: PathBuf,
    key: SecretBox<[u8; 32]>,
}

impl EncryptedFileVault {
    /// Open (or lazily create) the store at `path` using the machine key.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_key(path, crypto::machine_key()))
    }

    /// Open the store with an explicit key.
    pub fn with_key(path: impl Into<PathBuf>, key: [u8; 32]) -> Self {
        Self {
            path: path.into(),
            key: SecretBox::new(Box::new(key)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn aad(integration_id: &str, field: &str) -> String {
        format!("{integration_id}/{field}")
    }

    fn update(&self, f: impl FnOnce(&mut VaultFile) -> Result<()>) -> Result<()> {
        fsutil::with_lock(BACKEND, &self.path, || {
            let mut doc: VaultFile = fsutil::read_json(BACKEND, &self.path)?;
            f(&mut doc)?;
            fsutil::write_json_atomic(BACKEND, &self.path, &doc)
        })
    }
}

impl CredentialVault for EncryptedFileVault {
    fn backend(&self) -> VaultBackend {
        BACKEND
    }

    fn set(&self, integration_id: &str, field: &str, secret: SecretString) -> Result<()> {
        check_name(integration_id)?;
        check_name(field)?;

        let sealed = crypto::seal(
            secret.expose_secret(),
            self.key.expose_secret(),
            &Self::aad(integration_id, field),
        )?;

        self.update(|doc| {
            doc.entries
                .entry(integration_id.to_string())
                .or_default()
                .insert(field.to_string(), sealed);
            Ok(())
        })?;

        tracing::debug!(integration = %integration_id, field = %field, "Credential stored in encrypted file");
        Ok(())
    }

    fn get(&self, integration_id: &str, field: &str) -> Result<Option<SecretString>> {
        let doc: VaultFile = fsutil::read_json(BACKEND, &self.path)?;

        doc.entries
            .get(integration_id)
            .and_then(|fields| fields.get(field))
            .map(|sealed| {
                crypto::open(
                    sealed,
                    self.key.expose_secret(),
                    &Self::aad(integration_id, field),
                )
            })
            .transpose()
    }

    fn delete(&self, integration_id: &str, fields: FieldSelector<'_>) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        self.update(|doc| {
            match fields {
                FieldSelector::All => {
                    doc.entries.remove(integration_id);
                }
                FieldSelector::One(field) => {
                    if let Some(stored) = doc.entries.get_mut(integration_id) {
                        stored.remove(field);
                        if stored.is_empty() {
                            doc.entries.remove(integration_id);
                        }
                    }
                }
            }
            Ok(())
        })
    }

    fn list(&self) -> Result<Vec<CredentialListing>> {
        let doc: VaultFile = fsutil::read_json(BACKEND, &self.path)?;

        Ok(doc
            .entries
            .into_iter()
            .map(|(integration_id, fields)| CredentialListing {
                integration_id,
                fields: fields.into_keys().collect(),
            })
            .collect())
    }
}
