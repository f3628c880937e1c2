//! OS keystore backend.
//!
//! Each secret is one keystore entry with service [`PRODUCT`] and account
//! `<integration_id>/<field>`. Keystores cannot enumerate their entries, so
//! the names of stored fields (never values) are tracked in a small JSON
//! index beside the rest of the vault state. Listing checks each indexed
//! name against the keystore, so entries removed behind our back (or never
//! persisted) are not reported as configured.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use keyring::Entry;
use secrecy::{ExposeSecret, SecretString};

use sessync_core::IntegrationKind;

use crate::{
    check_name, fsutil, CredentialListing, CredentialVault, FieldSelector, Result, VaultBackend,
    VaultError, PRODUCT,
};

const BACKEND: VaultBackend = VaultBackend::Keystore;
const PROBE_ACCOUNT: &str = "__sessync_probe__";

type NameIndex = BTreeMap<String, BTreeSet<String>>;

fn unavailable(e: keyring::Error) -> VaultError {
    VaultError::Unavailable {
        backend: BACKEND,
        reason: e.to_string(),
    }
}

/// Vault backed by the platform credential store.
pub struct KeystoreVault {
    service: String,
    index_path: PathBuf,
}

impl KeystoreVault {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            service: PRODUCT.to_string(),
            index_path: index_path.into(),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Check that a keystore backend answers at all.
    ///
    /// Looks up an account that is never written: "no entry" proves the
    /// store is reachable, anything else means it is not.
    pub fn probe(&self) -> Result<()> {
        let entry = Entry::new(&self.service, PROBE_ACCOUNT).map_err(unavailable)?;
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }

    fn entry(&self, integration_id: &str, field: &str) -> Result<Entry> {
        Entry::new(&self.service, &format!("{integration_id}/{field}")).map_err(unavailable)
    }

    fn delete_entry(&self, integration_id: &str, field: &str) -> Result<()> {
        match self.entry(integration_id, field)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }

    fn update_index(&self, f: impl FnOnce(&mut NameIndex)) -> Result<()> {
        fsutil::with_lock(BACKEND, &self.index_path, || {
            let mut index: NameIndex = fsutil::read_json(BACKEND, &self.index_path)?;
            f(&mut index);
            fsutil::write_json_atomic(BACKEND, &self.index_path, &index)
        })
    }
}

impl CredentialVault for KeystoreVault {
    fn backend(&self) -> VaultBackend {
        BACKEND
    }

    fn set(&self, integration_id: &str, field: &str, secret: SecretString) -> Result<()> {
        check_name(integration_id)?;
        check_name(field)?;

        self.entry(integration_id, field)?
            .set_password(secret.expose_secret())
            .map_err(unavailable)?;

        self.update_index(|index| {
            index
                .entry(integration_id.to_string())
                .or_default()
                .insert(field.to_string());
        })?;

        tracing::debug!(integration = %integration_id, field = %field, "Credential stored in OS keystore");
        Ok(())
    }

    fn get(&self, integration_id: &str, field: &str) -> Result<Option<SecretString>> {
        match self.entry(integration_id, field)?.get_password() {
            Ok(value) => Ok(Some(SecretString::from(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(unavailable(e)),
        }
    }

    fn delete(&self, integration_id: &str, fields: FieldSelector<'_>) -> Result<()> {
        match fields {
            FieldSelector::One(field) => {
                self.delete_entry(integration_id, field)?;
                self.update_index(|index| {
                    if let Some(stored) = index.get_mut(integration_id) {
                        stored.remove(field);
                        if stored.is_empty() {
                            index.remove(integration_id);
                        }
                    }
                })
            }
            FieldSelector::All => {
                // The index may be stale; also try every catalog field name.
                let index: NameIndex = fsutil::read_json(BACKEND, &self.index_path)?;
                let mut fields = index.get(integration_id).cloned().unwrap_or_default();
                fields.extend(
                    IntegrationKind::ALL
                        .iter()
                        .flat_map(|k| k.required_fields())
                        .map(|f| f.to_string()),
                );
                for field in &fields {
                    self.delete_entry(integration_id, field)?;
                }
                self.update_index(|index| {
                    index.remove(integration_id);
                })
            }
        }
    }

    fn list(&self) -> Result<Vec<CredentialListing>> {
        let index: NameIndex = fsutil::read_json(BACKEND, &self.index_path)?;
        present_listings(index, |integration_id, field| {
            match self.entry(integration_id, field)?.get_password() {
                Ok(_) => Ok(true),
                Err(keyring::Error::NoEntry) => Ok(false),
                Err(e) => Err(unavailable(e)),
            }
        })
    }
}

/// Listings for the indexed names that `present` confirms are still stored.
fn present_listings(
    index: NameIndex,
    mut present: impl FnMut(&str, &str) -> Result<bool>,
) -> Result<Vec<CredentialListing>> {
    let mut listings = Vec::with_capacity(index.len());
    for (integration_id, names) in index {
        let mut fields = Vec::with_capacity(names.len());
        for field in names {
            if present(&integration_id, &field)? {
                fields.push(field);
            } else {
                tracing::warn!(
                    integration = %integration_id,
                    field = %field,
                    "Indexed credential is missing from the OS keystore"
                );
            }
        }
        if !fields.is_empty() {
            listings.push(CredentialListing {
                integration_id,
                fields,
            });
        }
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The platform store is not available in CI; these cover the name index.

    fn index(entries: &[(&str, &[&str])]) -> NameIndex {
        entries
            .iter()
            .map(|(id, fields)| {
                (
                    id.to_string(),
                    fields.iter().map(|f| f.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn index_round_trips_names() {
        let dir = tempfile::tempdir().unwrap();
        let vault = KeystoreVault::new(dir.path().join("credential-index.json"));
        vault
            .update_index(|index| {
                index
                    .entry("jira".to_string())
                    .or_default()
                    .extend(["username".to_string(), "api_token".to_string()]);
            })
            .unwrap();

        let stored: NameIndex = fsutil::read_json(BACKEND, vault.index_path()).unwrap();
        assert_eq!(stored, index(&[("jira", &["api_token", "username"])]));
    }

    #[test]
    fn listing_drops_names_the_keystore_lost() {
        let names = index(&[
            ("jira", &["api_token", "username"]),
            ("slack", &["token"]),
        ]);
        // Only the jira username survived, as after the store was wiped.
        let listing =
            present_listings(names, |id, field| Ok(id == "jira" && field == "username")).unwrap();

        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].integration_id, "jira");
        assert_eq!(listing[0].fields, vec!["username"]);
    }

    #[test]
    fn listing_surfaces_keystore_errors() {
        let names = index(&[("jira", &["username"])]);
        let err = present_listings(names, |_, _| {
            Err(VaultError::Unavailable {
                backend: BACKEND,
                reason: "locked".to_string(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, VaultError::Unavailable { .. }));
    }

    #[test]
    fn empty_index_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let vault = KeystoreVault::new(dir.path().join("missing.json"));
        assert!(vault.list().unwrap().is_empty());
        assert_eq!(vault.backend(), VaultBackend::Keystore);
    }
}
