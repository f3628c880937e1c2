//! Authenticated encryption for the fallback credential file.
//!
//! Values are sealed with ChaCha20-Poly1305 under a machine-derived key.
//! The credential's `integration_id/field` name is bound as associated data,
//! so a ciphertext copied to another slot fails to open.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use secrecy::SecretString;

use crate::{Result, VaultError};

const NONCE_LEN: usize = 12;
const KEY_CONTEXT: &str = "sessync 2026-01 encrypted-file credential vault key v1";

/// Encrypt `plaintext`, returning base64 of nonce + ciphertext.
pub fn seal(plaintext: &str, key: &[u8; 32], aad: &str) -> Result<String> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    chacha20poly1305::aead::rand_core::RngCore::fill_bytes(&mut OsRng, &mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| VaultError::Crypto("encryption failed".to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(&combined))
}

/// Decrypt a value produced by [`seal`] with the same key and associated data.
pub fn open(encoded: &str, key: &[u8; 32], aad: &str) -> Result<SecretString> {
    let combined = STANDARD
        .decode(encoded)
        .map_err(|_| VaultError::Crypto("invalid encoding".to_string()))?;

    if combined.len() < NONCE_LEN {
        return Err(VaultError::Crypto("ciphertext too short".to_string()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(key.into());

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| {
            VaultError::Crypto(
                "decryption failed (wrong machine key or tampered value)".to_string(),
            )
        })?;

    String::from_utf8(plaintext)
        .map(SecretString::from)
        .map_err(|_| VaultError::Crypto("decrypted value is not UTF-8".to_string()))
}

/// Derive the fallback key from stable facts about this machine and user.
///
/// Anyone able to read these facts can rebuild the key; the file store is
/// therefore weaker than the OS keystore.
pub fn machine_key() -> [u8; 32] {
    blake3::derive_key(KEY_CONTEXT, machine_material().as_bytes())
}

fn machine_material() -> String {
    let machine_id = ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default();
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_default();

    format!("{machine_id}\n{host}\n{user}\n{home}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn seal_then_open() {
        let sealed = seal("xoxb-123", &KEY, "slack/token").unwrap();
        assert!(!sealed.contains("xoxb-123"));
        let opened = open(&sealed, &KEY, "slack/token").unwrap();
        assert_eq!(opened.expose_secret(), "xoxb-123");
    }

    #[test]
    fn nonces_differ_per_seal() {
        let a = seal("same", &KEY, "x/y").unwrap();
        let b = seal("same", &KEY, "x/y").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal("secret", &KEY, "x/y").unwrap();
        assert!(open(&sealed, &[8u8; 32], "x/y").is_err());
    }

    #[test]
    fn moved_ciphertext_fails() {
        let sealed = seal("secret", &KEY, "jira/api_token").unwrap();
        assert!(matches!(
            open(&sealed, &KEY, "github/token"),
            Err(VaultError::Crypto(_))
        ));
    }

    #[test]
    fn machine_key_is_stable() {
        assert_eq!(machine_key(), machine_key());
    }
}
