//! Locked, atomic JSON file helpers shared by the vault backends.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Result, VaultBackend, VaultError};

fn unavailable(backend: VaultBackend, path: &Path, e: impl std::fmt::Display) -> VaultError {
    VaultError::Unavailable {
        backend,
        reason: format!("{}: {e}", path.display()),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Run `f` while holding an exclusive advisory lock beside `path`.
pub(crate) fn with_lock<T>(
    backend: VaultBackend,
    path: &Path,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| unavailable(backend, parent, e))?;
    }
    let lock_file = lock_path(path);
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_file)
        .map_err(|e| unavailable(backend, &lock_file, e))?;
    FileExt::lock_exclusive(&lock).map_err(|e| unavailable(backend, &lock_file, e))?;

    let result = f();

    let _ = FileExt::unlock(&lock);
    result
}

/// Read a JSON document, or its default when the file does not exist yet.
pub(crate) fn read_json<T: DeserializeOwned + Default>(
    backend: VaultBackend,
    path: &Path,
) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| VaultError::Corrupt(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(unavailable(backend, path, e)),
    }
}

/// Replace a JSON document via temp file + rename, readable by the owner only.
pub(crate) fn write_json_atomic<T: Serialize>(
    backend: VaultBackend,
    path: &Path,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| VaultError::Corrupt(format!("serialize {}: {e}", path.display())))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let write = || -> std::io::Result<()> {
        let mut tmp = File::create(&tmp_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        tmp.write_all(&json)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, path)
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        unavailable(backend, path, e)
    })
}
