//! Invocation-level advisory lock for a project's session log.
//!
//! An `update` holds the writer lock from before artifact regeneration
//! until its entry is appended, so two updates against the same project
//! root run one after the other.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::store::StoreError;

const LOCK_FILE: &str = ".session-log.lock";

/// Exclusive lock on a journal directory, released on drop.
#[derive(Debug)]
pub struct WriterLock {
    file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Block until the lock for `dir` is held.
    pub fn acquire(dir: &Path) -> Result<Self, StoreError> {
        let (file, path) = open_lock_file(dir)?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| StoreError::Lock(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "Journal writer lock acquired");
        Ok(Self { file, path })
    }

    /// Take the lock only if no other writer holds it.
    pub fn try_acquire(dir: &Path) -> Result<Option<Self>, StoreError> {
        let (file, path) = open_lock_file(dir)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(StoreError::Lock(format!("{}: {e}", path.display()))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release journal lock");
        }
    }
}

fn open_lock_file(dir: &Path) -> Result<(File, PathBuf), StoreError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)?;
    Ok((file, path))
}
