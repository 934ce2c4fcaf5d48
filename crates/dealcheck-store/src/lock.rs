//! Cross-process exclusion for the history's read-correct-append sequence.
//!
//! The evaluator's `Mutex` only covers one process. File-backed stores hand
//! out a [`HistoryLock`] on a sidecar `.lock` file so that separate
//! `dealcheck` runs on the same history take turns.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::StoreError;

/// An advisory lock that may or may not be backed by a file.
#[derive(Default)]
pub struct HistoryLock {
    path: Option<PathBuf>,
    file: Option<RwLock<File>>,
}

/// Held for the duration of the exclusive section; released on drop.
pub struct HistoryGuard<'a> {
    _held: Option<RwLockWriteGuard<'a, File>>,
}

impl HistoryLock {
    /// No cross-process exclusion.
    pub fn none() -> Self {
        Self::default()
    }

    /// Exclusion through an advisory lock on `path`. Nothing is opened
    /// until [`acquire`](Self::acquire).
    pub fn on_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            file: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Block until no other holder of the same lock file is inside its
    /// section.
    pub fn acquire(&mut self) -> Result<HistoryGuard<'_>, StoreError> {
        let Some(path) = &self.path else {
            return Ok(HistoryGuard { _held: None });
        };
        if self.file.is_none() {
            self.file = Some(RwLock::new(open_lock_file(path)?));
        }
        let Some(lock) = self.file.as_mut() else {
            return Ok(HistoryGuard { _held: None });
        };
        let guard = lock.write().map_err(|source| StoreError::Lock {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "history lock acquired");
        Ok(HistoryGuard { _held: Some(guard) })
    }
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    let lock_error = |source: std::io::Error| StoreError::Lock {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(lock_error)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(lock_error)
}
