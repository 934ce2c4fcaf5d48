//! JSON-lines history file.
//!
//! One [`HistoryEntry`] per line. Appends open the file in append mode and
//! write the whole line with a single `write_all`, so an append never
//! rewrites earlier entries. Reads parse the file top to bottom; line order
//! is insertion order. Processes sharing a file coordinate through an
//! advisory lock on `<file>.lock`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use dealcheck_core::HistoryEntry;
use tracing::{debug, info};

use crate::{HistoryLock, HistoryStore, StoreError};

pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    /// Use (or later create) the history file at `path`.
    ///
    /// The file is not touched until the first append; a missing file reads
    /// as an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(path = %path.display(), "using JSON-lines score history");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file the cross-process lock is taken on.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn read_entries(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: HistoryEntry =
                serde_json::from_str(line).map_err(|source| StoreError::Corrupt {
                    path: self.path.clone(),
                    line: idx + 1,
                    source,
                })?;
            entries.push(entry);
        }
        debug!(path = %self.path.display(), count = entries.len(), "read score history");
        Ok(entries)
    }
}

impl HistoryStore for JsonlStore {
    fn append(&mut self, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(&entry).map_err(StoreError::Serialize)?;
        line.push('\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        debug!(
            path = %self.path.display(),
            brand = %entry.brand(),
            model = %entry.model(),
            final_score = entry.final_score(),
            "appended history entry"
        );
        Ok(())
    }

    fn all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        self.read_entries()
    }

    fn exclusive(&self) -> HistoryLock {
        HistoryLock::on_file(self.lock_path())
    }
}
