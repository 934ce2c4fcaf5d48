use dealcheck_core::HistoryEntry;

use crate::{HistoryStore, StoreError};

/// Ephemeral history held in a `Vec`. Lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Vec<HistoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing entries, kept in the given order.
    pub fn with_entries(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }
}

impl HistoryStore for MemoryStore {
    fn append(&mut self, entry: HistoryEntry) -> Result<(), StoreError> {
        self.entries.push(entry);
        Ok(())
    }

    fn all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.entries.clone())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.len())
    }
}
