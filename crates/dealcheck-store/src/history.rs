use dealcheck_core::HistoryEntry;

use crate::{HistoryLock, StoreError};

/// Append-only archive of score records.
///
/// Implementations must:
/// - never reject, deduplicate, reorder or mutate on [`append`](Self::append);
/// - return entries in insertion order from every query;
/// - return an empty `Vec` for an empty or missing history, and an `Err`
///   only when the medium itself cannot be read.
///
/// Backends with an index override the default query methods; the defaults
/// filter a full scan.
pub trait HistoryStore: Send {
    /// Add one entry at the end of the history.
    fn append(&mut self, entry: HistoryEntry) -> Result<(), StoreError>;

    /// Every entry, in insertion order.
    fn all(&self) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Entries with exactly `brand` whose model contains `model_substring`.
    fn query_by_brand_model(
        &self,
        brand: &str,
        model_substring: &str,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.matches_brand_model(brand, model_substring))
            .collect())
    }

    /// Entries filed under exactly this ad fingerprint.
    fn query_by_fingerprint(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.matches_fingerprint(key))
            .collect())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.all()?.len())
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Lock guarding a read-then-append sequence against other processes
    /// sharing the same medium. Stores that are private to one process, or
    /// whose engine already serialises writers, need none.
    fn exclusive(&self) -> HistoryLock {
        HistoryLock::none()
    }

    /// Final scores for a brand/model group, oldest first.
    fn trend(&self, brand: &str, model_substring: &str) -> Result<Vec<u8>, StoreError> {
        Ok(self
            .query_by_brand_model(brand, model_substring)?
            .iter()
            .map(HistoryEntry::final_score)
            .collect())
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for Box<S> {
    fn append(&mut self, entry: HistoryEntry) -> Result<(), StoreError> {
        (**self).append(entry)
    }

    fn all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).all()
    }

    fn query_by_brand_model(
        &self,
        brand: &str,
        model_substring: &str,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).query_by_brand_model(brand, model_substring)
    }

    fn query_by_fingerprint(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).query_by_fingerprint(key)
    }

    fn len(&self) -> Result<usize, StoreError> {
        (**self).len()
    }

    fn exclusive(&self) -> HistoryLock {
        (**self).exclusive()
    }

    fn trend(&self, brand: &str, model_substring: &str) -> Result<Vec<u8>, StoreError> {
        (**self).trend(brand, model_substring)
    }
}

/// Mean final score of `entries`, or `None` when there are none.
pub fn average(entries: &[HistoryEntry]) -> Option<f64> {
    if entries.is_empty() {
        return None;
    }
    let sum: f64 = entries.iter().map(|e| e.final_score() as f64).sum();
    Some(sum / entries.len() as f64)
}
