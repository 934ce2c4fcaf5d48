use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing the history medium.
///
/// None of these mean "no entries": an empty history is always `Ok(vec![])`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt history entry at {path}:{line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("failed to serialise history entry: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("history schema error: {0}")]
    Schema(#[from] dealcheck_core::SchemaError),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),
}
