//! Storage layer: the append-only score history behind one trait, with a
//! JSON-lines file backend, an in-memory backend, and DuckDB (feature-gated).

mod error;
mod history;
mod jsonl;
mod lock;
mod memory;

pub use error::StoreError;
pub use history::{HistoryStore, average};
pub use jsonl::JsonlStore;
pub use lock::{HistoryGuard, HistoryLock};
pub use memory::MemoryStore;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
