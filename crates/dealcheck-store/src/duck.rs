//! DuckDB score history.
//!
//! One `score_history` table, appended to inside a transaction per entry.
//! Rows come back as Arrow record batches in the shape of
//! [`dealcheck_core::history_schema`] and are decoded from the `record` JSON
//! column.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use dealcheck_core::{HistoryEntry, entries_from_batches};
use duckdb::{Connection, params};
use tracing::{debug, info};

use crate::{HistoryStore, StoreError};

const HISTORY_COLUMNS: &str = "seq, recorded_at, fingerprint, brand, model, \
     rule_score, ai_score, final_score, classification, record";

/// DuckDB-backed history.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and
/// [`open_persistent`](Self::open_persistent) for a history that survives
/// process restarts.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "using DuckDB score history");
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE SEQUENCE IF NOT EXISTS score_history_seq;
             CREATE TABLE IF NOT EXISTS score_history (
                seq            BIGINT  PRIMARY KEY DEFAULT nextval('score_history_seq'),
                recorded_at    VARCHAR NOT NULL,
                fingerprint    VARCHAR,
                brand          VARCHAR NOT NULL,
                model          VARCHAR NOT NULL,
                rule_score     INTEGER NOT NULL,
                ai_score       INTEGER NOT NULL,
                final_score    INTEGER NOT NULL,
                classification VARCHAR NOT NULL,
                record         VARCHAR NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    fn select(&self, where_clause: &str, args: &[&str]) -> Result<Vec<HistoryEntry>, StoreError> {
        let sql = format!("SELECT {HISTORY_COLUMNS} FROM score_history {where_clause} ORDER BY seq");
        let mut stmt = self.conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt
            .query_arrow(duckdb::params_from_iter(args.iter()))?
            .collect();
        let entries = entries_from_batches(&batches)?;
        debug!(count = entries.len(), filter = where_clause, "queried score history");
        Ok(entries)
    }

    /// Access the underlying DuckDB connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl HistoryStore for DuckStore {
    fn append(&mut self, entry: HistoryEntry) -> Result<(), StoreError> {
        let record = serde_json::to_string(&entry.record).map_err(StoreError::Serialize)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO score_history (
                recorded_at, fingerprint, brand, model,
                rule_score, ai_score, final_score, classification, record
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.recorded_at.to_rfc3339(),
                entry.fingerprint,
                entry.brand(),
                entry.model(),
                entry.record.rule_score as i32,
                entry.record.ai_score as i32,
                entry.record.final_score as i32,
                entry.record.classification.as_str(),
                record,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        self.select("", &[])
    }

    fn query_by_brand_model(
        &self,
        brand: &str,
        model_substring: &str,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        self.select(
            "WHERE brand = ? AND contains(model, ?)",
            &[brand, model_substring],
        )
    }

    fn query_by_fingerprint(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        self.select("WHERE fingerprint = ?", &[key])
    }

    fn len(&self) -> Result<usize, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT count(*)::BIGINT FROM score_history", [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }
}
