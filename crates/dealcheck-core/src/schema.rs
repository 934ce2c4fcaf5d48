//! Arrow schema for the score history table.
//!
//! The scalar columns (`brand`, `model`, scores) exist for SQL filtering and
//! tabular display; the `record` column carries the full [`ScoreRecord`] as
//! JSON and is the source of truth when decoding.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Int32Array, Int64Array, LargeStringArray, StringArray, StringViewArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::record::{HistoryEntry, ScoreRecord};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("column '{column}' has unexpected type {data_type}")]
    WrongType {
        column: &'static str,
        data_type: DataType,
    },

    #[error("null '{column}' at row {row}")]
    Null { column: &'static str, row: usize },

    #[error("bad timestamp at row {row}: {source}")]
    Timestamp {
        row: usize,
        source: chrono::ParseError,
    },

    #[error("bad record JSON at row {row}: {source}")]
    Record {
        row: usize,
        source: serde_json::Error,
    },

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

/// Schema for the append-only `score_history` table.
pub fn history_schema() -> Schema {
    Schema::new(vec![
        Field::new("seq", DataType::Int64, false),
        Field::new("recorded_at", DataType::Utf8, false),
        Field::new("fingerprint", DataType::Utf8, true),
        Field::new("brand", DataType::Utf8, false),
        Field::new("model", DataType::Utf8, false),
        Field::new("rule_score", DataType::Int32, false),
        Field::new("ai_score", DataType::Int32, false),
        Field::new("final_score", DataType::Int32, false),
        Field::new("classification", DataType::Utf8, false),
        Field::new("record", DataType::Utf8, false),
    ])
}

/// Encode entries as a single batch; `seq` is the position in `entries`.
pub fn entries_to_batch(entries: &[HistoryEntry]) -> Result<RecordBatch, SchemaError> {
    let records = entries
        .iter()
        .enumerate()
        .map(|(row, e)| {
            serde_json::to_string(&e.record).map_err(|source| SchemaError::Record { row, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(0..entries.len() as i64)),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|e| e.recorded_at.to_rfc3339()),
        )),
        Arc::new(StringArray::from(
            entries
                .iter()
                .map(|e| e.fingerprint.clone())
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.brand()))),
        Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.model()))),
        Arc::new(Int32Array::from_iter_values(
            entries.iter().map(|e| e.record.rule_score as i32),
        )),
        Arc::new(Int32Array::from_iter_values(
            entries.iter().map(|e| e.record.ai_score as i32),
        )),
        Arc::new(Int32Array::from_iter_values(
            entries.iter().map(|e| e.record.final_score as i32),
        )),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|e| e.record.classification.as_str()),
        )),
        Arc::new(StringArray::from(records)),
    ];

    let schema: SchemaRef = Arc::new(history_schema());
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Decode batches (in row order) back into history entries.
///
/// Only `recorded_at`, `fingerprint` and `record` are read; the scalar
/// columns are derived data.
pub fn entries_from_batches(batches: &[RecordBatch]) -> Result<Vec<HistoryEntry>, SchemaError> {
    let mut entries = Vec::new();
    let mut offset = 0;

    for batch in batches {
        let recorded_at = column(batch, "recorded_at")?;
        let fingerprint = column(batch, "fingerprint")?;
        let record = column(batch, "record")?;

        for row in 0..batch.num_rows() {
            let global = offset + row;

            let ts = get_string(recorded_at.as_ref(), row, "recorded_at")?.ok_or(
                SchemaError::Null {
                    column: "recorded_at",
                    row: global,
                },
            )?;
            let recorded_at = DateTime::parse_from_rfc3339(&ts)
                .map_err(|source| SchemaError::Timestamp {
                    row: global,
                    source,
                })?
                .with_timezone(&Utc);

            let json = get_string(record.as_ref(), row, "record")?.ok_or(SchemaError::Null {
                column: "record",
                row: global,
            })?;
            let record: ScoreRecord = serde_json::from_str(&json)
                .map_err(|source| SchemaError::Record { row: global, source })?;

            entries.push(HistoryEntry {
                recorded_at,
                fingerprint: get_string(fingerprint.as_ref(), row, "fingerprint")?,
                record,
            });
        }
        offset += batch.num_rows();
    }

    Ok(entries)
}

fn column(batch: &RecordBatch, name: &'static str) -> Result<ArrayRef, SchemaError> {
    batch
        .column_by_name(name)
        .cloned()
        .ok_or(SchemaError::MissingColumn(name))
}

/// Extract a string value (handles Utf8, LargeUtf8 and Utf8View).
fn get_string(
    col: &dyn Array,
    row: usize,
    name: &'static str,
) -> Result<Option<String>, SchemaError> {
    if col.is_null(row) {
        return Ok(None);
    }
    let any = col.as_any();
    if let Some(arr) = any.downcast_ref::<StringArray>() {
        return Ok(Some(arr.value(row).to_string()));
    }
    if let Some(arr) = any.downcast_ref::<LargeStringArray>() {
        return Ok(Some(arr.value(row).to_string()));
    }
    if let Some(arr) = any.downcast_ref::<StringViewArray>() {
        return Ok(Some(arr.value(row).to_string()));
    }
    Err(SchemaError::WrongType {
        column: name,
        data_type: col.data_type().clone(),
    })
}
