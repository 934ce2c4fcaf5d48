use dealcheck_ai::{ExtractionError, GenerationError};
use dealcheck_core::ConfigError;
use dealcheck_store::StoreError;
use thiserror::Error;

/// Reasons an evaluation (or a history lookup) could not produce a result.
///
/// A history failure *during* an evaluation is not an error: the evaluation
/// completes uncalibrated and reports it on
/// [`Evaluation::history_error`](crate::Evaluation::history_error).
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("history unavailable: {0}")]
    HistoryUnavailable(#[from] StoreError),
}
