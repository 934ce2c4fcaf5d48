//! Evaluation engine: historical calibration plus the pipeline that runs
//! extraction, rule scoring, blending and calibration against a history store.

mod error;
pub mod calibrator;
pub mod pipeline;

pub use calibrator::{CalibrationOutcome, Calibrator, ConsistencySignal};
pub use error::EvaluationError;
pub use pipeline::{Evaluation, Evaluator};
