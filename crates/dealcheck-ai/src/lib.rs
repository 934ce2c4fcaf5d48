//! AI-facing layer: recovers structured evaluations from free-form model
//! text, scores listings with a fixed rule formula, and blends the two.

mod error;
pub mod blend;
pub mod extractor;
pub mod generator;
pub mod repair;
pub mod response;
pub mod rules;

pub use blend::{BlendedScore, blend};
pub use error::{ExtractionError, GenerationError, ScoringError};
pub use extractor::{ExtractionStage, Extractor, extract_object};
pub use generator::{GenerationRequest, StaticResponse, TextGenerator};
pub use repair::repair_json;
pub use response::ExtractedEvaluation;
pub use rules::{FALLBACK_SCORE, RuleBreakdown, RuleInputs};

pub use dealcheck_core::ExtractionMode;
