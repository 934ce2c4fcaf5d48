use thiserror::Error;

/// Failures turning model text into an evaluation. Both abort the evaluation.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No extraction stage produced a JSON object.
    #[error("model output could not be parsed as a JSON object ({} chars)", raw.chars().count())]
    MalformedOutput { raw: String },

    /// Parsed, but a field needed for identity or blending is absent.
    #[error("model output is missing required field '{field}'")]
    MissingRequiredField { field: &'static str },
}

impl ExtractionError {
    /// The unparseable text, for diagnostics.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw } => Some(raw),
            Self::MissingRequiredField { .. } => None,
        }
    }
}

/// Arithmetic fault inside the rule scorer. Never escapes the scorer.
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("non-finite {term} term: {value}")]
    NonFinite { term: &'static str, value: f64 },
}

/// Failure of the external text-generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generation failed: {0}")]
    Failed(String),

    #[error("text generation timed out")]
    Timeout,
}
