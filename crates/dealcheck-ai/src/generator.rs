//! Seam to the external text-generation service.
//!
//! No provider ships here. Callers plug one in by implementing
//! [`TextGenerator`], or by passing a closure.

use std::path::PathBuf;

use dealcheck_core::ExtractionMode;

use crate::error::GenerationError;

/// What the generator is asked to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub ad_text: String,
    pub image_paths: Vec<PathBuf>,
    /// Which response template to ask for.
    pub mode: ExtractionMode,
    /// Advisory band from earlier evaluations of the same ad, if volatile.
    pub target_range: Option<(u8, u8)>,
    /// The earlier scores behind `target_range`.
    pub historical_scores: Vec<u8>,
}

impl GenerationRequest {
    pub fn new(ad_text: impl Into<String>, mode: ExtractionMode) -> Self {
        Self {
            ad_text: ad_text.into(),
            image_paths: Vec::new(),
            mode,
            target_range: None,
            historical_scores: Vec::new(),
        }
    }

    pub fn with_images(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.image_paths.extend(paths);
        self
    }
}

pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

impl<F> TextGenerator for F
where
    F: Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync,
{
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self(request)
    }
}

/// Replays one canned response. Used for saved model output.
#[derive(Debug, Clone)]
pub struct StaticResponse(pub String);

impl TextGenerator for StaticResponse {
    fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Ok(self.0.clone())
    }
}
