//! Engine configuration.
//!
//! Only the calibration policies are tunable. The blend ratio (70/30) and the
//! rule scorer's coefficients are fixed policy and deliberately absent here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::DEFAULT_FINGERPRINT_CHARS;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("correction threshold must be finite and non-negative, got {0}")]
    CorrectionThreshold(f64),

    #[error("fingerprint prefix must be at least one character")]
    FingerprintChars,

    #[error("consistency check needs at least one prior entry")]
    ConsistencyMinEntries,

    #[error("default AI confidence must be within [0, 1], got {0}")]
    DefaultConfidence(f64),
}

/// Which response schema the generative model was asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Flat listing-evaluation object.
    Compact,
    /// Nested `from_ad` / `from_internet` / `cross_analysis` object.
    #[default]
    Rich,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Rich => "rich",
        }
    }
}

impl std::str::FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "rich" => Ok(Self::Rich),
            other => Err(format!("unknown extraction mode '{other}' (expected compact or rich)")),
        }
    }
}

/// Thresholds for the two historical calibration policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Apply the model-average correction.
    pub model_average: bool,
    /// Minimum |working - average| that triggers a correction.
    pub correction_threshold: f64,
    /// Run the fingerprint consistency check.
    pub consistency: bool,
    /// Max-min spread above which repeated evaluations count as volatile.
    pub spread_threshold: u8,
    /// Prior evaluations of the same ad needed before spread is judged.
    pub min_repeat_entries: usize,
    /// Half-width of the advisory target range around the historical mean.
    pub target_half_width: u8,
    /// Normalised ad characters hashed into the fingerprint.
    pub fingerprint_chars: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            model_average: true,
            correction_threshold: 15.0,
            consistency: true,
            spread_threshold: 12,
            min_repeat_entries: 3,
            target_half_width: 5,
            fingerprint_chars: DEFAULT_FINGERPRINT_CHARS,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.correction_threshold.is_finite() || self.correction_threshold < 0.0 {
            return Err(ConfigError::CorrectionThreshold(self.correction_threshold));
        }
        if self.fingerprint_chars == 0 {
            return Err(ConfigError::FingerprintChars);
        }
        if self.min_repeat_entries == 0 {
            return Err(ConfigError::ConsistencyMinEntries);
        }
        Ok(())
    }
}

/// Top-level configuration for one evaluation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: ExtractionMode,
    /// Used when the model omits `ai_confidence`.
    pub default_ai_confidence: f64,
    pub calibration: CalibrationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::default(),
            default_ai_confidence: 0.8,
            calibration: CalibrationConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.default_ai_confidence) {
            return Err(ConfigError::DefaultConfidence(self.default_ai_confidence));
        }
        self.calibration.validate()
    }
}
