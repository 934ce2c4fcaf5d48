//! Fixed 70/30 blend of the rule score and the model's score.

use dealcheck_core::clamp_score;
use serde::Serialize;

pub const RULE_WEIGHT: f64 = 0.7;
pub const AI_WEIGHT: f64 = 0.3;

/// `round(rule * 0.7 + ai * 0.3)`, half to even.
pub fn blend(rule_score: u8, ai_score: u8) -> u8 {
    let weighted = f64::from(rule_score) * RULE_WEIGHT + f64::from(ai_score) * AI_WEIGHT;
    clamp_score(weighted.round_ties_even() as i64)
}

/// Blender output, before any historical calibration.
///
/// `ai_confidence` rides along for the record; it does not change the
/// weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlendedScore {
    pub rule_score: u8,
    pub ai_score: u8,
    pub ai_confidence: f64,
    pub working_score: u8,
}

impl BlendedScore {
    pub fn new(rule_score: u8, ai_score: u8, ai_confidence: f64) -> Self {
        Self {
            rule_score,
            ai_score,
            ai_confidence,
            working_score: blend(rule_score, ai_score),
        }
    }
}
