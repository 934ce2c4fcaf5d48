//! Score records and the history entries they are filed under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::BrandModelKey;
use crate::listing::{CrossAnalysis, ListingFacts, MarketFacts, UserInfo, normalize_token};

/// Clamp an arbitrary integer score into `0..=100`.
pub fn clamp_score(score: i64) -> u8 {
    score.clamp(0, 100) as u8
}

/// The fixed label set a deal is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    ExcellentDeal,
    GoodDeal,
    FairDeal,
    Overpriced,
    Risky,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Self::ExcellentDeal,
        Self::GoodDeal,
        Self::FairDeal,
        Self::Overpriced,
        Self::Risky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExcellentDeal => "excellent_deal",
            Self::GoodDeal => "good_deal",
            Self::FairDeal => "fair_deal",
            Self::Overpriced => "overpriced",
            Self::Risky => "risky",
        }
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ExcellentDeal => "Excellent deal",
            Self::GoodDeal => "Good deal",
            Self::FairDeal => "Fair deal",
            Self::Overpriced => "Overpriced",
            Self::Risky => "Risky",
        }
    }

    /// Parse a model-provided label (English or Hebrew).
    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "excellent_deal" | "excellent" | "great_deal" | "עסקה_מעולה" => {
                Some(Self::ExcellentDeal)
            }
            "good_deal" | "good" | "עסקה_טובה" => Some(Self::GoodDeal),
            "fair_deal" | "fair" | "reasonable_deal" | "reasonable" | "עסקה_סבירה" => {
                Some(Self::FairDeal)
            }
            "overpriced" | "too_expensive" | "expensive" | "יקרה_מדי" => Some(Self::Overpriced),
            "risky" | "dangerous" | "מסוכנת" => Some(Self::Risky),
            _ => None,
        }
    }

    /// Fallback label derived from a final score when the model gave none.
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Self::ExcellentDeal,
            65..=79 => Self::GoodDeal,
            50..=64 => Self::FairDeal,
            35..=49 => Self::Overpriced,
            _ => Self::Risky,
        }
    }
}

/// Traffic-light band used by presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Green,
    Amber,
    Red,
}

impl ScoreBand {
    pub fn for_score(score: u8) -> Self {
        if score >= 80 {
            Self::Green
        } else if score >= 60 {
            Self::Amber
        } else {
            Self::Red
        }
    }
}

/// The entity the engine produces and persists for one evaluation.
///
/// Built only after blending and calibration have run on a working score,
/// so a persisted record is always the final, corrected one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub rule_score: u8,
    pub ai_score: u8,
    pub ai_confidence: f64,
    pub final_score: u8,
    pub classification: Classification,
    pub verdict: String,
    #[serde(default)]
    pub key_reasons: Vec<String>,
    pub listing: ListingFacts,
    #[serde(default)]
    pub market: MarketFacts,
    #[serde(default)]
    pub cross_analysis: CrossAnalysis,
    #[serde(default, skip_serializing_if = "UserInfo::is_empty")]
    pub user_info: UserInfo,
}

impl ScoreRecord {
    pub fn band(&self) -> ScoreBand {
        ScoreBand::for_score(self.final_score)
    }

    pub fn brand_model(&self) -> BrandModelKey {
        BrandModelKey::new(&self.listing.brand, &self.listing.model)
    }
}

/// A persisted [`ScoreRecord`] plus the identity keys it was filed under.
///
/// The brand/model key is carried by the record's listing facts; the
/// fingerprint is present only when the raw ad text was available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub fingerprint: Option<String>,
    pub record: ScoreRecord,
}

impl HistoryEntry {
    pub fn new(record: ScoreRecord, fingerprint: Option<String>) -> Self {
        Self {
            recorded_at: Utc::now(),
            fingerprint,
            record,
        }
    }

    pub fn brand(&self) -> &str {
        &self.record.listing.brand
    }

    pub fn model(&self) -> &str {
        &self.record.listing.model
    }

    pub fn final_score(&self) -> u8 {
        self.record.final_score
    }

    /// Exact brand match and the stored model containing `model_substring`.
    pub fn matches_brand_model(&self, brand: &str, model_substring: &str) -> bool {
        self.brand() == brand && self.model().contains(model_substring)
    }

    pub fn matches_fingerprint(&self, key: &str) -> bool {
        self.fingerprint.as_deref() == Some(key)
    }
}
