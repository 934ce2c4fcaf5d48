//! Facts the generative model claims about a listing and its market.
//!
//! These are produced once per evaluation by the extractor and never mutated
//! afterwards. Enumerated fields accept both the English tokens used in the
//! compact schema and the Hebrew tokens the rich prompt asks the model for.

use serde::{Deserialize, Serialize};

/// Data the model claims to have read from the ad text and images.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingFacts {
    pub brand: String,
    pub model: String,
    pub year: Option<i32>,
    pub mileage_km: Option<u64>,
    pub price: Option<u64>,
    pub is_taxi: bool,
    pub is_private: bool,
    #[serde(default)]
    pub claims: Vec<String>,
}

/// Data the model claims to have sourced externally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketFacts {
    pub market_estimate: Option<u64>,
    /// 0-100.
    pub reliability_score: Option<u8>,
    pub avg_maintenance_cost: Option<u64>,
    pub demand_level: Option<DemandLevel>,
    #[serde(default)]
    pub known_issues: Vec<String>,
}

/// Descriptive comparison between the ad and the market. Never scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossAnalysis {
    pub price_alignment: Option<PriceAlignment>,
    pub condition_alignment: Option<ConditionAlignment>,
    #[serde(default)]
    pub key_differences: Vec<String>,
}

/// Background the model offers the buyer. Rich schema only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub reliability_summary: Option<String>,
    #[serde(default)]
    pub common_faults: Vec<String>,
    #[serde(default)]
    pub maintenance_tips: Vec<String>,
    pub market_context: Option<String>,
}

impl UserInfo {
    pub fn is_empty(&self) -> bool {
        self.reliability_summary.is_none()
            && self.common_faults.is_empty()
            && self.maintenance_tips.is_empty()
            && self.market_context.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandLevel {
    Low,
    Medium,
    High,
}

impl DemandLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse a model-provided token. Unknown tokens yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "low" | "נמוך" | "נמוכה" => Some(Self::Low),
            "medium" | "moderate" | "בינוני" | "בינונית" => Some(Self::Medium),
            "high" | "גבוה" | "גבוהה" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceAlignment {
    High,
    Low,
    Fair,
}

impl PriceAlignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
            Self::Fair => "fair",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "high" | "גבוה" => Some(Self::High),
            "low" | "נמוך" => Some(Self::Low),
            "fair" | "reasonable" | "aligned" | "סביר" | "תואם" => Some(Self::Fair),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionAlignment {
    Matches,
    Mismatch,
}

impl ConditionAlignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matches => "matches",
            Self::Mismatch => "mismatch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "matches" | "match" | "consistent" | "תואם" => Some(Self::Matches),
            "mismatch" | "inconsistent" | "does_not_match" | "לא_תואם" => Some(Self::Mismatch),
            _ => None,
        }
    }
}

/// Lower-case, trim, and join inner whitespace/hyphens with `_` so that
/// "Does not match", "does-not-match" and "does_not_match" compare equal.
pub(crate) fn normalize_token(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
