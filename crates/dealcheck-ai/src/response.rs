//! Schema validation: a parsed JSON object becomes an [`ExtractedEvaluation`].
//!
//! The model is asked for a fixed template but routinely drifts from it, so
//! every field reader is lenient. Numbers may arrive as strings with
//! thousands separators or a currency sign, booleans as "yes"/"כן", lists as
//! a single string. `0` is the template's "unknown" placeholder for the
//! numeric facts and is read as absent.
//!
//! Only `brand`, `model` and `deal_score` are mandatory. Anything else that
//! is present but unusable is logged at `warn` and dropped.

use std::sync::LazyLock;

use dealcheck_core::{
    Classification, ConditionAlignment, CrossAnalysis, DemandLevel, ExtractionMode, ListingFacts,
    MarketFacts, PriceAlignment, UserInfo, clamp_score,
};
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::ExtractionError;

type Object = Map<String, Value>;

const PRICE_KEYS: &[&str] = &["price_nis", "price"];
const MILEAGE_KEYS: &[&str] = &["mileage_km", "mileage", "km"];
const MARKET_KEYS: &[&str] = &["market_estimate_nis", "market_estimate", "market_price"];
const CLAIM_KEYS: &[&str] = &["ad_claims", "claims"];
const VERDICT_KEYS: &[&str] = &["short_verdict", "verdict"];

/// One number, digits grouped by thousands commas, optional fraction.
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:,\d{3})*(?:\.\d+)?").expect("static regex"));

/// Everything the model said, validated and typed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEvaluation {
    pub listing: ListingFacts,
    pub market: MarketFacts,
    pub cross_analysis: CrossAnalysis,
    /// The model's own 0-100 score.
    pub ai_score: u8,
    pub ai_confidence: f64,
    /// `None` when the model's label was absent or not in the label set.
    pub classification: Option<Classification>,
    pub verdict: String,
    pub key_reasons: Vec<String>,
    pub user_info: UserInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Nested,
    Flat,
}

impl ExtractedEvaluation {
    /// Validate `obj` against the schema for `mode`.
    ///
    /// The layout actually present wins: a flat object in rich mode (or a
    /// nested one in compact mode) is still read, with a warning.
    pub fn from_object(
        obj: &Object,
        mode: ExtractionMode,
        default_confidence: f64,
    ) -> Result<Self, ExtractionError> {
        let layout = if obj.get("from_ad").is_some_and(Value::is_object) {
            Layout::Nested
        } else {
            Layout::Flat
        };
        let expected = match mode {
            ExtractionMode::Rich => Layout::Nested,
            ExtractionMode::Compact => Layout::Flat,
        };
        if layout != expected {
            warn!(mode = mode.as_str(), ?layout, "response layout does not match extraction mode");
        }

        let empty = Object::new();
        let (ad, internet, cross) = match layout {
            Layout::Nested => (
                section(obj, "from_ad").unwrap_or(&empty),
                section(obj, "from_internet").unwrap_or(&empty),
                section(obj, "cross_analysis").unwrap_or(&empty),
            ),
            Layout::Flat => (
                obj,
                section(obj, "from_internet").unwrap_or(obj),
                section(obj, "cross_analysis").unwrap_or(&empty),
            ),
        };

        let brand = read_string(ad, &["brand"]).ok_or(ExtractionError::MissingRequiredField {
            field: "brand",
        })?;
        let model = read_string(ad, &["model"]).ok_or(ExtractionError::MissingRequiredField {
            field: "model",
        })?;
        let ai_score = read_score(obj, "deal_score").ok_or(
            ExtractionError::MissingRequiredField {
                field: "deal_score",
            },
        )?;

        let listing = ListingFacts {
            brand,
            model,
            year: read_u64(ad, &["year"])
                .and_then(|y| i32::try_from(y).ok())
                .filter(|y| *y != 0),
            mileage_km: read_u64(ad, MILEAGE_KEYS).filter(|v| *v != 0),
            price: read_u64(ad, PRICE_KEYS).filter(|v| *v != 0),
            is_taxi: read_bool(ad, "is_taxi", false),
            is_private: read_bool(ad, "is_private", true),
            claims: read_string_list(ad, CLAIM_KEYS),
        };

        let market = MarketFacts {
            market_estimate: read_u64(internet, MARKET_KEYS).filter(|v| *v != 0),
            reliability_score: read_score(internet, "reliability_score").filter(|v| *v != 0),
            avg_maintenance_cost: read_u64(internet, &["avg_maintenance_cost"])
                .filter(|v| *v != 0),
            demand_level: read_enum(internet, "demand_level", DemandLevel::parse),
            known_issues: read_string_list(internet, &["known_issues"]),
        };

        let cross_analysis = CrossAnalysis {
            price_alignment: read_enum(cross, "price_alignment", PriceAlignment::parse),
            condition_alignment: read_enum(cross, "condition_alignment", ConditionAlignment::parse),
            key_differences: read_string_list(cross, &["key_differences"]),
        };

        let user_info = section(obj, "user_info")
            .map(|info| UserInfo {
                reliability_summary: read_string(info, &["reliability_summary"]),
                common_faults: read_string_list(info, &["common_faults"]),
                maintenance_tips: read_string_list(info, &["maintenance_tips"]),
                market_context: read_string(info, &["market_context"]),
            })
            .unwrap_or_default();

        Ok(Self {
            listing,
            market,
            cross_analysis,
            ai_score,
            ai_confidence: read_confidence(obj, default_confidence),
            classification: read_enum(obj, "classification", Classification::parse),
            verdict: read_string(obj, VERDICT_KEYS).unwrap_or_default(),
            key_reasons: read_string_list(obj, &["key_reasons"]),
            user_info,
        })
    }

    /// Serialise in the rich template, with `0`/`""` for unknowns.
    pub fn to_rich_json(&self) -> Value {
        let l = &self.listing;
        let m = &self.market;
        let c = &self.cross_analysis;
        let u = &self.user_info;
        json!({
            "from_ad": {
                "brand": l.brand,
                "model": l.model,
                "year": l.year.unwrap_or(0),
                "mileage_km": l.mileage_km.unwrap_or(0),
                "price_nis": l.price.unwrap_or(0),
                "is_taxi": l.is_taxi,
                "is_private": l.is_private,
                "ad_claims": l.claims,
            },
            "from_internet": {
                "market_estimate_nis": m.market_estimate.unwrap_or(0),
                "reliability_score": m.reliability_score.unwrap_or(0),
                "avg_maintenance_cost": m.avg_maintenance_cost.unwrap_or(0),
                "demand_level": m.demand_level.map(|d| d.as_str()).unwrap_or(""),
                "known_issues": m.known_issues,
            },
            "cross_analysis": {
                "price_alignment": c.price_alignment.map(|p| p.as_str()).unwrap_or(""),
                "condition_alignment": c.condition_alignment.map(|p| p.as_str()).unwrap_or(""),
                "key_differences": c.key_differences,
            },
            "deal_score": self.ai_score,
            "classification": self.classification.map(|c| c.as_str()).unwrap_or(""),
            "short_verdict": self.verdict,
            "key_reasons": self.key_reasons,
            "ai_confidence": self.ai_confidence,
            "user_info": {
                "reliability_summary": u.reliability_summary.as_deref().unwrap_or(""),
                "common_faults": u.common_faults,
                "maintenance_tips": u.maintenance_tips,
                "market_context": u.market_context.as_deref().unwrap_or(""),
            },
        })
    }

    /// Serialise in the flat compact template. Market detail beyond the
    /// estimate, cross analysis and user info are not part of it.
    pub fn to_compact_json(&self) -> Value {
        let l = &self.listing;
        json!({
            "brand": l.brand,
            "model": l.model,
            "year": l.year.unwrap_or(0),
            "mileage_km": l.mileage_km.unwrap_or(0),
            "price_nis": l.price.unwrap_or(0),
            "market_estimate_nis": self.market.market_estimate.unwrap_or(0),
            "is_taxi": l.is_taxi,
            "is_private": l.is_private,
            "deal_score": self.ai_score,
            "classification": self.classification.map(|c| c.as_str()).unwrap_or(""),
            "short_verdict": self.verdict,
            "key_reasons": self.key_reasons,
            "ai_confidence": self.ai_confidence,
        })
    }
}

fn section<'a>(obj: &'a Object, key: &str) -> Option<&'a Object> {
    match obj.get(key) {
        Some(Value::Object(inner)) => Some(inner),
        Some(Value::Null) | None => None,
        Some(other) => {
            warn!(field = key, value = %other, "expected an object, ignoring");
            None
        }
    }
}

fn first<'a, 'k>(obj: &'a Object, keys: &[&'k str]) -> Option<(&'k str, &'a Value)> {
    keys.iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))
}

fn read_string(obj: &Object, keys: &[&str]) -> Option<String> {
    let (field, value) = first(obj, keys)?;
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            warn!(field, value = %other, "expected a string, ignoring");
            return None;
        }
    };
    (!s.is_empty()).then_some(s)
}

/// Non-negative integer. Floats truncate; a string must hold exactly one
/// number (`"₪ 85,000"` → 85000, `"85,000-90,000"` → unknown).
fn read_u64(obj: &Object, keys: &[&str]) -> Option<u64> {
    let (field, value) = first(obj, keys)?;
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f.trunc() as u64)),
        Value::String(s) if s.trim_start().starts_with('-') => None,
        Value::String(s) => single_number(s).and_then(|n| {
            let integral = n.split('.').next().unwrap_or_default();
            integral.replace(',', "").parse().ok()
        }),
        _ => None,
    };
    if parsed.is_none() && !matches!(value, Value::String(s) if s.trim().is_empty()) {
        warn!(field, value = %value, "unusable number, treating as unknown");
    }
    parsed
}

/// The number in `s`, unless there is none or more than one.
fn single_number(s: &str) -> Option<&str> {
    let mut groups = NUMBER.find_iter(s);
    let number = groups.next()?;
    groups.next().is_none().then_some(number.as_str())
}

fn read_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let numeric: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
                .collect();
            numeric.parse().ok()
        }
        _ => None,
    };
    parsed.filter(|f: &f64| f.is_finite())
}

/// A 0-100 score, rounded half-to-even and clamped.
fn read_score(obj: &Object, key: &str) -> Option<u8> {
    let value = obj.get(key).filter(|v| !v.is_null())?;
    match read_f64(value) {
        Some(f) => Some(clamp_score(f.round_ties_even() as i64)),
        None => {
            warn!(field = key, value = %value, "unusable score");
            None
        }
    }
}

fn read_confidence(obj: &Object, default: f64) -> f64 {
    match obj.get("ai_confidence").filter(|v| !v.is_null()) {
        None => default,
        Some(value) => match read_f64(value) {
            Some(c) => c.clamp(0.0, 1.0),
            None => {
                warn!(value = %value, "unusable ai_confidence, using default");
                default
            }
        },
    }
}

fn read_bool(obj: &Object, key: &str, default: bool) -> bool {
    let Some(value) = obj.get(key).filter(|v| !v.is_null()) else {
        return default;
    };
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "כן" => Some(true),
            "false" | "no" | "n" | "0" | "לא" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        warn!(field = key, value = %value, default, "unusable boolean, using default");
        default
    })
}

fn read_string_list(obj: &Object, keys: &[&str]) -> Vec<String> {
    let Some((field, value)) = first(obj, keys) else {
        return Vec::new();
    };
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s.trim().to_string()],
        other => {
            warn!(field, value = %other, "expected a list, ignoring");
            return Vec::new();
        }
    };
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

fn read_enum<T>(obj: &Object, key: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
    let raw = read_string(obj, &[key])?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(field = key, value = %raw, "unrecognised label");
    }
    parsed
}
