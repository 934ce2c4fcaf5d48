//! Deterministic rule-based deal score.
//!
//! Starts from a baseline of 70 and applies four independent terms: price
//! versus market, mileage above 100,000 km, ownership (taxi or dealer), and
//! age beyond five years. The result is rounded half-to-even and clamped to
//! `0..=100`. A non-finite intermediate yields [`FALLBACK_SCORE`] instead of
//! an error.

use chrono::{Datelike, Local};
use dealcheck_core::{ListingFacts, MarketFacts, clamp_score};
use serde::Serialize;
use tracing::warn;

use crate::error::ScoringError;

pub const BASELINE: f64 = 70.0;
/// Returned whenever the computation itself fails.
pub const FALLBACK_SCORE: u8 = 50;

const PRICE_WEIGHT: f64 = 0.55;
const MILEAGE_ALLOWANCE_KM: f64 = 100_000.0;
const MILEAGE_STEP_KM: f64 = 10_000.0;
const MILEAGE_STEP_PENALTY: f64 = 1.5;
const TAXI_PENALTY: f64 = 25.0;
const DEALER_PENALTY: f64 = 10.0;
const AGE_GRACE_YEARS: i64 = 5;
const AGE_YEAR_PENALTY: f64 = 2.0;

/// Inputs to the rule scorer. Every numeric input is optional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleInputs {
    pub market_price: Option<f64>,
    pub ad_price: Option<f64>,
    pub mileage_km: Option<f64>,
    pub model_year: Option<i32>,
    pub is_taxi: bool,
    pub is_private: bool,
}

impl Default for RuleInputs {
    fn default() -> Self {
        Self {
            market_price: None,
            ad_price: None,
            mileage_km: None,
            model_year: None,
            is_taxi: false,
            is_private: true,
        }
    }
}

/// Each term of a rule score, for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RuleBreakdown {
    pub baseline: f64,
    /// Positive when the ad is below market.
    pub price_adjustment: f64,
    pub mileage_penalty: f64,
    pub ownership_penalty: f64,
    pub age_penalty: f64,
    /// Sum of the terms before rounding and clamping.
    pub raw: f64,
    pub score: u8,
}

impl RuleInputs {
    pub fn from_facts(listing: &ListingFacts, market: &MarketFacts) -> Self {
        Self {
            market_price: market.market_estimate.map(|v| v as f64),
            ad_price: listing.price.map(|v| v as f64),
            mileage_km: listing.mileage_km.map(|v| v as f64),
            model_year: listing.year,
            is_taxi: listing.is_taxi,
            is_private: listing.is_private,
        }
    }

    /// Score against the local calendar year.
    pub fn score(&self) -> u8 {
        self.score_at(Local::now().year())
    }

    pub fn score_at(&self, current_year: i32) -> u8 {
        match self.breakdown_at(current_year) {
            Ok(breakdown) => breakdown.score,
            Err(e) => {
                warn!(error = %e, inputs = ?self, "rule scoring failed, using fallback");
                FALLBACK_SCORE
            }
        }
    }

    pub fn breakdown_at(&self, current_year: i32) -> Result<RuleBreakdown, ScoringError> {
        let price_adjustment = match (self.market_price, self.ad_price) {
            (Some(market), Some(ad)) if market != 0.0 && ad != 0.0 => {
                (market - ad) / market * 100.0 * PRICE_WEIGHT
            }
            _ => 0.0,
        };
        finite("price", price_adjustment)?;

        let mileage_penalty = match self.mileage_km {
            Some(km) if km > MILEAGE_ALLOWANCE_KM => {
                (km - MILEAGE_ALLOWANCE_KM) / MILEAGE_STEP_KM * MILEAGE_STEP_PENALTY
            }
            _ => 0.0,
        };
        finite("mileage", mileage_penalty)?;

        let ownership_penalty = if self.is_taxi {
            TAXI_PENALTY
        } else if !self.is_private {
            DEALER_PENALTY
        } else {
            0.0
        };

        let age = self
            .model_year
            .map(|year| i64::from(current_year) - i64::from(year))
            .unwrap_or(0);
        let age_penalty = if age > AGE_GRACE_YEARS {
            (age - AGE_GRACE_YEARS) as f64 * AGE_YEAR_PENALTY
        } else {
            0.0
        };

        let raw = BASELINE + price_adjustment - mileage_penalty - ownership_penalty - age_penalty;
        finite("total", raw)?;

        Ok(RuleBreakdown {
            baseline: BASELINE,
            price_adjustment,
            mileage_penalty,
            ownership_penalty,
            age_penalty,
            raw,
            score: clamp_score(raw.round_ties_even() as i64),
        })
    }
}

fn finite(term: &'static str, value: f64) -> Result<f64, ScoringError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScoringError::NonFinite { term, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const YEAR: i32 = 2026;

    fn inputs(market: f64, ad: f64, mileage: f64, year: i32) -> RuleInputs {
        RuleInputs {
            market_price: Some(market),
            ad_price: Some(ad),
            mileage_km: Some(mileage),
            model_year: Some(year),
            ..Default::default()
        }
    }

    #[test]
    fn at_market_new_car_is_baseline() {
        assert_eq!(inputs(100_000.0, 100_000.0, 50_000.0, YEAR).score_at(YEAR), 70);
    }

    #[test]
    fn twenty_percent_below_market() {
        assert_eq!(inputs(100_000.0, 80_000.0, 50_000.0, YEAR).score_at(YEAR), 81);
    }

    #[test]
    fn current_year_from_clock() {
        let current = Local::now().year();
        assert_eq!(inputs(100_000.0, 80_000.0, 50_000.0, current).score(), 81);
    }

    #[test]
    fn taxi_costs_twenty_five() {
        let private = inputs(100_000.0, 90_000.0, 150_000.0, 2010);
        let taxi = RuleInputs {
            is_taxi: true,
            ..private
        };
        // 70 + 5.5 - 7.5 - 22 = 46
        assert_eq!(private.score_at(YEAR), 46);
        assert_eq!(taxi.score_at(YEAR), 21);
    }

    #[test]
    fn dealer_costs_ten_and_taxi_takes_precedence() {
        let dealer = RuleInputs {
            is_private: false,
            ..Default::default()
        };
        assert_eq!(dealer.score_at(YEAR), 60);
        let taxi_dealer = RuleInputs {
            is_taxi: true,
            is_private: false,
            ..Default::default()
        };
        assert_eq!(taxi_dealer.score_at(YEAR), 45);
    }

    #[test]
    fn missing_or_zero_prices_skip_price_term() {
        let no_market = RuleInputs {
            ad_price: Some(10_000.0),
            ..Default::default()
        };
        assert_eq!(no_market.score_at(YEAR), 70);
        let zero_market = inputs(0.0, 10_000.0, 0.0, YEAR);
        assert_eq!(zero_market.score_at(YEAR), 70);
        let zero_ad = inputs(50_000.0, 0.0, 0.0, YEAR);
        assert_eq!(zero_ad.score_at(YEAR), 70);
    }

    #[test]
    fn breakdown_terms() {
        let b = inputs(100_000.0, 110_000.0, 130_000.0, 2015)
            .breakdown_at(YEAR)
            .unwrap();
        assert!((b.price_adjustment - -5.5).abs() < 1e-9);
        assert!((b.mileage_penalty - 4.5).abs() < 1e-9);
        assert_eq!(b.ownership_penalty, 0.0);
        assert_eq!(b.age_penalty, 12.0);
        // 70 - 5.5 - 4.5 - 12 = 48
        assert_eq!(b.score, 48);
    }

    #[test]
    fn future_model_year_is_not_a_bonus() {
        let b = RuleInputs {
            model_year: Some(YEAR + 1),
            ..Default::default()
        }
        .breakdown_at(YEAR)
        .unwrap();
        assert_eq!(b.age_penalty, 0.0);
    }

    #[test]
    fn clamped_at_both_ends() {
        assert_eq!(inputs(100_000.0, 1.0, 0.0, YEAR).score_at(YEAR), 100);
        assert_eq!(inputs(10_000.0, 90_000.0, 900_000.0, 1970).score_at(YEAR), 0);
    }

    #[test]
    fn non_finite_falls_back() {
        let nan = inputs(f64::NAN, 10_000.0, 0.0, YEAR);
        assert!(matches!(
            nan.breakdown_at(YEAR),
            Err(ScoringError::NonFinite { term: "price", .. })
        ));
        assert_eq!(nan.score_at(YEAR), FALLBACK_SCORE);

        let inf = RuleInputs {
            mileage_km: Some(f64::INFINITY),
            ..Default::default()
        };
        assert_eq!(inf.score_at(YEAR), FALLBACK_SCORE);
    }

    #[test]
    fn from_facts_maps_fields() {
        let listing = ListingFacts {
            brand: "Kia".into(),
            model: "Picanto".into(),
            year: Some(2020),
            mileage_km: Some(60_000),
            price: Some(45_000),
            is_taxi: false,
            is_private: false,
            claims: vec![],
        };
        let market = MarketFacts {
            market_estimate: Some(50_000),
            ..Default::default()
        };
        let r = RuleInputs::from_facts(&listing, &market);
        assert_eq!(r.market_price, Some(50_000.0));
        assert_eq!(r.ad_price, Some(45_000.0));
        assert_eq!(r.model_year, Some(2020));
        assert!(!r.is_private);
        // 70 + 5.5 - 10 - 1*2 = 63.5, half to even
        assert_eq!(r.score_at(YEAR), 64);
    }

    proptest! {
        #[test]
        fn score_always_in_range(
            market in proptest::option::of(any::<f64>()),
            ad in proptest::option::of(any::<f64>()),
            mileage in proptest::option::of(any::<f64>()),
            year in proptest::option::of(any::<i32>()),
            is_taxi in any::<bool>(),
            is_private in any::<bool>(),
        ) {
            let r = RuleInputs { market_price: market, ad_price: ad, mileage_km: mileage, model_year: year, is_taxi, is_private };
            prop_assert!(r.score_at(YEAR) <= 100);
        }

        #[test]
        fn taxi_term_is_exactly_twenty_five(
            market in 1_000.0f64..500_000.0,
            ad in 1_000.0f64..500_000.0,
            mileage in 0.0f64..400_000.0,
            year in 1990i32..=2026,
        ) {
            let base = inputs(market, ad, mileage, year);
            let taxi = RuleInputs { is_taxi: true, ..base };
            let a = base.breakdown_at(YEAR).unwrap();
            let b = taxi.breakdown_at(YEAR).unwrap();
            prop_assert!((a.raw - b.raw - 25.0).abs() < 1e-9);
        }
    }
}
