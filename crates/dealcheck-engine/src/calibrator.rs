//! Historical calibration.
//!
//! Two independent policies, each switchable in [`CalibrationConfig`]:
//!
//! - **Model-average correction.** When the working score is at least
//!   `correction_threshold` away from the mean final score of earlier
//!   evaluations of the same brand/model, it is pulled halfway toward that
//!   mean (truncating) and the verdict cites the mean.
//! - **Consistency check.** When the same ad (by fingerprint) has been
//!   evaluated `min_repeat_entries` times or more and those scores spread by
//!   more than `spread_threshold`, a [`ConsistencySignal`] reports the mean
//!   and a target range around it. Advisory: nothing is clamped to it.

use dealcheck_core::{BrandModelKey, CalibrationConfig, HistoryEntry, fingerprint};
use dealcheck_store::{HistoryStore, StoreError, average};
use serde::Serialize;
use tracing::{debug, info};

/// Share of the gap to the historical mean that a correction closes.
pub const PULL_FACTOR: f64 = 0.5;

/// What the model-average policy did to the working score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationOutcome {
    Corrected { average: f64, from: u8, to: u8 },
    WithinTolerance { average: f64 },
    NoHistory,
    Skipped { reason: String },
}

impl CalibrationOutcome {
    /// The score after this outcome is applied to `working`.
    pub fn final_score(&self, working: u8) -> u8 {
        match self {
            Self::Corrected { to, .. } => *to,
            _ => working,
        }
    }

    /// Text appended to the verdict, if any.
    pub fn verdict_note(&self) -> Option<String> {
        match self {
            Self::Corrected { average, .. } => Some(format!(
                " [calibrated toward historical model average {average}]"
            )),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Volatility across repeated evaluations of one ad.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencySignal {
    /// Earlier final scores, oldest first.
    pub scores: Vec<u8>,
    pub mean: f64,
    pub spread: u8,
    /// Inclusive advisory range, `mean ± target_half_width` clamped to 0..=100.
    pub target_range: (u8, u8),
}

#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    config: CalibrationConfig,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Fingerprint ad text with the configured prefix length.
    pub fn fingerprint(&self, ad_text: &str) -> Option<String> {
        fingerprint(ad_text, self.config.fingerprint_chars)
    }

    /// Apply the model-average policy to `working`, given the earlier
    /// entries for the same brand/model.
    pub fn correct(&self, working: u8, matches: &[HistoryEntry]) -> CalibrationOutcome {
        if !self.config.model_average {
            return CalibrationOutcome::Skipped {
                reason: "model-average correction disabled".into(),
            };
        }
        let Some(mean) = average(matches) else {
            return CalibrationOutcome::NoHistory;
        };
        let average = round2(mean);
        let diff = f64::from(working) - average;
        if diff.abs() < self.config.correction_threshold {
            return CalibrationOutcome::WithinTolerance { average };
        }

        let corrected = (f64::from(working) + (-diff * PULL_FACTOR)).trunc();
        let to = corrected.clamp(0.0, 100.0) as u8;
        info!(average, from = working, to, "corrected toward historical model average");
        CalibrationOutcome::Corrected {
            average,
            from: working,
            to,
        }
    }

    /// Read the brand/model group from `store` and apply [`correct`](Self::correct).
    pub fn model_average<S: HistoryStore + ?Sized>(
        &self,
        store: &S,
        key: &BrandModelKey,
        working: u8,
    ) -> Result<CalibrationOutcome, StoreError> {
        if !self.config.model_average {
            return Ok(self.correct(working, &[]));
        }
        let matches = store.query_by_brand_model(&key.brand, &key.model)?;
        debug!(key = %key, matches = matches.len(), "brand/model history");
        Ok(self.correct(working, &matches))
    }

    /// Judge the spread of earlier scores for one ad.
    pub fn consistency_signal(&self, scores: &[u8]) -> Option<ConsistencySignal> {
        if !self.config.consistency || scores.len() < self.config.min_repeat_entries {
            return None;
        }
        let max = *scores.iter().max()?;
        let min = *scores.iter().min()?;
        let spread = max - min;
        if spread <= self.config.spread_threshold {
            return None;
        }

        let mean = scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64;
        let half = f64::from(self.config.target_half_width);
        let bound = |v: f64| v.round_ties_even().clamp(0.0, 100.0) as u8;
        let signal = ConsistencySignal {
            scores: scores.to_vec(),
            mean,
            spread,
            target_range: (bound(mean - half), bound(mean + half)),
        };
        info!(
            evaluations = scores.len(),
            spread,
            mean,
            "inconsistent scores for a repeated ad"
        );
        Some(signal)
    }

    /// Read earlier evaluations filed under `key` and judge their spread.
    pub fn consistency_check<S: HistoryStore + ?Sized>(
        &self,
        store: &S,
        key: &str,
    ) -> Result<Option<ConsistencySignal>, StoreError> {
        if !self.config.consistency {
            return Ok(None);
        }
        let scores: Vec<u8> = store
            .query_by_fingerprint(key)?
            .iter()
            .map(HistoryEntry::final_score)
            .collect();
        Ok(self.consistency_signal(&scores))
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dealcheck_core::{Classification, ListingFacts, ScoreRecord};
    use dealcheck_store::MemoryStore;

    pub(crate) fn entry(brand: &str, model: &str, score: u8, fp: Option<&str>) -> HistoryEntry {
        let record = ScoreRecord {
            rule_score: score,
            ai_score: score,
            ai_confidence: 0.8,
            final_score: score,
            classification: Classification::from_score(score),
            verdict: String::new(),
            key_reasons: vec![],
            listing: ListingFacts {
                brand: brand.into(),
                model: model.into(),
                is_private: true,
                ..Default::default()
            },
            market: Default::default(),
            cross_analysis: Default::default(),
            user_info: Default::default(),
        };
        HistoryEntry::new(record, fp.map(str::to_string))
    }

    fn corollas(scores: &[u8]) -> Vec<HistoryEntry> {
        scores.iter().map(|s| entry("Toyota", "Corolla", *s, None)).collect()
    }

    #[test]
    fn pulls_halfway_to_average() {
        let outcome = Calibrator::default().correct(80, &corollas(&[60]));
        assert_eq!(
            outcome,
            CalibrationOutcome::Corrected {
                average: 60.0,
                from: 80,
                to: 70
            }
        );
        assert_eq!(outcome.final_score(80), 70);
        assert_eq!(
            outcome.verdict_note().as_deref(),
            Some(" [calibrated toward historical model average 60]")
        );
    }

    #[test]
    fn small_gap_is_left_alone() {
        let outcome = Calibrator::default().correct(80, &corollas(&[70]));
        assert_eq!(outcome, CalibrationOutcome::WithinTolerance { average: 70.0 });
        assert_eq!(outcome.final_score(80), 80);
        assert_eq!(outcome.verdict_note(), None);
    }

    #[test]
    fn threshold_is_inclusive() {
        let outcome = Calibrator::default().correct(75, &corollas(&[60]));
        assert_eq!(outcome.final_score(75), 67);
    }

    #[test]
    fn correction_truncates_toward_zero() {
        // avg 61.67, diff -28.67, 33 + 14.335 = 47.335 → 47
        let outcome = Calibrator::default().correct(33, &corollas(&[60, 62, 63]));
        assert_eq!(
            outcome,
            CalibrationOutcome::Corrected {
                average: 61.67,
                from: 33,
                to: 47
            }
        );
    }

    #[test]
    fn no_history_no_note() {
        let outcome = Calibrator::default().correct(90, &[]);
        assert_eq!(outcome, CalibrationOutcome::NoHistory);
        assert_eq!(outcome.verdict_note(), None);
    }

    #[test]
    fn disabled_policy_is_skipped() {
        let calibrator = Calibrator::new(CalibrationConfig {
            model_average: false,
            ..Default::default()
        });
        let outcome = calibrator.correct(90, &corollas(&[10]));
        assert!(outcome.is_skipped());
        assert_eq!(outcome.final_score(90), 90);
    }

    #[test]
    fn model_average_uses_brand_and_model_substring() {
        let store = MemoryStore::with_entries(vec![
            entry("Toyota", "Corolla Hybrid", 60, None),
            entry("Toyota", "Yaris", 10, None),
            entry("toyota", "Corolla", 10, None),
        ]);
        let key = BrandModelKey::new("Toyota", "Corolla");
        let outcome = Calibrator::default().model_average(&store, &key, 80).unwrap();
        assert_eq!(outcome.final_score(80), 70);
    }

    #[test]
    fn volatile_repeats_raise_a_signal() {
        let signal = Calibrator::default()
            .consistency_signal(&[60, 75, 68])
            .unwrap();
        assert_eq!(signal.spread, 15);
        assert!((signal.mean - 67.666).abs() < 0.01);
        assert_eq!(signal.target_range, (63, 73));
    }

    #[test]
    fn spread_at_threshold_is_stable() {
        assert_eq!(Calibrator::default().consistency_signal(&[60, 72, 66]), None);
    }

    #[test]
    fn too_few_repeats() {
        assert_eq!(Calibrator::default().consistency_signal(&[10, 90]), None);
    }

    #[test]
    fn target_range_is_clamped() {
        let signal = Calibrator::default()
            .consistency_signal(&[100, 100, 100, 80])
            .unwrap();
        assert_eq!(signal.target_range, (90, 100));
    }

    #[test]
    fn consistency_check_reads_by_fingerprint() {
        let calibrator = Calibrator::default();
        let fp = calibrator.fingerprint("Mazda 3, 2019, 85,000 km").unwrap();
        let same = calibrator.fingerprint("  MAZDA 3,   2019,\n85,000 KM ").unwrap();
        assert_eq!(fp, same);

        let store = MemoryStore::with_entries(vec![
            entry("Mazda", "3", 50, Some(&fp)),
            entry("Mazda", "3", 80, Some("other")),
            entry("Mazda", "3", 70, Some(&fp)),
            entry("Mazda", "3", 55, Some(&fp)),
        ]);
        let signal = calibrator.consistency_check(&store, &fp).unwrap().unwrap();
        assert_eq!(signal.scores, vec![50, 70, 55]);

        let off = Calibrator::new(CalibrationConfig {
            consistency: false,
            ..Default::default()
        });
        assert_eq!(off.consistency_check(&store, &fp).unwrap(), None);
    }
}
