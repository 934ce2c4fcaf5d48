//! The evaluation pipeline.
//!
//! raw model text → [`Extractor`] → [`RuleInputs`] → [`BlendedScore`] →
//! [`Calibrator`] → [`ScoreRecord`], appended to the history exactly once.
//!
//! The store sits behind a `Mutex`, and the lock is held from the first
//! history read to the append, so concurrent evaluations of the same
//! vehicle each see the other's entry or none of it. The store's
//! [`exclusive`](HistoryStore::exclusive) lock is taken for the same span,
//! which extends this to other processes sharing the history file.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use dealcheck_ai::{BlendedScore, Extractor, GenerationRequest, RuleInputs, TextGenerator};
use dealcheck_core::{BrandModelKey, Classification, EngineConfig, HistoryEntry, ScoreRecord};
use dealcheck_store::{HistoryStore, StoreError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calibrator::{CalibrationOutcome, Calibrator, ConsistencySignal};
use crate::error::EvaluationError;

/// Result of one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// The record as persisted (or as it would have been).
    pub record: ScoreRecord,
    /// Blender output before calibration.
    pub blended: BlendedScore,
    pub outcome: CalibrationOutcome,
    /// Volatility across earlier evaluations of the same ad text.
    pub consistency: Option<ConsistencySignal>,
    pub fingerprint: Option<String>,
    pub persisted: bool,
    /// Set when the history could not be read or written.
    pub history_error: Option<String>,
    /// Final scores for this brand/model, oldest first, including this one
    /// when persisted.
    pub trend: Vec<u8>,
}

pub struct Evaluator {
    extractor: Extractor,
    calibrator: Calibrator,
    store: Mutex<Box<dyn HistoryStore>>,
    current_year: Option<i32>,
}

impl Evaluator {
    pub fn new(
        config: EngineConfig,
        store: impl HistoryStore + 'static,
    ) -> Result<Self, EvaluationError> {
        config.validate()?;
        let store: Box<dyn HistoryStore> = Box::new(store);
        Ok(Self {
            extractor: Extractor::from_config(&config),
            calibrator: Calibrator::new(config.calibration),
            store: Mutex::new(store),
            current_year: None,
        })
    }

    /// Pin the calendar year the rule scorer ages vehicles against.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn HistoryStore>> {
        // Appends are single operations; a panic elsewhere leaves the store usable.
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluate saved model output. `ad_text` enables the consistency check
    /// and files the record under the ad's fingerprint.
    pub fn evaluate(&self, raw: &str, ad_text: Option<&str>) -> Result<Evaluation, EvaluationError> {
        let extracted = self.extractor.extract(raw)?;

        let rules = RuleInputs::from_facts(&extracted.listing, &extracted.market);
        let rule_score = match self.current_year {
            Some(year) => rules.score_at(year),
            None => rules.score(),
        };
        let blended = BlendedScore::new(rule_score, extracted.ai_score, extracted.ai_confidence);
        let fingerprint = ad_text.and_then(|t| self.calibrator.fingerprint(t));
        let key = BrandModelKey::new(&extracted.listing.brand, &extracted.listing.model);
        debug!(
            key = %key,
            rule_score,
            ai_score = blended.ai_score,
            working = blended.working_score,
            "blended score"
        );

        let mut store = self.store();
        let mut lock = store.exclusive();
        let (section, history) = match lock.acquire() {
            Ok(guard) => {
                let history = self.read_history(
                    &**store,
                    &key,
                    fingerprint.as_deref(),
                    blended.working_score,
                );
                (Some(guard), history)
            }
            Err(e) => (None, Err(e)),
        };
        let (outcome, consistency, mut history_error) = match history {
            Ok((outcome, consistency)) => (outcome, consistency, None),
            Err(e) => {
                warn!(error = %e, "history unavailable, skipping calibration");
                (
                    CalibrationOutcome::Skipped {
                        reason: format!("history unavailable: {e}"),
                    },
                    None,
                    Some(e.to_string()),
                )
            }
        };

        let final_score = outcome.final_score(blended.working_score);
        let mut verdict = extracted.verdict;
        if let Some(note) = outcome.verdict_note() {
            verdict.push_str(&note);
        }
        let classification = extracted.classification.unwrap_or_else(|| {
            let derived = Classification::from_score(final_score);
            warn!(final_score, label = derived.as_str(), "model gave no usable label, derived from score");
            derived
        });

        let record = ScoreRecord {
            rule_score,
            ai_score: blended.ai_score,
            ai_confidence: blended.ai_confidence,
            final_score,
            classification,
            verdict,
            key_reasons: extracted.key_reasons,
            listing: extracted.listing,
            market: extracted.market,
            cross_analysis: extracted.cross_analysis,
            user_info: extracted.user_info,
        };

        let mut persisted = false;
        if history_error.is_none() {
            match store.append(HistoryEntry::new(record.clone(), fingerprint.clone())) {
                Ok(()) => persisted = true,
                Err(e) => {
                    warn!(error = %e, "could not append to history");
                    history_error = Some(e.to_string());
                }
            }
        }

        let trend = if history_error.is_none() {
            store.trend(&key.brand, &key.model).unwrap_or_else(|e| {
                warn!(error = %e, "could not read score trend");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        drop(section);
        drop(store);

        info!(
            key = %key,
            final_score,
            classification = classification.as_str(),
            persisted,
            "evaluation complete"
        );

        Ok(Evaluation {
            record,
            blended,
            outcome,
            consistency,
            fingerprint,
            persisted,
            history_error,
            trend,
        })
    }

    fn read_history(
        &self,
        store: &dyn HistoryStore,
        key: &BrandModelKey,
        fingerprint: Option<&str>,
        working: u8,
    ) -> Result<(CalibrationOutcome, Option<ConsistencySignal>), StoreError> {
        let outcome = self.calibrator.model_average(store, key, working)?;
        let consistency = match fingerprint {
            Some(fp) => self.calibrator.consistency_check(store, fp)?,
            None => None,
        };
        Ok((outcome, consistency))
    }

    /// Ask `generator` for an evaluation of `ad_text`, then run the result
    /// through [`evaluate`](Self::evaluate).
    ///
    /// When earlier evaluations of the same ad were volatile, the request
    /// carries their scores and the advisory target range.
    pub fn evaluate_with<G: TextGenerator + ?Sized>(
        &self,
        generator: &G,
        ad_text: &str,
        image_paths: Vec<PathBuf>,
    ) -> Result<Evaluation, EvaluationError> {
        let mut request =
            GenerationRequest::new(ad_text, self.extractor.mode()).with_images(image_paths);

        match self.consistency(ad_text) {
            Ok(Some(signal)) => {
                request.target_range = Some(signal.target_range);
                request.historical_scores = signal.scores;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "consistency check failed, generating without a target"),
        }

        let raw = generator.generate(&request)?;
        self.evaluate(&raw, Some(ad_text))
    }

    /// Volatility signal for `ad_text`, without evaluating anything.
    pub fn consistency(&self, ad_text: &str) -> Result<Option<ConsistencySignal>, EvaluationError> {
        let Some(fp) = self.calibrator.fingerprint(ad_text) else {
            return Ok(None);
        };
        let store = self.store();
        Ok(self.calibrator.consistency_check(&**store, &fp)?)
    }

    /// History entries, optionally narrowed to a brand/model group.
    pub fn history(&self, filter: Option<(&str, &str)>) -> Result<Vec<HistoryEntry>, EvaluationError> {
        let store = self.store();
        let entries = match filter {
            Some((brand, model)) => store.query_by_brand_model(brand, model)?,
            None => store.all()?,
        };
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrator::tests::entry;
    use dealcheck_ai::{ExtractionError, GenerationError, StaticResponse};
    use dealcheck_core::{CalibrationConfig, ExtractionMode};
    use dealcheck_store::{JsonlStore, MemoryStore};
    use std::sync::Arc;

    const YEAR: i32 = 2026;

    /// Compact response whose rule score is 81 (20% under market, low
    /// mileage, current year) and whose blend with `ai` follows.
    fn response(brand: &str, model: &str, ai: u8) -> String {
        format!(
            r#"```json
{{"brand": "{brand}", "model": "{model}", "year": {YEAR}, "mileage_km": 50000,
  "price_nis": 80000, "market_estimate_nis": 100000, "is_taxi": false, "is_private": true,
  "deal_score": {ai}, "classification": "good_deal", "short_verdict": "Solid buy",
  "key_reasons": ["under market"], "ai_confidence": 0.9}}
```"#
        )
    }

    fn compact() -> EngineConfig {
        EngineConfig {
            mode: ExtractionMode::Compact,
            ..Default::default()
        }
    }

    fn evaluator(store: impl HistoryStore + 'static) -> Evaluator {
        Evaluator::new(compact(), store).unwrap().with_current_year(YEAR)
    }

    /// Reads work, appends fail.
    struct ReadOnly(MemoryStore);

    impl HistoryStore for ReadOnly {
        fn append(&mut self, _entry: HistoryEntry) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("read-only medium")))
        }

        fn all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
            self.0.all()
        }
    }

    #[test]
    fn first_evaluation_has_no_history() {
        let eval = evaluator(MemoryStore::new());
        let result = eval.evaluate(&response("Toyota", "Corolla", 78), None).unwrap();
        assert_eq!(result.record.rule_score, 81);
        assert_eq!(result.record.ai_score, 78);
        assert_eq!(result.blended.working_score, 80);
        assert_eq!(result.record.final_score, 80);
        assert_eq!(result.outcome, CalibrationOutcome::NoHistory);
        assert_eq!(result.record.verdict, "Solid buy");
        assert_eq!(result.record.classification, Classification::GoodDeal);
        assert!(result.persisted);
        assert_eq!(result.trend, vec![80]);
    }

    #[test]
    fn corrected_toward_model_average() {
        let store = MemoryStore::with_entries(vec![entry("Toyota", "Corolla", 60, None)]);
        let eval = evaluator(store);
        let result = eval.evaluate(&response("Toyota", "Corolla", 78), None).unwrap();
        assert_eq!(result.blended.working_score, 80);
        assert_eq!(result.record.final_score, 70);
        assert_eq!(
            result.record.verdict,
            "Solid buy [calibrated toward historical model average 60]"
        );
        // The corrected record is what was persisted, once.
        let history = eval.history(Some(("Toyota", "Corolla"))).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].final_score(), 70);
        assert_eq!(result.trend, vec![60, 70]);
    }

    #[test]
    fn small_gap_is_not_corrected() {
        let store = MemoryStore::with_entries(vec![entry("Toyota", "Corolla", 70, None)]);
        let result = evaluator(store)
            .evaluate(&response("Toyota", "Corolla", 78), None)
            .unwrap();
        assert_eq!(result.record.final_score, 80);
        assert_eq!(result.outcome, CalibrationOutcome::WithinTolerance { average: 70.0 });
        assert_eq!(result.record.verdict, "Solid buy");
    }

    #[test]
    fn malformed_output_persists_nothing() {
        let eval = evaluator(MemoryStore::new());
        let err = eval.evaluate("Sorry, I can't help with that.", None).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Extraction(ExtractionError::MalformedOutput { .. })
        ));
        assert!(eval.history(None).unwrap().is_empty());
    }

    #[test]
    fn missing_identity_persists_nothing() {
        let eval = evaluator(MemoryStore::new());
        let err = eval
            .evaluate(r#"{"brand": "Toyota", "deal_score": 70}"#, None)
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Extraction(ExtractionError::MissingRequiredField { field: "model" })
        ));
        assert!(eval.history(None).unwrap().is_empty());
    }

    #[test]
    fn corrupt_history_skips_calibration() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("history.jsonl");
        std::fs::write(&path, "{not json\n").unwrap();

        let eval = evaluator(JsonlStore::open(&path));
        let result = eval.evaluate(&response("Toyota", "Corolla", 78), Some("ad")).unwrap();
        assert_eq!(result.record.final_score, 80);
        assert!(result.outcome.is_skipped());
        assert!(result.history_error.is_some());
        assert!(!result.persisted);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json\n");
        assert!(matches!(
            eval.history(None),
            Err(EvaluationError::HistoryUnavailable(StoreError::Corrupt { line: 1, .. }))
        ));
    }

    #[test]
    fn failed_append_keeps_calibrated_result() {
        let store = ReadOnly(MemoryStore::with_entries(vec![entry("Toyota", "Corolla", 60, None)]));
        let result = evaluator(store)
            .evaluate(&response("Toyota", "Corolla", 78), None)
            .unwrap();
        assert_eq!(result.record.final_score, 70);
        assert!(!result.persisted);
        assert!(result.history_error.unwrap().contains("read-only"));
        assert!(result.trend.is_empty());
    }

    #[test]
    fn repeated_volatile_ad_raises_signal() {
        let ad = "Mazda 3 2019, 85,000 km, one owner, garage kept";
        let eval = evaluator(MemoryStore::new());
        let fp = eval.calibrator().fingerprint(ad).unwrap();
        for score in [60u8, 75, 68] {
            eval.store()
                .append(entry("Mazda", "3", score, Some(&fp)))
                .unwrap();
        }

        let result = eval.evaluate(&response("Mazda", "3", 50), Some(ad)).unwrap();
        let signal = result.consistency.unwrap();
        assert_eq!(signal.scores, vec![60, 75, 68]);
        assert_eq!(signal.target_range, (63, 73));
        assert_eq!(result.fingerprint.as_deref(), Some(fp.as_str()));
        // Advisory only.
        assert_ne!(result.record.final_score, 68);

        let stored = eval.history(None).unwrap();
        assert_eq!(stored.last().unwrap().fingerprint.as_deref(), Some(fp.as_str()));
    }

    #[test]
    fn evaluate_with_passes_target_range_to_generator() {
        let ad = "Kia Picanto 2021, 30,000 km";
        let eval = evaluator(MemoryStore::new());
        let fp = eval.calibrator().fingerprint(ad).unwrap();
        for score in [40u8, 70, 55] {
            eval.store()
                .append(entry("Kia", "Picanto", score, Some(&fp)))
                .unwrap();
        }

        let seen = Arc::new(Mutex::new(None));
        let seen_in = Arc::clone(&seen);
        let generator = move |req: &GenerationRequest| -> Result<String, GenerationError> {
            *seen_in.lock().unwrap() = Some(req.clone());
            Ok(response("Kia", "Picanto", 60))
        };

        let result = eval.evaluate_with(&generator, ad, vec![]).unwrap();
        let request = seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.mode, ExtractionMode::Compact);
        assert_eq!(request.target_range, Some((50, 60)));
        assert_eq!(request.historical_scores, vec![40, 70, 55]);
        assert!(result.persisted);
        assert_eq!(eval.history(None).unwrap().len(), 4);
    }

    #[test]
    fn evaluate_with_static_response() {
        let eval = evaluator(MemoryStore::new());
        let result = eval
            .evaluate_with(&StaticResponse(response("Seat", "Leon", 78)), "Seat Leon ad", vec![])
            .unwrap();
        assert_eq!(result.record.final_score, 80);
        assert!(result.fingerprint.is_some());
    }

    #[test]
    fn generator_failure_is_an_error() {
        let eval = evaluator(MemoryStore::new());
        let failing = |_: &GenerationRequest| -> Result<String, GenerationError> {
            Err(GenerationError::Timeout)
        };
        let err = eval.evaluate_with(&failing, "ad", vec![]).unwrap_err();
        assert!(matches!(err, EvaluationError::Generation(GenerationError::Timeout)));
    }

    #[test]
    fn unlabelled_output_is_classified_from_score() {
        let raw = r#"{"brand": "Fiat", "model": "500", "deal_score": 20, "classification": "???"}"#;
        let result = evaluator(MemoryStore::new()).evaluate(raw, None).unwrap();
        // No market data: rule 70, blend 0.7*70 + 0.3*20 = 55
        assert_eq!(result.record.final_score, 55);
        assert_eq!(result.record.classification, Classification::FairDeal);
    }

    #[test]
    fn disabled_policies() {
        let config = EngineConfig {
            mode: ExtractionMode::Compact,
            calibration: CalibrationConfig {
                model_average: false,
                consistency: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let store = MemoryStore::with_entries(vec![entry("Toyota", "Corolla", 10, None)]);
        let eval = Evaluator::new(config, store).unwrap().with_current_year(YEAR);
        let result = eval.evaluate(&response("Toyota", "Corolla", 78), Some("ad")).unwrap();
        assert_eq!(result.record.final_score, 80);
        assert!(result.outcome.is_skipped());
        assert!(result.history_error.is_none());
        assert!(result.persisted);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = compact();
        config.calibration.fingerprint_chars = 0;
        assert!(matches!(
            Evaluator::new(config, MemoryStore::new()),
            Err(EvaluationError::Config(_))
        ));
    }

    #[test]
    fn n_evaluations_append_n_entries_in_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let eval = evaluator(JsonlStore::open(tmp.path().join("h.jsonl")));
        for (model, ai) in [("Octavia", 78u8), ("Fabia", 40), ("Superb", 90)] {
            eval.evaluate(&response("Skoda", model, ai), None).unwrap();
        }
        let models: Vec<String> = eval
            .history(None)
            .unwrap()
            .iter()
            .map(|e| e.model().to_string())
            .collect();
        assert_eq!(models, vec!["Octavia", "Fabia", "Superb"]);
    }

    #[test]
    fn concurrent_evaluations_see_each_other() {
        const N: usize = 6;
        let tmp = tempfile::TempDir::new().unwrap();
        let eval = evaluator(JsonlStore::open(tmp.path().join("h.jsonl")));

        let outcomes: Vec<CalibrationOutcome> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..N)
                .map(|_| s.spawn(|| eval.evaluate(&response("Kia", "Sportage", 78), None).unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().outcome)
                .collect()
        });

        assert_eq!(eval.history(None).unwrap().len(), N);
        let first = outcomes
            .iter()
            .filter(|o| **o == CalibrationOutcome::NoHistory)
            .count();
        assert_eq!(first, 1);
        assert!(
            outcomes
                .iter()
                .filter(|o| **o != CalibrationOutcome::NoHistory)
                .all(|o| *o == CalibrationOutcome::WithinTolerance { average: 80.0 })
        );
    }

    /// JSONL store whose reads take long enough for another evaluator to
    /// interleave.
    struct SlowReads(JsonlStore);

    impl HistoryStore for SlowReads {
        fn append(&mut self, entry: HistoryEntry) -> Result<(), StoreError> {
            self.0.append(entry)
        }

        fn all(&self) -> Result<Vec<HistoryEntry>, StoreError> {
            std::thread::sleep(std::time::Duration::from_millis(100));
            self.0.all()
        }

        fn exclusive(&self) -> dealcheck_store::HistoryLock {
            self.0.exclusive()
        }
    }

    #[test]
    fn separate_evaluators_on_one_file_take_turns() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("h.jsonl");
        let a = evaluator(SlowReads(JsonlStore::open(&path)));
        let b = evaluator(SlowReads(JsonlStore::open(&path)));

        // Working scores 87 and 57: whichever runs second is pulled to 72.
        let (ra, rb) = std::thread::scope(|s| {
            let ha = s.spawn(|| a.evaluate(&response("Honda", "Civic", 100), None).unwrap());
            let hb = s.spawn(|| b.evaluate(&response("Honda", "Civic", 0), None).unwrap());
            (ha.join().unwrap(), hb.join().unwrap())
        });
        assert_eq!(ra.blended.working_score, 87);
        assert_eq!(rb.blended.working_score, 57);

        let (earlier, later) = if ra.outcome == CalibrationOutcome::NoHistory {
            (ra, rb)
        } else {
            (rb, ra)
        };
        assert_eq!(earlier.outcome, CalibrationOutcome::NoHistory);
        assert_eq!(later.record.final_score, 72);
        assert!(matches!(later.outcome, CalibrationOutcome::Corrected { to: 72, .. }));
        assert_eq!(a.history(None).unwrap().len(), 2);
    }

    #[test]
    fn evaluation_serialises() {
        let result = evaluator(MemoryStore::new())
            .evaluate(&response("Toyota", "Corolla", 78), None)
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"]["kind"], "no_history");
        assert_eq!(json["record"]["final_score"], 80);
    }
}
