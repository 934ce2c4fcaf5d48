//! Vertical card display for evaluations, rule breakdowns and history.
//!
//! Cards are grouped into sections; a section whose rows are all empty is
//! left out entirely.

use std::fmt;

use arrow::util::pretty::pretty_format_batches;
use dealcheck_ai::RuleBreakdown;
use dealcheck_core::{HistoryEntry, ScoreBand, entries_to_batch};
use dealcheck_engine::{CalibrationOutcome, ConsistencySignal, Evaluation};

const MAX_LIST_ITEMS: usize = 10;

/// History table columns, everything but the record JSON.
const HISTORY_COLUMNS: &[usize] = &[0, 1, 3, 4, 5, 6, 7, 8];

#[derive(Default)]
struct Card {
    lines: Vec<String>,
}

impl Card {
    fn title(&mut self, title: &str, subtitle: &str) {
        self.lines.push(format!("=== {title} ==="));
        if !subtitle.is_empty() {
            self.lines.push(subtitle.to_string());
        }
        self.lines.push(String::new());
    }

    fn section(&mut self, header: &str, rows: &[(&str, Option<String>)]) {
        if rows.iter().all(|(_, v)| v.is_none()) {
            return;
        }
        self.lines.push(header.to_string());
        for (label, value) in rows {
            if let Some(value) = value {
                self.lines.push(format!("  {label:<26} {value}"));
            }
        }
        self.lines.push(String::new());
    }

    fn list(&mut self, header: &str, items: &[String]) {
        if items.is_empty() {
            return;
        }
        self.lines.push(header.to_string());
        for item in items.iter().take(MAX_LIST_ITEMS) {
            self.lines.push(format!("  - {item}"));
        }
        if items.len() > MAX_LIST_ITEMS {
            self.lines
                .push(format!("    ... and {} more", items.len() - MAX_LIST_ITEMS));
        }
        self.lines.push(String::new());
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

fn band(score: u8) -> &'static str {
    match ScoreBand::for_score(score) {
        ScoreBand::Green => "GREEN",
        ScoreBand::Amber => "AMBER",
        ScoreBand::Red => "RED",
    }
}

fn opt<T: fmt::Display>(value: Option<T>) -> Option<String> {
    value.map(|v| v.to_string())
}

/// One character per score, lowest to highest.
fn sparkline(scores: &[u8]) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    scores
        .iter()
        .map(|s| BARS[(usize::from(*s) * (BARS.len() - 1)) / 100])
        .collect()
}

fn calibration_row(outcome: &CalibrationOutcome) -> String {
    match outcome {
        CalibrationOutcome::Corrected { average, from, to } => {
            format!("corrected {from} -> {to} (model average {average})")
        }
        CalibrationOutcome::WithinTolerance { average } => {
            format!("within tolerance of model average {average}")
        }
        CalibrationOutcome::NoHistory => "no earlier evaluations of this model".into(),
        CalibrationOutcome::Skipped { reason } => format!("skipped: {reason}"),
    }
}

fn consistency_rows(card: &mut Card, signal: &ConsistencySignal) {
    let scores: Vec<String> = signal.scores.iter().map(u8::to_string).collect();
    card.section(
        "Consistency",
        &[
            ("earlier scores", Some(scores.join(", "))),
            ("mean", Some(format!("{:.1}", signal.mean))),
            ("spread", Some(signal.spread.to_string())),
            (
                "target range",
                Some(format!("{}-{}", signal.target_range.0, signal.target_range.1)),
            ),
        ],
    );
}

pub fn evaluation_card(eval: &Evaluation) -> String {
    let r = &eval.record;
    let l = &r.listing;
    let m = &r.market;
    let c = &r.cross_analysis;
    let u = &r.user_info;

    let mut card = Card::default();
    card.title(
        &format!(
            "{} {}/100 [{}] {}",
            r.brand_model(),
            r.final_score,
            band(r.final_score),
            r.classification.label()
        ),
        &r.verdict,
    );

    card.section(
        "Scores",
        &[
            (
                "ai",
                Some(format!(
                    "{} ({:.0}% confidence)",
                    r.ai_score,
                    r.ai_confidence * 100.0
                )),
            ),
            ("rule", Some(r.rule_score.to_string())),
            ("blended", Some(eval.blended.working_score.to_string())),
            ("calibration", Some(calibration_row(&eval.outcome))),
        ],
    );

    card.section(
        "From the ad",
        &[
            ("year", opt(l.year)),
            ("mileage_km", opt(l.mileage_km)),
            ("price", opt(l.price)),
            ("taxi", Some(l.is_taxi.to_string())),
            ("private owner", Some(l.is_private.to_string())),
        ],
    );
    card.list("Ad claims", &l.claims);

    card.section(
        "Market",
        &[
            ("market estimate", opt(m.market_estimate)),
            ("reliability", opt(m.reliability_score)),
            ("avg maintenance cost", opt(m.avg_maintenance_cost)),
            ("demand", m.demand_level.map(|d| d.as_str().to_string())),
        ],
    );
    card.list("Known issues", &m.known_issues);

    card.section(
        "Cross analysis",
        &[
            ("price alignment", c.price_alignment.map(|p| p.as_str().to_string())),
            (
                "condition alignment",
                c.condition_alignment.map(|p| p.as_str().to_string()),
            ),
        ],
    );
    card.list("Key differences", &c.key_differences);
    card.list("Key reasons", &r.key_reasons);

    card.section(
        "About this model",
        &[
            ("reliability", u.reliability_summary.clone()),
            ("market context", u.market_context.clone()),
        ],
    );
    card.list("Common faults", &u.common_faults);
    card.list("Maintenance tips", &u.maintenance_tips);

    if let Some(signal) = &eval.consistency {
        consistency_rows(&mut card, signal);
    }

    let trend: Vec<String> = eval.trend.iter().map(u8::to_string).collect();
    card.section(
        "History",
        &[
            ("persisted", Some(eval.persisted.to_string())),
            ("error", eval.history_error.clone()),
            (
                "trend",
                (eval.trend.len() >= 2)
                    .then(|| format!("{} {}", sparkline(&eval.trend), trend.join(" "))),
            ),
        ],
    );

    card.to_string()
}

pub fn breakdown_card(breakdown: &RuleBreakdown) -> String {
    let mut card = Card::default();
    card.title(
        &format!("rule score {}/100 [{}]", breakdown.score, band(breakdown.score)),
        "",
    );
    card.section(
        "Terms",
        &[
            ("baseline", Some(format!("{:+.2}", breakdown.baseline))),
            ("price vs market", Some(format!("{:+.2}", breakdown.price_adjustment))),
            ("mileage", Some(format!("{:+.2}", -breakdown.mileage_penalty))),
            ("ownership", Some(format!("{:+.2}", -breakdown.ownership_penalty))),
            ("age", Some(format!("{:+.2}", -breakdown.age_penalty))),
            ("raw", Some(format!("{:.2}", breakdown.raw))),
        ],
    );
    card.to_string()
}

pub fn fallback_card(score: u8, reason: &str) -> String {
    let mut card = Card::default();
    card.title(&format!("rule score {score}/100 (fallback)"), reason);
    card.to_string()
}

pub fn consistency_card(signal: Option<&ConsistencySignal>) -> String {
    let mut card = Card::default();
    match signal {
        Some(signal) => {
            card.title("inconsistent scores", "earlier evaluations of this ad disagree");
            consistency_rows(&mut card, signal);
        }
        None => card.title("consistent", "no volatile history for this ad"),
    }
    card.to_string()
}

pub fn history_table(entries: &[HistoryEntry]) -> anyhow::Result<String> {
    if entries.is_empty() {
        return Ok("(no history)".into());
    }
    let batch = entries_to_batch(entries)?.project(HISTORY_COLUMNS)?;
    Ok(pretty_format_batches(&[batch])?.to_string())
}
