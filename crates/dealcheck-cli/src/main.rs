mod cli;
mod display;

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::{Datelike, Local};
use clap::Parser;
use dealcheck_ai::{FALLBACK_SCORE, RuleInputs};
use dealcheck_core::ExtractionMode;
use dealcheck_engine::Evaluator;
use dealcheck_store::{HistoryStore, JsonlStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Backend, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    tracing::debug!("dealcheck v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    match &cli.command {
        Commands::Evaluate { response, ad, mode } => {
            let raw = read_input(response)?;
            let ad_text = ad.as_deref().map(read_input).transpose()?;
            let evaluator = evaluator(&cli, *mode)?;
            let evaluation = evaluator
                .evaluate(&raw, ad_text.as_deref())
                .context("evaluation failed")?;
            if let Some(err) = &evaluation.history_error {
                tracing::warn!(error = %err, "score was not calibrated or not saved");
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&evaluation)?);
            } else {
                print!("{}", display::evaluation_card(&evaluation));
            }
        }

        Commands::Score {
            market,
            price,
            mileage,
            year,
            taxi,
            dealer,
        } => {
            let inputs = RuleInputs {
                market_price: *market,
                ad_price: *price,
                mileage_km: *mileage,
                model_year: *year,
                is_taxi: *taxi,
                is_private: !*dealer,
            };
            match inputs.breakdown_at(Local::now().year()) {
                Ok(breakdown) if cli.json => {
                    println!("{}", serde_json::to_string_pretty(&breakdown)?)
                }
                Ok(breakdown) => print!("{}", display::breakdown_card(&breakdown)),
                Err(e) if cli.json => println!(
                    "{}",
                    serde_json::json!({ "score": FALLBACK_SCORE, "fallback": e.to_string() })
                ),
                Err(e) => print!("{}", display::fallback_card(FALLBACK_SCORE, &e.to_string())),
            }
        }

        Commands::History {
            brand,
            model,
            limit,
        } => {
            let evaluator = evaluator(&cli, ExtractionMode::default())?;
            let filter = brand.as_deref().zip(model.as_deref());
            let mut entries = evaluator
                .history(filter)
                .with_context(|| format!("could not read {}", cli.history.display()))?;
            if let Some(limit) = limit {
                let skip = entries.len().saturating_sub(*limit);
                entries.drain(..skip);
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("{}", display::history_table(&entries)?);
            }
        }

        Commands::Consistency { ad } => {
            let ad_text = read_input(ad)?;
            let evaluator = evaluator(&cli, ExtractionMode::default())?;
            let signal = evaluator
                .consistency(&ad_text)
                .with_context(|| format!("could not read {}", cli.history.display()))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&signal)?);
            } else {
                print!("{}", display::consistency_card(signal.as_ref()));
            }
        }
    }

    Ok(())
}

fn evaluator(cli: &Cli, mode: ExtractionMode) -> anyhow::Result<Evaluator> {
    let store = open_store(cli.backend, &cli.history)?;
    Evaluator::new(cli.engine_config(mode), store).context("invalid calibration settings")
}

fn open_store(backend: Backend, path: &Path) -> anyhow::Result<Box<dyn HistoryStore>> {
    match backend {
        Backend::Jsonl => Ok(Box::new(JsonlStore::open(path))),
        #[cfg(feature = "duckdb")]
        Backend::Duckdb => {
            let store = dealcheck_store::DuckStore::open_persistent(path)
                .with_context(|| format!("could not open {}", path.display()))?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "duckdb"))]
        Backend::Duckdb => anyhow::bail!("this build has no DuckDB support; rebuild with --features duckdb"),
    }
}

/// Read a file, or stdin for `-`.
fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("could not read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))
}
