use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dealcheck_core::{EngineConfig, ExtractionMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// One JSON object per line, append-only
    Jsonl,
    /// DuckDB database file (needs the `duckdb` feature)
    Duckdb,
}

#[derive(Parser, Debug)]
#[command(name = "dealcheck")]
#[command(about = "Used-vehicle deal scoring with historical calibration", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Score history location
    #[arg(long, global = true, env = "DEALCHECK_HISTORY", default_value = "data_history.jsonl")]
    pub history: PathBuf,

    /// Score history backend
    #[arg(long, global = true, value_enum, env = "DEALCHECK_BACKEND", default_value = "jsonl")]
    pub backend: Backend,

    /// Minimum gap to the model average that triggers a correction
    #[arg(long, global = true, env = "DEALCHECK_CORRECTION_THRESHOLD")]
    pub correction_threshold: Option<f64>,

    /// Score spread above which repeated evaluations of one ad are flagged
    #[arg(long, global = true, env = "DEALCHECK_SPREAD_THRESHOLD")]
    pub spread_threshold: Option<u8>,

    /// Emit JSON instead of a card
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score saved model output and file it in the history
    Evaluate {
        /// File with the model's response, or `-` for stdin
        #[arg(long)]
        response: PathBuf,

        /// Original ad text, for the consistency check
        #[arg(long)]
        ad: Option<PathBuf>,

        /// Response schema the model was asked for
        #[arg(long, default_value = "rich")]
        mode: ExtractionMode,
    },

    /// Rule-based score with its term breakdown
    Score {
        /// Market price estimate
        #[arg(long)]
        market: Option<f64>,

        /// Advertised price
        #[arg(long)]
        price: Option<f64>,

        /// Odometer reading in km
        #[arg(long)]
        mileage: Option<f64>,

        /// Model year
        #[arg(long)]
        year: Option<i32>,

        /// Vehicle was a taxi
        #[arg(long)]
        taxi: bool,

        /// Sold by a dealer rather than a private owner
        #[arg(long)]
        dealer: bool,
    },

    /// List history entries
    History {
        /// Exact brand
        #[arg(long, requires = "model")]
        brand: Option<String>,

        /// Model name (substring match)
        #[arg(long, requires = "brand")]
        model: Option<String>,

        /// Show only the N most recent entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check earlier evaluations of an ad for volatile scores
    Consistency {
        /// Ad text file
        #[arg(long)]
        ad: PathBuf,
    },
}

impl Cli {
    /// Engine configuration from defaults plus any threshold overrides.
    pub fn engine_config(&self, mode: ExtractionMode) -> EngineConfig {
        let mut config = EngineConfig {
            mode,
            ..Default::default()
        };
        if let Some(threshold) = self.correction_threshold {
            config.calibration.correction_threshold = threshold;
        }
        if let Some(spread) = self.spread_threshold {
            config.calibration.spread_threshold = spread;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_defaults() {
        let cli = Cli::try_parse_from(["dealcheck", "evaluate", "--response", "-"]).unwrap();
        assert_eq!(cli.backend, Backend::Jsonl);
        assert!(!cli.json);
        match cli.command {
            Commands::Evaluate { response, ad, mode } => {
                assert_eq!(response, PathBuf::from("-"));
                assert_eq!(ad, None);
                assert_eq!(mode, ExtractionMode::Rich);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dealcheck",
            "evaluate",
            "--response",
            "out.txt",
            "--mode",
            "compact",
            "--history",
            "/tmp/h.jsonl",
            "--correction-threshold",
            "20",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.history, PathBuf::from("/tmp/h.jsonl"));
        let config = cli.engine_config(ExtractionMode::Compact);
        assert_eq!(config.calibration.correction_threshold, 20.0);
        assert_eq!(config.calibration.spread_threshold, 12);
        assert_eq!(config.mode, ExtractionMode::Compact);
    }

    #[test]
    fn history_filter_needs_both_halves() {
        assert!(Cli::try_parse_from(["dealcheck", "history", "--brand", "Kia"]).is_err());
        assert!(
            Cli::try_parse_from(["dealcheck", "history", "--brand", "Kia", "--model", "Rio"])
                .is_ok()
        );
    }

    #[test]
    fn score_flags() {
        let cli = Cli::try_parse_from([
            "dealcheck", "score", "--market", "100000", "--price", "80000", "--taxi",
        ])
        .unwrap();
        match cli.command {
            Commands::Score {
                market,
                price,
                taxi,
                dealer,
                ..
            } => {
                assert_eq!(market, Some(100_000.0));
                assert_eq!(price, Some(80_000.0));
                assert!(taxi);
                assert!(!dealer);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
