//! Core types shared by every Deal Checker layer: listing and market facts,
//! score records, identity keys, the Arrow history schema and engine config.

pub mod config;
pub mod identity;
pub mod listing;
pub mod record;
pub mod schema;

pub use config::{CalibrationConfig, ConfigError, EngineConfig, ExtractionMode};
pub use identity::{BrandModelKey, fingerprint, normalize_ad_text};
pub use listing::{
    ConditionAlignment, CrossAnalysis, DemandLevel, ListingFacts, MarketFacts, PriceAlignment,
    UserInfo,
};
pub use record::{Classification, HistoryEntry, ScoreBand, ScoreRecord, clamp_score};
pub use schema::{SchemaError, entries_from_batches, entries_to_batch, history_schema};
