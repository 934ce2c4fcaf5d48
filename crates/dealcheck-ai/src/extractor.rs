//! Recover a JSON object from free-form model output.
//!
//! Four stages, each tried only when the previous one did not yield an
//! object:
//!
//! 1. [`Direct`](ExtractionStage::Direct): parse as-is.
//! 2. [`Unwrapped`](ExtractionStage::Unwrapped): strip code fences and a
//!    BOM, flatten line breaks, turn typographic quotes used as string
//!    delimiters into `"`. String contents are left as they are.
//! 3. [`BraceSpan`](ExtractionStage::BraceSpan): parse only the span from the
//!    first `{` to the last `}`.
//! 4. [`Repaired`](ExtractionStage::Repaired): run [`repair_json`] and parse.

use std::sync::LazyLock;

use dealcheck_core::{EngineConfig, ExtractionMode};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ExtractionError;
use crate::repair::repair_json;
use crate::response::ExtractedEvaluation;

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^```[\w-]*").expect("static regex"));

/// Which stage produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    Direct,
    Unwrapped,
    BraceSpan,
    Repaired,
}

impl ExtractionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Unwrapped => "unwrapped",
            Self::BraceSpan => "brace_span",
            Self::Repaired => "repaired",
        }
    }
}

/// Find the JSON object in `raw`.
pub fn extract_object(raw: &str) -> Result<(Map<String, Value>, ExtractionStage), ExtractionError> {
    if let Some(obj) = parse_object(raw) {
        return Ok((obj, ExtractionStage::Direct));
    }

    let unwrapped = unwrap(raw);
    if let Some(obj) = parse_object(&unwrapped) {
        return Ok((obj, ExtractionStage::Unwrapped));
    }

    if let Some(span) = brace_span(&unwrapped)
        && let Some(obj) = parse_object(span)
    {
        return Ok((obj, ExtractionStage::BraceSpan));
    }

    if let Some(obj) = parse_object(&repair_json(&unwrapped)) {
        return Ok((obj, ExtractionStage::Repaired));
    }

    Err(ExtractionError::MalformedOutput {
        raw: raw.to_string(),
    })
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Stage 2 normalisation. Hebrew geresh/gershayim are left alone.
fn unwrap(raw: &str) -> String {
    let text = raw.trim_start_matches('\u{FEFF}');
    let mut out = String::with_capacity(text.len());
    // Inside a string: `Some(true)` when it was opened by a typographic quote.
    let mut open: Option<bool> = None;
    let mut escaped = false;
    let mut i = 0;
    while let Some(c) = text[i..].chars().next() {
        if open.is_none()
            && let Some(fence) = FENCE.find(&text[i..])
        {
            i += fence.end();
            continue;
        }
        i += c.len_utf8();
        let c = if matches!(c, '\r' | '\n') { ' ' } else { c };
        match open {
            None if c == '"' => {
                open = Some(false);
                out.push('"');
            }
            None if is_typographic_quote(c) => {
                open = Some(true);
                out.push('"');
            }
            None => out.push(c),
            Some(_) if escaped => {
                escaped = false;
                out.push(c);
            }
            Some(_) if c == '\\' => {
                escaped = true;
                out.push(c);
            }
            Some(false) if c == '"' => {
                open = None;
                out.push('"');
            }
            Some(true) if is_typographic_quote(c) => {
                open = None;
                out.push('"');
            }
            Some(true) if c == '"' => out.push_str("\\\""),
            Some(_) => out.push(c),
        }
    }
    out
}

fn is_typographic_quote(c: char) -> bool {
    matches!(c, '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}')
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Turns raw model output into an [`ExtractedEvaluation`] for one mode.
#[derive(Debug, Clone)]
pub struct Extractor {
    mode: ExtractionMode,
    default_confidence: f64,
}

impl Extractor {
    pub fn new(mode: ExtractionMode) -> Self {
        Self {
            mode,
            default_confidence: EngineConfig::default().default_ai_confidence,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            mode: config.mode,
            default_confidence: config.default_ai_confidence,
        }
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn extract(&self, raw: &str) -> Result<ExtractedEvaluation, ExtractionError> {
        let (obj, stage) = extract_object(raw)?;
        debug!(stage = stage.as_str(), mode = self.mode.as_str(), "extracted model output");
        ExtractedEvaluation::from_object(&obj, self.mode, self.default_confidence)
    }
}
