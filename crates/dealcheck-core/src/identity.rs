//! Identity keys used to group evaluations of "the same" vehicle.
//!
//! Two granularities:
//!
//! - [`BrandModelKey`]: coarse. Exact brand plus a model name that later
//!   queries match as a substring, so trim and variant suffixes
//!   ("Corolla" vs "Corolla Hybrid") land in one group.
//! - [`fingerprint`]: fine. A hash of the first N characters of the ad text
//!   after normalisation, so re-pasting the same ad yields the same key
//!   regardless of case or whitespace noise.

use sha2::{Digest, Sha256};

/// Default number of normalised characters hashed into a fingerprint.
pub const DEFAULT_FINGERPRINT_CHARS: usize = 80;

/// Coarse identity: brand (exact) and model (substring).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrandModelKey {
    pub brand: String,
    pub model: String,
}

impl BrandModelKey {
    pub fn new(brand: &str, model: &str) -> Self {
        Self {
            brand: brand.trim().to_string(),
            model: model.trim().to_string(),
        }
    }

    /// Both halves are required for calibration and persistence.
    pub fn is_complete(&self) -> bool {
        !self.brand.is_empty() && !self.model.is_empty()
    }
}

impl std::fmt::Display for BrandModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.brand, self.model)
    }
}

/// Normalise ad text for fingerprinting.
///
/// Lower-cases, trims, and collapses every run of whitespace (including
/// newlines and tabs) into a single space. Unicode bidi marks are dropped so
/// that the same Hebrew ad pasted from different sources keys identically.
pub fn normalize_ad_text(text: &str) -> String {
    text.chars()
        .filter(|c| !is_bidi_control(*c))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fingerprint the first `prefix_chars` characters of the normalised ad.
///
/// Returns lowercase hex SHA-256, or `None` when the text normalises to
/// nothing (no ad text means no fine-grained identity).
pub fn fingerprint(ad_text: &str, prefix_chars: usize) -> Option<String> {
    let normalized = normalize_ad_text(ad_text);
    if normalized.is_empty() {
        return None;
    }
    let prefix: String = normalized.chars().take(prefix_chars).collect();
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    Some(format!("{:x}", hasher.finalize()))
}

/// LRM/RLM, ALM, the embedding/override controls and the isolates.
pub fn is_bidi_control(c: char) -> bool {
    matches!(
        c,
        '\u{200E}' | '\u{200F}' | '\u{061C}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}'
    )
}
