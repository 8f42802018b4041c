//! Currency and unit scale from a table header line such as
//! `Financial Highlights (in KRW bn)`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInfo {
    /// ISO-style three-letter code, upper-cased.
    pub currency: Option<String>,
    /// Scale word (`bn`, `mn`, `thousands`, …), lower-cased.
    pub unit: Option<String>,
}

static RE_IN_CURRENCY_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bin\s+([A-Z]{3})\s+(\w+)").unwrap());

/// Extract `in {CCY} {unit}` from a header line. No match leaves both unset.
pub fn infer_header(line: &str) -> HeaderInfo {
    match RE_IN_CURRENCY_UNIT.captures(line) {
        Some(caps) => HeaderInfo {
            currency: Some(caps[1].to_uppercase()),
            unit: Some(caps[2].to_lowercase()),
        },
        None => HeaderInfo::default(),
    }
}
