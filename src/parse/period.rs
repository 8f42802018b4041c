//! Fiscal-period inference from table column labels.
//!
//! Column headers in PE portfolio reports look like `Dec-24 YTD Actual`,
//! `FY2023 Actual` or `Variance`. Two patterns are recognised, tried in the
//! order of [`PERIOD_RULES`]; anything else leaves the period unset.

use crate::types::PeriodKind;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Two-digit years at or above this value are read as 19xx, below as 20xx.
pub const DEFAULT_CENTURY_PIVOT: u8 = 70;

/// Period facts inferred from a column label. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodInfo {
    pub year: Option<i32>,
    pub kind: Option<PeriodKind>,
    pub period_label: Option<String>,
}

impl PeriodInfo {
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.kind.is_none() && self.period_label.is_none()
    }
}

type PeriodBuilder = fn(&Captures<'_>, u8) -> Option<PeriodInfo>;

/// Ordered period rules; the first pattern that matches wins.
pub static PERIOD_RULES: Lazy<Vec<(Regex, PeriodBuilder)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(?i)Dec-?([0-9]{2})\s*YTD").unwrap(),
            build_ytd as PeriodBuilder,
        ),
        (
            Regex::new(r"(?i)FY\s*([0-9]{4})").unwrap(),
            build_fiscal_year as PeriodBuilder,
        ),
    ]
});

/// Infer the period of a column label with the default century pivot.
///
/// ```
/// use fin_extract::parse::infer_period;
/// use fin_extract::PeriodKind;
///
/// let p = infer_period("Dec-24 YTD Actual");
/// assert_eq!(p.year, Some(2024));
/// assert_eq!(p.kind, Some(PeriodKind::Ytd));
/// assert_eq!(p.period_label.as_deref(), Some("Dec-24"));
/// ```
pub fn infer_period(label: &str) -> PeriodInfo {
    infer_period_with_pivot(label, DEFAULT_CENTURY_PIVOT)
}

/// Like [`infer_period`] with an explicit century pivot for two-digit years.
pub fn infer_period_with_pivot(label: &str, pivot: u8) -> PeriodInfo {
    PERIOD_RULES
        .iter()
        .find_map(|(re, build)| re.captures(label).and_then(|caps| build(&caps, pivot)))
        .unwrap_or_default()
}

fn build_ytd(caps: &Captures<'_>, pivot: u8) -> Option<PeriodInfo> {
    let yy_text = caps.get(1)?.as_str();
    let yy: i32 = yy_text.parse().ok()?;
    let year = if yy >= i32::from(pivot) { 1900 + yy } else { 2000 + yy };
    Some(PeriodInfo {
        year: Some(year),
        kind: Some(PeriodKind::Ytd),
        period_label: Some(format!("Dec-{yy_text}")),
    })
}

fn build_fiscal_year(caps: &Captures<'_>, _pivot: u8) -> Option<PeriodInfo> {
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    Some(PeriodInfo {
        year: Some(year),
        kind: Some(PeriodKind::Fy),
        period_label: Some(format!("FY{year}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dec_ytd() {
        assert_eq!(
            infer_period("Dec-24 YTD Actual"),
            PeriodInfo {
                year: Some(2024),
                kind: Some(PeriodKind::Ytd),
                period_label: Some("Dec-24".into()),
            }
        );
    }

    #[test]
    fn test_dec_ytd_without_hyphen_and_lowercase() {
        let p = infer_period("dec23 ytd budget");
        assert_eq!(p.year, Some(2023));
        assert_eq!(p.period_label.as_deref(), Some("Dec-23"));
    }

    #[test]
    fn test_century_pivot() {
        assert_eq!(infer_period("Dec-70 YTD").year, Some(1970));
        assert_eq!(infer_period("Dec-69 YTD").year, Some(2069));
        assert_eq!(infer_period("Dec-05 YTD").period_label.as_deref(), Some("Dec-05"));
        assert_eq!(infer_period_with_pivot("Dec-69 YTD", 50).year, Some(1969));
    }

    #[test]
    fn test_fiscal_year() {
        assert_eq!(
            infer_period("FY2023 Actual"),
            PeriodInfo {
                year: Some(2023),
                kind: Some(PeriodKind::Fy),
                period_label: Some("FY2023".into()),
            }
        );
        assert_eq!(infer_period("fy 2022 Budget").period_label.as_deref(), Some("FY2022"));
    }

    #[test]
    fn test_no_match() {
        let p = infer_period("Q1 Actual");
        assert!(p.is_empty());
        assert_eq!(p, PeriodInfo::default());
    }

    #[test]
    fn test_ytd_rule_wins_over_fy() {
        let p = infer_period("Dec-24 YTD vs FY2023");
        assert_eq!(p.kind, Some(PeriodKind::Ytd));
        assert_eq!(p.year, Some(2024));
    }
}
