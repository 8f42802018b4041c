//! Numeric, percentage and identifier parsing for raw table cells.
//!
//! Financial tables print negative numbers in parentheses, so `(45.2)` means
//! `-45.2`. A leading minus sign is honoured too. The two conventions are not
//! cumulative: `-(5)` is still `-5`.

use once_cell::sync::Lazy;
use regex::Regex;

/// A value recovered from free text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedValue {
    /// The numeral was followed by a percent sign.
    Percentage(f64),
    /// A bare numeral.
    Number(f64),
}

impl ParsedValue {
    pub fn value(self) -> f64 {
        match self {
            ParsedValue::Percentage(v) | ParsedValue::Number(v) => v,
        }
    }

    pub fn is_percentage(self) -> bool {
        matches!(self, ParsedValue::Percentage(_))
    }
}

type ValueRule = fn(&str) -> Option<ParsedValue>;

/// Ordered value rules. Percentage must come first: a percent string also
/// contains a bare number.
pub const VALUE_RULES: &[(&str, ValueRule)] = &[
    ("percentage", percentage_rule as ValueRule),
    ("numeric", numeric_rule as ValueRule),
];

fn percentage_rule(text: &str) -> Option<ParsedValue> {
    parse_percentage(text).map(ParsedValue::Percentage)
}

fn numeric_rule(text: &str) -> Option<ParsedValue> {
    parse_numeric(text).map(ParsedValue::Number)
}

// ── Canonical keys ───────────────────────────────────────────────────────────

static RE_NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Turn a free-text label into a snake_case identifier.
///
/// `"Net Revenue (USD)"` becomes `"net_revenue_usd"`. Symbol-only input
/// yields an empty string. Applying the function twice gives the same result
/// as applying it once.
pub fn to_canonical_key(label: &str) -> String {
    let lower = label.to_lowercase();
    let spaced = RE_NON_ALNUM.replace_all(&lower, " ");
    RE_WHITESPACE.replace_all(spaced.trim(), "_").into_owned()
}

// ── Numbers ──────────────────────────────────────────────────────────────────

static RE_PERCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<minus>-)?(?:(?P<paren>\()\s*(?P<inner>-)?\s*)?(?P<num>[0-9]+(?:\.[0-9]+)?)\s*%")
        .unwrap()
});

static RE_NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<minus>-)?(?:(?P<paren>\()\s*(?P<inner>-)?\s*)?(?P<num>[0-9]+(?:\.[0-9]+)?)")
        .unwrap()
});

/// Parse the first `N%` pattern in `text`.
///
/// Returns `None` when no numeral is immediately followed by `%`.
pub fn parse_percentage(text: &str) -> Option<f64> {
    parse_signed(&RE_PERCENT, text)
}

/// Parse the first numeral in `text`.
///
/// Call this only after [`parse_percentage`] has failed, or use
/// [`parse_value`] which applies that order.
pub fn parse_numeric(text: &str) -> Option<f64> {
    parse_signed(&RE_NUMERIC, text)
}

/// Try every rule in [`VALUE_RULES`] and return the first hit.
pub fn parse_value(text: &str) -> Option<ParsedValue> {
    VALUE_RULES.iter().find_map(|(_, rule)| rule(text))
}

fn parse_signed(re: &Regex, text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    let caps = re.captures(&cleaned)?;
    let magnitude: f64 = caps.name("num")?.as_str().parse().ok()?;
    // A hyphen glued to a word ("Dec-24", "H1-12.7%") is not a sign.
    let minus = caps
        .name("minus")
        .is_some_and(|m| !cleaned[..m.start()].ends_with(|c: char| c.is_alphanumeric()));
    let negative = caps.name("paren").is_some() || minus || caps.name("inner").is_some();
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_parenthesised_is_negative() {
        assert_eq!(parse_percentage("(12.7%)"), Some(-12.7));
        assert_eq!(parse_percentage("( 12.7 % )"), Some(-12.7));
    }

    #[test]
    fn test_percentage_plain() {
        assert_eq!(parse_percentage("12.7%"), Some(12.7));
        assert_eq!(parse_percentage("margin 3 %"), Some(3.0));
    }

    #[test]
    fn test_percentage_absent() {
        assert_eq!(parse_percentage("no percent here"), None);
        assert_eq!(parse_percentage("12.7"), None);
        assert_eq!(parse_percentage(""), None);
    }

    #[test]
    fn test_percentage_minus_sign() {
        assert_eq!(parse_percentage("-4.5%"), Some(-4.5));
        assert_eq!(parse_percentage("(-4.5%)"), Some(-4.5));
        assert_eq!(parse_percentage("-(4.5%)"), Some(-4.5));
    }

    #[test]
    fn test_numeric_thousands_in_parentheses() {
        assert_eq!(parse_numeric("(1,234)"), Some(-1234.0));
        assert_eq!(parse_numeric("-(1,234)"), Some(-1234.0));
        assert_eq!(parse_numeric("1,234,567.5"), Some(1_234_567.5));
    }

    #[test]
    fn test_numeric_first_match() {
        assert_eq!(parse_numeric("(45.2)"), Some(-45.2));
        assert_eq!(parse_numeric("Revenue 45.2 bn"), Some(45.2));
        assert_eq!(parse_numeric("garbage"), None);
    }

    #[test]
    fn test_parenthesised_label_does_not_negate_later_number() {
        assert_eq!(parse_numeric("Revenue (KRW bn) 45.2"), Some(45.2));
    }

    #[test]
    fn test_detached_dash_is_not_a_sign() {
        assert_eq!(parse_numeric("EBITDA - 45.2"), Some(45.2));
    }

    #[test]
    fn test_hyphen_inside_label_is_not_a_sign() {
        assert_eq!(parse_numeric("Dec-24 YTD 45.2"), Some(24.0));
        assert_eq!(parse_numeric("FY-2023 120.5"), Some(2023.0));
        assert_eq!(parse_percentage("H1-12.7%"), Some(12.7));
        assert_eq!(parse_numeric("change: -3.1"), Some(-3.1));
        assert_eq!(parse_numeric("-7"), Some(-7.0));
    }

    #[test]
    fn test_parse_value_prefers_percentage() {
        assert_eq!(parse_value("(12.7%)"), Some(ParsedValue::Percentage(-12.7)));
        assert_eq!(parse_value("12.7"), Some(ParsedValue::Number(12.7)));
        assert_eq!(parse_value("n/a"), None);
        // 2023 alone would match the numeric rule first if order were reversed
        assert_eq!(parse_value("2023 growth 8%"), Some(ParsedValue::Percentage(8.0)));
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(to_canonical_key("Net Revenue (USD)"), "net_revenue_usd");
        assert_eq!(to_canonical_key("  EBITDA   Margin "), "ebitda_margin");
        assert_eq!(to_canonical_key("---"), "");
        assert_eq!(to_canonical_key(""), "");
    }

    #[test]
    fn test_canonical_key_idempotent() {
        for label in ["Net Revenue (USD)", "EBITDA-Margin %", "Capex/Sales", "a__b"] {
            let once = to_canonical_key(label);
            assert_eq!(to_canonical_key(&once), once, "label: {label}");
        }
    }
}
