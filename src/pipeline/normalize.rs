//! Record normalizer: turn raw model output into typed, resolved records.
//!
//! The model is trusted first. Inference from the column label and the table
//! header only fills fields the model left unset, with one exception: a
//! column labelled "variance" always yields a `variance_pct` value kind,
//! because the header is the strongest signal for that field.
//!
//! ## Rule order
//!
//! 1. metric name from the model's name, else the row label
//! 2. numeric value kept as is
//! 3. missing value recovered from text (percentage before numeric)
//! 4. fiscal year / period kind / period label from the column label
//! 5. currency / unit from the table header
//! 6. variance override

use crate::parse::{
    infer_period_with_pivot, parse_value, to_canonical_key, HeaderInfo, DEFAULT_CENTURY_PIVOT,
};
use crate::pipeline::section::Section;
use crate::store::{NewCompanyProfile, NewFinancialMetric};
use crate::types::{PeriodKind, RawCompanyProfile, RawFinancialRecord, RawValue, SourceRef, ValueKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const PCT_UNIT: &str = "pct";

/// Batch-level facts shared by every record of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeContext {
    pub header: HeaderInfo,
    pub century_pivot: u8,
}

impl Default for NormalizeContext {
    fn default() -> Self {
        Self {
            header: HeaderInfo::default(),
            century_pivot: DEFAULT_CENTURY_PIVOT,
        }
    }
}

impl NormalizeContext {
    /// Context for a located section: header inferred from its first line.
    pub fn for_section(section: &Section, century_pivot: u8) -> Self {
        Self {
            header: crate::parse::infer_header(section.header_line()),
            century_pivot,
        }
    }
}

/// A record after normalization. `value` is `None` when it could not be
/// resolved; such records are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub metric_name: String,
    pub source_label: String,
    pub column_label: String,
    pub value: Option<f64>,
    pub value_kind: ValueKind,
    pub currency: Option<String>,
    pub unit: Option<String>,
    pub fiscal_year: Option<i32>,
    pub period_kind: Option<PeriodKind>,
    pub period_label: Option<String>,
    pub source: Option<SourceRef>,
}

impl NormalizedRecord {
    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    /// Convert into a persistable metric, or `None` if the value is unresolved.
    ///
    /// `fallback_page` is used as the source page when the model gave none.
    pub fn into_metric(
        self,
        company_profile_id: &str,
        fallback_page: usize,
    ) -> Option<NewFinancialMetric> {
        let value = self.value?;
        let source = self.source.unwrap_or_default();
        Some(NewFinancialMetric {
            company_profile_id: company_profile_id.to_string(),
            metric_name: self.metric_name,
            source_label: self.source_label,
            column_label: self.column_label,
            value_kind: self.value_kind,
            value,
            currency: self.currency,
            unit: self.unit,
            fiscal_year: self.fiscal_year,
            period_kind: self.period_kind,
            period_label: self.period_label,
            source_page: source
                .page
                .or_else(|| u32::try_from(fallback_page).ok()),
            source_quote: source.quote,
        })
    }
}

/// Normalize every record of a batch.
pub fn normalize_records(
    records: &[RawFinancialRecord],
    ctx: &NormalizeContext,
) -> Vec<NormalizedRecord> {
    records.iter().map(|r| normalize_record(r, ctx)).collect()
}

/// Normalize a single raw record.
pub fn normalize_record(raw: &RawFinancialRecord, ctx: &NormalizeContext) -> NormalizedRecord {
    let is_variance = mentions_variance(&raw.column_label);

    // 1. Metric name: the model's own name wins when present.
    let metric_name = match non_blank(&raw.metric_name) {
        Some(name) => to_canonical_key(name),
        None => to_canonical_key(&raw.source_label),
    };

    let mut unit = non_blank(&raw.unit).map(str::to_string);
    let mut currency = non_blank(&raw.currency).map(str::to_string);
    let mut value_kind = raw.value_kind;

    // 2–3. Value, repaired from text when the model gave none.
    let value = match &raw.value {
        Some(RawValue::Number(v)) => Some(*v),
        other => {
            let quote = raw.source.as_ref().and_then(|s| s.quote.as_deref());
            let text_value = match other {
                Some(RawValue::Text(t)) => Some(t.as_str()),
                _ => None,
            };
            let recovered = [text_value, quote]
                .into_iter()
                .flatten()
                .find_map(parse_value);
            match recovered {
                Some(parsed) if parsed.is_percentage() => {
                    unit = Some(PCT_UNIT.to_string());
                    value_kind = Some(if is_variance {
                        ValueKind::VariancePct
                    } else {
                        raw.value_kind.unwrap_or_default()
                    });
                    Some(parsed.value())
                }
                Some(parsed) => Some(parsed.value()),
                None => {
                    debug!(
                        "Unresolved value for {} / {}",
                        metric_name, raw.column_label
                    );
                    None
                }
            }
        }
    };

    // 4. Period from the column label, only where unset.
    let period = infer_period_with_pivot(&raw.column_label, ctx.century_pivot);
    let fiscal_year = raw.fiscal_year.filter(|y| *y != 0).or(period.year);
    let period_kind = raw.period_kind.or(period.kind);
    let period_label = non_blank(&raw.period_label)
        .map(str::to_string)
        .or(period.period_label);

    // 5. Currency / unit from the table header, only where unset.
    if currency.is_none() {
        currency = ctx.header.currency.clone();
    }
    if unit.is_none() {
        unit = ctx.header.unit.clone();
    }

    // 6. Variance columns are always variance percentages.
    if is_variance {
        value_kind = Some(ValueKind::VariancePct);
        if unit.is_none() {
            unit = Some(PCT_UNIT.to_string());
        }
    }

    NormalizedRecord {
        metric_name,
        source_label: raw.source_label.clone(),
        column_label: raw.column_label.clone(),
        value,
        value_kind: value_kind.unwrap_or_default(),
        currency,
        unit,
        fiscal_year,
        period_kind,
        period_label,
        source: raw.source.clone(),
    }
}

/// Build the persistable profile from the model's company object.
pub fn profile_from_raw(document_id: &str, raw: &RawCompanyProfile) -> NewCompanyProfile {
    let first_investment_date = non_blank(&raw.first_investment_date).and_then(|s| {
        let parsed = parse_loose_date(s);
        if parsed.is_none() {
            warn!("Ignoring unparsable first investment date '{}'", s);
        }
        parsed
    });
    let source = raw.source.clone().unwrap_or_default();

    NewCompanyProfile {
        document_id: document_id.to_string(),
        name: raw.name.trim().to_string(),
        description: non_blank(&raw.description).map(str::to_string),
        geography: non_blank(&raw.geography).map(str::to_string),
        fund_role: non_blank(&raw.fund_role).map(str::to_string),
        first_investment_date,
        investment_type: non_blank(&raw.investment_type).map(str::to_string),
        source_page: source.page,
        source_quote: source.quote,
    }
}

/// Parse the date shapes models produce for "first investment date".
///
/// Partial dates resolve to the first day of the period: `2019-03` is
/// 2019-03-01, `2019` is 2019-01-01.
pub fn parse_loose_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    // Full ISO date, possibly the prefix of a timestamp.
    if let Some(prefix) = s.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d);
        }
    }
    for fmt in ["%Y/%m/%d", "%d %B %Y", "%B %d, %Y", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // Month precision: "2019-03", "March 2019", "Mar 2019".
    for (candidate, fmt) in [
        (format!("{s}-01"), "%Y-%m-%d"),
        (format!("1 {s}"), "%d %B %Y"),
    ] {
        if let Ok(d) = NaiveDate::parse_from_str(&candidate, fmt) {
            return Some(d);
        }
    }
    // Year precision.
    if s.len() == 4 {
        if let Ok(year) = s.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }
    None
}

fn mentions_variance(column_label: &str) -> bool {
    column_label.to_lowercase().contains("variance")
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(source_label: &str, column_label: &str) -> RawFinancialRecord {
        RawFinancialRecord {
            source_label: source_label.into(),
            column_label: column_label.into(),
            ..Default::default()
        }
    }

    fn quoted(mut r: RawFinancialRecord, quote: &str) -> RawFinancialRecord {
        r.source = Some(SourceRef {
            page: None,
            quote: Some(quote.into()),
        });
        r
    }

    #[test]
    fn test_revenue_recovered_from_parenthesised_quote() {
        let r = quoted(raw("Revenue", "Dec-24 YTD Actual"), "(45.2)");
        let n = normalize_record(&r, &NormalizeContext::default());
        assert_eq!(n.metric_name, "revenue");
        assert_eq!(n.value, Some(-45.2));
        assert_eq!(n.fiscal_year, Some(2024));
        assert_eq!(n.period_kind, Some(PeriodKind::Ytd));
        assert_eq!(n.period_label.as_deref(), Some("Dec-24"));
        assert_eq!(n.value_kind, ValueKind::Actual);
    }

    #[test]
    fn test_garbage_quote_stays_unresolved() {
        let r = quoted(raw("EBITDA Margin", "Variance"), "garbage");
        let n = normalize_record(&r, &NormalizeContext::default());
        assert_eq!(n.value, None);
        assert!(!n.is_resolved());
        assert_eq!(n.value_kind, ValueKind::VariancePct);
        assert!(n.into_metric("p1", 4).is_none());
    }

    #[test]
    fn test_model_metric_name_is_trusted() {
        let mut r = raw("Net Revenue (USD)", "FY2023 Actual");
        r.metric_name = Some("Total Revenue".into());
        r.value = Some(RawValue::Number(10.0));
        let n = normalize_record(&r, &NormalizeContext::default());
        assert_eq!(n.metric_name, "total_revenue");
        assert_eq!(n.source_label, "Net Revenue (USD)");

        r.metric_name = Some("   ".into());
        assert_eq!(normalize_record(&r, &NormalizeContext::default()).metric_name, "net_revenue_usd");
    }

    #[test]
    fn test_numeric_value_kept_unchanged() {
        let mut r = quoted(raw("Revenue", "FY2023 Actual"), "999");
        r.value = Some(RawValue::Number(120.5));
        let n = normalize_record(&r, &NormalizeContext::default());
        assert_eq!(n.value, Some(120.5));
        assert_eq!(n.unit, None);
    }

    #[test]
    fn test_percentage_quote_sets_pct_unit_and_keeps_model_kind() {
        let mut r = quoted(raw("EBITDA Margin", "FY2023 Actual"), "12.7%");
        r.unit = Some("bn".into());
        r.value_kind = Some(ValueKind::Actual);
        let n = normalize_record(&r, &NormalizeContext::default());
        assert_eq!(n.value, Some(12.7));
        assert_eq!(n.unit.as_deref(), Some("pct"));
        assert_eq!(n.value_kind, ValueKind::Actual);
    }

    #[test]
    fn test_text_value_is_repaired_before_quote() {
        let mut r = quoted(raw("Capex", "FY2023 Actual"), "55");
        r.value = Some(RawValue::Text("(3.5)".into()));
        assert_eq!(normalize_record(&r, &NormalizeContext::default()).value, Some(-3.5));

        r.value = Some(RawValue::Text("n/a".into()));
        assert_eq!(normalize_record(&r, &NormalizeContext::default()).value, Some(55.0));
    }

    #[test]
    fn test_model_period_fields_take_precedence() {
        let mut r = raw("Revenue", "Dec-24 YTD Actual");
        r.value = Some(RawValue::Number(1.0));
        r.fiscal_year = Some(2025);
        r.period_label = Some("Dec-2024".into());
        let n = normalize_record(&r, &NormalizeContext::default());
        assert_eq!(n.fiscal_year, Some(2025));
        assert_eq!(n.period_kind, Some(PeriodKind::Ytd));
        assert_eq!(n.period_label.as_deref(), Some("Dec-2024"));
    }

    #[test]
    fn test_header_fills_only_unset_currency_and_unit() {
        let ctx = NormalizeContext {
            header: HeaderInfo {
                currency: Some("KRW".into()),
                unit: Some("bn".into()),
            },
            ..Default::default()
        };
        let mut r = raw("Revenue", "FY2023 Actual");
        r.value = Some(RawValue::Number(1.0));
        let n = normalize_record(&r, &ctx);
        assert_eq!(n.currency.as_deref(), Some("KRW"));
        assert_eq!(n.unit.as_deref(), Some("bn"));

        r.currency = Some("USD".into());
        r.unit = Some("mn".into());
        let n = normalize_record(&r, &ctx);
        assert_eq!(n.currency.as_deref(), Some("USD"));
        assert_eq!(n.unit.as_deref(), Some("mn"));
    }

    #[test]
    fn test_variance_overrides_model_kind() {
        let ctx = NormalizeContext::default();
        let mut r = raw("Revenue", "Variance vs Budget");
        r.value = Some(RawValue::Number(-3.0));
        r.value_kind = Some(ValueKind::Actual);
        let n = normalize_record(&r, &ctx);
        assert_eq!(n.value_kind, ValueKind::VariancePct);
        assert_eq!(n.unit.as_deref(), Some("pct"));
    }

    #[test]
    fn test_variance_keeps_header_unit() {
        let ctx = NormalizeContext {
            header: HeaderInfo {
                currency: Some("KRW".into()),
                unit: Some("bn".into()),
            },
            ..Default::default()
        };
        let mut r = raw("Revenue", "VARIANCE");
        r.value = Some(RawValue::Number(2.0));
        let n = normalize_record(&r, &ctx);
        assert_eq!(n.value_kind, ValueKind::VariancePct);
        assert_eq!(n.unit.as_deref(), Some("bn"));
    }

    #[test]
    fn test_into_metric_falls_back_to_section_page() {
        let r = quoted(raw("Revenue", "FY2023 Actual"), "10");
        let m = normalize_record(&r, &NormalizeContext::default())
            .into_metric("profile-1", 5)
            .unwrap();
        assert_eq!(m.source_page, Some(5));
        assert_eq!(m.source_quote.as_deref(), Some("10"));
        assert_eq!(m.company_profile_id, "profile-1");

        let mut r = r;
        r.source = Some(SourceRef {
            page: Some(9),
            quote: None,
        });
        r.value = Some(RawValue::Number(1.0));
        let m = normalize_record(&r, &NormalizeContext::default())
            .into_metric("profile-1", 5)
            .unwrap();
        assert_eq!(m.source_page, Some(9));
    }

    #[test]
    fn test_profile_from_raw() {
        let raw = RawCompanyProfile {
            name: " Acme Corp ".into(),
            description: Some("".into()),
            geography: Some("Korea".into()),
            first_investment_date: Some("March 2019".into()),
            ..Default::default()
        };
        let p = profile_from_raw("doc-1", &raw);
        assert_eq!(p.name, "Acme Corp");
        assert_eq!(p.description, None);
        assert_eq!(p.geography.as_deref(), Some("Korea"));
        assert_eq!(p.first_investment_date, NaiveDate::from_ymd_opt(2019, 3, 1));
    }

    #[test]
    fn test_parse_loose_date() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day);
        assert_eq!(parse_loose_date("2019-03-15"), d(2019, 3, 15));
        assert_eq!(parse_loose_date("2019-03-15T00:00:00Z"), d(2019, 3, 15));
        assert_eq!(parse_loose_date("2019/03/15"), d(2019, 3, 15));
        assert_eq!(parse_loose_date("2019-03"), d(2019, 3, 1));
        assert_eq!(parse_loose_date("Mar 2019"), d(2019, 3, 1));
        assert_eq!(parse_loose_date("2019"), d(2019, 1, 1));
        assert_eq!(parse_loose_date("sometime"), None);
    }
}
