//! Shapes exchanged with the language model and shared across the pipeline.
//!
//! The `Raw*` structs mirror the JSON objects the model is asked to return.
//! Deserialising into them *is* the schema validation step: an object that
//! does not fit is rejected with [`crate::error::ExtractError::SchemaValidation`].
//! Field names are camelCase on the wire to match the prompts.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Reporting window of a financial figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodKind {
    /// Year to date.
    #[serde(rename = "YTD", alias = "ytd", alias = "Ytd")]
    Ytd,
    /// Full fiscal year.
    #[serde(rename = "FY", alias = "fy", alias = "Fy")]
    Fy,
}

impl PeriodKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodKind::Ytd => "YTD",
            PeriodKind::Fy => "FY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "YTD" => Some(PeriodKind::Ytd),
            "FY" => Some(PeriodKind::Fy),
            _ => None,
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a figure is a plain value or a variance percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Actual,
    VariancePct,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Actual => "actual",
            ValueKind::VariancePct => "variance_pct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "actual" => Some(ValueKind::Actual),
            "variance_pct" => Some(ValueKind::VariancePct),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the document a fact was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(
        default,
        deserialize_with = "whole_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

/// Company profile as returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCompanyProfile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub geography: Option<String>,
    #[serde(default)]
    pub fund_role: Option<String>,
    /// ISO date preferred; parsed leniently before persistence.
    #[serde(default)]
    pub first_investment_date: Option<String>,
    #[serde(default)]
    pub investment_type: Option<String>,
    #[serde(default)]
    pub source: Option<SourceRef>,
}

/// A cell value as emitted by the model.
///
/// The prompt asks for plain numbers, but models sometimes echo the printed
/// cell (`"(12.5)"`, `"8.1%"`). Text is kept so the normalizer can repair it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

/// One row × column cell of the financial highlights table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFinancialRecord {
    /// Row label as printed in the table.
    pub source_label: String,
    #[serde(default)]
    pub metric_name: Option<String>,
    pub column_label: String,
    #[serde(default)]
    pub value: Option<RawValue>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "whole_number")]
    pub fiscal_year: Option<i32>,
    #[serde(default)]
    pub period_kind: Option<PeriodKind>,
    #[serde(default)]
    pub period_label: Option<String>,
    #[serde(default)]
    pub value_kind: Option<ValueKind>,
    #[serde(default)]
    pub source: Option<SourceRef>,
}

/// Envelope of the financial-highlights extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialHighlights {
    pub records: Vec<RawFinancialRecord>,
}

/// Accept `2023` and `2023.0` alike; models often print integers as floats.
fn whole_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let Some(n) = Option::<f64>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(D::Error::custom(format!("expected a whole number, got {n}")));
    }
    T::try_from(n as i64)
        .map(Some)
        .map_err(|_| D::Error::custom(format!("{n} is out of range")))
}
