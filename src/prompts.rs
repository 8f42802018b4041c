//! Prompts and target shapes for the two model extractions.
//!
//! Keeping every prompt here means prompt changes never touch retry or
//! error-handling code, and tests can inspect them without calling a model.
//! The JSON schemas describe the same shapes as [`crate::types`]; they are
//! sent to the model alongside the prompt, while deserialisation into the
//! `Raw*` types remains the actual validation.

use serde_json::{json, Value};

/// System prompt for the company-profile extraction.
pub const COMPANY_SYSTEM_PROMPT: &str = "\
You are an extraction assistant for private equity PDF reports.
Extract a single company's profile fields from the provided text.
Return valid JSON only, matching the provided JSON schema.
When a field is not present, omit it.
Include a minimal source object with page and a short quote if available.";

pub const COMPANY_USER_PROMPT: &str = "\
From the following text, extract:
- name
- description
- geography
- fundRole
- firstInvestmentDate (ISO date if possible)
- investmentType
Return JSON only.";

/// System prompt for the financial-highlights extraction.
///
/// The numeric conventions here (no thousands separators, `pct` unit,
/// `variance_pct` for variance columns) are the same ones the normalizer
/// falls back to when the model ignores them.
pub const FINANCIAL_SYSTEM_PROMPT: &str = "\
You extract Financial highlights tables from private equity PDF pages.
Return an array of records, each record representing a single row-column cell value.
Use numeric values only (no commas). Percent values should be numbers like 12.7 and unit 'pct'.
For variance columns, set valueKind='variance_pct'. Provide fiscalYear/periodKind/periodLabel \
when derivable from column labels (e.g., Dec-24 YTD Actual, FY2023 Actual). \
Include currency and unit (e.g., KRW and bn) from table headers.
Include a minimal source object with page and short quote if available.";

pub const FINANCIAL_USER_PROMPT: &str = "\
Given the Financial highlights section text, identify the YTD and FY tables \
and output records for every visible cell.
Return JSON only.";

/// Append the document text to a user instruction.
pub fn user_prompt(instructions: &str, text: &str) -> String {
    format!("{instructions}\n\nTEXT:\n{text}")
}

/// Render the schema as the message appended to the system prompt.
pub fn schema_instruction(schema: &Value) -> String {
    format!(
        "The JSON you return must satisfy this JSON schema:\n{}",
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}

fn source_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "page": { "type": "integer" },
            "quote": { "type": "string" }
        }
    })
}

/// JSON schema of [`crate::types::RawCompanyProfile`].
pub fn company_profile_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": { "type": "string" },
            "description": { "type": "string" },
            "geography": { "type": "string" },
            "fundRole": { "type": "string" },
            "firstInvestmentDate": { "type": "string", "description": "ISO date preferred" },
            "investmentType": { "type": "string" },
            "source": source_schema()
        }
    })
}

/// JSON schema of [`crate::types::FinancialHighlights`].
pub fn financial_highlights_schema() -> Value {
    json!({
        "type": "object",
        "required": ["records"],
        "properties": {
            "records": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["sourceLabel", "metricName", "columnLabel", "value"],
                    "properties": {
                        "sourceLabel": { "type": "string" },
                        "metricName": { "type": "string" },
                        "columnLabel": { "type": "string" },
                        "value": { "type": ["number", "null"] },
                        "unit": { "type": "string" },
                        "currency": { "type": "string" },
                        "fiscalYear": { "type": "integer" },
                        "periodKind": { "enum": ["YTD", "FY"] },
                        "periodLabel": { "type": "string" },
                        "valueKind": { "enum": ["actual", "variance_pct"] },
                        "source": source_schema()
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_appends_text_block() {
        assert_eq!(user_prompt("Do it.", "page one"), "Do it.\n\nTEXT:\npage one");
    }

    #[test]
    fn financial_prompt_states_numeric_conventions() {
        assert!(FINANCIAL_SYSTEM_PROMPT.contains("no commas"));
        assert!(FINANCIAL_SYSTEM_PROMPT.contains("'pct'"));
        assert!(FINANCIAL_SYSTEM_PROMPT.contains("variance_pct"));
    }

    #[test]
    fn schemas_name_the_wire_fields() {
        let company = company_profile_schema();
        assert_eq!(company["required"][0], "name");
        assert!(company["properties"]["firstInvestmentDate"].is_object());

        let fin = financial_highlights_schema();
        let item = &fin["properties"]["records"]["items"]["properties"];
        assert!(item["columnLabel"].is_object());
        assert_eq!(item["periodKind"]["enum"][1], "FY");
    }

    #[test]
    fn schema_instruction_embeds_schema() {
        let s = schema_instruction(&company_profile_schema());
        assert!(s.contains("\"firstInvestmentDate\""));
    }
}
