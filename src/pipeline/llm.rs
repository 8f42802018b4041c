//! Model boundary: ask a language model for a JSON object of a given shape.
//!
//! The pipeline depends only on the [`StructuredExtractor`] trait, so tests
//! and alternative backends plug in without a network. [`LlmExtractor`] is
//! the production implementation over an `edgequake_llm` provider. All prompt
//! text lives in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! Transport failures and timeouts are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`): with 500 ms base and 3 retries the
//! waits are 500 ms → 1 s → 2 s. An answer that is not valid JSON, or JSON of
//! the wrong shape, is a schema-validation error and is not retried.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::Stage;
use crate::prompts;
use crate::types::{FinancialHighlights, RawCompanyProfile, RawFinancialRecord};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// One structured-output request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    /// Stage the request belongs to; carried into errors.
    pub stage: Stage,
    pub system_prompt: String,
    pub user_prompt: String,
    /// JSON schema of the expected object.
    pub schema: Value,
}

/// Something that turns a prompt into a JSON object.
///
/// Implementations return the raw object; shape validation happens in the
/// typed helpers ([`extract_company_profile`], [`extract_financial_records`]).
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Value, ExtractError>;
}

/// [`StructuredExtractor`] backed by an `edgequake_llm` chat provider.
pub struct LlmExtractor {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
}

impl std::fmt::Debug for LlmExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmExtractor")
            .field("provider", &"<dyn LLMProvider>")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl LlmExtractor {
    /// Wrap an already constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        }
    }

    /// Resolve the provider from the config and wrap it.
    ///
    /// Resolution order, most specific first:
    /// 1. `config.provider`, used as is
    /// 2. `config.provider_name` with `config.model` (or [`crate::DEFAULT_MODEL`])
    /// 3. `EDGEQUAKE_LLM_PROVIDER` with `config.model`, then `EDGEQUAKE_MODEL`
    /// 4. `openai` when `OPENAI_API_KEY` is set, with `config.model` or the default
    /// 5. auto-detection by [`ProviderFactory::from_env`]
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1)))
    }
}

#[async_trait]
impl StructuredExtractor for LlmExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Value, ExtractError> {
        let stage = request.stage;
        let messages = build_messages(request);
        let options = self.build_options();
        let limit = Duration::from_secs(self.api_timeout_secs);
        let start = Instant::now();

        let mut last_err: Option<ExtractError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff(attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    stage,
                    attempt,
                    self.max_retries,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match timeout(limit, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    info!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        stage,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return parse_json_response(stage, &response.content);
                }
                Ok(Err(e)) => {
                    warn!("{}: attempt {} failed: {}", stage, attempt + 1, e);
                    last_err = Some(ExtractError::LlmApiError {
                        stage,
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {}s",
                        stage,
                        attempt + 1,
                        self.api_timeout_secs
                    );
                    last_err = Some(ExtractError::ApiTimeout {
                        stage,
                        secs: self.api_timeout_secs,
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ExtractError::LlmApiError {
            stage,
            message: "no attempt was made".into(),
        }))
    }
}

/// Where the provider for a run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProviderChoice {
    Named { name: String, model: String },
    AutoDetect,
}

/// Pick a provider for a config without a pre-built one. Blank variables
/// count as unset.
fn choose_provider(
    config: &ExtractionConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ProviderChoice {
    let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(ref name) = config.provider_name {
        return ProviderChoice::Named {
            name: name.clone(),
            model: config.model_or_default().to_string(),
        };
    }
    if let Some(name) = env("EDGEQUAKE_LLM_PROVIDER") {
        let model = config
            .model
            .clone()
            .or_else(|| env("EDGEQUAKE_MODEL"))
            .unwrap_or_else(|| config.model_or_default().to_string());
        return ProviderChoice::Named { name, model };
    }
    if env("OPENAI_API_KEY").is_some() {
        return ProviderChoice::Named {
            name: "openai".to_string(),
            model: config.model_or_default().to_string(),
        };
    }
    ProviderChoice::AutoDetect
}

fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    match choose_provider(config, |key| std::env::var(key).ok()) {
        ProviderChoice::Named { name, model } => {
            debug!("Creating provider {} with model {}", name, model);
            ProviderFactory::create_llm_provider(&name, &model).map_err(|e| {
                ExtractError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("{e}"),
                }
            })
        }
        ProviderChoice::AutoDetect => {
            if let Some(ref model) = config.model {
                warn!("Provider auto-detected from environment; model {} may be ignored", model);
            }
            let (llm_provider, _embedding) =
                ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
                    provider: "auto".to_string(),
                    hint: format!(
                        "No LLM provider could be auto-detected from environment.\n\
                        Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                        Error: {}",
                        e
                    ),
                })?;
            Ok(llm_provider)
        }
    }
}

/// System prompt with the schema attached, then the user prompt.
fn build_messages(request: &ExtractionRequest) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "{}\n\n{}",
            request.system_prompt,
            prompts::schema_instruction(&request.schema)
        )),
        ChatMessage::user(request.user_prompt.clone()),
    ]
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\n(.*?)\n?```\s*$").unwrap());

/// Parse a model answer as a JSON object, unwrapping a Markdown code fence
/// if the model added one.
pub fn parse_json_response(stage: Stage, content: &str) -> Result<Value, ExtractError> {
    let trimmed = content.trim();
    let body = match RE_JSON_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => trimmed,
    };

    let value: Value = serde_json::from_str(body).map_err(|e| ExtractError::SchemaValidation {
        stage,
        detail: format!(
            "invalid JSON ({}): {}",
            e,
            body.chars().take(200).collect::<String>()
        ),
    })?;

    if !value.is_object() {
        return Err(ExtractError::SchemaValidation {
            stage,
            detail: format!("expected a JSON object, got {}", json_kind(&value)),
        });
    }
    Ok(value)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn validate<T: DeserializeOwned>(stage: Stage, value: Value) -> Result<T, ExtractError> {
    serde_json::from_value(value).map_err(|e| ExtractError::SchemaValidation {
        stage,
        detail: e.to_string(),
    })
}

/// Extract the company profile from the leading pages' text.
pub async fn extract_company_profile(
    extractor: &dyn StructuredExtractor,
    text: &str,
) -> Result<RawCompanyProfile, ExtractError> {
    let request = ExtractionRequest {
        stage: Stage::ExtractCompany,
        system_prompt: prompts::COMPANY_SYSTEM_PROMPT.to_string(),
        user_prompt: prompts::user_prompt(prompts::COMPANY_USER_PROMPT, text),
        schema: prompts::company_profile_schema(),
    };
    let value = extractor.extract(&request).await?;
    validate(Stage::ExtractCompany, value)
}

/// Extract the financial-highlights records from the located section.
pub async fn extract_financial_records(
    extractor: &dyn StructuredExtractor,
    text: &str,
) -> Result<Vec<RawFinancialRecord>, ExtractError> {
    let request = ExtractionRequest {
        stage: Stage::ExtractFinancials,
        system_prompt: prompts::FINANCIAL_SYSTEM_PROMPT.to_string(),
        user_prompt: prompts::user_prompt(prompts::FINANCIAL_USER_PROMPT, text),
        schema: prompts::financial_highlights_schema(),
    };
    let value = extractor.extract(&request).await?;
    let highlights: FinancialHighlights = validate(Stage::ExtractFinancials, value)?;
    Ok(highlights.records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn named(name: &str, model: &str) -> ProviderChoice {
        ProviderChoice::Named {
            name: name.into(),
            model: model.into(),
        }
    }

    #[test]
    fn test_provider_name_wins_over_environment() {
        let config = ExtractionConfig::builder()
            .provider_name("anthropic")
            .model("claude-x")
            .build()
            .unwrap();
        let env = env_of(&[("EDGEQUAKE_LLM_PROVIDER", "gemini"), ("OPENAI_API_KEY", "sk")]);
        assert_eq!(choose_provider(&config, env), named("anthropic", "claude-x"));
    }

    #[test]
    fn test_environment_provider_uses_config_model_first() {
        let env = || env_of(&[("EDGEQUAKE_LLM_PROVIDER", "gemini"), ("EDGEQUAKE_MODEL", "g-1")]);
        let with_model = ExtractionConfig::builder().model("g-2").build().unwrap();
        assert_eq!(choose_provider(&with_model, env()), named("gemini", "g-2"));
        assert_eq!(
            choose_provider(&ExtractionConfig::default(), env()),
            named("gemini", "g-1")
        );
    }

    #[test]
    fn test_openai_key_honours_model_and_default() {
        let env = || env_of(&[("OPENAI_API_KEY", "sk-test")]);
        let with_model = ExtractionConfig::builder().model("gpt-4o").build().unwrap();
        assert_eq!(choose_provider(&with_model, env()), named("openai", "gpt-4o"));
        assert_eq!(
            choose_provider(&ExtractionConfig::default(), env()),
            named("openai", crate::config::DEFAULT_MODEL)
        );
    }

    #[test]
    fn test_blank_variables_fall_through_to_auto_detect() {
        let env = env_of(&[("EDGEQUAKE_LLM_PROVIDER", " "), ("OPENAI_API_KEY", "")]);
        assert_eq!(
            choose_provider(&ExtractionConfig::default(), env),
            ProviderChoice::AutoDetect
        );
    }

    struct Canned {
        answer: Value,
        seen: Mutex<Vec<ExtractionRequest>>,
    }

    #[async_trait]
    impl StructuredExtractor for Canned {
        async fn extract(&self, request: &ExtractionRequest) -> Result<Value, ExtractError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.answer.clone())
        }
    }

    fn canned(answer: Value) -> Canned {
        Canned {
            answer,
            seen: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn parse_plain_json() {
        let v = parse_json_response(Stage::ExtractCompany, r#" {"name": "Acme"} "#).unwrap();
        assert_eq!(v["name"], "Acme");
    }

    #[test]
    fn parse_fenced_json() {
        let raw = "```json\n{\"records\": []}\n```";
        let v = parse_json_response(Stage::ExtractFinancials, raw).unwrap();
        assert!(v["records"].as_array().unwrap().is_empty());

        let bare = "```\n{\"name\": \"X\"}\n```\n";
        assert_eq!(parse_json_response(Stage::ExtractCompany, bare).unwrap()["name"], "X");
    }

    #[test]
    fn parse_rejects_prose_and_non_objects() {
        let err = parse_json_response(Stage::ExtractCompany, "Sorry, I cannot help.").unwrap_err();
        assert!(matches!(err, ExtractError::SchemaValidation { stage: Stage::ExtractCompany, .. }));

        let err = parse_json_response(Stage::ExtractFinancials, "[1, 2]").unwrap_err();
        assert!(err.to_string().contains("an array"), "got: {err}");
    }

    #[test]
    fn company_helper_validates_shape() {
        let ok = canned(json!({ "name": "Acme", "geography": "Korea" }));
        let profile = tokio_test::block_on(extract_company_profile(&ok, "page text")).unwrap();
        assert_eq!(profile.name, "Acme");

        let seen = ok.seen.lock().unwrap();
        assert_eq!(seen[0].stage, Stage::ExtractCompany);
        assert!(seen[0].user_prompt.ends_with("TEXT:\npage text"));

        let bad = canned(json!({ "description": "no name" }));
        let err = tokio_test::block_on(extract_company_profile(&bad, "t")).unwrap_err();
        assert!(matches!(err, ExtractError::SchemaValidation { stage: Stage::ExtractCompany, .. }));
    }

    #[tokio::test]
    async fn financial_helper_returns_records() {
        let ex = canned(json!({
            "records": [
                { "sourceLabel": "Revenue", "metricName": "Revenue",
                  "columnLabel": "FY2023 Actual", "value": 10.5 }
            ]
        }));
        let records = extract_financial_records(&ex, "Financial Highlights").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].column_label, "FY2023 Actual");

        let empty = canned(json!({ "records": [] }));
        assert!(extract_financial_records(&empty, "t").await.unwrap().is_empty());

        let wrong = canned(json!({ "rows": [] }));
        assert!(extract_financial_records(&wrong, "t").await.is_err());
    }

    #[tokio::test]
    async fn financial_helper_rejects_bad_records() {
        let ex = canned(json!({ "records": [ { "sourceLabel": "Revenue" } ] }));
        let err = extract_financial_records(&ex, "t").await.unwrap_err();
        assert!(matches!(err, ExtractError::SchemaValidation { stage: Stage::ExtractFinancials, .. }));
    }

    #[test]
    fn messages_carry_schema() {
        let req = ExtractionRequest {
            stage: Stage::ExtractCompany,
            system_prompt: "sys".into(),
            user_prompt: "usr".into(),
            schema: prompts::company_profile_schema(),
        };
        assert_eq!(build_messages(&req).len(), 2);
    }
}
