//! Configuration for an extraction run.
//!
//! Every knob lives in [`ExtractionConfig`], built via
//! [`ExtractionConfigBuilder`]. The library never reads the environment on its
//! own: model name and provider come from here, and only the provider factory
//! looks up API keys when the provider is constructed.

use crate::error::ExtractError;
use crate::parse::DEFAULT_CENTURY_PIVOT;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use fin_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4o-mini")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.company_pages, 2);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model identifier. `None` means [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Provider name ("openai", "anthropic", "ollama", ...).
    /// With neither this nor `provider` set, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction should be reproducible; anything above zero lets the model
    /// paraphrase labels between runs and breaks the identity keys.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a transport failure of the model call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Leading pages handed to the company-profile extraction. Default: 2.
    pub company_pages: usize,

    /// Two-digit years at or above this map to 19xx, below to 20xx. Default: 70.
    pub century_pivot: u8,

    /// Receives stage events while the run progresses.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            password: None,
            company_pages: 2,
            century_pivot: DEFAULT_CENTURY_PIVOT,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("company_pages", &self.company_pages)
            .field("century_pivot", &self.century_pivot)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured model, or [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn company_pages(mut self, n: usize) -> Self {
        self.config.company_pages = n;
        self
    }

    pub fn century_pivot(mut self, pivot: u8) -> Self {
        self.config.century_pivot = pivot;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.company_pages == 0 {
            return Err(ExtractError::InvalidConfig(
                "company_pages must be ≥ 1".into(),
            ));
        }
        if c.century_pivot > 99 {
            return Err(ExtractError::InvalidConfig(format!(
                "century_pivot must be 0–99, got {}",
                c.century_pivot
            )));
        }
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if matches!(c.model.as_deref(), Some(m) if m.trim().is_empty()) {
            return Err(ExtractError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.model_or_default(), "gpt-4o-mini");
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.max_tokens, 4096);
        assert_eq!(c.company_pages, 2);
        assert_eq!(c.century_pivot, 70);
        assert!(c.progress_callback.is_none());
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = ExtractionConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
        let c = ExtractionConfig::builder().temperature(-1.0).build().unwrap();
        assert_eq!(c.temperature, 0.0);
    }

    #[test]
    fn builder_rejects_invalid_values() {
        assert!(matches!(
            ExtractionConfig::builder().company_pages(0).build(),
            Err(ExtractError::InvalidConfig(_))
        ));
        assert!(ExtractionConfig::builder().century_pivot(100).build().is_err());
        assert!(ExtractionConfig::builder().api_timeout_secs(0).build().is_err());
        assert!(ExtractionConfig::builder().model("  ").build().is_err());
        assert!(ExtractionConfig::builder().century_pivot(99).build().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let c = ExtractionConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
