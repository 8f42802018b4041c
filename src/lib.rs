//! # fin-extract
//!
//! Extract a company profile and its financial-highlights table from a PDF
//! report with a language model, normalise the figures, and store them
//! idempotently in SQLite.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      read, SHA-256, page text via pdfium (spawn_blocking)
//!  ├─ 2. Document   upsert by content hash
//!  ├─ 3. Company    model call over the first pages → upsert by (document, name)
//!  ├─ 4. Section    locate "financial highlights" (or the last pages)
//!  ├─ 5. Financials model call → raw row × column records
//!  ├─ 6. Normalize  repair values, infer period / currency / unit
//!  └─ 7. Metrics    upsert by (profile, metric, column, value kind)
//! ```
//!
//! Running the pipeline twice over the same file leaves the database exactly
//! as one run would.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fin_extract::{run_extraction, ExtractionConfig, LlmExtractor, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder().model("gpt-4o-mini").build()?;
//!     let extractor = LlmExtractor::from_config(&config)?;
//!     let store = Store::open("extract.db")?;
//!     let summary = run_extraction("report.pdf", &extractor, &store, &config).await?;
//!     println!("{} metrics, {} dropped", summary.metrics_inserted, summary.metrics_dropped);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | The `fin-extract` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//! | `bundled` | on      | Embed the pdfium shared library at compile time |
//!
//! Library-only users can opt out:
//! ```toml
//! fin-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod store;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_MODEL};
pub use error::ExtractError;
pub use output::RunSummary;
pub use pipeline::input::{load_document, DocumentText};
pub use pipeline::llm::{ExtractionRequest, LlmExtractor, StructuredExtractor};
pub use pipeline::normalize::{normalize_record, NormalizeContext, NormalizedRecord};
pub use pipeline::section::{locate_financial_section, Section};
pub use pipeline::Stage;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use run::{inspect_document, run_extraction, run_on_document, DocumentInspection};
pub use store::{NewCompanyProfile, NewDocument, NewFinancialMetric, Store, TableCounts};
pub use types::{PeriodKind, RawCompanyProfile, RawFinancialRecord, RawValue, SourceRef, ValueKind};
