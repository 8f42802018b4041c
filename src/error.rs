//! Error type for the fin-extract library.
//!
//! Every failure that stops a run is an [`ExtractError`]. Nothing inside the
//! pipeline catches, retries or translates these errors; they carry enough
//! context (the [`Stage`] that failed and, for storage, the identity key
//! involved) for the caller to diagnose the run and decide whether to re-run
//! it. Re-running is safe because every write is an idempotent upsert.
//!
//! A financial record whose value cannot be resolved is *not* an error: it is
//! dropped and counted in [`crate::output::RunSummary::metrics_dropped`].

use crate::pipeline::Stage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider could not be constructed (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call failed after all retries.
    #[error("LLM call failed during {stage}: {message}")]
    LlmApiError { stage: Stage, message: String },

    /// The model call did not return in time.
    #[error("LLM call timed out after {secs}s during {stage}")]
    ApiTimeout { stage: Stage, secs: u64 },

    /// The model answered, but not with an object of the requested shape.
    #[error("Model output failed schema validation during {stage}: {detail}")]
    SchemaValidation { stage: Stage, detail: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// A lookup or write against the store failed.
    #[error("Storage error during {step} (key: {key}): {source}")]
    Storage {
        step: Stage,
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// The pipeline stage the error is attributed to, when known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ExtractError::LlmApiError { stage, .. }
            | ExtractError::ApiTimeout { stage, .. }
            | ExtractError::SchemaValidation { stage, .. } => Some(*stage),
            ExtractError::Storage { step, .. } => Some(*step),
            ExtractError::FileNotFound { .. }
            | ExtractError::PermissionDenied { .. }
            | ExtractError::NotAPdf { .. }
            | ExtractError::CorruptPdf { .. }
            | ExtractError::PasswordRequired { .. }
            | ExtractError::WrongPassword { .. }
            | ExtractError::PdfiumBindingFailed(_) => Some(Stage::ReadDocument),
            _ => None,
        }
    }
}
