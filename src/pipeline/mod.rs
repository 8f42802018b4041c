//! Pipeline stages for report extraction.
//!
//! Each submodule implements exactly one transformation step; the
//! orchestrator in [`crate::run`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ section ──▶ llm ──▶ normalize ──▶ store
//! (pdfium)  (locate)   (model)  (repair)     (upsert)
//! ```
//!
//! 1. [`input`]     — read and hash the PDF, extract page-ordered text
//! 2. [`section`]   — find the financial-highlights pages
//! 3. [`llm`]       — ask the model for a structured object; the only stage
//!    with network I/O
//! 4. [`normalize`] — turn raw model records into typed, resolved records

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod input;
pub mod llm;
pub mod normalize;
pub mod section;

/// A step of the extraction run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ReadDocument,
    UpsertDocument,
    ExtractCompany,
    UpsertCompany,
    LocateSection,
    ExtractFinancials,
    Normalize,
    UpsertMetrics,
}

impl Stage {
    /// All stages in the order a run visits them.
    pub const ALL: [Stage; 8] = [
        Stage::ReadDocument,
        Stage::UpsertDocument,
        Stage::ExtractCompany,
        Stage::UpsertCompany,
        Stage::LocateSection,
        Stage::ExtractFinancials,
        Stage::Normalize,
        Stage::UpsertMetrics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ReadDocument => "read document",
            Stage::UpsertDocument => "upsert document",
            Stage::ExtractCompany => "extract company",
            Stage::UpsertCompany => "upsert company",
            Stage::LocateSection => "locate section",
            Stage::ExtractFinancials => "extract financials",
            Stage::Normalize => "normalize",
            Stage::UpsertMetrics => "upsert metrics",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
