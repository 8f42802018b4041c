//! Pipeline orchestrator: one document in, one [`RunSummary`] out.
//!
//! The run is strictly sequential. A failure at any step aborts the run and
//! surfaces the error; upserts already committed stay committed, and because
//! every write is an idempotent upsert the caller can simply re-run.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::RunSummary;
use crate::pipeline::input::{self, DocumentText};
use crate::pipeline::llm::{extract_company_profile, extract_financial_records, StructuredExtractor};
use crate::pipeline::normalize::{normalize_record, profile_from_raw, NormalizeContext};
use crate::pipeline::section::{company_text, locate_financial_section, Section};
use crate::pipeline::Stage;
use crate::progress::{ExtractionProgressCallback, NoopProgressCallback};
use crate::store::{NewDocument, Store};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Read a PDF from disk and run the full extraction over it.
///
/// # Errors
/// Any [`ExtractError`] from reading, the model call, schema validation or
/// storage. Records whose value cannot be resolved are not errors; they are
/// counted in [`RunSummary::metrics_dropped`].
pub async fn run_extraction(
    path: impl AsRef<Path>,
    extractor: &dyn StructuredExtractor,
    store: &Store,
    config: &ExtractionConfig,
) -> Result<RunSummary, ExtractError> {
    let path = path.as_ref();
    info!("Starting extraction: {}", path.display());
    let noop = NoopProgressCallback;
    let cb: &dyn ExtractionProgressCallback = config.progress_callback.as_deref().unwrap_or(&noop);

    // ── Step 1: Read + hash ──────────────────────────────────────────────
    cb.on_stage_start(Stage::ReadDocument);
    let document = input::load_document(path, config.password.as_deref()).await?;
    cb.on_stage_complete(Stage::ReadDocument);

    run_on_document(&document, extractor, store, config).await
}

/// Run the extraction over text that has already been read.
///
/// This is everything after the PDF boundary, so it needs no pdfium.
pub async fn run_on_document(
    document: &DocumentText,
    extractor: &dyn StructuredExtractor,
    store: &Store,
    config: &ExtractionConfig,
) -> Result<RunSummary, ExtractError> {
    let start = Instant::now();
    let noop = NoopProgressCallback;
    let cb: &dyn ExtractionProgressCallback = config.progress_callback.as_deref().unwrap_or(&noop);

    // ── Step 2: Upsert document ──────────────────────────────────────────
    cb.on_stage_start(Stage::UpsertDocument);
    let document_id = store
        .upsert_document(&NewDocument {
            content_hash: document.content_hash.clone(),
            filename: document.filename.clone(),
            page_count: document.page_count,
        })
        .map_err(|source| ExtractError::Storage {
            step: Stage::UpsertDocument,
            key: document.content_hash.clone(),
            source,
        })?;
    debug!("Document {} → {}", document.content_hash, document_id);
    cb.on_stage_complete(Stage::UpsertDocument);

    // ── Step 3: Extract company profile ──────────────────────────────────
    cb.on_stage_start(Stage::ExtractCompany);
    let lead = company_text(&document.pages, config.company_pages);
    let raw_profile = extract_company_profile(extractor, &lead).await?;
    info!("Company: {}", raw_profile.name);
    cb.on_stage_complete(Stage::ExtractCompany);

    // ── Step 4: Upsert company profile ───────────────────────────────────
    cb.on_stage_start(Stage::UpsertCompany);
    let profile = profile_from_raw(&document_id, &raw_profile);
    let company_profile_id = store
        .upsert_company_profile(&profile)
        .map_err(|source| ExtractError::Storage {
            step: Stage::UpsertCompany,
            key: format!("{}/{}", document_id, profile.name),
            source,
        })?;
    cb.on_stage_complete(Stage::UpsertCompany);

    // ── Step 5: Locate financial section ─────────────────────────────────
    cb.on_stage_start(Stage::LocateSection);
    let section = locate_financial_section(&document.pages);
    if section.matched {
        info!("Financial highlights found at page {}", section.start_page);
    } else {
        info!(
            "No financial highlights heading; using pages from {}",
            section.start_page
        );
    }
    cb.on_stage_complete(Stage::LocateSection);

    // ── Step 6: Extract financial records ────────────────────────────────
    cb.on_stage_start(Stage::ExtractFinancials);
    let records = extract_financial_records(extractor, &section.text).await?;
    info!("Model returned {} financial records", records.len());
    cb.on_stage_complete(Stage::ExtractFinancials);

    // ── Step 7: Normalize ────────────────────────────────────────────────
    cb.on_stage_start(Stage::Normalize);
    let ctx = NormalizeContext::for_section(&section, config.century_pivot);
    debug!("Header inference: {:?}", ctx.header);
    let mut metrics = Vec::with_capacity(records.len());
    let mut dropped = 0usize;
    for raw in &records {
        let normalized = normalize_record(raw, &ctx);
        let (name, column) = (normalized.metric_name.clone(), normalized.column_label.clone());
        match normalized.into_metric(&company_profile_id, section.start_page) {
            Some(metric) => metrics.push(metric),
            None => {
                debug!("Dropping {} / {}: value unresolved", name, column);
                cb.on_record_dropped(&name, &column);
                dropped += 1;
            }
        }
    }
    cb.on_stage_complete(Stage::Normalize);

    // ── Step 8: Upsert metrics ───────────────────────────────────────────
    cb.on_stage_start(Stage::UpsertMetrics);
    for metric in &metrics {
        store
            .upsert_financial_metric(metric)
            .map_err(|source| ExtractError::Storage {
                step: Stage::UpsertMetrics,
                key: metric.identity_key(),
                source,
            })?;
    }
    cb.on_stage_complete(Stage::UpsertMetrics);

    let summary = RunSummary {
        document_id,
        company_profile_id,
        metrics_inserted: metrics.len(),
        metrics_dropped: dropped,
        records_extracted: records.len(),
        section_start_page: section.start_page,
        section_matched: section.matched,
    };
    info!(
        "Extraction done in {:?}: {} metrics written, {} dropped",
        start.elapsed(),
        summary.metrics_inserted,
        summary.metrics_dropped
    );
    cb.on_run_complete(&summary);
    Ok(summary)
}

/// What a document looks like to the pipeline, without calling the model.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInspection {
    pub content_hash: String,
    pub filename: String,
    pub page_count: usize,
    pub section: Section,
}

/// Read a PDF and locate its financial section. Needs no provider or store.
pub async fn inspect_document(
    path: impl AsRef<Path>,
    password: Option<&str>,
) -> Result<DocumentInspection, ExtractError> {
    let document = input::load_document(path.as_ref(), password).await?;
    Ok(inspect_text(document))
}

fn inspect_text(document: DocumentText) -> DocumentInspection {
    let section = locate_financial_section(&document.pages);
    DocumentInspection {
        content_hash: document.content_hash,
        filename: document.filename,
        page_count: document.page_count,
        section,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_text_locates_section() {
        let doc = DocumentText::from_pages(
            "r.pdf",
            b"%PDF",
            vec!["cover".into(), "Financial Highlights (in USD mn)".into()],
        );
        let inspection = inspect_text(doc);
        assert_eq!(inspection.page_count, 2);
        assert!(inspection.section.matched);
        assert_eq!(inspection.section.start_page, 2);
    }
}
