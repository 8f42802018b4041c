//! Input stage: read a PDF, hash it, and extract page-ordered text via pdfium.
//!
//! ## Why hash the raw bytes?
//!
//! The SHA-256 of the file is the document's identity. Hashing the bytes
//! rather than the extracted text means a re-run over the same file always
//! resolves to the same stored document, even if a newer pdfium version lays
//! out the text slightly differently.
//!
//! ## Why spawn_blocking?
//!
//! pdfium uses thread-local state and is not async-safe;
//! `tokio::task::spawn_blocking` keeps it off the Tokio worker threads.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

/// Text content of a document, one string per page, with its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentText {
    /// Lower-case hex SHA-256 of the raw file bytes.
    pub content_hash: String,
    /// Display name (file name without directories).
    pub filename: String,
    pub page_count: usize,
    /// Page texts in reading order, trimmed.
    pub pages: Vec<String>,
}

impl DocumentText {
    /// Build a document from raw bytes and already-extracted page texts.
    ///
    /// Used when the text comes from somewhere other than pdfium, and in
    /// tests.
    pub fn from_pages(
        filename: impl Into<String>,
        bytes: &[u8],
        pages: Vec<String>,
    ) -> Self {
        let pages: Vec<String> = pages.into_iter().map(|p| p.trim().to_string()).collect();
        Self {
            content_hash: content_hash(bytes),
            filename: filename.into(),
            page_count: pages.len(),
            pages,
        }
    }
}

/// Lower-case hex SHA-256 digest.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Display name for a path: the last component, or the whole path.
pub fn display_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read, validate and extract a PDF from disk.
pub async fn load_document(
    path: &Path,
    password: Option<&str>,
) -> Result<DocumentText, ExtractError> {
    let bytes = read_pdf_bytes(path).await?;
    let hash = content_hash(&bytes);
    debug!("{}: sha256 {}", path.display(), hash);

    let owned_path = path.to_path_buf();
    let pwd = password.map(str::to_string);
    let pages = tokio::task::spawn_blocking(move || {
        extract_pages_blocking(&owned_path, &bytes, pwd.as_deref())
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Text extraction task panicked: {}", e)))??;

    info!("Extracted text from {} pages", pages.len());

    Ok(DocumentText {
        content_hash: hash,
        filename: display_filename(path),
        page_count: pages.len(),
        pages,
    })
}

/// Read the file, mapping I/O failures to input errors and checking the
/// `%PDF` magic bytes so callers get a meaningful error rather than a pdfium one.
async fn read_pdf_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    check_magic(path, &bytes)?;
    Ok(bytes)
}

fn check_magic(path: &Path, bytes: &[u8]) -> Result<(), ExtractError> {
    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(ExtractError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Blocking implementation of per-page text extraction.
fn extract_pages_blocking(
    path: &Path,
    bytes: &[u8],
    password: Option<&str>,
) -> Result<Vec<String>, ExtractError> {
    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| ExtractError::PdfiumBindingFailed(e.to_string()))?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    ExtractError::WrongPassword {
                        path: path.to_path_buf(),
                    }
                } else {
                    ExtractError::PasswordRequired {
                        path: path.to_path_buf(),
                    }
                }
            } else {
                ExtractError::CorruptPdf {
                    path: path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

    let mut pages = Vec::with_capacity(document.pages().len() as usize);
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(|e| ExtractError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;
        pages.push(text.all().trim().to_string());
    }

    Ok(pages)
}
