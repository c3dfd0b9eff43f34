// src/pdf_text.rs

use lopdf::Document;
use std::path::Path;
use tracing::{info, warn};

/// Result of attempting to extract text from a PDF.
#[derive(Debug)]
pub enum PdfContent {
    /// The PDF contains extractable text.
    Text(String),
    /// The PDF appears to be scanned / image-only, needs OCR.
    ScannedImage,
    /// Something went wrong during extraction.
    Error(String),
}

/// Below this many non-whitespace characters a PDF is treated as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Share of image-only pages at which the whole document counts as scanned.
const SCANNED_PAGE_RATIO: f64 = 0.8;

pub fn read_pdf_file(path: &Path) -> PdfContent {
    match std::fs::read(path) {
        Ok(bytes) => extract_text_from_pdf(&bytes),
        Err(e) => PdfContent::Error(format!("Failed to read {}: {e}", path.display())),
    }
}

pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> PdfContent {
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return PdfContent::ScannedImage;
    }

    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => classify_text(text),
        Err(e) => {
            warn!(error = %e, "pdf-extract failed, may be scanned or corrupted");
            PdfContent::ScannedImage
        }
    }
}

fn classify_text(text: String) -> PdfContent {
    let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
    if meaningful < MIN_TEXT_CHARS {
        info!(chars = meaningful, "Extracted text too short, treating as scanned");
        PdfContent::ScannedImage
    } else {
        info!(chars = meaningful, "Text extracted successfully");
        PdfContent::Text(text.trim().to_string())
    }
}

/// Pages that carry XObject images but no fonts are scanned pages.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let image_only_pages = pages
        .values()
        .filter(|object_id| {
            let Some(resources) = doc
                .get_object(**object_id)
                .ok()
                .and_then(|page| page.as_dict().ok())
                .and_then(|page| page.get(b"Resources").ok())
                .and_then(|r| doc.dereference(r).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
            else {
                return false;
            };

            let non_empty = |key: &[u8]| {
                resources
                    .get(key)
                    .ok()
                    .and_then(|v| doc.dereference(v).ok())
                    .and_then(|(_, resolved)| resolved.as_dict().ok())
                    .is_some_and(|d| !d.is_empty())
            };

            non_empty(b"XObject") && !non_empty(b"Font")
        })
        .count();

    let ratio = image_only_pages as f64 / pages.len() as f64;
    info!(
        total_pages = pages.len(),
        image_only = image_only_pages,
        ratio = %format_args!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= SCANNED_PAGE_RATIO
}
