// src/invoice.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{info, info_span, warn};

use crate::config::LlmSection;
use crate::error::{HarvestError, Result};
use crate::heuristics;
use crate::llm_extract::LlmClient;
use crate::pdf_text::{self, PdfContent};

/// The two identifiers pulled out of an invoice PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRefs {
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
}

impl InvoiceRefs {
    /// Trim values and drop blanks and placeholder strings like "null" or "N/A".
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            let v = v?;
            let v = v.trim();
            match v.to_ascii_lowercase().as_str() {
                "" | "null" | "none" | "n/a" | "unknown" => None,
                _ => Some(v.to_string()),
            }
        }
        Self {
            invoice_number: clean(self.invoice_number),
            order_number: clean(self.order_number),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.invoice_number.is_none() && self.order_number.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Llm,
    Heuristics,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMethod::Llm => f.write_str("llm"),
            ExtractionMethod::Heuristics => f.write_str("heuristics"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetails {
    #[serde(flatten)]
    pub refs: InvoiceRefs,
    pub method: ExtractionMethod,
}

/// Step one: turn the PDF into text.
pub fn read_attachment(path: &Path) -> Result<String> {
    match pdf_text::read_pdf_file(path) {
        PdfContent::Text(text) => Ok(text),
        PdfContent::ScannedImage => Err(HarvestError::Pdf(format!(
            "{} is scanned/image-only, no text to extract",
            path.display()
        ))),
        PdfContent::Error(e) => Err(HarvestError::Pdf(e)),
    }
}

/// Step two: find the references, preferring the model and falling back to regexes.
pub async fn get_details(llm: Option<&LlmClient>, text: &str) -> InvoiceDetails {
    if let Some(llm) = llm {
        match llm.extract_refs(text).await {
            Ok(refs) => {
                return InvoiceDetails {
                    refs,
                    method: ExtractionMethod::Llm,
                };
            }
            Err(e) => warn!(error = %e, "LLM extraction failed, falling back to heuristics"),
        }
    }

    InvoiceDetails {
        refs: heuristics::extract_refs(text),
        method: ExtractionMethod::Heuristics,
    }
}

/// Read `path` and extract its invoice and order numbers.
pub async fn run_workflow(path: &Path, llm: &LlmSection) -> Result<InvoiceDetails> {
    let client = LlmClient::from_config(llm)?;
    process_file(client.as_ref(), path).await
}

pub async fn process_file(llm: Option<&LlmClient>, path: &Path) -> Result<InvoiceDetails> {
    let span = info_span!("invoice", path = %path.display());
    let text = {
        let _guard = span.enter();
        read_attachment(path)?
    };

    let details = get_details(llm, &text).await;

    let _guard = span.enter();
    info!(
        invoice_number = ?details.refs.invoice_number,
        order_number = ?details.refs.order_number,
        method = %details.method,
        "Invoice details"
    );
    Ok(details)
}

/// PDFs among `paths`, by extension.
pub fn pdf_paths<P: AsRef<Path>>(paths: &[P]) -> impl Iterator<Item = &Path> {
    paths.iter().map(AsRef::as_ref).filter(|p| {
        p.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
    })
}
