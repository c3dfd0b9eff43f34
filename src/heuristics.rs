// src/heuristics.rs

use crate::invoice::InvoiceRefs;
use regex::Regex;

/// Keyword-anchored regex extraction, used when no LLM is configured or it fails.
pub fn extract_refs(text: &str) -> InvoiceRefs {
    InvoiceRefs {
        invoice_number: extract_invoice_number(text),
        order_number: extract_order_number(text),
    }
}

fn extract_invoice_number(text: &str) -> Option<String> {
    // "Invoice No.", "Invoice Number:", "Invoice #", "Tax Invoice No"
    let re = Regex::new(
        r"(?i)\binvoice\s*(?:no\.?|number|num\.?|#)\s*[:#]?\s*([A-Z0-9][A-Z0-9\-/]*[0-9][A-Z0-9\-/]*)",
    )
    .ok()?;
    re.captures(text).map(|c| c[1].trim().to_string())
}

fn extract_order_number(text: &str) -> Option<String> {
    let re = Regex::new(
        r"(?i)\b(?:purchase\s+order|order|P\.?O\.?)\s*(?:no\.?|number|num\.?|#|id)?\s*[:#]?\s*([A-Z0-9][A-Z0-9\-/]*[0-9][A-Z0-9\-/]*)",
    )
    .ok()?;
    re.captures(text).map(|c| c[1].trim().to_string())
}
