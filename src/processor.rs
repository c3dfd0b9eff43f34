// src/processor.rs

use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::MailboxSettings;
use crate::error::HarvestError;
use crate::extractor::extract_and_save;
use crate::source::{MessageSource, SearchWindow};

/// Outcome of one harvesting run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    success: bool,
    message: String,
    files_downloaded: Vec<PathBuf>,
    emails_processed: usize,
    error: Option<String>,
}

impl ProcessingResult {
    pub fn succeeded(
        message: impl Into<String>,
        files_downloaded: Vec<PathBuf>,
        emails_processed: usize,
    ) -> Self {
        Self {
            success: true,
            message: message.into(),
            files_downloaded,
            emails_processed,
            error: None,
        }
    }

    /// A run that could not complete; `files_downloaded` keeps whatever made it to disk.
    pub fn failed(
        message: impl Into<String>,
        error: &HarvestError,
        files_downloaded: Vec<PathBuf>,
        emails_processed: usize,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            files_downloaded,
            emails_processed,
            error: Some(error.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn files_downloaded(&self) -> &[PathBuf] {
        &self.files_downloaded
    }

    pub fn emails_processed(&self) -> usize {
        self.emails_processed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Check for recent mail and download every attachment into `settings.data_dir`.
pub async fn process_new_emails<S>(source: &S, settings: &MailboxSettings) -> ProcessingResult
where
    S: MessageSource + ?Sized,
{
    let dir = &settings.data_dir;
    if let Err(e) = fs::create_dir_all(dir) {
        let err = HarvestError::fs(dir, e);
        error!(error = %err, "Data folder unavailable");
        return ProcessingResult::failed("Could not prepare data folder", &err, Vec::new(), 0);
    }

    let window = SearchWindow::from(settings);
    let ids = match source.list_recent(&window).await {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "Listing recent messages failed");
            return ProcessingResult::failed("Could not list recent emails", &e, Vec::new(), 0);
        }
    };

    if ids.is_empty() {
        info!("No recent messages with attachments");
        return ProcessingResult::succeeded("No new emails with attachments found", Vec::new(), 0);
    }

    let mut downloaded: Vec<PathBuf> = Vec::new();
    for id in &ids {
        let message = match source.fetch_message(id).await {
            Ok(m) => m,
            Err(e) if e.is_recoverable() => {
                warn!(id = %id, error = %e, "Skipping message");
                continue;
            }
            Err(e) => {
                error!(id = %id, error = %e, "Fetching message failed");
                return ProcessingResult::failed(
                    "Processing aborted while fetching emails",
                    &e,
                    downloaded,
                    ids.len(),
                );
            }
        };

        match extract_and_save(&message, dir, source).await {
            Ok(paths) => downloaded.extend(paths),
            Err(e) => {
                error!(id = %id, error = %e, "Writing attachments failed");
                return ProcessingResult::failed(
                    "Processing aborted while saving attachments",
                    &e,
                    downloaded,
                    ids.len(),
                );
            }
        }
    }

    let summary = if downloaded.is_empty() {
        "Emails found but no attachments to download".to_string()
    } else {
        format!(
            "Successfully downloaded {} attachment(s) from {} email(s)",
            downloaded.len(),
            ids.len()
        )
    };
    info!(files = downloaded.len(), emails = ids.len(), "{summary}");
    ProcessingResult::succeeded(summary, downloaded, ids.len())
}
