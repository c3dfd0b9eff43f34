// src/inventory.rs

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use crate::config::Config;
use crate::error::{HarvestError, Result};
use crate::store::{StoredDownload, StoredRun};

pub const GMAIL_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

pub fn rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

fn now() -> String {
    rfc3339(OffsetDateTime::now_utc())
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: String,
    pub folder: PathBuf,
    #[serde(skip)]
    modified_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct FileListing {
    pub files: Vec<FileEntry>,
    pub total_count: usize,
    pub timestamp: String,
}

/// Every regular file under `dir`, newest first. A missing `dir` is an empty listing.
pub fn list_files(dir: &Path) -> Result<FileListing> {
    let mut files = Vec::new();
    if dir.is_dir() {
        collect_files(dir, &mut files)?;
    }
    files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));

    Ok(FileListing {
        total_count: files.len(),
        files,
        timestamp: now(),
    })
}

fn collect_files(dir: &Path, out: &mut Vec<FileEntry>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| HarvestError::fs(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| HarvestError::fs(dir, e))?;
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if meta.is_dir() {
            collect_files(&path, out)?;
        } else if meta.is_file() {
            let modified_at = meta
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);
            out.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                modified: rfc3339(modified_at),
                folder: dir.to_path_buf(),
                path,
                modified_at,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub credentials_configured: bool,
    pub token_exists: bool,
    pub data_folder_exists: bool,
    pub target_email: Option<String>,
    pub last_run: Option<StoredRun>,
    pub last_run_files: Vec<StoredDownload>,
    pub timestamp: String,
}

pub fn status(
    cfg: &Config,
    last_run: Option<StoredRun>,
    last_run_files: Vec<StoredDownload>,
) -> StatusReport {
    let tokens = &cfg.gmail.tokens;
    StatusReport {
        status: "ready",
        credentials_configured: !cfg.gmail.client_id.is_empty()
            && !cfg.gmail.client_secret.is_empty(),
        token_exists: !tokens.access_token.is_empty() || !tokens.refresh_token.is_empty(),
        data_folder_exists: cfg.mailbox.data_dir.is_dir(),
        target_email: cfg.mailbox.target_email.clone(),
        last_run,
        last_run_files,
        timestamp: now(),
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub target_email: Option<String>,
    pub data_folder: PathBuf,
    pub gmail_api_scopes: &'static [&'static str],
    pub search_hours_back: i64,
    pub max_results: u32,
    pub llm_backend: String,
    pub llm_model: Option<String>,
    pub version: &'static str,
    pub timestamp: String,
}

/// Effective settings with secrets left out.
pub fn config_report(cfg: &Config) -> ConfigReport {
    ConfigReport {
        target_email: cfg.mailbox.target_email.clone(),
        data_folder: cfg.mailbox.data_dir.clone(),
        gmail_api_scopes: GMAIL_SCOPES,
        search_hours_back: cfg.mailbox.hours_back,
        max_results: cfg.mailbox.max_results,
        llm_backend: format!("{:?}", cfg.llm.backend).to_lowercase(),
        llm_model: cfg.llm.active_model().map(str::to_string),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now(),
    }
}
