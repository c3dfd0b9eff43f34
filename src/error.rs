// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while harvesting attachments.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// The mailbox could not be reached or a fetch call failed.
    #[error("message source unavailable: {0}")]
    SourceUnavailable(String),

    /// A part claims to be an attachment but its content can't be used.
    #[error("malformed part '{part}': {reason}")]
    MalformedPart { part: String, reason: String },

    #[error("filesystem error at '{path}': {source}")]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("PDF error: {0}")]
    Pdf(String),
}

pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Failures that only cost one part or one message, never the whole run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HarvestError::SourceUnavailable(_) | HarvestError::MalformedPart { .. }
        )
    }
}

impl From<google_gmail1::Error> for HarvestError {
    fn from(e: google_gmail1::Error) -> Self {
        HarvestError::SourceUnavailable(e.to_string())
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(e: reqwest::Error) -> Self {
        HarvestError::Llm(e.to_string())
    }
}
