// src/config.rs

use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};
use toml_edit::{DocumentMut, value};

use crate::error::{HarvestError, Result};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(rename = "gmail_oauth")]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub mailbox: MailboxSettings,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "msgstore/harvest.db".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    pub tokens: Tokens,
    #[serde(default)]
    pub urls: AuthUrls,
}

#[derive(Debug, Default, Deserialize)]
pub struct Tokens {
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthUrls {
    pub token_url: String,
    pub auth_url: String,
}

impl Default for AuthUrls {
    fn default() -> Self {
        Self {
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
        }
    }
}

/// Largest accepted search window, one hundred years.
pub const MAX_HOURS_BACK: i64 = 24 * 365 * 100;

/// Where to look for mail and where attachments land.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailboxSettings {
    /// Gmail user id; `me` is the authenticated account.
    pub user: String,
    pub target_email: Option<String>,
    pub data_dir: PathBuf,
    pub hours_back: i64,
    pub max_results: u32,
}

impl Default for MailboxSettings {
    fn default() -> Self {
        Self {
            user: "me".to_string(),
            target_email: None,
            data_dir: PathBuf::from("data"),
            hours_back: 24,
            max_results: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    Heuristics,
    Ollama,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmEndpoint {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub backend: LlmBackend,
    pub ollama: LlmEndpoint,
    pub remote: LlmEndpoint,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Remote,
            ollama: LlmEndpoint {
                base_url: "http://localhost:11434/v1".to_string(),
                model: "qwen3:8b".to_string(),
            },
            remote: LlmEndpoint {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
            },
        }
    }
}

impl LlmSection {
    pub fn active_model(&self) -> Option<&str> {
        match self.backend {
            LlmBackend::Heuristics => None,
            LlmBackend::Ollama => Some(&self.ollama.model),
            LlmBackend::Remote => Some(&self.remote.model),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| HarvestError::fs(path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| HarvestError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let hours = self.mailbox.hours_back;
        if !(0..=MAX_HOURS_BACK).contains(&hours) {
            return Err(HarvestError::Config(format!(
                "mailbox.hours_back must be between 0 and {MAX_HOURS_BACK}, got {hours}"
            )));
        }
        Ok(())
    }

    /// Rewrite only the access token, leaving comments and layout intact.
    pub fn update_access_token(path: impl AsRef<Path>, new_token: &str) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| HarvestError::fs(path, e))?;
        let mut doc = content
            .parse::<DocumentMut>()
            .map_err(|e| HarvestError::Config(e.to_string()))?;

        doc["gmail_oauth"]["tokens"]["access_token"] = value(new_token);

        fs::write(path, doc.to_string()).map_err(|e| HarvestError::fs(path, e))?;
        Ok(())
    }
}
