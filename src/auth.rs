// src/auth.rs
//
// Supplies a ready Gmail hub. The OAuth dance itself is yup-oauth2's job; we
// only seed it with the tokens from the config file.

use async_trait::async_trait;
use google_gmail1::Gmail;
use serde::Deserialize;
use std::path::Path;
use time::{Duration, OffsetDateTime};
use tracing::info;
use urlencoding::encode;
use yup_oauth2::error::TokenStorageError;
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use crate::config::{Config, GmailConfig};
use crate::error::{HarvestError, Result};
use crate::gmail_source::GmailHub;

/// Lifetime assumed for an access token read from disk.
const STORED_TOKEN_TTL_SECS: i64 = 3599;

/// Token storage seeded from config; refreshed tokens live only in memory.
struct SeededTokenStore {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[async_trait]
impl TokenStorage for SeededTokenStore {
    async fn set(&self, _scopes: &[&str], _token: TokenInfo) -> std::result::Result<(), TokenStorageError> {
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        if self.access_token.is_empty() && self.refresh_token.is_empty() {
            return None;
        }
        Some(TokenInfo {
            access_token: Some(self.access_token.clone()).filter(|t| !t.is_empty()),
            refresh_token: Some(self.refresh_token.clone()).filter(|t| !t.is_empty()),
            expires_at: Some(OffsetDateTime::now_utc() + Duration::seconds(self.expires_in)),
            id_token: None,
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

/// Exchange the refresh token for a new access token.
pub async fn refresh_access_token(gmail: &GmailConfig) -> Result<TokenResponse> {
    let body = format!(
        "client_id={}&client_secret={}&refresh_token={}&grant_type=refresh_token",
        encode(&gmail.client_id),
        encode(&gmail.client_secret),
        encode(&gmail.tokens.refresh_token),
    );

    let resp = reqwest::Client::new()
        .post(&gmail.urls.token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .map_err(|e| HarvestError::Auth(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let error_text = resp.text().await.unwrap_or_default();
        return Err(HarvestError::Auth(format!("token refresh failed ({status}): {error_text}")));
    }

    resp.json()
        .await
        .map_err(|e| HarvestError::Auth(format!("bad token response: {e}")))
}

/// Build the Gmail hub from `cfg`. With `refresh`, a new access token is
/// fetched first and written back to `config_path`.
pub async fn create_hub(cfg: &Config, config_path: &Path, refresh: bool) -> Result<GmailHub> {
    let (access_token, ttl) = if refresh {
        info!("Refreshing access token");
        let token = refresh_access_token(&cfg.gmail).await?;
        Config::update_access_token(config_path, &token.access_token)?;
        (token.access_token, token.expires_in)
    } else {
        (cfg.gmail.tokens.access_token.clone(), STORED_TOKEN_TTL_SECS)
    };

    let secret = ApplicationSecret {
        client_id: cfg.gmail.client_id.clone(),
        client_secret: cfg.gmail.client_secret.clone(),
        token_uri: cfg.gmail.urls.token_url.clone(),
        auth_uri: cfg.gmail.urls.auth_url.clone(),
        redirect_uris: vec!["http://localhost".to_string()],
        project_id: None,
        client_email: None,
        auth_provider_x509_cert_url: None,
        client_x509_cert_url: None,
    };

    let auth = InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
        .with_storage(Box::new(SeededTokenStore {
            access_token,
            refresh_token: cfg.gmail.tokens.refresh_token.clone(),
            expires_in: ttl,
        }))
        .build()
        .await
        .map_err(|e| HarvestError::Auth(e.to_string()))?;

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_webpki_roots()
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}
