// src/gmail_source.rs

use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::api::Scope;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::{HarvestError, Result};
use crate::message::{AttachmentRef, FetchedMessage, MessagePart};
use crate::source::{MessageSource, SearchWindow};

pub type GmailHub = Gmail<HttpsConnector<HttpConnector>>;

/// Read-only view of one Gmail mailbox.
pub struct GmailSource {
    hub: GmailHub,
    user: String,
}

impl GmailSource {
    pub fn new(hub: GmailHub, user: impl Into<String>) -> Self {
        Self {
            hub,
            user: user.into(),
        }
    }

    /// Address the credential actually belongs to.
    pub async fn authenticated_address(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile(&self.user)
            .add_scope(Scope::Readonly)
            .doit()
            .await
            .map_err(|e| HarvestError::Auth(e.to_string()))?;
        Ok(profile.email_address.unwrap_or_default())
    }

    /// Warn when the credential's mailbox is not the one we were told to watch.
    pub async fn check_account(&self, target_email: Option<&str>) -> Result<()> {
        let address = self.authenticated_address().await?;
        info!(address = %address, "Authenticated Gmail account");
        if let Some(target) = target_email {
            if !address.eq_ignore_ascii_case(target) {
                warn!(
                    authenticated = %address,
                    target = %target,
                    "Authenticated account differs from target; searching the authenticated inbox"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSource for GmailSource {
    async fn list_recent(&self, window: &SearchWindow) -> Result<Vec<String>> {
        let query = window.query(OffsetDateTime::now_utc());
        info!(user = %self.user, query = %query, max = window.max_results, "Starting id fetch");

        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = window.max_results.saturating_sub(ids.len() as u32);
            if remaining == 0 {
                break;
            }

            let mut req = self
                .hub
                .users()
                .messages_list(&self.user)
                .q(&query)
                .max_results(remaining)
                .add_scope(Scope::Readonly);
            if let Some(token) = page_token.as_deref() {
                req = req.page_token(token);
            }

            let (_, response) = req.doit().await?;

            ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            match response.next_page_token {
                Some(token) => {
                    debug!(next_token = %token, "Fetching next page");
                    page_token = Some(token);
                }
                None => break,
            }
        }

        ids.truncate(window.max_results as usize);
        info!(matches = ids.len(), "Listing complete");
        Ok(ids)
    }

    async fn fetch_message(&self, id: &str) -> Result<FetchedMessage> {
        let (_, email) = self
            .hub
            .users()
            .messages_get(&self.user, id)
            .add_scope(Scope::Readonly)
            .doit()
            .await?;

        let payload = email.payload.as_ref().ok_or_else(|| HarvestError::MalformedPart {
            part: id.to_string(),
            reason: "message has no payload".to_string(),
        })?;

        let received = match email.internal_date {
            Some(ms) => OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
                .map_err(|e| HarvestError::MalformedPart {
                    part: id.to_string(),
                    reason: format!("bad internalDate {ms}: {e}"),
                })?,
            None => {
                warn!(id = %id, "Message has no internalDate, using now for collision names");
                OffsetDateTime::now_utc()
            }
        };

        info!(id = %id, mime = ?payload.mime_type, "Fetched message");

        Ok(FetchedMessage {
            id: id.to_string(),
            received,
            root: MessagePart::from_gmail(id, payload),
        })
    }

    async fn fetch_content(&self, reference: &AttachmentRef) -> Result<Vec<u8>> {
        let (_, body) = self
            .hub
            .users()
            .messages_attachments_get(&self.user, &reference.message_id, &reference.attachment_id)
            .add_scope(Scope::Readonly)
            .doit()
            .await?;

        body.data.ok_or_else(|| HarvestError::MalformedPart {
            part: reference.attachment_id.clone(),
            reason: "attachment body has no data".to_string(),
        })
    }
}
