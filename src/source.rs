// src/source.rs

use async_trait::async_trait;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

use crate::config::{MAX_HOURS_BACK, MailboxSettings};
use crate::error::Result;
use crate::message::{AttachmentRef, FetchedMessage};

/// Which messages count as "recent".
#[derive(Debug, Clone)]
pub struct SearchWindow {
    pub hours_back: i64,
    pub max_results: u32,
    pub require_attachment: bool,
}

impl From<&MailboxSettings> for SearchWindow {
    fn from(settings: &MailboxSettings) -> Self {
        Self {
            hours_back: settings.hours_back,
            max_results: settings.max_results,
            require_attachment: true,
        }
    }
}

impl SearchWindow {
    /// Gmail search syntax for this window, anchored at `now`.
    ///
    /// `after:` only has day resolution, so the window is widened to the
    /// start of the day `hours_back` hours ago. Windows beyond
    /// [`MAX_HOURS_BACK`] are clamped.
    pub fn query(&self, now: OffsetDateTime) -> String {
        let hours = self.hours_back.clamp(0, MAX_HOURS_BACK);
        let since = now
            .checked_sub(Duration::hours(hours))
            .unwrap_or(now);
        let fmt = format_description!("[year]/[month]/[day]");
        let date = since
            .format(fmt)
            .unwrap_or_else(|_| since.date().to_string());
        if self.require_attachment {
            format!("has:attachment after:{date}")
        } else {
            format!("after:{date}")
        }
    }
}

/// Anything that can list messages and hand out their parts and bytes.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn list_recent(&self, window: &SearchWindow) -> Result<Vec<String>>;

    async fn fetch_message(&self, id: &str) -> Result<FetchedMessage>;

    async fn fetch_content(&self, reference: &AttachmentRef) -> Result<Vec<u8>>;
}
