use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RawFeedMeta;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub feed_url: String,
    pub title: Option<String>,
    pub alternate_title: Option<String>,
    pub site_url: Option<String>,
    pub feed_type: Option<String>,
    pub etag: Option<String>,
    pub broken: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl Feed {
    pub fn new(feed_url: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            feed_url,
            title: None,
            alternate_title: None,
            site_url: None,
            feed_type: None,
            etag: None,
            broken: false,
            error: None,
            created_at: now,
            last_checked_at: now,
            last_updated_at: None,
        }
    }

    pub fn display_title(&self) -> &str {
        self.alternate_title
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or(&self.feed_url)
    }

    /// Append a diagnostic to the feed's error field, keeping earlier text.
    pub fn push_error(&mut self, msg: &str) {
        match &mut self.error {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(msg);
            }
            None => self.error = Some(msg.to_string()),
        }
    }

    /// Apply document-level metadata after a detected update.
    ///
    /// The feed type is only set once; later documents never change it.
    pub fn apply_meta(&mut self, meta: &RawFeedMeta) {
        if self.feed_type.is_none() {
            self.feed_type = meta.version.clone();
        }
        if let Some(title) = &meta.title {
            self.title = Some(title.clone());
        }
        if let Some(link) = &meta.link {
            self.site_url = Some(link.clone());
        }
    }
}

/// Partial update for a feed row; only the populated fields are written.
#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub title: Option<String>,
    pub etag: Option<String>,
    pub error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
}
