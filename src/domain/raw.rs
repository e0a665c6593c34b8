use chrono::{DateTime, Utc};

/// Transient output of one fetch. Consumed by the scraper and reconciler,
/// never persisted as-is.
#[derive(Debug, Clone)]
pub struct RawFeedDocument {
    /// HTTP status the fetch ended with.
    pub status: u16,
    /// Feed-level metadata; `None` when the body could not be parsed.
    pub meta: Option<RawFeedMeta>,
    /// ETag returned by the server, if any.
    pub etag: Option<String>,
    pub entries: Vec<RawEntry>,
}

impl RawFeedDocument {
    /// A bodyless document carrying only a status, e.g. a 304 response.
    pub fn status_only(status: u16) -> Self {
        Self {
            status,
            meta: None,
            etag: None,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawFeedMeta {
    pub title: Option<String>,
    pub link: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub guid: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub comments_url: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub published: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

impl RawEntry {
    /// Best-known timestamp: updated, then published, then created.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.updated.or(self.published).or(self.created)
    }
}
