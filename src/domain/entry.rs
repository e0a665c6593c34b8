use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RawEntry;

/// One syndication item, owned by exactly one feed.
///
/// Data fields default to the empty string rather than NULL; identity
/// resolution treats an empty guid/url/title as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub comments_url: String,
    pub date: DateTime<Utc>,
}

impl Entry {
    /// Normalize a raw entry into a candidate row for reconciliation.
    ///
    /// Content prefers the structured content body, falling back to the
    /// summary/description. The guid falls back to the entry URL, and a
    /// missing timestamp falls back to the current time.
    pub fn from_raw(feed_id: i64, raw: &RawEntry) -> Self {
        let url = raw.link.clone().unwrap_or_default();
        let guid = raw
            .guid
            .clone()
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| url.clone());

        Self {
            id: 0,
            feed_id,
            guid,
            url,
            title: raw.title.clone().unwrap_or_default(),
            content: raw
                .content
                .clone()
                .filter(|c| !c.is_empty())
                .or_else(|| raw.summary.clone())
                .unwrap_or_default(),
            author: raw.author.clone().unwrap_or_default(),
            comments_url: raw.comments_url.clone().unwrap_or_default(),
            date: raw.timestamp().unwrap_or_else(Utc::now),
        }
    }

    /// A previously seen entry has been re-published; take every data
    /// field from the newer candidate.
    pub fn merge_from(&mut self, newer: &Entry) {
        self.date = newer.date;
        self.title = newer.title.clone();
        self.content = newer.content.clone();
        self.author = newer.author.clone();
        self.comments_url = newer.comments_url.clone();
        self.url = newer.url.clone();
        self.guid = newer.guid.clone();
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_raw_guid_falls_back_to_url() {
        let raw = RawEntry {
            link: Some("https://example.com/post/1".into()),
            ..Default::default()
        };
        let entry = Entry::from_raw(1, &raw);
        assert_eq!(entry.guid, "https://example.com/post/1");
        assert_eq!(entry.url, "https://example.com/post/1");
    }

    #[test]
    fn test_from_raw_keeps_explicit_guid() {
        let raw = RawEntry {
            guid: Some("tag:example.com,2024:1".into()),
            link: Some("https://example.com/post/1".into()),
            ..Default::default()
        };
        let entry = Entry::from_raw(1, &raw);
        assert_eq!(entry.guid, "tag:example.com,2024:1");
    }

    #[test]
    fn test_from_raw_content_falls_back_to_summary() {
        let raw = RawEntry {
            summary: Some("short version".into()),
            ..Default::default()
        };
        assert_eq!(Entry::from_raw(1, &raw).content, "short version");

        let raw = RawEntry {
            content: Some("full body".into()),
            summary: Some("short version".into()),
            ..Default::default()
        };
        assert_eq!(Entry::from_raw(1, &raw).content, "full body");
    }

    #[test]
    fn test_from_raw_missing_date_defaults_to_now() {
        let before = Utc::now();
        let entry = Entry::from_raw(1, &RawEntry::default());
        assert!(entry.date >= before);
        assert!(entry.date <= Utc::now());
    }

    #[test]
    fn test_merge_from_overwrites_all_data_fields() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut old = Entry {
            id: 7,
            feed_id: 1,
            guid: "old-guid".into(),
            url: "https://example.com/old".into(),
            title: "Old".into(),
            content: "old body".into(),
            author: "a".into(),
            comments_url: String::new(),
            date,
        };

        let newer = Entry {
            id: 0,
            feed_id: 1,
            guid: "new-guid".into(),
            url: "https://example.com/new".into(),
            title: "New".into(),
            content: "new body".into(),
            author: "b".into(),
            comments_url: "https://example.com/new#comments".into(),
            date: date + chrono::Duration::days(1),
        };

        old.merge_from(&newer);
        assert_eq!(old.id, 7);
        assert_eq!(old.guid, "new-guid");
        assert_eq!(old.title, "New");
        assert_eq!(old.content, "new body");
        assert_eq!(old.author, "b");
        assert_eq!(old.comments_url, "https://example.com/new#comments");
        assert_eq!(old.url, "https://example.com/new");
        assert_eq!(old.date, newer.date);
    }
}
