//! Conditional fetch and update classification for a single feed.
//!
//! One `check` call walks the whole protocol: fetch (conditionally unless
//! forced), classify the resulting status, and decide whether the feed has
//! new content since its last recorded update. The feed's `last_checked_at`
//! is stamped on every path, success or failure.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::domain::{Feed, RawEntry, RawFeedDocument};
use crate::fetcher::Fetcher;

/// Classification of a failed check.
///
/// `Broken` is terminal for the feed until the broken flag is cleared
/// manually; `Temporary` leaves the feed active for the next run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("feed gone: {0}")]
    Broken(String),
    #[error("{0}")]
    Temporary(String),
}

pub struct Scraper<'a> {
    fetcher: &'a (dyn Fetcher + Send + Sync),
}

impl<'a> Scraper<'a> {
    pub fn new(fetcher: &'a (dyn Fetcher + Send + Sync)) -> Self {
        Self { fetcher }
    }

    /// Fetch the feed and classify the response.
    ///
    /// 404 and 410 mean the source is permanently gone. 200/301/302 must
    /// carry a parseable document with a title; anything structurally
    /// invalid is a temporary error. 304 legitimately has no body and is
    /// passed through for the update decision. Every other status is
    /// unrecognized and treated as temporary.
    async fn parse(&self, feed: &Feed, force: bool) -> Result<RawFeedDocument, FeedError> {
        let fetched = if force {
            self.fetcher.fetch(&feed.feed_url, None, None).await
        } else {
            self.fetcher
                .fetch(&feed.feed_url, feed.etag.as_deref(), feed.last_updated_at)
                .await
        };

        let document =
            fetched.map_err(|e| FeedError::Temporary(format!("fetch failed: {e}")))?;

        match document.status {
            404 | 410 => Err(FeedError::Broken("feed not found".into())),
            304 => Ok(document),
            200 | 301 | 302 => match &document.meta {
                Some(meta) if meta.title.is_some() => Ok(document),
                _ => Err(FeedError::Temporary("invalid feed content".into())),
            },
            status => Err(FeedError::Temporary(format!("unrecognized status: {status}"))),
        }
    }

    /// Check the feed for updates.
    ///
    /// Returns whether the feed has new content and the fetched document.
    /// Temporary failures are recorded on the feed and reported as
    /// `(false, None)`; a broken feed is marked as such and the error
    /// propagates so the caller can skip it in future runs.
    pub async fn check(
        &self,
        feed: &mut Feed,
        force: bool,
    ) -> Result<(bool, Option<RawFeedDocument>), FeedError> {
        let result = self.parse(feed, force).await;

        // Unconditional: the check happened, whatever came of it.
        feed.last_checked_at = Utc::now();

        match result {
            Ok(document) => {
                let updated = has_updated(feed, &document.entries, force);
                Ok((updated, Some(document)))
            }
            Err(FeedError::Broken(msg)) => {
                feed.broken = true;
                feed.error = Some(msg.clone());
                Err(FeedError::Broken(msg))
            }
            Err(FeedError::Temporary(msg)) => {
                debug!(feed = %feed.feed_url, error = %msg, "temporary feed error");
                feed.error = Some(msg);
                Ok((false, None))
            }
        }
    }
}

/// Greatest timestamp across the document's entries, skipping entries
/// without one.
pub fn find_latest_entry_date(entries: &[RawEntry]) -> Option<DateTime<Utc>> {
    entries.iter().filter_map(RawEntry::timestamp).max()
}

fn has_updated(feed: &Feed, entries: &[RawEntry], force: bool) -> bool {
    if force {
        return true;
    }

    match find_latest_entry_date(entries) {
        Some(latest) => feed
            .last_updated_at
            .map_or(true, |last| latest > last),
        None => false,
    }
}
