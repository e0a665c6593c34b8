pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{Entry, Feed, FeedUpdate};

pub use sqlite::SqliteStore;

/// Persistence boundary for the sync engine.
///
/// The entry lookups implement the identity fallback chain: callers probe
/// by guid, then url, then the exact (title, date) pair, always scoped to
/// one feed.
pub trait Store {
    // Feed operations
    fn add_feed(&self, feed: &Feed) -> Result<i64>;
    fn get_feed(&self, id: i64) -> Result<Option<Feed>>;
    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>>;
    fn all_feeds(&self) -> Result<Vec<Feed>>;
    /// Feeds eligible for sync, i.e. not marked broken.
    fn active_feeds(&self) -> Result<Vec<Feed>>;
    /// Write only the columns populated in the update.
    fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()>;
    /// Write back every mutable column of an existing feed row.
    fn save_feed(&self, feed: &Feed) -> Result<()>;
    fn delete_feed(&self, id: i64) -> Result<()>;
    /// Manual reset of the broken flag; also clears the stored error.
    fn clear_broken(&self, id: i64) -> Result<()>;

    // Entry operations
    fn insert_entry(&self, entry: &Entry) -> Result<i64>;
    fn update_entry(&self, entry: &Entry) -> Result<()>;
    fn find_entry_by_guid(&self, feed_id: i64, guid: &str) -> Result<Option<Entry>>;
    fn find_entry_by_url(&self, feed_id: i64, url: &str) -> Result<Option<Entry>>;
    fn find_entry_by_title_date(
        &self,
        feed_id: i64,
        title: &str,
        date: DateTime<Utc>,
    ) -> Result<Option<Entry>>;
    fn entries_for_feed(&self, feed_id: i64) -> Result<Vec<Entry>>;
    fn entry_count(&self, feed_id: i64) -> Result<i64>;
}
