use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, TributaryError};
use crate::domain::{Entry, Feed, FeedUpdate};
use crate::store::Store;

const FEED_COLUMNS: &str = "id, feed_url, title, alternate_title, site_url, feed_type, etag, \
     broken, error, created_at, last_checked_at, last_updated_at";

const ENTRY_COLUMNS: &str =
    "id, feed_id, guid, url, title, content, author, comments_url, date";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| TributaryError::Other(format!("migration failed: {e}")))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            TributaryError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }
}

fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        feed_url: row.get(1)?,
        title: row.get(2)?,
        alternate_title: row.get(3)?,
        site_url: row.get(4)?,
        feed_type: row.get(5)?,
        etag: row.get(6)?,
        broken: row.get::<_, i32>(7)? != 0,
        error: row.get(8)?,
        created_at: row
            .get::<_, String>(9)
            .ok()
            .and_then(|s| SqliteStore::parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        last_checked_at: row
            .get::<_, String>(10)
            .ok()
            .and_then(|s| SqliteStore::parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        last_updated_at: row
            .get::<_, Option<String>>(11)?
            .and_then(|s| SqliteStore::parse_datetime(&s)),
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        guid: row.get(2)?,
        url: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        author: row.get(6)?,
        comments_url: row.get(7)?,
        date: row
            .get::<_, String>(8)
            .ok()
            .and_then(|s| SqliteStore::parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

impl Store for SqliteStore {
    fn add_feed(&self, feed: &Feed) -> Result<i64> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO feeds (feed_url, title, alternate_title, site_url, feed_type, etag, \
             broken, error, created_at, last_checked_at, last_updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                feed.feed_url,
                feed.title,
                feed.alternate_title,
                feed.site_url,
                feed.feed_type,
                feed.etag,
                feed.broken as i32,
                feed.error,
                feed.created_at.to_rfc3339(),
                feed.last_checked_at.to_rfc3339(),
                feed.last_updated_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let conn = self.lock()?;

        let result = conn
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"),
                params![id],
                feed_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let conn = self.lock()?;

        let result = conn
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE feed_url = ?1"),
                params![url],
                feed_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn all_feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY title, feed_url"
        ))?;

        let feeds = stmt
            .query_map([], feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn active_feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE broken = 0 ORDER BY title, feed_url"
        ))?;

        let feeds = stmt
            .query_map([], feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()> {
        let conn = self.lock()?;

        if let Some(ref title) = update.title {
            conn.execute(
                "UPDATE feeds SET title = ?1 WHERE id = ?2",
                params![title, id],
            )?;
        }
        if let Some(ref etag) = update.etag {
            conn.execute("UPDATE feeds SET etag = ?1 WHERE id = ?2", params![etag, id])?;
        }
        if let Some(ref error) = update.error {
            conn.execute(
                "UPDATE feeds SET error = ?1 WHERE id = ?2",
                params![error, id],
            )?;
        }
        if let Some(last_checked_at) = update.last_checked_at {
            conn.execute(
                "UPDATE feeds SET last_checked_at = ?1 WHERE id = ?2",
                params![last_checked_at.to_rfc3339(), id],
            )?;
        }
        if let Some(last_updated_at) = update.last_updated_at {
            conn.execute(
                "UPDATE feeds SET last_updated_at = ?1 WHERE id = ?2",
                params![last_updated_at.to_rfc3339(), id],
            )?;
        }

        Ok(())
    }

    fn save_feed(&self, feed: &Feed) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "UPDATE feeds SET title = ?1, alternate_title = ?2, site_url = ?3, feed_type = ?4, \
             etag = ?5, broken = ?6, error = ?7, last_checked_at = ?8, last_updated_at = ?9
             WHERE id = ?10",
            params![
                feed.title,
                feed.alternate_title,
                feed.site_url,
                feed.feed_type,
                feed.etag,
                feed.broken as i32,
                feed.error,
                feed.last_checked_at.to_rfc3339(),
                feed.last_updated_at.map(|dt| dt.to_rfc3339()),
                feed.id,
            ],
        )?;

        Ok(())
    }

    fn delete_feed(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn clear_broken(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE feeds SET broken = 0, error = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    fn insert_entry(&self, entry: &Entry) -> Result<i64> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO entries (feed_id, guid, url, title, content, author, comments_url, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.feed_id,
                entry.guid,
                entry.url,
                entry.title,
                entry.content,
                entry.author,
                entry.comments_url,
                entry.date.to_rfc3339(),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn update_entry(&self, entry: &Entry) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "UPDATE entries SET guid = ?1, url = ?2, title = ?3, content = ?4, author = ?5, \
             comments_url = ?6, date = ?7 WHERE id = ?8",
            params![
                entry.guid,
                entry.url,
                entry.title,
                entry.content,
                entry.author,
                entry.comments_url,
                entry.date.to_rfc3339(),
                entry.id,
            ],
        )?;

        Ok(())
    }

    fn find_entry_by_guid(&self, feed_id: i64, guid: &str) -> Result<Option<Entry>> {
        let conn = self.lock()?;

        let result = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE feed_id = ?1 AND guid = ?2"),
                params![feed_id, guid],
                entry_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn find_entry_by_url(&self, feed_id: i64, url: &str) -> Result<Option<Entry>> {
        let conn = self.lock()?;

        let result = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE feed_id = ?1 AND url = ?2"),
                params![feed_id, url],
                entry_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn find_entry_by_title_date(
        &self,
        feed_id: i64,
        title: &str,
        date: DateTime<Utc>,
    ) -> Result<Option<Entry>> {
        let conn = self.lock()?;

        let result = conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries \
                     WHERE feed_id = ?1 AND title = ?2 AND date = ?3"
                ),
                params![feed_id, title, date.to_rfc3339()],
                entry_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn entries_for_feed(&self, feed_id: i64) -> Result<Vec<Entry>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE feed_id = ?1 ORDER BY date DESC"
        ))?;

        let entries = stmt
            .query_map(params![feed_id], entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn entry_count(&self, feed_id: i64) -> Result<i64> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE feed_id = ?1",
            params![feed_id],
            |row| row.get(0),
        )?;

        Ok(count)
    }
}
