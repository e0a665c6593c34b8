//! Bounded-concurrency batch driver.
//!
//! One scheduler is built per run: it seeds a shared queue with the whole
//! feed batch, spawns a fixed pool of workers that drain it, and joins
//! them all before returning. Each feed appears in the queue exactly once,
//! so no two workers ever touch the same feed's state; that single
//! invariant replaces per-row locking.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::domain::{Feed, FeedUpdate};
use crate::fetcher::Fetcher;
use crate::reconciler::EntryReconciler;
use crate::scraper::{FeedError, Scraper};
use crate::store::Store;

pub const DEFAULT_WORKERS: usize = 10;

/// Aggregate result of one synchronization pass.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub total: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub broken: usize,
    pub failed: usize,
    pub entries_added: usize,
    pub entries_merged: usize,
    pub elapsed: Duration,
}

impl RunStats {
    fn absorb(&mut self, other: RunStats) {
        self.total += other.total;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.broken += other.broken;
        self.failed += other.failed;
        self.entries_added += other.entries_added;
        self.entries_merged += other.entries_merged;
    }

    fn absorb_outcome(&mut self, worker_id: usize, outcome: FeedOutcome) {
        match outcome {
            FeedOutcome::Updated {
                feed_url,
                inserted,
                merged,
                clean,
            } => {
                self.updated += 1;
                self.entries_added += inserted;
                self.entries_merged += merged;
                if !clean {
                    self.failed += 1;
                }
                info!(worker = worker_id, feed = %feed_url, inserted, merged, "feed updated");
            }
            FeedOutcome::Unchanged => self.unchanged += 1,
            FeedOutcome::Broken { feed_url } => {
                self.broken += 1;
                warn!(worker = worker_id, feed = %feed_url, "feed marked broken");
            }
            FeedOutcome::Failed { feed_url, message } => {
                self.failed += 1;
                error!(worker = worker_id, feed = %feed_url, error = %message, "feed sync failed");
            }
        }
    }
}

pub struct SyncScheduler<S: ?Sized> {
    store: Arc<S>,
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    workers: usize,
    force: bool,
}

impl<S: Store + Send + Sync + ?Sized + 'static> SyncScheduler<S> {
    pub fn new(store: Arc<S>, fetcher: Arc<dyn Fetcher + Send + Sync>, workers: usize) -> Self {
        Self {
            store,
            fetcher,
            workers: workers.max(1),
            force: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Process every feed in the batch exactly once, returning only after
    /// all of them have completed.
    pub async fn run(&self, feeds: Vec<Feed>) -> RunStats {
        let started = Instant::now();
        let total = feeds.len();

        // The batch is fully seeded before any worker starts draining it.
        let queue = Arc::new(Mutex::new(feeds.into_iter().collect::<VecDeque<_>>()));

        let pool_size = self.workers.min(total.max(1));
        let mut handles = Vec::with_capacity(pool_size);

        for worker_id in 0..pool_size {
            let queue = queue.clone();
            let store = self.store.clone();
            let fetcher = self.fetcher.clone();
            let force = self.force;

            handles.push(tokio::spawn(async move {
                let mut stats = RunStats::default();

                loop {
                    let Some(feed) = next_feed(&queue, worker_id) else {
                        break;
                    };

                    let outcome = sync_feed(store.as_ref(), fetcher.as_ref(), feed, force).await;
                    stats.total += 1;
                    stats.absorb_outcome(worker_id, outcome);
                }

                stats
            }));
        }

        let mut stats = RunStats::default();
        for handle in handles {
            match handle.await {
                Ok(worker_stats) => stats.absorb(worker_stats),
                Err(e) => error!("Worker join error: {}", e),
            }
        }

        stats.elapsed = started.elapsed();
        info!(
            total = stats.total,
            updated = stats.updated,
            broken = stats.broken,
            failed = stats.failed,
            entries = stats.entries_added,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "sync pass complete"
        );

        stats
    }
}

/// Pop the next feed off the shared queue.
///
/// The queue is only ever drained, never re-seeded. A poisoned queue means
/// a worker panicked mid-pop and any feeds still queued will be skipped
/// this run, so that is reported rather than swallowed.
fn next_feed(queue: &Mutex<VecDeque<Feed>>, worker_id: usize) -> Option<Feed> {
    match queue.lock() {
        Ok(mut q) => q.pop_front(),
        Err(e) => {
            error!(worker = worker_id, error = %e, "feed queue poisoned; worker stopping");
            None
        }
    }
}

enum FeedOutcome {
    Updated {
        feed_url: String,
        inserted: usize,
        merged: usize,
        clean: bool,
    },
    Unchanged,
    Broken {
        feed_url: String,
    },
    Failed {
        feed_url: String,
        message: String,
    },
}

/// One feed's full cycle: fetch classification, reconciliation,
/// persistence. A failure here never propagates to the rest of the batch.
async fn sync_feed<S: Store + ?Sized>(
    store: &S,
    fetcher: &(dyn Fetcher + Send + Sync),
    mut feed: Feed,
    force: bool,
) -> FeedOutcome {
    let feed_url = feed.feed_url.clone();
    let scraper = Scraper::new(fetcher);

    let (updated, document) = match scraper.check(&mut feed, force).await {
        Ok(result) => result,
        Err(FeedError::Broken(_)) => {
            // check() already recorded the broken flag and error text.
            return match store.save_feed(&feed) {
                Ok(()) => FeedOutcome::Broken { feed_url },
                Err(e) => FeedOutcome::Failed {
                    feed_url,
                    message: e.to_string(),
                },
            };
        }
        Err(FeedError::Temporary(msg)) => {
            // Temporary errors surface as Ok((false, None)); this arm only
            // exists to keep the match exhaustive.
            return FeedOutcome::Failed {
                feed_url,
                message: msg,
            };
        }
    };

    let document = match document {
        Some(document) if updated => document,
        _ => {
            // Not updated (or a temporary error): persist the
            // last_checked_at / error touch-ups and move on.
            let touch_up = FeedUpdate {
                error: feed.error.clone(),
                last_checked_at: Some(feed.last_checked_at),
                ..Default::default()
            };
            return match store.update_feed(feed.id, &touch_up) {
                Ok(()) => FeedOutcome::Unchanged,
                Err(e) => FeedOutcome::Failed {
                    feed_url,
                    message: e.to_string(),
                },
            };
        }
    };

    if let Some(meta) = &document.meta {
        feed.apply_meta(meta);
    }
    if document.etag.is_some() {
        feed.etag = document.etag.clone();
    }

    let reconciler = EntryReconciler::new(store);
    match reconciler.reconcile(&mut feed, &document.entries) {
        Ok(outcome) => {
            // last_updated_at only ever advances.
            if let Some(latest) = outcome.latest {
                if feed.last_updated_at.map_or(true, |prev| latest > prev) {
                    feed.last_updated_at = Some(latest);
                }
            }

            let result = FeedOutcome::Updated {
                feed_url: feed_url.clone(),
                inserted: outcome.inserted,
                merged: outcome.merged,
                clean: outcome.is_clean(),
            };

            match store.save_feed(&feed) {
                Ok(()) => result,
                Err(e) => FeedOutcome::Failed {
                    feed_url,
                    message: e.to_string(),
                },
            }
        }
        Err(e) => {
            // Persist whatever the scraper recorded even when
            // reconciliation hit a store error.
            if let Err(save_err) = store.save_feed(&feed) {
                error!(
                    feed = %feed_url,
                    error = %save_err,
                    "could not persist feed after reconciliation failure"
                );
            }
            FeedOutcome::Failed {
                feed_url,
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

    use crate::app::{Result, TributaryError};
    use crate::domain::{Entry, RawEntry, RawFeedDocument, RawFeedMeta};
    use crate::store::SqliteStore;

    /// Canned fetcher that counts invocations, so tests can assert every
    /// feed is fetched exactly once.
    struct CountingFetcher {
        document: RawFeedDocument,
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new(document: RawFeedDocument) -> Self {
            Self {
                document,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _etag: Option<&str>,
            _last_modified: Option<DateTime<Utc>>,
        ) -> Result<RawFeedDocument> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.document.clone())
        }
    }

    /// Store that fails entry lookups and full-row writes, delegating
    /// everything else, to drive the reconciliation-error path.
    struct FlakyStore {
        inner: SqliteStore,
    }

    fn store_offline() -> TributaryError {
        TributaryError::Other("store offline".into())
    }

    impl Store for FlakyStore {
        fn add_feed(&self, feed: &Feed) -> Result<i64> {
            self.inner.add_feed(feed)
        }
        fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
            self.inner.get_feed(id)
        }
        fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
            self.inner.get_feed_by_url(url)
        }
        fn all_feeds(&self) -> Result<Vec<Feed>> {
            self.inner.all_feeds()
        }
        fn active_feeds(&self) -> Result<Vec<Feed>> {
            self.inner.active_feeds()
        }
        fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()> {
            self.inner.update_feed(id, update)
        }
        fn save_feed(&self, _feed: &Feed) -> Result<()> {
            Err(store_offline())
        }
        fn delete_feed(&self, id: i64) -> Result<()> {
            self.inner.delete_feed(id)
        }
        fn clear_broken(&self, id: i64) -> Result<()> {
            self.inner.clear_broken(id)
        }
        fn insert_entry(&self, entry: &Entry) -> Result<i64> {
            self.inner.insert_entry(entry)
        }
        fn update_entry(&self, entry: &Entry) -> Result<()> {
            self.inner.update_entry(entry)
        }
        fn find_entry_by_guid(&self, _feed_id: i64, _guid: &str) -> Result<Option<Entry>> {
            Err(store_offline())
        }
        fn find_entry_by_url(&self, feed_id: i64, url: &str) -> Result<Option<Entry>> {
            self.inner.find_entry_by_url(feed_id, url)
        }
        fn find_entry_by_title_date(
            &self,
            feed_id: i64,
            title: &str,
            date: DateTime<Utc>,
        ) -> Result<Option<Entry>> {
            self.inner.find_entry_by_title_date(feed_id, title, date)
        }
        fn entries_for_feed(&self, feed_id: i64) -> Result<Vec<Entry>> {
            self.inner.entries_for_feed(feed_id)
        }
        fn entry_count(&self, feed_id: i64) -> Result<i64> {
            self.inner.entry_count(feed_id)
        }
    }

    fn valid_document(entry_date: DateTime<Utc>) -> RawFeedDocument {
        RawFeedDocument {
            status: 200,
            meta: Some(RawFeedMeta {
                title: Some("A Feed".into()),
                link: Some("https://example.com".into()),
                version: Some("rss2".into()),
            }),
            etag: Some("\"v1\"".into()),
            entries: vec![RawEntry {
                guid: Some("entry-1".into()),
                title: Some("Post".into()),
                summary: Some("body".into()),
                published: Some(entry_date),
                ..Default::default()
            }],
        }
    }

    fn seed_feeds(store: &SqliteStore, n: usize) -> Vec<Feed> {
        (0..n)
            .map(|i| {
                let mut feed = Feed::new(format!("https://example.com/feed-{i}.xml"));
                feed.id = store.add_feed(&feed).unwrap();
                feed
            })
            .collect()
    }

    #[tokio::test]
    async fn test_every_feed_processed_exactly_once_with_small_pool() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let entry_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fetcher = Arc::new(CountingFetcher::new(valid_document(entry_date)));

        let before = Utc::now();
        let feeds = seed_feeds(&store, 25);

        let scheduler = SyncScheduler::new(store.clone(), fetcher.clone(), 3);
        let stats = scheduler.run(feeds).await;

        assert_eq!(stats.total, 25);
        assert_eq!(stats.updated, 25);
        assert_eq!(stats.entries_added, 25);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 25);

        // run() only returns once every feed in the batch is done
        for feed in store.all_feeds().unwrap() {
            assert!(feed.last_checked_at >= before);
            assert_eq!(feed.last_updated_at, Some(entry_date));
            assert_eq!(store.entry_count(feed.id).unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_end_to_end_insert_and_advance() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut feed = Feed::new("https://example.com/feed.xml".into());
        feed.last_updated_at = Some(t);
        feed.id = store.add_feed(&feed).unwrap();

        let fetcher = Arc::new(CountingFetcher::new(valid_document(
            t + ChronoDuration::hours(1),
        )));
        let scheduler = SyncScheduler::new(store.clone(), fetcher, 2);
        let stats = scheduler.run(vec![feed.clone()]).await;

        assert_eq!(stats.updated, 1);
        let synced = store.get_feed(feed.id).unwrap().unwrap();
        assert_eq!(synced.last_updated_at, Some(t + ChronoDuration::hours(1)));
        assert_eq!(synced.title.as_deref(), Some("A Feed"));
        assert_eq!(synced.feed_type.as_deref(), Some("rss2"));
        assert_eq!(synced.etag.as_deref(), Some("\"v1\""));
        assert_eq!(store.entry_count(feed.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_not_modified_persists_touch_ups_only() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut feed = Feed::new("https://example.com/feed.xml".into());
        feed.last_updated_at = Some(t);
        feed.last_checked_at = t;
        feed.id = store.add_feed(&feed).unwrap();

        let fetcher = Arc::new(CountingFetcher::new(RawFeedDocument::status_only(304)));
        let scheduler = SyncScheduler::new(store.clone(), fetcher, 1);
        let stats = scheduler.run(vec![feed.clone()]).await;

        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.updated, 0);

        let synced = store.get_feed(feed.id).unwrap().unwrap();
        assert!(synced.last_checked_at > t);
        assert_eq!(synced.last_updated_at, Some(t));
        assert!(synced.error.is_none());
        assert_eq!(store.entry_count(feed.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broken_feed_does_not_abort_batch() {
        struct GoneFetcher;

        #[async_trait]
        impl Fetcher for GoneFetcher {
            async fn fetch(
                &self,
                url: &str,
                _etag: Option<&str>,
                _last_modified: Option<DateTime<Utc>>,
            ) -> Result<RawFeedDocument> {
                if url.contains("gone") {
                    Ok(RawFeedDocument::status_only(410))
                } else {
                    Ok(valid_document(
                        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    ))
                }
            }
        }

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut gone = Feed::new("https://example.com/gone.xml".into());
        gone.id = store.add_feed(&gone).unwrap();
        let mut healthy = Feed::new("https://example.com/healthy.xml".into());
        healthy.id = store.add_feed(&healthy).unwrap();

        let scheduler = SyncScheduler::new(store.clone(), Arc::new(GoneFetcher), 2);
        let stats = scheduler.run(vec![gone.clone(), healthy.clone()]).await;

        assert_eq!(stats.broken, 1);
        assert_eq!(stats.updated, 1);

        let gone = store.get_feed(gone.id).unwrap().unwrap();
        assert!(gone.broken);
        assert_eq!(gone.error.as_deref(), Some("feed not found"));
        // Broken feeds drop out of the active set for the next run
        assert_eq!(store.active_feeds().unwrap().len(), 1);

        let healthy = store.get_feed(healthy.id).unwrap().unwrap();
        assert!(!healthy.broken);
        assert_eq!(store.entry_count(healthy.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_temporary_error_keeps_feed_active() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut feed = Feed::new("https://example.com/feed.xml".into());
        feed.id = store.add_feed(&feed).unwrap();

        let fetcher = Arc::new(CountingFetcher::new(RawFeedDocument::status_only(500)));
        let scheduler = SyncScheduler::new(store.clone(), fetcher, 1);
        let stats = scheduler.run(vec![feed.clone()]).await;

        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.broken, 0);

        let synced = store.get_feed(feed.id).unwrap().unwrap();
        assert!(!synced.broken);
        assert_eq!(synced.error.as_deref(), Some("unrecognized status: 500"));
        assert_eq!(store.active_feeds().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_identical_run_adds_nothing() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let feeds = seed_feeds(&store, 3);

        let fetcher = Arc::new(CountingFetcher::new(valid_document(t)));

        let scheduler = SyncScheduler::new(store.clone(), fetcher.clone(), 2);
        let first = scheduler.run(feeds).await;
        assert_eq!(first.entries_added, 3);

        let feeds = store.active_feeds().unwrap();
        let scheduler = SyncScheduler::new(store.clone(), fetcher, 2);
        let second = scheduler.run(feeds).await;
        assert_eq!(second.updated, 0);
        assert_eq!(second.entries_added, 0);
        assert_eq!(second.unchanged, 3);
    }

    #[tokio::test]
    async fn test_force_resyncs_unchanged_feed() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let feeds = seed_feeds(&store, 1);

        let fetcher = Arc::new(CountingFetcher::new(valid_document(t)));
        SyncScheduler::new(store.clone(), fetcher.clone(), 1)
            .run(feeds)
            .await;

        let feeds = store.active_feeds().unwrap();
        let stats = SyncScheduler::new(store.clone(), fetcher, 1)
            .force(true)
            .run(feeds)
            .await;

        // Forced: reported updated, but reconciliation still discards the
        // equal-dated entry instead of duplicating it.
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.entries_added, 0);
    }

    #[tokio::test]
    async fn test_reconciliation_store_error_reports_failed() {
        let inner = SqliteStore::in_memory().unwrap();
        let mut feed = Feed::new("https://example.com/feed.xml".into());
        feed.id = inner.add_feed(&feed).unwrap();

        let store = Arc::new(FlakyStore { inner });
        let fetcher = Arc::new(CountingFetcher::new(valid_document(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )));

        let stats = SyncScheduler::new(store.clone(), fetcher, 1)
            .run(vec![feed.clone()])
            .await;

        // The failure is counted and the run completes; nothing was stored.
        assert_eq!(stats.total, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.updated, 0);
        assert_eq!(store.inner.entry_count(feed.id).unwrap(), 0);
    }

    #[test]
    fn test_poisoned_queue_is_reported_not_drained() {
        let queue = Mutex::new(VecDeque::from([Feed::new(
            "https://example.com/feed.xml".into(),
        )]));

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = queue.lock().unwrap();
            panic!("worker died holding the queue");
        }));
        assert!(queue.lock().is_err());

        // A poisoned queue ends the worker instead of handing out feeds
        assert!(next_feed(&queue, 0).is_none());
    }
}
