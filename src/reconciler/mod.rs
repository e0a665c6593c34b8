//! Entry identity resolution and merge.
//!
//! Raw entries are matched against stored entries through an ordered
//! fallback chain (guid, then url, then exact title+date). A match with a
//! strictly newer date is merged in place; anything equal or older is
//! discarded. Entries with no usable identifier are skipped and reported,
//! never aborting the rest of the batch.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::app::Result;
use crate::domain::{Entry, Feed, RawEntry};
use crate::store::Store;

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Greatest date seen across all resolved candidates, whether they
    /// were inserted, merged or discarded.
    pub latest: Option<DateTime<Utc>>,
    pub inserted: usize,
    pub merged: usize,
    /// One message per raw entry that could not be identified.
    pub errors: Vec<String>,
}

impl ReconcileOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct EntryReconciler<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> EntryReconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Reconcile a document's raw entries against the feed's stored
    /// entries, in document order.
    ///
    /// Identity failures accumulate onto `feed.error`; store failures
    /// propagate immediately.
    pub fn reconcile(&self, feed: &mut Feed, raw_entries: &[RawEntry]) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();

        for raw in raw_entries {
            let candidate = Entry::from_raw(feed.id, raw);

            let existing = if !candidate.guid.is_empty() {
                self.store.find_entry_by_guid(feed.id, &candidate.guid)?
            } else if !candidate.url.is_empty() {
                self.store.find_entry_by_url(feed.id, &candidate.url)?
            } else if !candidate.title.is_empty() {
                self.store
                    .find_entry_by_title_date(feed.id, &candidate.title, candidate.date)?
            } else {
                warn!(feed = %feed.feed_url, "entry has no usable identifier, skipping");
                outcome
                    .errors
                    .push("can't find an entry identifier, cannot import".into());
                continue;
            };

            match existing {
                None => {
                    self.store.insert_entry(&candidate)?;
                    outcome.inserted += 1;
                }
                Some(mut stored) => {
                    // Only a strictly newer re-publication wins.
                    if candidate.date > stored.date {
                        stored.merge_from(&candidate);
                        self.store.update_entry(&stored)?;
                        outcome.merged += 1;
                    }
                }
            }

            if outcome.latest.map_or(true, |latest| candidate.date > latest) {
                outcome.latest = Some(candidate.date);
            }
        }

        for msg in &outcome.errors {
            feed.push_error(&format!("entry error: {msg}"));
        }

        Ok(outcome)
    }
}
