use std::time::Duration;

use tokio::time::interval;
use tracing::error;
use url::Url;

use crate::app::{AppContext, Result, TributaryError};
use crate::domain::Feed;
use crate::scheduler::{RunStats, SyncScheduler};
use crate::store::Store;

pub async fn add_feed(ctx: &AppContext, url: &str) -> Result<()> {
    Url::parse(url)?;

    if ctx.store.get_feed_by_url(url)?.is_some() {
        println!("Feed already exists: {}", url);
        return Ok(());
    }

    let mut feed = Feed::new(url.to_string());
    feed.id = ctx.store.add_feed(&feed)?;
    println!("Added feed: {}", url);

    // First sync populates title, type and entries
    let scheduler = SyncScheduler::new(ctx.store.clone(), ctx.fetcher.clone(), 1);
    let stats = scheduler.run(vec![feed.clone()]).await;

    match ctx.store.get_feed(feed.id)? {
        Some(synced) if synced.broken => {
            println!(
                "Warning: feed is unreachable ({})",
                synced.error.as_deref().unwrap_or("unknown error")
            );
        }
        Some(synced) => {
            if let Some(title) = &synced.title {
                println!("Feed title: {}", title);
            }
            println!("Fetched {} entries", stats.entries_added);
        }
        None => {}
    }

    Ok(())
}

pub fn remove_feed(ctx: &AppContext, url: &str) -> Result<()> {
    let feed = ctx
        .store
        .get_feed_by_url(url)?
        .ok_or_else(|| TributaryError::FeedNotFound(url.to_string()))?;

    ctx.store.delete_feed(feed.id)?;
    println!("Removed feed: {}", url);
    Ok(())
}

pub fn clear_broken(ctx: &AppContext, url: &str) -> Result<()> {
    let feed = ctx
        .store
        .get_feed_by_url(url)?
        .ok_or_else(|| TributaryError::FeedNotFound(url.to_string()))?;

    if !feed.broken {
        println!("Feed is not marked broken: {}", url);
        return Ok(());
    }

    ctx.store.clear_broken(feed.id)?;
    println!("Feed reactivated: {}", url);
    Ok(())
}

pub async fn sync_feeds(ctx: &AppContext, workers: usize, force: bool) -> Result<()> {
    let feeds = ctx.store.active_feeds()?;

    if feeds.is_empty() {
        println!("No active feeds to sync");
        return Ok(());
    }

    println!("Syncing {} feeds...", feeds.len());

    let scheduler = SyncScheduler::new(ctx.store.clone(), ctx.fetcher.clone(), workers).force(force);
    let stats = scheduler.run(feeds).await;
    print_stats(&stats);

    Ok(())
}

/// Everlasting variant of `sync_feeds`: one full pass per tick.
pub async fn sync_feeds_forever(
    ctx: &AppContext,
    workers: usize,
    force: bool,
    every_secs: u64,
) -> Result<()> {
    let mut timer = interval(Duration::from_secs(every_secs));

    loop {
        timer.tick().await;
        // A failed pass is retried on the next tick, not fatal to the loop.
        if let Err(e) = sync_feeds(ctx, workers, force).await {
            error!(error = %e, "sync pass failed; retrying on next tick");
        }
    }
}

fn print_stats(stats: &RunStats) {
    println!(
        "Sync complete: {} updated, {} unchanged, {} broken, {} failed, {} new entries ({:.1}s)",
        stats.updated,
        stats.unchanged,
        stats.broken,
        stats.failed,
        stats.entries_added,
        stats.elapsed.as_secs_f64()
    );
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in feeds {
        let count = ctx.store.entry_count(feed.id)?;
        let marker = if feed.broken { " [broken]" } else { "" };
        println!(
            "{}{} ({} entries)\n  {}",
            feed.display_title(),
            marker,
            count,
            feed.feed_url
        );
        if let Some(error) = &feed.error {
            println!("  last error: {}", error);
        }
    }

    Ok(())
}

pub fn list_entries(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.all_feeds()?;

    let mut any = false;
    for feed in feeds {
        for entry in ctx.store.entries_for_feed(feed.id)? {
            any = true;
            println!(
                "{} {} ({})",
                entry.date.format("%Y-%m-%d"),
                entry.display_title(),
                feed.display_title()
            );
        }
    }

    if !any {
        println!("No entries");
    }

    Ok(())
}
