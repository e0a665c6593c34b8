//! # Tributary
//!
//! A concurrent RSS/Atom feed synchronizer.
//!
//! ## Architecture
//!
//! ```text
//! Fetcher → Scraper → Reconciler → Store
//!              ↑
//!         Scheduler (bounded worker pool)
//! ```
//!
//! - [`fetcher`]: HTTP client with ETag/conditional request support
//! - [`scraper`]: status classification and update detection per feed
//! - [`reconciler`]: entry identity resolution (guid → url → title+date)
//! - [`scheduler`]: drives many feed syncs per run over a fixed worker pool
//! - [`store`]: SQLite persistence layer

/// Application context and error handling.
pub mod app;

/// Command-line interface using clap.
///
/// - `add <url>` / `remove <url>` - feed registration
/// - `sync [--force] [--every <interval>]` - run synchronization passes
/// - `list [--entries]` - inspect stored state
/// - `clear-broken <url>` - reactivate a feed marked broken
pub mod cli;

/// Configuration loaded from `~/.config/tributary/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`Feed`](domain::Feed): a subscribed syndication source
/// - [`Entry`](domain::Entry): one item within a feed
/// - [`RawFeedDocument`](domain::RawFeedDocument): transient fetch output
pub mod domain;

/// HTTP fetching with conditional request support.
pub mod fetcher;

/// Entry identity resolution and merge.
pub mod reconciler;

/// Bounded-concurrency batch scheduler.
pub mod scheduler;

/// Conditional fetch protocol and update classification.
pub mod scraper;

/// SQLite persistence layer behind the [`Store`](store::Store) trait.
pub mod store;
