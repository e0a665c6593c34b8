pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tributary")]
#[command(about = "A concurrent RSS/Atom feed synchronizer", long_about = None)]
pub struct Cli {
    /// Number of parallel workers for syncing feeds (default from config)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new feed and run its first sync
    Add {
        /// URL of the feed to add
        url: String,
    },
    /// Remove a feed and its entries
    Remove {
        /// URL of the feed to remove
        url: String,
    },
    /// Run one synchronization pass over all active feeds
    Sync {
        /// Sync even when the source reports no new content
        #[arg(long)]
        force: bool,

        /// Keep syncing on an interval (e.g., "30s", "10m", "1h")
        #[arg(long)]
        every: Option<String>,
    },
    /// List feeds or entries
    List {
        /// Show entries instead of feeds
        #[arg(long)]
        entries: bool,
    },
    /// Clear the broken flag on a feed so it is synced again
    ClearBroken {
        /// URL of the feed to reactivate
        url: String,
    },
}

/// Parse an interval string like "1h", "30m", "6h", "1d" into seconds.
pub fn parse_interval(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .map(|h| h * 3600)
            .map_err(|_| format!("Invalid hours: {}", hours))
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes
            .parse::<u64>()
            .map(|m| m * 60)
            .map_err(|_| format!("Invalid minutes: {}", minutes))
    } else if let Some(days) = s.strip_suffix('d') {
        days.parse::<u64>()
            .map(|d| d * 86400)
            .map_err(|_| format!("Invalid days: {}", days))
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>()
            .map_err(|_| format!("Invalid seconds: {}", secs))
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))
    }
}
