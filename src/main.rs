use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tributary::app::AppContext;
use tributary::cli::{commands, parse_interval, Cli, Commands};
use tributary::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let ctx = AppContext::new(config)?;
    let workers = cli.workers.unwrap_or(ctx.config.workers).max(1);

    match cli.command {
        Commands::Add { url } => {
            commands::add_feed(&ctx, &url).await?;
        }
        Commands::Remove { url } => {
            commands::remove_feed(&ctx, &url)?;
        }
        Commands::Sync { force, every } => match every {
            Some(every) => {
                let secs = parse_interval(&every).map_err(anyhow::Error::msg)?;
                commands::sync_feeds_forever(&ctx, workers, force, secs).await?;
            }
            None => {
                commands::sync_feeds(&ctx, workers, force).await?;
            }
        },
        Commands::List { entries } => {
            if entries {
                commands::list_entries(&ctx)?;
            } else {
                commands::list_feeds(&ctx)?;
            }
        }
        Commands::ClearBroken { url } => {
            commands::clear_broken(&ctx, &url)?;
        }
    }

    Ok(())
}
