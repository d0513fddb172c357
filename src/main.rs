//! Bazaar-Crawler main entry point
//!
//! This is the command-line interface for the resumable player-ID crawler.

use anyhow::Context;
use bazaar_crawler::config::{load_settings, Settings};
use bazaar_crawler::storage::{ProgressStore, SqliteStore};
use bazaar_crawler::{
    CrawlEngine, CrawlPosition, EngineDeps, EngineSettings, OperatorApi, RateLimitedClient,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How often the running crawler logs a status line
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Bazaar-Crawler: a resumable, rate-limited player-ID crawler
///
/// Walks the configured player-ID range against the game API, storing every player's
/// bazaar listings. Progress is persisted after each batch so the crawl resumes where it
/// stopped.
#[derive(Parser, Debug)]
#[command(name = "bazaar-crawler")]
#[command(version)]
#[command(about = "A resumable, rate-limited player-ID crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start crawling even if the persisted configuration is disabled
    #[arg(long)]
    start: bool,

    /// Restart the pass from the beginning of the ID range
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "status")]
    dry_run: bool,

    /// Print the persisted crawl state and exit
    #[arg(long, conflicts_with = "dry_run")]
    status: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let settings = match load_settings(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&settings)
    } else if cli.status {
        handle_status(&settings)
    } else {
        handle_run(settings, cli.fresh, cli.start).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("bazaar_crawler=info,warn"),
            1 => EnvFilter::new("bazaar_crawler=debug,info"),
            2 => EnvFilter::new("bazaar_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(settings: &Settings) -> anyhow::Result<()> {
    let crawl = &settings.crawl;

    println!("=== Bazaar-Crawler Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", settings.api.base_url);
    println!(
        "  Quota: {} calls / {}s",
        settings.api.max_calls, settings.api.window_seconds
    );
    println!("  Request timeout: {}ms", settings.api.request_timeout_ms);

    println!("\nCrawl (first boot defaults):");
    println!(
        "  ID range: {}-{} ({} IDs)",
        crawl.id_range.start,
        crawl.id_range.end,
        crawl.id_range.len()
    );
    println!("  Batch size: {}", crawl.batch_size);
    println!("  Max concurrent requests: {}", crawl.max_concurrent_requests);
    println!("  Request delay: {}ms", crawl.request_delay_ms);
    println!("  Interval: {} minutes", crawl.interval_minutes);
    println!("  Enabled: {}", crawl.enabled);

    println!("\nStorage:");
    println!("  Database: {}", settings.storage.database_path);

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --status mode: prints the persisted state as JSON
fn handle_status(settings: &Settings) -> anyhow::Result<()> {
    let store = SqliteStore::new(Path::new(&settings.storage.database_path))
        .context("Failed to open database")?;

    let Some((config, position)) = store.load()? else {
        println!("No crawl state persisted yet in {}", settings.storage.database_path);
        return Ok(());
    };

    let report = serde_json::json!({
        "config": config,
        "position": position,
        "players": store.count_players()?,
        "listings": store.count_listings()?,
        "recent_passes": store.recent_passes(5)?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Handles the main mode: runs the engine until Ctrl-C
async fn handle_run(settings: Settings, fresh: bool, force_start: bool) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteStore::new(Path::new(&settings.storage.database_path))
            .context("Failed to open database")?,
    );

    if fresh {
        reset_position(store.as_ref(), &settings)?;
    }

    let client = Arc::new(RateLimitedClient::new(&settings.api)?);
    let engine = Arc::new(CrawlEngine::new(
        EngineDeps::with_store(client, store),
        EngineSettings::from_settings(&settings),
    ));
    let api = OperatorApi::new(engine.clone());

    engine.init().await?;
    if force_start {
        api.start().await?;
    }

    let status = api.status();
    tracing::info!(
        "Engine {} at ID {} ({}/{} indexed)",
        status.status.state,
        status.status.current_id,
        status.status.indexed_count,
        status.status.total_count
    );

    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("Shutting down");
                break;
            }
            _ = ticker.tick() => log_status(&api),
        }
    }

    engine.shutdown().await;
    let status = engine.status();
    tracing::info!("Stopped at ID {} ({})", status.current_id, status.state);
    Ok(())
}

/// Moves the persisted position back to the start of the configured range
fn reset_position(store: &SqliteStore, settings: &Settings) -> anyhow::Result<()> {
    let (config, _) = store.load_or_default(&settings.crawl)?;
    let position = CrawlPosition::new(config.id_range.start);
    store.save(&config, &position)?;
    tracing::info!("Position reset to ID {}", position.current_id);
    Ok(())
}

fn log_status(api: &OperatorApi) {
    let response = api.status();
    let status = &response.status;

    let speed = status
        .speed
        .map(|s| format!("{:.1} IDs/min", s))
        .unwrap_or_else(|| "-".to_string());
    let eta = status
        .estimated_time_remaining
        .map(|d| format!("{}m", d.as_secs() / 60))
        .unwrap_or_else(|| "calculating".to_string());

    tracing::info!(
        "Status: {}, {}/{} ({:.1}%), {}, ETA {}, {} calls/h",
        status.state,
        status.indexed_count,
        status.total_count,
        status.percent_complete,
        speed,
        eta,
        response.calls_per_hour
    );

    if let Some(detail) = &status.error_detail {
        tracing::warn!("Engine error: {}", detail);
    }
}
