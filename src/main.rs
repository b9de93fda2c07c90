//! Panocrawl main entry point
//!
//! This is the command-line interface for the Panocrawl panorama crawler.

use anyhow::Context;
use clap::Parser;
use panocrawl::config::{load_config_with_hash, AreaConfig, Config};
use panocrawl::crawler::{crawl, Fetcher, HttpFetcher};
use panocrawl::output::{load_statistics, print_statistics};
use panocrawl::storage::Checkpointer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Panocrawl: a breadth-first street panorama crawler
///
/// Panocrawl walks linked street-level panoramas outward from a seed,
/// keeping the ones inside a geographic area. Progress is checkpointed
/// with a rolling backup so an interrupted crawl can be resumed.
#[derive(Parser, Debug)]
#[command(name = "panocrawl")]
#[command(version)]
#[command(about = "A breadth-first street panorama crawler", long_about = None)]
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

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring any saved checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the saved checkpoint and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let checkpointer = Checkpointer::from_output(&config.output).with_config_hash(config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &checkpointer);
    } else if cli.stats {
        handle_stats(&checkpointer)?;
    } else {
        handle_crawl(&config, checkpointer, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("panocrawl=info,warn"),
            1 => EnvFilter::new("panocrawl=debug,info"),
            2 => EnvFilter::new("panocrawl=trace,debug"),
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

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config, checkpointer: &Checkpointer) {
    println!("=== Panocrawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Backup interval: {}s", config.crawler.backup_interval);
    println!("  Report interval: {}s", config.crawler.report_interval);
    println!("  Temporal links: {}", config.crawler.temporal);

    println!("\nArea:");
    match &config.area {
        AreaConfig::Circle { origin, radius } => {
            println!("  Circle of {} m around {}", radius, origin);
        }
        AreaConfig::Box {
            origin,
            width,
            height,
        } => {
            println!(
                "  Box of {} x {} m centered at {}",
                width,
                height.unwrap_or(*width),
                origin
            );
        }
        AreaConfig::GpsBox {
            top_left,
            bottom_right,
        } => {
            println!("  GPS box from ({}) to ({})", top_left, bottom_right);
        }
    }

    println!("\nSeed:");
    match (&config.seed.pano_id, &config.seed.location) {
        (Some(id), _) => println!("  Panorama: {}", id),
        (None, Some(location)) => println!(
            "  Nearest panorama to {} within {} m",
            location, config.seed.search_radius
        ),
        (None, None) => println!("  (none)"),
    }

    println!("\nOutput:");
    println!("  Checkpoint: {}", checkpointer.primary_path().display());
    println!("  Backup: {}", checkpointer.backup_path().display());
    if config.output.save_metadata {
        println!("  Metadata archive: {}", config.output.session_dir().display());
    }
    if checkpointer.exists() {
        println!("  A saved crawl exists and would be resumed");
    }

    println!("\nFetcher:");
    println!("  User agent: {}", config.fetcher.user_agent);
    println!("  Max attempts: {}", config.fetcher.max_attempts);
    println!("  Timeout: {}s", config.fetcher.timeout_secs);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the saved checkpoint
fn handle_stats(checkpointer: &Checkpointer) -> anyhow::Result<()> {
    println!("Checkpoint: {}\n", checkpointer.primary_path().display());

    let stats = load_statistics(checkpointer).context("No saved crawl to report on")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, checkpointer: Checkpointer, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        if checkpointer.exists() {
            tracing::warn!("Ignoring saved crawl; it will be overwritten");
        }
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if a checkpoint exists)");
    }

    let fetcher = HttpFetcher::new(config.fetcher.clone())
        .context("Failed to set up the panorama fetcher")?
        .with_temporal(config.crawler.temporal)
        .with_raw_metadata(config.output.save_metadata);
    let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);

    // Run the crawler
    match crawl(config, fetcher, checkpointer, fresh).await {
        Ok(status) => {
            tracing::info!("Crawl finished: {}", status);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
