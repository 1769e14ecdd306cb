//! Phone-Harvest main entry point
//!
//! This is the command-line interface for the Phone-Harvest catalogue harvester.

use anyhow::Context;
use clap::Parser;
use phone_harvest::config::{load_config_with_hash, Config};
use phone_harvest::harvest::{run_harvest, seed_targets};
use phone_harvest::output::{load_statistics, print_statistics};
use phone_harvest::storage::{open_store, DedupStore};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Phone-Harvest: a proxy-rotating phone specification harvester
///
/// Phone-Harvest walks a phone catalogue through a rotating pool of proxies,
/// remembers every processed page across restarts, and appends one JSON line
/// per phone to the records file.
#[derive(Parser, Debug)]
#[command(name = "phone-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A proxy-rotating phone specification harvester", long_about = None)]
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

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the dedup store and records file, then exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!(path = %cli.config.display(), "Loading configuration");
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!(hash = %config_hash, "Configuration loaded");

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_harvest(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("phone_harvest=info,warn"),
            1 => EnvFilter::new("phone_harvest=debug,info"),
            2 => EnvFilter::new("phone_harvest=trace,debug"),
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
fn handle_dry_run(config: &Config) {
    println!("=== Phone-Harvest Dry Run ===\n");

    println!("Harvester:");
    println!("  Workers: {}", config.harvester.parallelism);
    println!(
        "  Delay: {}ms + up to {}ms random",
        config.harvester.delay_ms, config.harvester.random_delay_ms
    );
    println!("  Request timeout: {}s", config.harvester.request_timeout_secs);
    println!("  User agents: {}", config.harvester.user_agents.len());
    if config.harvester.allowed_domains.is_empty() {
        println!("  Allowed domains: any");
    } else {
        println!(
            "  Allowed domains: {}",
            config.harvester.allowed_domains.join(", ")
        );
    }

    println!("\nProxy Supplier:");
    println!("  URL: {}", config.proxy.supplier_url);
    println!("  Watermark: {}", config.proxy.watermark);
    println!("  Timeout: {}s", config.proxy.supplier_timeout_secs);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Collection: {}", config.storage.collection);
    println!("  Records: {}", config.output.records_path);

    println!("\nRetries:");
    match config.retry.max_attempts {
        Some(max) => println!("  Max attempts: {}", max),
        None => println!("  Max attempts: unbounded"),
    }
    println!(
        "  Backoff: {}ms x{} (cap {}ms, jitter {})",
        config.retry.backoff_base_ms,
        config.retry.backoff_factor,
        config.retry.backoff_max_ms,
        config.retry.jitter
    );

    let seeds = seed_targets(config);
    println!("\nSeeds ({}):", seeds.len());
    for seed in &seeds {
        println!("  - {} ({})", seed.url, seed.stage);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the dedup store
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let store = open_store(&config.storage).context("Failed to open dedup store")?;
    let stats = load_statistics(&store, Path::new(&config.output.records_path));
    store.close().context("Failed to close dedup store")?;

    print_statistics(&stats?);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        seeds = config.harvester.seed_urls.len(),
        workers = config.harvester.parallelism,
        "Starting harvest"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(watch_shutdown(cancel.clone()));

    match run_harvest(&config, cancel).await {
        Ok(stats) => {
            print_statistics(&stats);
            tracing::info!("Harvest completed");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Harvest failed");
            Err(e.into())
        }
    }
}

/// Cancels `cancel` on Ctrl-C or SIGTERM
async fn watch_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
                return;
            }
        }
        _ = terminate => {}
    }

    tracing::info!("Shutdown requested, finishing in-flight requests");
    cancel.cancel();
}
