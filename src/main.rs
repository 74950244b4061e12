//! # Legal Mirror CLI (`lexm`)
//!
//! The `lexm` binary drives the mirror: database setup, the source registry,
//! one-shot crawl runs, the HTTP trigger and archive inspection.
//!
//! ## Usage
//!
//! ```bash
//! lexm --config ./config/lexm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexm init` | Create the SQLite database, run migrations, sync sources |
//! | `lexm sources list` | Show configured sources and their sync state |
//! | `lexm sources sync` | Write configured sources to the database |
//! | `lexm crawl` | Run one bounded crawl batch |
//! | `lexm serve` | Start the HTTP trigger (`POST /crawl`) |
//! | `lexm stats` | Per-source crawl health |
//! | `lexm get <url>` | Show the archived document for a URL |
//! | `lexm prune --days N` | Delete successful frontier rows older than N days |
//!
//! ## Logging
//!
//! Log output goes to stderr via `tracing`. The default filter is
//! `legal_mirror=info`; override it with `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use legal_mirror::config;
use legal_mirror::crawler::Crawler;
use legal_mirror::store::{CrawlStore, SqliteStore};
use legal_mirror::{get, server, sources, stats};

/// Legal Mirror CLI: a bounded-batch crawler and archiver for legal
/// publications.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lexm.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lexm",
    about = "Legal Mirror: crawl and archive legal publications",
    version,
    long_about = "Legal Mirror discovers, fetches, classifies and archives publications from \
    official gazettes, legal databases and RSS feeds. Each run processes a bounded batch of the \
    URL frontier and is safe to re-invoke."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and sync the source registry.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Manage the source registry.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Run one crawl batch and print the result as JSON.
    Crawl,

    /// Start the HTTP trigger on `[server].bind`.
    Serve,

    /// Show per-source crawl health.
    Stats,

    /// Show the archived document for a URL.
    Get {
        /// Document URL (canonicalized before lookup).
        url: String,

        /// Print the document as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete successful frontier rows not touched for the given number of days.
    Prune {
        /// Retention window in days.
        #[arg(long, default_value = "90")]
        days: i64,
    },
}

#[derive(Subcommand)]
enum SourcesAction {
    /// List configured sources and whether the database matches.
    List,
    /// Upsert configured sources into the database.
    Sync,
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("legal_mirror=info".parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&cfg).await?;
            let count = sources::sync_sources(&cfg, &store).await?;
            store.close().await;
            println!("Database initialized successfully ({} sources).", count);
        }
        Commands::Sources { action } => match action {
            SourcesAction::List => sources::run_list(&cfg).await?,
            SourcesAction::Sync => sources::run_sync(&cfg).await?,
        },
        Commands::Crawl => {
            let store = Arc::new(SqliteStore::open(&cfg).await?);
            let crawler = Crawler::from_config(&cfg, store.clone())?;
            let result = crawler.run_batch().await?;
            store.close().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Get { url, json } => {
            get::run_get(&cfg, &url, json).await?;
        }
        Commands::Prune { days } => {
            if days < 0 {
                anyhow::bail!("--days must be >= 0");
            }
            let store = SqliteStore::open(&cfg).await?;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
            let removed = store.prune_succeeded(cutoff).await?;
            store.close().await;
            println!("Pruned {} frontier rows older than {} days.", removed, days);
        }
    }

    Ok(())
}
