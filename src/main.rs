//! # fsembed CLI
//!
//! ## Usage
//!
//! ```bash
//! fsembed --config ./config/fsembed.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fsembed embed --file-system-path P` | Embed new and changed files under `P` |
//! | `fsembed search --file-system-path P --query Q` | Similarity search under `P` |
//! | `fsembed collections` | List vector-store collections |
//! | `fsembed files --file-system-path P` | List files tracked for `P` |
//! | `fsembed stats` | Totals per tracked root |
//! | `fsembed reset [--file-system-path P] --yes` | Forget one root, or everything |
//! | `fsembed serve` | Start the HTTP API |
//!
//! With `--api-url`, `embed`, `search`, `files` and `stats` go through a
//! running `fsembed serve` instead of opening the stores locally.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fsembed::client::ApiClient;
use fsembed::config::{load_config, Config};
use fsembed::progress::ProgressMode;
use fsembed::runtime::Services;
use fsembed::{admin, pipeline, query, server};

/// fsembed: incremental filesystem embedding and similarity search.
#[derive(Parser)]
#[command(
    name = "fsembed",
    about = "Incremental filesystem embedding into a vector store, with similarity search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/fsembed.toml")]
    config: PathBuf,

    /// Base URL of a running `fsembed serve` (e.g. http://127.0.0.1:6002).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Progress on stderr. Defaults to `human` on a TTY, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed new and changed files under a directory.
    Embed {
        #[arg(long)]
        file_system_path: String,
    },

    /// Similarity search over an embedded directory.
    Search {
        #[arg(long)]
        file_system_path: String,

        #[arg(long)]
        query: String,

        /// Maximum number of results (defaults to `retrieval.default_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List collections in the vector store.
    Collections,

    /// List files tracked for a directory, with their content hashes.
    Files {
        #[arg(long)]
        file_system_path: String,
    },

    /// Show totals per tracked directory.
    Stats,

    /// Delete a directory's collection and fingerprints, or everything.
    Reset {
        /// Only reset this directory. Without it, every collection is dropped.
        #[arg(long)]
        file_system_path: Option<String>,

        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },

    /// Start the HTTP API server.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &std::path::Path) -> anyhow::Result<Config> {
    let mut cfg = load_config(path)?;
    cfg.apply_env_overrides(|k| std::env::var(k).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    // Remote mode: no local stores are opened.
    if let Some(api_url) = &cli.api_url {
        let client = ApiClient::new(api_url)?;
        match &cli.command {
            Commands::Embed { file_system_path } => {
                let report = client.embed(file_system_path).await?;
                pipeline::print_report(&report);
                return Ok(());
            }
            Commands::Search {
                file_system_path,
                query,
                limit,
            } => {
                let hits = client.query(file_system_path, query, *limit).await?;
                query::print_hits(&hits);
                return Ok(());
            }
            Commands::Files { file_system_path } => {
                let listing = client.files(file_system_path).await?;
                println!("{}", serde_json::to_string_pretty(&listing)?);
                return Ok(());
            }
            Commands::Stats => {
                let report = client.stats().await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            _ => anyhow::bail!("--api-url supports embed, search, files and stats only"),
        }
    }

    let cfg = load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let services = Services::build(&cfg).await?;

    match cli.command {
        Commands::Embed { file_system_path } => {
            pipeline::run_embed(&services, &file_system_path, mode).await?;
        }
        Commands::Search {
            file_system_path,
            query,
            limit,
        } => {
            query::run_search(&services.query, &file_system_path, &query, limit).await?;
        }
        Commands::Collections => {
            admin::run_collections(&services).await?;
        }
        Commands::Files { file_system_path } => {
            admin::run_files(&services, &file_system_path).await?;
        }
        Commands::Stats => {
            admin::run_stats(&services).await?;
        }
        Commands::Reset {
            file_system_path,
            yes,
        } => {
            admin::run_reset(&services, file_system_path.as_deref(), yes).await?;
        }
        Commands::Serve => {
            server::run_server(services).await?;
        }
    }

    Ok(())
}
