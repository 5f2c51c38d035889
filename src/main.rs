//! # ragchat CLI
//!
//! The `ragchat` binary starts the chat server and exposes a few operator
//! commands for the persisted index and conversation history.
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat serve` | Build or load the index and start the HTTP chat server |
//! | `ragchat ask "<question>"` | Answer one question and print the response |
//! | `ragchat index status` | Show what the persisted index contains |
//! | `ragchat index rebuild` | Rebuild the persisted index from the corpus and replace it |
//! | `ragchat history show` | Print the most recent conversation turns |
//!
//! Provider credentials are read from `GEMINI_API_KEY` / `OPENAI_API_KEY`;
//! a `.env` file in the working directory is loaded first if present.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ragchat::config::{self, Config};
use ragchat::embedding::create_embedder;
use ragchat::ingest;
use ragchat::logging;
use ragchat::server;
use ragchat::service::RagService;
use ragchat::stats;
use tracing::error;

/// ragchat: a retrieval-augmented chat assistant over a fixed document set.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragchat.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "ragchat", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat server.
    ///
    /// Loads the persisted index (building it from the corpus on first run)
    /// and serves `/chat`, `/feedback`, and `/health` on `[server].bind`.
    Serve,

    /// Answer a single question and print the response.
    ///
    /// Uses and updates the same history file as the server.
    Ask {
        /// The question to answer.
        query: String,
    },

    /// Inspect or rebuild the persisted vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Inspect the conversation history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Print manifest details and whether the corpus has changed since the build.
    Status,
    /// Rebuild the index from the corpus and replace the persisted one.
    ///
    /// Re-embeds every chunk. The index is never refreshed automatically;
    /// run this after changing the corpus or the embedding model. The old
    /// index stays in place if the rebuild fails.
    Rebuild,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print the most recent turns.
    Show {
        /// Number of turns to print.
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

/// Start the service, telling transient provider failures apart from
/// problems that need operator action.
async fn start_service(cfg: &Config) -> anyhow::Result<RagService> {
    match RagService::start(cfg).await {
        Ok(service) => Ok(service),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            error!(error = %e, "startup failed on a provider error");
            Err(anyhow::Error::new(e)
                .context("could not prepare the vector index; retry once the provider is reachable"))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Serve => {
            let service = Arc::new(start_service(&cfg).await?);
            server::run_server(&cfg, service).await?;
        }
        Commands::Ask { query } => {
            let service = start_service(&cfg).await?;
            println!("{}", service.answer(&query).await);
        }
        Commands::Index { action } => match action {
            IndexAction::Status => {
                stats::run_index_status(&cfg).await?;
            }
            IndexAction::Rebuild => {
                let embedder = create_embedder(&cfg.embedding)?;
                let index = ingest::rebuild_index(&cfg, embedder.as_ref()).await?;
                println!(
                    "Rebuilt index at {} ({} chunks).",
                    cfg.index.dir.display(),
                    index.len()
                );
            }
        },
        Commands::History { action } => match action {
            HistoryAction::Show { limit } => {
                stats::run_history_show(&cfg, limit)?;
            }
        },
    }

    Ok(())
}
