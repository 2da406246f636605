//! # Docshelf CLI (`shelf`)
//!
//! The `shelf` binary is the operational interface for Docshelf. It provides
//! commands for database initialization, document ingestion, search, and
//! starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the SQLite database and run schema migrations |
//! | `shelf ingest <id> <path> <mime>` | (Re)ingest one stored document |
//! | `shelf search "<query>"` | Search ingested documents |
//! | `shelf serve` | Start the JSON HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docshelf::{config, ingest, migrate, search, server};

/// Docshelf — semantic search over a document archive.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/shelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Docshelf — semantic search over a document archive",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents and chunks
    /// tables. This command is idempotent.
    Init,

    /// Ingest (or re-ingest) one document from the blob store.
    ///
    /// Downloads the blob, extracts its text, chunks and embeds it, and
    /// replaces any previously stored chunks for the same document id.
    Ingest {
        /// Document identifier.
        id: String,

        /// Blob storage path, relative to the blob root.
        path: String,

        /// Mime type of the stored blob (`application/pdf` or `text/*`).
        mime: String,

        /// Display name; defaults to the path's file name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Search ingested documents.
    ///
    /// Embeds the query, finds the closest chunks, and prints ranked
    /// documents with scored snippets and signed download URLs.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of documents to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the JSON HTTP server.
    ///
    /// Exposes ingestion and search endpoints plus signed blob downloads
    /// on the configured bind address.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            id,
            path,
            mime,
            name,
        } => {
            ingest::run_ingest(&cfg, &id, &path, &mime, name).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
