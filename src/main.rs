//! # Folio CLI (`folio`)
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio init` | Create the SQLite database and schema |
//! | `folio store <chapter>` | Store a chapter version (content from `--file` or stdin) |
//! | `folio get <id>` | Print a stored version |
//! | `folio search "<query>"` | Ranked search over stored versions |
//! | `folio serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! folio init
//! folio store chapter-1 --file scraped/ch1.txt --status scraped \
//!     --source-url https://example.org/book/ch1 --screenshot shots/ch1.png
//! cat rewrite.txt | folio store chapter-1 --status ai_rewritten
//! folio search "the storm breaks" --chapter chapter-1 --limit 3
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use folio::store_cmd::StoreArgs;
use folio::{config, get, logging, migrate, search, server, store_cmd};
use folio_core::VersionStatus;

/// Folio: a content-addressed chapter version store with adaptive ranking.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/folio.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio: a content-addressed chapter version store with adaptive ranking",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it more than once is safe.
    Init,

    /// Store a chapter version and print its id.
    ///
    /// Storing identical content for the same chapter again updates the
    /// existing record instead of creating a new one.
    Store {
        /// Chapter identifier (e.g. `chapter-1`).
        chapter: String,

        /// Read content from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Workflow status: scraped, ai_rewritten, reviewed, approved, auto_approved.
        #[arg(long)]
        status: VersionStatus,

        /// Author (defaults to `ai_writer`).
        #[arg(long)]
        author: Option<String>,

        /// Free-form version label (defaults to `1.0`).
        #[arg(long)]
        version: Option<String>,

        #[arg(long)]
        source_url: Option<String>,

        #[arg(long)]
        screenshot: Option<PathBuf>,

        /// Reviewer feedback, stored verbatim.
        #[arg(long)]
        feedback: Option<String>,

        /// Reviewer rating, 1 to 5 stars.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,
    },

    /// Retrieve a version by id.
    Get {
        /// Version id (`<chapter>_<hash>`).
        id: String,
    },

    /// Ranked search over stored versions.
    Search {
        /// The search query string.
        query: String,

        /// Only consider versions of this chapter.
        #[arg(long)]
        chapter: Option<String>,

        /// Maximum number of results (defaults to `[ranking].default_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Characters of content to show per result.
        #[arg(long, default_value_t = search::DEFAULT_PREVIEW_CHARS)]
        preview: usize,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Store {
            chapter,
            file,
            status,
            author,
            version,
            source_url,
            screenshot,
            feedback,
            rating,
        } => {
            let args = StoreArgs {
                chapter,
                file,
                status,
                author,
                version,
                source_url,
                screenshot,
                feedback,
                rating,
            };
            store_cmd::run_store(&cfg, args).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Search {
            query,
            chapter,
            limit,
            preview,
        } => {
            search::run_search(&cfg, &query, chapter, limit, preview).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
