//! # Incident Insight CLI (`insight`)
//!
//! The `insight` binary is the primary interface. It provides commands for
//! database initialization, incident import, retrieval inspection, one-shot
//! analysis, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! insight --config ./config/insight.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `insight init` | Create the SQLite database and run schema migrations |
//! | `insight import <file>` | Embed and store incidents from a JSON file |
//! | `insight search "<query>"` | Show the most similar stored incidents |
//! | `insight analyze "<text>"` | Run the full analysis pipeline |
//! | `insight serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use incident_insight::{analyze, config, ingest, migrate, search, server};

/// Incident Insight — retrieval-augmented root-cause analysis for SRE
/// incident reports.
#[derive(Parser)]
#[command(
    name = "insight",
    about = "Incident Insight — retrieval-augmented root-cause analysis for incident reports",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/insight.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the incidents table. Running it
    /// multiple times is safe.
    Init,

    /// Embed and store incidents from a JSON file.
    ///
    /// The file holds an array of `{id?, title, description}` objects.
    /// Records that already exist (same id) are updated in place.
    Import {
        /// Path to the incident JSON file.
        file: PathBuf,

        /// Show counts without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show stored incidents most similar to a query.
    Search {
        /// The query text.
        query: String,

        /// Maximum number of results (defaults to retrieval.top_k).
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Analyze an incident report end to end.
    ///
    /// Embeds the text, retrieves similar incidents, asks the inference
    /// service for a root-cause recommendation, and prints the formatted
    /// result.
    Analyze {
        /// The incident text to analyze.
        text: String,

        /// Also run the LLM-as-judge evaluation of the produced analysis.
        #[arg(long)]
        judge: bool,
    },

    /// Start the HTTP server (`GET /health`, `POST /analyze`).
    Serve,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init => migrate::run_migrations(&config).await.map(|()| {
            println!("initialized {}", config.db.path.display());
        }),
        Commands::Import { file, dry_run } => ingest::run_import(&config, &file, dry_run).await,
        Commands::Search { query, limit } => search::run_search(&config, &query, limit).await,
        Commands::Analyze { text, judge } => analyze::run_analyze(&config, &text, judge).await,
        Commands::Serve => server::run_server(&config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
