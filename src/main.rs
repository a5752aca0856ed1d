//! # Knowledge Engine CLI (`kbe`)
//!
//! The `kbe` binary starts the HTTP API and offers local parsing for
//! debugging extraction behavior without a running server.
//!
//! ## Usage
//!
//! ```bash
//! kbe --config ./config/kbe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbe serve` | Start the JSON HTTP API |
//! | `kbe parse <file>` | Extract text and metadata from a local file |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use knowledge_engine::config;
use knowledge_engine::models::DocumentType;
use knowledge_engine::parse;
use knowledge_engine::server;

/// Knowledge Engine CLI.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/kbe.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbe",
    about = "Knowledge Engine — document search and AI prompt augmentation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kbe.toml`. Missing file means built-in
    /// defaults.
    #[arg(long, global = true, default_value = "./config/kbe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the JSON HTTP API.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// document upload, search, and completion endpoints against an
    /// in-memory knowledge store.
    Serve,

    /// Extract text and metadata from a local file.
    ///
    /// Runs the same parsing pipeline uploads go through and prints the
    /// result. Useful for checking what a document will contribute to
    /// search before uploading it.
    Parse {
        /// Path to the document.
        file: PathBuf,

        /// Format override; inferred from the file extension when
        /// omitted.
        #[arg(long)]
        doc_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        config::Config::default()
    };

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Parse { file, doc_type } => {
            run_parse(&file, doc_type.as_deref())?;
        }
    }

    Ok(())
}

fn run_parse(file: &PathBuf, doc_type: Option<&str>) -> anyhow::Result<()> {
    let doc_type = match doc_type {
        Some(t) => DocumentType::from_str(t)?,
        None => {
            let ext = file
                .extension()
                .and_then(|e| e.to_str())
                .with_context(|| format!("cannot infer type of {}", file.display()))?;
            DocumentType::from_str(ext)?
        }
    };

    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let outcome = parse::parse(&bytes, doc_type)?;

    println!("type: {}", doc_type);
    for (key, value) in &outcome.metadata {
        println!("{}: {}", key, value);
    }
    if outcome.partial {
        println!("partial: some sections failed to decode and were skipped");
    }
    println!("---");
    println!("{}", outcome.text);

    Ok(())
}
