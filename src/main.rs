//! # pdf-rag CLI (`rag`)
//!
//! The `rag` binary runs ingestion, answers questions, serves the HTTP API,
//! and executes worker events.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the vector store and record schema |
//! | `rag ingest [--reset]` | Ingest PDFs from the source directory |
//! | `rag query "<text>"` | Answer a question inline |
//! | `rag get <id>` | Show a stored query record |
//! | `rag serve` | Start the HTTP API |
//! | `rag worker --event <file>` | Answer a dispatched query record |
//! | `rag lambda-api` | Serve the HTTP API as an AWS Lambda function |
//! | `rag lambda-worker` | Run the worker as an AWS Lambda function |
//! | `rag completions <shell>` | Print shell completions |
//!
//! Without `--config`, `./config/rag.toml` is used when present; otherwise
//! built-in defaults plus environment overrides apply.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use pdf_rag::{config, get, ingest, lambda, migrate, query, server, worker};

const DEFAULT_CONFIG_PATH: &str = "./config/rag.toml";

/// Question answering over PDF documents.
#[derive(Parser)]
#[command(name = "rag", version, about = "Question answering over PDF documents")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rag.toml` if it exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vector store file and the query record table.
    ///
    /// Safe to run repeatedly.
    Init,

    /// Load, split, embed and store the source PDFs.
    ///
    /// Only chunks whose id is not yet stored are embedded.
    Ingest {
        /// Delete the vector store before ingesting.
        #[arg(long)]
        reset: bool,
    },

    /// Answer a question against the local vector store.
    Query {
        /// The question.
        text: String,
    },

    /// Show a query record by id.
    Get {
        /// Query id (UUID).
        id: String,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Answer a dispatched query record and store the result.
    Worker {
        /// JSON file with the query record, or `-` to read stdin.
        #[arg(long, default_value = "-")]
        event: PathBuf,
    },

    /// Serve the HTTP API from inside an AWS Lambda function.
    LambdaApi,

    /// Answer query records delivered as AWS Lambda events.
    LambdaWorker,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

fn load_config(path: Option<&Path>) -> Result<config::Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            config::load_config(Path::new(DEFAULT_CONFIG_PATH))
        }
        None => config::Config::from_env(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "rag", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { reset } => {
            ingest::run_ingest_cmd(&cfg, reset).await?;
        }
        Commands::Query { text } => {
            query::run_query(&cfg, &text).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Worker { event } => {
            worker::run_worker(&cfg, &event).await?;
        }
        Commands::LambdaApi => {
            lambda::run_lambda_api(&cfg).await?;
        }
        Commands::LambdaWorker => {
            lambda::run_lambda_worker(&cfg).await?;
        }
        Commands::Completions { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
