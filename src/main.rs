//! # AutoQuery CLI (`autoquery`)
//!
//! Upload documents, inspect the corpus, run retrieval and ask questions
//! from the command line, or start the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! autoquery --config ./config/autoquery.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `autoquery serve` | Start the HTTP API |
//! | `autoquery upload <PATH>...` | Upload files or directories |
//! | `autoquery list` | List uploaded documents |
//! | `autoquery get <ID>` | Show one document (`--text` for the body) |
//! | `autoquery delete <ID>` | Delete a document |
//! | `autoquery search "<query>"` | Print retrieved passages |
//! | `autoquery ask "<question>"` | Answer a question from the documents (`--document <ID>` to scope) |

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use autoquery::{commands, config, logging, server};

/// AutoQuery: question answering over your own documents.
#[derive(Parser)]
#[command(
    name = "autoquery",
    about = "AutoQuery: upload documents, retrieve passages, ask questions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// A missing file is not an error; built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/autoquery.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Upload one or more files. Directories are searched recursively
    /// for `.pdf`, `.docx`, `.doc` and `.txt` files.
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List uploaded documents, oldest first.
    List,

    /// Show a document's metadata.
    Get {
        id: String,
        /// Print the extracted text instead of metadata.
        #[arg(long)]
        text: bool,
    },

    /// Delete a document and its vectors.
    Delete { id: String },

    /// Retrieve passages for a query.
    Search {
        query: String,
        /// Maximum passages to print (defaults to `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question using retrieved passages and the configured LLM.
    Ask {
        question: String,
        /// Answer from one document's text instead of retrieval.
        #[arg(long)]
        document: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Upload { paths } => commands::run_upload(&cfg, &paths).await?,
        Commands::List => commands::run_list(&cfg).await?,
        Commands::Get { id, text } => commands::run_get(&cfg, &id, text).await?,
        Commands::Delete { id } => commands::run_delete(&cfg, &id).await?,
        Commands::Search { query, limit } => commands::run_search(&cfg, &query, limit).await?,
        Commands::Ask { question, document } => {
            commands::run_ask(&cfg, &question, document.as_deref()).await?
        }
    }

    Ok(())
}
