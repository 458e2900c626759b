//! # Lorekeeper CLI (`lore`)
//!
//! Builds a searchable index from a folder of game guides and answers
//! questions about them with a hosted language model.
//!
//! ## Usage
//!
//! ```bash
//! lore --config ./config/lore.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lore index` | Load, chunk, and embed the guides; write the index |
//! | `lore ask "<question>"` | Answer one question and exit |
//! | `lore chat` | Interactive question loop |
//! | `lore serve` | Start the HTTP query API |
//! | `lore stats` | Summarise the persisted index |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from ./guides
//! lore index --config ./config/lore.toml
//!
//! # Ask once, showing which pages the answer came from
//! HF_TOKEN=hf_... lore ask "What is the safe code in the pharmacy?" --sources
//!
//! # Serve POST /ask on 127.0.0.1:5000
//! HF_TOKEN=hf_... lore serve
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use lorekeeper::{chat, config, ingest, logging, qa::QaEngine, server, stats};

/// Lorekeeper: question answering over game-guide PDFs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lore.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lore",
    about = "Lorekeeper: retrieval-augmented question answering over game guides",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/lore.toml`. Credentials are never read from this
    /// file; set the variable named by `api_key_env` instead.
    #[arg(long, global = true, default_value = "./config/lore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the configured documents.
    ///
    /// Rebuilds the whole index and atomically replaces the file at
    /// `[index].path`. A failed run leaves the previous index untouched.
    Index {
        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a single question.
    Ask {
        /// The question to answer.
        question: String,

        /// Also print the source chunks used to answer.
        #[arg(long)]
        sources: bool,

        /// Number of chunks to retrieve (defaults to `[retrieval].k`).
        #[arg(long, value_parser = parse_k)]
        k: Option<usize>,
    },

    /// Ask questions interactively until `exit`.
    Chat,

    /// Start the HTTP query API on `[server].bind`.
    Serve,

    /// Show what the persisted index holds.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    match cli.command {
        Commands::Index { dry_run } => {
            ingest::run_index(&cfg, dry_run).await?;
        }
        Commands::Ask {
            question,
            sources,
            k,
        } => {
            let engine = load_engine(&cfg)?;
            let k = k.unwrap_or(engine.k());
            let answer = engine.answer_with_k(&question, k, sources).await?;
            let mut stdout = std::io::stdout().lock();
            chat::write_answer(&mut stdout, &answer)?;
        }
        Commands::Chat => {
            let engine = load_engine(&cfg)?;
            let stdin = std::io::stdin().lock();
            chat::run_chat(&engine, stdin, std::io::stdout()).await?;
        }
        Commands::Serve => {
            let engine = Arc::new(load_engine(&cfg)?);
            server::run_server(engine, &cfg.server.bind).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
    }

    Ok(())
}

/// `--k` must retrieve at least one chunk.
fn parse_k(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("k must be at least 1".to_string()),
        Ok(k) => Ok(k),
        Err(e) => Err(e.to_string()),
    }
}

fn load_engine(cfg: &config::Config) -> anyhow::Result<QaEngine> {
    QaEngine::from_config(cfg).with_context(|| {
        format!(
            "Cannot start without a usable index at {}; run `lore index` first",
            cfg.index.path.display()
        )
    })
}
