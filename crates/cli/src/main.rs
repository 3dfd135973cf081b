//! # Scout CLI (`scout`)
//!
//! Command-line front end for the incremental code index.
//!
//! ```bash
//! # Build or refresh the index for the current directory
//! scout index
//!
//! # Keep the index fresh while editing
//! scout watch
//!
//! # Regex search over indexed chunks
//! scout search "fn apply_\w+"
//!
//! # Semantic search
//! scout search --semantic "retry with backoff" -k 5
//! ```

mod config;
mod engine;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use engine::Engine;
use env_logger::Env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scout",
    about = "Incremental code index with regex and semantic search",
    version
)]
struct Cli {
    /// Project root to operate on.
    #[arg(long, global = true, default_value = ".")]
    path: PathBuf,

    /// Emit machine-readable JSON instead of human output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or incrementally refresh the index.
    ///
    /// Unchanged files are skipped via content fingerprints; renames and
    /// deletions are swept out of the index. Safe to run repeatedly.
    Index,

    /// Watch the project and keep the index fresh.
    ///
    /// Runs one full pass, then applies debounced per-file syncs as the
    /// filesystem changes. Ctrl-C stops the watcher.
    Watch,

    /// Search indexed chunks.
    Search {
        /// Regex pattern, or free text with `--semantic`.
        query: String,

        /// Rank by embedding similarity instead of regex matching.
        #[arg(long)]
        semantic: bool,

        /// Maximum number of results.
        #[arg(short = 'k', long, default_value_t = 10)]
        limit: usize,
    },

    /// Show index size and tracked paths.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let engine = Engine::open(&cli.path).await?;

    match cli.command {
        Commands::Index => {
            let stats = engine.index().await?;
            output::print_stats(&stats, cli.json)?;
        }
        Commands::Watch => {
            let stats = engine.index().await?;
            output::print_stats(&stats, cli.json)?;

            let watcher = engine.watch()?;
            let mut updates = watcher.subscribe_updates();
            println!("Watching {} (Ctrl-C to stop)", engine.root().display());

            loop {
                tokio::select! {
                    update = updates.recv() => {
                        match update {
                            Ok(update) => output::print_update(&update, cli.json)?,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                log::warn!("Dropped {skipped} sync updates");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    result = tokio::signal::ctrl_c() => {
                        result?;
                        break;
                    }
                }
            }
        }
        Commands::Search {
            query,
            semantic,
            limit,
        } => {
            if semantic {
                let matches = engine.search_semantic(&query, limit).await?;
                output::print_vector_matches(&matches, cli.json)?;
            } else {
                let matches = engine.search_text(&query, limit).await?;
                output::print_text_matches(&matches, cli.json)?;
            }
        }
        Commands::Status => {
            let (files, chunks) = engine.status().await;
            output::print_status(engine.root(), files, chunks, cli.json)?;
        }
    }

    Ok(())
}
