//! # Scout Indexer
//!
//! Incremental, consistency-preserving index maintenance.
//!
//! ## Pipeline
//!
//! ```text
//! Directory ──> File Scanner (.gitignore aware)
//!                   │
//!                   ├──> Fingerprints (skip unchanged files)
//!                   │
//!                   ├──> Chunker ──> Diff (adds / updates / removes)
//!                   │
//!                   └──> Coordinator ──> Index Store (atomic per-path commit)
//! ```
//!
//! The [`ProjectIndexer`] drives bulk passes; the [`ChangeWatcher`] feeds
//! the same per-path sync entry points from debounced filesystem events.
//! Both routes serialize through the [`Coordinator`], which rejects commits
//! whose base snapshot has been superseded by a concurrent writer.
//!
//! ## Example
//!
//! ```no_run
//! use scout_indexer::{Coordinator, FingerprintStore, ProjectIndexer};
//! use scout_store::{
//!     BatcherConfig, EmbeddingBatcher, EmbeddingCache, HashingProvider, JsonIndexStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(JsonIndexStore::load(".scout/index.json").await?);
//!     let cache = Arc::new(EmbeddingCache::load(".scout/embeddings.json", 10_000).await?);
//!     let provider = Arc::new(HashingProvider::new(256));
//!     let batcher = EmbeddingBatcher::new(provider, cache.clone(), BatcherConfig::default());
//!     let fingerprints = FingerprintStore::load(".scout/fingerprints.json").await?;
//!     let coordinator = Arc::new(Coordinator::new(store, batcher, cache, fingerprints));
//!
//!     let indexer = ProjectIndexer::new(".", coordinator)?;
//!     let stats = indexer.index().await?;
//!
//!     println!("Indexed {} files, {} mutations", stats.files, stats.total_mutations());
//!     Ok(())
//! }
//! ```

mod coordinator;
mod diff;
mod error;
mod fingerprints;
mod indexer;
mod scanner;
mod stats;
mod watcher;

pub use coordinator::{CommitResult, Coordinator};
pub use diff::{diff, Changeset};
pub use error::{IndexerError, Result};
pub use fingerprints::{file_fingerprint, ChunkFingerprint, FileSnapshot, FingerprintStore};
pub use indexer::ProjectIndexer;
pub use scanner::FileScanner;
pub use stats::IndexStats;
pub use watcher::{ChangeWatcher, SyncUpdate, WatcherConfig, WatcherHealth};
