//! # Scout Store
//!
//! Durable, queryable chunk repository plus the embedding boundary.
//!
//! ```text
//! Chunks needing vectors
//!     │
//!     ├──> Embedding Cache (content-addressed, LRU)
//!     │      └─> cache hits
//!     │
//!     ├──> Embedding Batcher (dedup + bounded batches + retry)
//!     │      └─> EmbeddingProvider
//!     │
//!     └──> Index Store (atomic per-file replace, text + vector query)
//! ```
//!
//! Any storage engine implementing [`IndexStore`] is substitutable; the
//! shipped [`JsonIndexStore`] keeps everything in memory behind a `RwLock`
//! and persists as JSON with atomic renames.

mod batcher;
mod cache;
mod embedder;
mod error;
mod store;

pub use batcher::{BatcherConfig, EmbeddingBatcher};
pub use cache::{CacheKey, EmbeddingCache, DEFAULT_CACHE_CAPACITY};
pub use embedder::{EmbeddingProvider, HashingProvider, ProviderError, DEFAULT_DIMENSION};
pub use error::{Result, StoreError};
pub use store::{IndexStore, JsonIndexStore, TextMatch, VectorMatch};
