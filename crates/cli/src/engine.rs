use crate::config::Config;
use anyhow::{Context, Result};
use scout_indexer::{
    ChangeWatcher, Coordinator, FingerprintStore, IndexStats, ProjectIndexer, WatcherConfig,
};
use scout_store::{
    BatcherConfig, EmbeddingBatcher, EmbeddingCache, EmbeddingProvider, HashingProvider,
    IndexStore, JsonIndexStore, TextMatch, VectorMatch,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Fully wired indexing stack for one project root.
pub struct Engine {
    root: PathBuf,
    config: Config,
    store: Arc<JsonIndexStore>,
    provider: Arc<HashingProvider>,
    indexer: Arc<ProjectIndexer>,
}

impl Engine {
    /// Open (or create) the index state under `<root>/.scout` and wire the
    /// store, embedding cache, batcher and coordinator together.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .with_context(|| format!("project root {} not found", root.as_ref().display()))?;
        let config = Config::load(&root)?;

        let state = Config::state_dir(&root);
        tokio::fs::create_dir_all(&state)
            .await
            .with_context(|| format!("failed to create {}", state.display()))?;

        let store = Arc::new(
            JsonIndexStore::load(state.join("index.json"))
                .await
                .context("failed to open index store")?,
        );
        let cache = Arc::new(
            EmbeddingCache::load(state.join("embeddings.json"), config.embedding.cache_capacity)
                .await
                .context("failed to open embedding cache")?,
        );
        let provider = Arc::new(HashingProvider::new(config.embedding.dimension));
        let batcher = EmbeddingBatcher::new(
            provider.clone(),
            cache.clone(),
            BatcherConfig {
                batch_size: config.embedding.batch_size,
                max_retries: config.embedding.max_retries,
                ..BatcherConfig::default()
            },
        );
        let fingerprints = FingerprintStore::load(state.join("fingerprints.json"))
            .await
            .context("failed to open fingerprint store")?;

        let coordinator = Arc::new(Coordinator::new(
            store.clone() as Arc<dyn IndexStore>,
            batcher,
            cache,
            fingerprints,
        ));
        let indexer = Arc::new(
            ProjectIndexer::new(&root, coordinator)?
                .with_max_file_bytes(config.index.max_file_kb * 1024),
        );

        Ok(Self {
            root,
            config,
            store,
            provider,
            indexer,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn index(&self) -> Result<IndexStats> {
        Ok(self.indexer.index().await?)
    }

    pub fn watch(&self) -> Result<ChangeWatcher> {
        let config = WatcherConfig {
            debounce: Duration::from_millis(self.config.watch.debounce_ms),
            max_batch_wait: Duration::from_millis(self.config.watch.max_batch_wait_ms),
            ..WatcherConfig::default()
        };
        Ok(ChangeWatcher::start(self.indexer.clone(), config)?)
    }

    pub async fn search_text(&self, pattern: &str, limit: usize) -> Result<Vec<TextMatch>> {
        Ok(self.store.search_text(pattern, limit).await?)
    }

    pub async fn search_semantic(&self, query: &str, k: usize) -> Result<Vec<VectorMatch>> {
        let texts = [query.to_string()];
        let vectors = self
            .provider
            .embed(&texts)
            .await
            .context("failed to embed query")?;
        let query_vector = vectors
            .into_iter()
            .next()
            .context("provider returned no vector for the query")?;
        Ok(self.store.search_vector(&query_vector, k).await?)
    }

    pub async fn status(&self) -> (usize, usize) {
        (
            self.store.file_count().await,
            self.store.chunk_count().await,
        )
    }
}
