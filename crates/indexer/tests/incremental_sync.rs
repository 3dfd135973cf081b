//! End-to-end incremental sync: bulk passes, in-place edits, deletions and
//! state reloads over a real temp project.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use scout_indexer::{Coordinator, FingerprintStore, ProjectIndexer};
use scout_store::{
    BatcherConfig, EmbeddingBatcher, EmbeddingCache, EmbeddingProvider, IndexStore, HashingProvider,
    JsonIndexStore, ProviderError,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

struct CountingProvider {
    inner: HashingProvider,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new() -> Self {
        Self {
            inner: HashingProvider::new(16),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(texts).await
    }
}

struct Harness {
    indexer: ProjectIndexer,
    store: Arc<JsonIndexStore>,
    provider: Arc<CountingProvider>,
}

async fn build_harness(project: &Path) -> Harness {
    build_harness_with(project, None).await
}

async fn build_harness_with(project: &Path, max_file_bytes: Option<u64>) -> Harness {
    let state = project.join(".scout");
    std::fs::create_dir_all(&state).unwrap();

    let store = Arc::new(
        JsonIndexStore::load(state.join("index.json"))
            .await
            .unwrap(),
    );
    let cache = Arc::new(
        EmbeddingCache::load(state.join("embeddings.json"), 1024)
            .await
            .unwrap(),
    );
    let provider = Arc::new(CountingProvider::new());
    let batcher = EmbeddingBatcher::new(provider.clone(), cache.clone(), BatcherConfig::default());
    let fingerprints = FingerprintStore::load(state.join("fingerprints.json"))
        .await
        .unwrap();
    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        batcher,
        cache,
        fingerprints,
    ));
    let mut indexer = ProjectIndexer::new(project, coordinator).unwrap();
    if let Some(max) = max_file_bytes {
        indexer = indexer.with_max_file_bytes(max);
    }

    Harness {
        indexer,
        store,
        provider,
    }
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn editing_one_function_updates_in_place() {
    let project = TempDir::new().unwrap();
    write_file(
        project.path(),
        "a.py",
        "def alpha():\n    return old_alpha_body\n\ndef beta():\n    return beta_body\n",
    );

    let harness = build_harness(project.path()).await;
    let stats = harness.indexer.index().await.unwrap();
    assert!(stats.errors.is_empty());
    assert!(stats.chunks_added >= 2);

    let before = harness.store.chunks_for_path("a.py").await.unwrap();
    let alpha_before = before
        .iter()
        .find(|c| c.symbol_path.as_deref() == Some("alpha"))
        .expect("alpha chunk indexed")
        .clone();

    write_file(
        project.path(),
        "a.py",
        "def alpha():\n    return new_alpha_body\n\ndef beta():\n    return beta_body\n",
    );
    let stats = harness.indexer.index().await.unwrap();
    assert_eq!(stats.chunks_updated, 1);
    assert_eq!(stats.chunks_added, 0);
    assert_eq!(stats.chunks_removed, 0);

    let after = harness.store.chunks_for_path("a.py").await.unwrap();
    let alpha_after = after
        .iter()
        .find(|c| c.symbol_path.as_deref() == Some("alpha"))
        .expect("alpha chunk survives the edit")
        .clone();
    assert_eq!(alpha_before.chunk_id, alpha_after.chunk_id);

    let stale = harness.store.search_text("old_alpha_body", 10).await.unwrap();
    assert!(stale.is_empty());
    let fresh = harness.store.search_text("new_alpha_body", 10).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].chunk.chunk_id, alpha_after.chunk_id);
}

#[tokio::test]
async fn deleting_a_function_removes_only_its_chunk() {
    let project = TempDir::new().unwrap();
    write_file(
        project.path(),
        "b.py",
        "def f():\n    return f_body\n\ndef g():\n    return g_body\n",
    );

    let harness = build_harness(project.path()).await;
    harness.indexer.index().await.unwrap();
    assert_eq!(harness.store.chunks_for_path("b.py").await.unwrap().len(), 2);

    write_file(project.path(), "b.py", "def f():\n    return f_body\n");
    let stats = harness.indexer.index().await.unwrap();
    assert_eq!(stats.chunks_removed, 1);

    let remaining = harness.store.chunks_for_path("b.py").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].symbol_path.as_deref(), Some("f"));
    assert!(harness.store.search_text("g_body", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unchanged_reindex_is_free() {
    let project = TempDir::new().unwrap();
    write_file(project.path(), "a.rs", "fn alpha() { one(); }\n");
    write_file(project.path(), "b.rs", "fn beta() { two(); }\n");

    let harness = build_harness(project.path()).await;
    harness.indexer.index().await.unwrap();
    let calls_after_first = harness.provider.calls();
    assert!(calls_after_first > 0);

    let stats = harness.indexer.index().await.unwrap();
    assert_eq!(harness.provider.calls(), calls_after_first);
    assert_eq!(stats.files_unchanged, 2);
    assert_eq!(stats.total_mutations(), 0);
}

#[tokio::test]
async fn deleted_file_is_forgotten() {
    let project = TempDir::new().unwrap();
    write_file(project.path(), "keep.rs", "fn keep() { keep_body(); }\n");
    write_file(project.path(), "drop.rs", "fn drop_me() { drop_body(); }\n");

    let harness = build_harness(project.path()).await;
    harness.indexer.index().await.unwrap();
    assert!(!harness.store.search_text("drop_body", 10).await.unwrap().is_empty());

    std::fs::remove_file(project.path().join("drop.rs")).unwrap();
    let stats = harness.indexer.index().await.unwrap();
    assert_eq!(stats.files_removed, 1);

    assert!(harness.store.chunks_for_path("drop.rs").await.unwrap().is_empty());
    assert!(harness.store.search_text("drop_body", 10).await.unwrap().is_empty());
    assert!(!harness.store.search_text("keep_body", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn state_survives_a_restart() {
    let project = TempDir::new().unwrap();
    write_file(project.path(), "lib.rs", "fn stable() { stable_body(); }\n");

    {
        let harness = build_harness(project.path()).await;
        harness.indexer.index().await.unwrap();
        assert_eq!(harness.store.chunk_count().await, 1);
    }

    // Fresh stack over the same on-disk state.
    let harness = build_harness(project.path()).await;
    assert_eq!(harness.store.chunk_count().await, 1);

    let stats = harness.indexer.index().await.unwrap();
    assert_eq!(stats.files_unchanged, 1);
    // Fingerprints and cached embeddings make the pass provider-free.
    assert_eq!(harness.provider.calls(), 0);

    let hits = harness.store.search_text("stable_body", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn single_path_sync_matches_bulk_results() {
    let project = TempDir::new().unwrap();
    write_file(project.path(), "x.rs", "fn x() { x_body(); }\n");

    let harness = build_harness(project.path()).await;
    harness.indexer.index().await.unwrap();

    write_file(project.path(), "x.rs", "fn x() { x_body_v2(); }\n");
    let result = harness.indexer.sync_path("x.rs").await.unwrap();
    assert_eq!(result.updated, 1);
    assert!(!result.no_op);

    // Replaying the same path is a fingerprint no-op.
    let replay = harness.indexer.sync_path("x.rs").await.unwrap();
    assert!(replay.no_op);

    std::fs::remove_file(project.path().join("x.rs")).unwrap();
    let removal = harness.indexer.sync_path("x.rs").await.unwrap();
    assert_eq!(removal.removed, 1);
    assert!(removal.file_removed);
    assert!(harness.store.chunks_for_path("x.rs").await.unwrap().is_empty());
}

#[tokio::test]
async fn files_over_the_size_limit_are_skipped() {
    let project = TempDir::new().unwrap();
    write_file(project.path(), "small.rs", "fn small() { small_body(); }\n");
    let big = format!("fn big() {{ big_body(); }}\n// {}\n", "x".repeat(256));
    write_file(project.path(), "big.rs", &big);

    let harness = build_harness_with(project.path(), Some(64)).await;
    let stats = harness.indexer.index().await.unwrap();
    assert!(stats.errors.is_empty());

    assert!(!harness.store.search_text("small_body", 10).await.unwrap().is_empty());
    assert!(harness.store.search_text("big_body", 10).await.unwrap().is_empty());
    assert!(harness.store.chunks_for_path("big.rs").await.unwrap().is_empty());
}
