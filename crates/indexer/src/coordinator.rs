use crate::diff::Changeset;
use crate::error::{IndexerError, Result};
use crate::fingerprints::{FileSnapshot, FingerprintStore};
use scout_chunker::Chunk;
use scout_store::{EmbeddingBatcher, EmbeddingCache, IndexStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

/// Outcome of one committed (or no-op) apply
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub file_path: String,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub embedded: usize,
    pub no_op: bool,
    /// True when the commit forgot the file itself, not merely some of its
    /// chunks. Distinguishes a file deletion from an edit that only removed
    /// definitions.
    pub file_removed: bool,
}

/// Keyed per-path mutation slots.
///
/// A lazily created map of path → mutex; unrelated paths never block each
/// other, and a slot is dropped once nothing holds it, so the map does not
/// grow with the lifetime of the process.
struct PathLocks {
    inner: std::sync::Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl PathLocks {
    fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, path: &str) -> Arc<TokioMutex<()>> {
        let mut map = self.inner.lock().expect("path lock map poisoned");
        map.entry(path.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    fn release_if_idle(&self, path: &str) {
        let mut map = self.inner.lock().expect("path lock map poisoned");
        if let Some(slot) = map.get(path) {
            // Only the map itself holds the Arc: nobody is waiting.
            if Arc::strong_count(slot) == 1 {
                map.remove(path);
            }
        }
    }

    #[cfg(test)]
    fn live_slots(&self) -> usize {
        self.inner.lock().expect("path lock map poisoned").len()
    }
}

/// The only component permitted to mutate committed index state.
///
/// Serializes writes per file path and defines the visibility contract:
/// once `apply` returns success, every subsequent query reflects the new
/// state, and no query ever sees a partial or duplicated file.
pub struct Coordinator {
    store: Arc<dyn IndexStore>,
    batcher: EmbeddingBatcher,
    cache: Arc<EmbeddingCache>,
    fingerprints: TokioMutex<FingerprintStore>,
    locks: PathLocks,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn IndexStore>,
        batcher: EmbeddingBatcher,
        cache: Arc<EmbeddingCache>,
        fingerprints: FingerprintStore,
    ) -> Self {
        Self {
            store,
            batcher,
            cache,
            fingerprints: TokioMutex::new(fingerprints),
            locks: PathLocks::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn IndexStore> {
        self.store.clone()
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        self.batcher.model_id()
    }

    /// Last committed snapshot for a path, for diffing against.
    pub async fn snapshot_for(&self, file_path: &str) -> Option<FileSnapshot> {
        self.fingerprints.lock().await.get(file_path).cloned()
    }

    /// Paths with committed state, sorted.
    pub async fn tracked_paths(&self) -> Vec<String> {
        self.fingerprints.lock().await.paths()
    }

    /// Apply a changeset as one atomic, consistent unit.
    ///
    /// Embedding resolution (the only long blocking I/O) runs before the
    /// per-path slot is taken; the slot covers only verify-commit-record.
    /// The base-fingerprint check under the slot rejects changesets whose
    /// base was superseded by a concurrent writer (`StaleChangeset`), which
    /// doubles as cancellation for superseded in-flight work.
    pub async fn apply(&self, changeset: Changeset) -> Result<CommitResult> {
        let path = changeset.file_path.clone();

        // Fail fast before paying for embeddings; the authoritative check
        // happens again under the slot.
        self.verify_base(&path, changeset.base_fingerprint.as_deref())
            .await?;

        if changeset.is_empty() && changeset.new_fingerprint == changeset.base_fingerprint {
            log::debug!("No-op changeset for {path}");
            return Ok(CommitResult {
                file_path: path,
                added: 0,
                updated: 0,
                removed: 0,
                embedded: 0,
                no_op: true,
                file_removed: false,
            });
        }

        let Changeset {
            adds,
            updates,
            removes,
            base_fingerprint,
            new_fingerprint,
            current_chunks,
            ..
        } = changeset;
        let file_removed = new_fingerprint.is_none();

        let mut upserts: Vec<Chunk> = adds;
        let added = upserts.len();
        let updated = updates.len();
        let removed = removes.len();
        upserts.extend(updates);

        // Step 3 of the protocol: fill in vectors for adds/updates. A
        // provider failure aborts here with nothing committed.
        let embedded = self.attach_embeddings(&mut upserts).await?;

        let slot = self.locks.slot(&path);
        let result = async {
            let _guard = slot.lock().await;

            self.verify_base(&path, base_fingerprint.as_deref()).await?;

            if removed > 0 || !upserts.is_empty() {
                self.store.replace_chunks(&path, &removes, upserts).await?;
            }

            let mut fingerprints = self.fingerprints.lock().await;
            match new_fingerprint {
                Some(fingerprint) => {
                    fingerprints.set(
                        path.clone(),
                        FileSnapshot::from_fingerprints(fingerprint, current_chunks),
                    );
                }
                None => {
                    fingerprints.remove(&path);
                }
            }
            fingerprints.save().await?;
            drop(fingerprints);

            log::debug!(
                "Committed {path}: +{added} ~{updated} -{removed} ({embedded} embedded)"
            );
            Ok(CommitResult {
                file_path: path.clone(),
                added,
                updated,
                removed,
                embedded,
                no_op: false,
                file_removed,
            })
        }
        .await;
        drop(slot);
        self.locks.release_if_idle(&path);

        result
    }

    /// Persist the embedding cache. Called at the end of an indexing cycle
    /// rather than per apply; losing it costs re-embedding, not correctness.
    pub async fn persist_caches(&self) -> Result<()> {
        self.cache.save().await?;
        Ok(())
    }

    async fn verify_base(&self, path: &str, base: Option<&str>) -> Result<()> {
        let fingerprints = self.fingerprints.lock().await;
        let current = fingerprints.current_fingerprint(path);
        if current != base {
            return Err(IndexerError::stale(path));
        }
        Ok(())
    }

    async fn attach_embeddings(&self, upserts: &mut [Chunk]) -> Result<usize> {
        if upserts.is_empty() {
            return Ok(0);
        }
        let resolved = self.batcher.resolve(upserts).await?;
        let model_id = self.batcher.model_id().to_string();
        let mut embedded = 0;
        for chunk in upserts.iter_mut() {
            if let Some(vector) = resolved.get(&chunk.chunk_id) {
                chunk.embedding = Some(vector.clone());
                chunk.embedding_model_id = Some(model_id.clone());
                embedded += 1;
            }
        }
        Ok(embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::fingerprints::file_fingerprint;
    use scout_chunker::ChunkKind;
    use scout_store::{BatcherConfig, HashingProvider, JsonIndexStore};
    use tempfile::TempDir;

    fn chunk(symbol: &str, text: &str) -> Chunk {
        Chunk::named("a.rs", ChunkKind::Function, symbol, 0..text.len(), 1..2, "rust", text)
    }

    fn coordinator(dir: &TempDir) -> Coordinator {
        let store = Arc::new(JsonIndexStore::new(dir.path().join("index.json")));
        let cache = Arc::new(EmbeddingCache::new(dir.path().join("cache.json"), 1024));
        let batcher = EmbeddingBatcher::new(
            Arc::new(HashingProvider::new(32)),
            cache.clone(),
            BatcherConfig::default(),
        );
        let fingerprints = FingerprintStore::new(dir.path().join("fingerprints.json"));
        Coordinator::new(store, batcher, cache, fingerprints)
    }

    #[tokio::test]
    async fn first_apply_commits_and_records_snapshot() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);

        let changeset = diff(
            "a.rs",
            None,
            vec![chunk("f", "fn f() {}")],
            Some(file_fingerprint("v1")),
        );
        let result = coord.apply(changeset).await.unwrap();

        assert_eq!(result.added, 1);
        assert_eq!(result.embedded, 1);
        assert!(!result.no_op);

        let snap = coord.snapshot_for("a.rs").await.unwrap();
        assert_eq!(snap.file_fingerprint, file_fingerprint("v1"));
        assert_eq!(snap.chunks.len(), 1);

        let stored = coord.store().chunks_for_path("a.rs").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].embedding.is_some());
    }

    #[tokio::test]
    async fn stale_base_is_rejected_without_mutation() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);

        let committed = diff(
            "a.rs",
            None,
            vec![chunk("f", "fn f() { one() }")],
            Some(file_fingerprint("v1")),
        );
        coord.apply(committed).await.unwrap();

        // A changeset diffed against nothing (base None) no longer matches
        // the recorded fingerprint: it must be rejected untouched.
        let stale = diff(
            "a.rs",
            None,
            vec![chunk("f", "fn f() { two() }")],
            Some(file_fingerprint("v2")),
        );
        let err = coord.apply(stale).await.unwrap_err();
        assert!(err.is_stale());

        let stored = coord.store().chunks_for_path("a.rs").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].text.contains("one()"));
        let snap = coord.snapshot_for("a.rs").await.unwrap();
        assert_eq!(snap.file_fingerprint, file_fingerprint("v1"));
    }

    #[tokio::test]
    async fn racing_writers_commit_exactly_once() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);

        let base = diff(
            "a.rs",
            None,
            vec![chunk("f", "fn f() { base() }")],
            Some(file_fingerprint("v1")),
        );
        coord.apply(base).await.unwrap();
        let snap = coord.snapshot_for("a.rs").await;

        // Two writers diff against the same committed snapshot, then race.
        let first = diff(
            "a.rs",
            snap.as_ref(),
            vec![chunk("f", "fn f() { first() }")],
            Some(file_fingerprint("v2")),
        );
        let second = diff(
            "a.rs",
            snap.as_ref(),
            vec![chunk("f", "fn f() { second() }")],
            Some(file_fingerprint("v3")),
        );

        let (r1, r2) = tokio::join!(coord.apply(first), coord.apply(second));
        let outcomes = [r1, r2];
        let committed = outcomes.iter().filter(|r| r.is_ok()).count();
        let stale = outcomes
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_stale()))
            .count();
        assert_eq!(committed, 1, "exactly one of the racers commits");
        assert_eq!(stale, 1, "the loser is rejected as stale");
    }

    #[tokio::test]
    async fn unchanged_reindex_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);

        let chunks = vec![chunk("f", "fn f() {}")];
        let first = diff("a.rs", None, chunks.clone(), Some(file_fingerprint("v1")));
        coord.apply(first).await.unwrap();

        let snap = coord.snapshot_for("a.rs").await;
        let again = diff("a.rs", snap.as_ref(), chunks, Some(file_fingerprint("v1")));
        assert!(again.is_empty());
        let result = coord.apply(again).await.unwrap();
        assert!(result.no_op);
        assert_eq!(result.embedded, 0);
    }

    #[tokio::test]
    async fn deletion_cascades_and_forgets_the_path() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);

        let chunks = vec![chunk("f", "fn f() {}"), chunk("g", "fn g() {}")];
        let first = diff("a.rs", None, chunks, Some(file_fingerprint("v1")));
        coord.apply(first).await.unwrap();

        let snap = coord.snapshot_for("a.rs").await;
        let removal = diff("a.rs", snap.as_ref(), vec![], None);
        let result = coord.apply(removal).await.unwrap();

        assert_eq!(result.removed, 2);
        assert!(result.file_removed);
        assert!(coord.snapshot_for("a.rs").await.is_none());
        assert!(coord.store().chunks_for_path("a.rs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chunk_only_removal_is_not_a_file_removal() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);

        let f = chunk("f", "fn f() {}");
        let g = chunk("g", "fn g() {}");
        let first = diff("a.rs", None, vec![f.clone(), g], Some(file_fingerprint("v1")));
        coord.apply(first).await.unwrap();

        // Editing g out of the file removes a chunk but keeps the file.
        let snap = coord.snapshot_for("a.rs").await;
        let edit = diff("a.rs", snap.as_ref(), vec![f], Some(file_fingerprint("v2")));
        let result = coord.apply(edit).await.unwrap();

        assert_eq!(result.removed, 1);
        assert!(!result.file_removed);
        assert!(coord.snapshot_for("a.rs").await.is_some());
        assert_eq!(coord.store().chunks_for_path("a.rs").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn idle_path_slots_are_dropped() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir);

        let changeset = diff(
            "a.rs",
            None,
            vec![chunk("f", "fn f() {}")],
            Some(file_fingerprint("v1")),
        );
        coord.apply(changeset).await.unwrap();
        assert_eq!(coord.locks.live_slots(), 0);
    }
}
