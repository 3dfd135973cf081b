use crate::error::Result;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DEFAULT_CACHE_CAPACITY: usize = 65_536;

/// Cache key: content identity plus the model that produced the vector.
/// Identical code fragments across files share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub content_hash: String,
    pub model_id: String,
}

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    schema_version: u32,
    /// Most-recently-used first, matching `LruCache` iteration order.
    entries: Vec<(CacheKey, Vec<f32>)>,
}

const CACHE_SCHEMA_VERSION: u32 = 1;

/// Content-addressed embedding cache.
///
/// Entries are never mutated after insert; eviction removes whole entries,
/// least-recently-used first. Persisted so a restarted watcher does not
/// re-embed unchanged content.
pub struct EmbeddingCache {
    path: PathBuf,
    inner: Mutex<LruCache<CacheKey, Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(path: impl AsRef<Path>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            path: path.as_ref().to_path_buf(),
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Load a previously persisted cache; a missing file yields an empty
    /// cache, a corrupt file is discarded with a warning.
    pub async fn load(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let cache = Self::new(path.as_ref(), capacity);
        if !cache.path.exists() {
            return Ok(cache);
        }

        let bytes = tokio::fs::read(&cache.path).await?;
        match serde_json::from_slice::<PersistedCache>(&bytes) {
            Ok(persisted) if persisted.schema_version == CACHE_SCHEMA_VERSION => {
                let mut guard = cache.inner.lock().expect("cache lock poisoned");
                // Insert LRU-first so recency order survives the round trip.
                for (key, vector) in persisted.entries.into_iter().rev() {
                    guard.put(key, vector);
                }
                drop(guard);
            }
            Ok(persisted) => {
                log::warn!(
                    "Embedding cache {} has schema {}, expected {CACHE_SCHEMA_VERSION}; starting empty",
                    cache.path.display(),
                    persisted.schema_version
                );
            }
            Err(err) => {
                log::warn!(
                    "Failed to parse embedding cache {}: {err}; starting empty",
                    cache.path.display()
                );
            }
        }
        Ok(cache)
    }

    pub fn get(&self, content_hash: &str, model_id: &str) -> Option<Vec<f32>> {
        let key = CacheKey {
            content_hash: content_hash.to_string(),
            model_id: model_id.to_string(),
        };
        self.inner
            .lock()
            .expect("cache lock poisoned")
            .get(&key)
            .cloned()
    }

    pub fn insert(&self, content_hash: &str, model_id: &str, vector: Vec<f32>) {
        let key = CacheKey {
            content_hash: content_hash.to_string(),
            model_id: model_id.to_string(),
        };
        self.inner.lock().expect("cache lock poisoned").put(key, vector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist entries atomically (tmp file + rename).
    pub async fn save(&self) -> Result<()> {
        let entries: Vec<(CacheKey, Vec<f32>)> = {
            let guard = self.inner.lock().expect("cache lock poisoned");
            guard
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        let persisted = PersistedCache {
            schema_version: CACHE_SCHEMA_VERSION,
            entries,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(&persisted)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
