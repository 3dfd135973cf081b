use crate::error::{Result, StoreError};
use async_trait::async_trait;
use ndarray::ArrayView1;
use regex::Regex;
use scout_chunker::{Chunk, ChunkId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Text/regex search hit
#[derive(Debug, Clone)]
pub struct TextMatch {
    pub chunk: Chunk,
    pub match_count: usize,
}

/// Vector similarity hit
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub chunk: Chunk,
    pub score: f32,
}

/// Storage contract the consistency engine depends on.
///
/// Each operation is individually atomic; `replace_chunks` is all-or-nothing,
/// so readers never observe a file with old chunks gone and new ones absent,
/// nor both generations at once.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Atomically remove `removes` and insert/replace `upserts` for one file.
    async fn replace_chunks(
        &self,
        file_path: &str,
        removes: &[ChunkId],
        upserts: Vec<Chunk>,
    ) -> Result<()>;

    /// Regex search over chunk text, ranked by match count.
    async fn search_text(&self, pattern: &str, limit: usize) -> Result<Vec<TextMatch>>;

    /// Approximate/exact nearest-neighbor query over chunk embeddings.
    async fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<VectorMatch>>;

    /// Committed chunk snapshot for one file, in structural order.
    async fn chunks_for_path(&self, file_path: &str) -> Result<Vec<Chunk>>;
}

const INDEX_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    schema_version: u32,
    files: HashMap<String, Vec<Chunk>>,
}

/// In-memory chunk repository with JSON persistence.
///
/// A single `RwLock` over the per-file map gives the contract's atomicity:
/// `replace_chunks` holds the write lock for the whole removal+insert+flush,
/// queries take read locks and always see a consistent committed state.
#[derive(Debug)]
pub struct JsonIndexStore {
    path: PathBuf,
    files: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl JsonIndexStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Load a persisted index. Missing file → empty store; unreadable or
    /// schema-mismatched content is a `Corrupt` error for the operator, not
    /// a silent rebuild.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self::new(&path));
        }

        let bytes = tokio::fs::read(&path).await?;
        let persisted: PersistedIndex = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::corrupt(path.display().to_string(), e.to_string()))?;
        if persisted.schema_version != INDEX_SCHEMA_VERSION {
            return Err(StoreError::corrupt(
                path.display().to_string(),
                format!(
                    "schema {} != expected {INDEX_SCHEMA_VERSION}",
                    persisted.schema_version
                ),
            ));
        }

        Ok(Self {
            path,
            files: RwLock::new(persisted.files),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn chunk_count(&self) -> usize {
        self.files.read().await.values().map(Vec::len).sum()
    }

    /// All indexed paths, sorted.
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    async fn flush(&self, files: &HashMap<String, Vec<Chunk>>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedIndex {
            schema_version: INDEX_SCHEMA_VERSION,
            files: files.clone(),
        };
        let bytes = serde_json::to_vec(&persisted)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl IndexStore for JsonIndexStore {
    async fn replace_chunks(
        &self,
        file_path: &str,
        removes: &[ChunkId],
        upserts: Vec<Chunk>,
    ) -> Result<()> {
        let mut files = self.files.write().await;

        let entry = files.entry(file_path.to_string()).or_default();
        entry.retain(|chunk| {
            !removes.contains(&chunk.chunk_id)
                && !upserts.iter().any(|up| up.chunk_id == chunk.chunk_id)
        });
        entry.extend(upserts);
        entry.sort_by_key(|chunk| chunk.start_byte);
        if entry.is_empty() {
            files.remove(file_path);
        }

        // Durability inside the critical section: a reader that sees the
        // new state after we return will also see it after a restart.
        self.flush(&files).await
    }

    async fn search_text(&self, pattern: &str, limit: usize) -> Result<Vec<TextMatch>> {
        let regex = Regex::new(pattern).map_err(|e| StoreError::InvalidPattern(e.to_string()))?;

        let files = self.files.read().await;
        let mut matches: Vec<TextMatch> = files
            .values()
            .flatten()
            .filter_map(|chunk| {
                let match_count = regex.find_iter(&chunk.text).count();
                (match_count > 0).then(|| TextMatch {
                    chunk: chunk.clone(),
                    match_count,
                })
            })
            .collect();
        drop(files);

        matches.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then_with(|| a.chunk.file_path.cmp(&b.chunk.file_path))
                .then_with(|| a.chunk.start_byte.cmp(&b.chunk.start_byte))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
        let files = self.files.read().await;
        let mut matches: Vec<VectorMatch> = files
            .values()
            .flatten()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                let score = cosine_similarity(query, embedding)?;
                Some(VectorMatch {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();
        drop(files);

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.file_path.cmp(&b.chunk.file_path))
        });
        matches.truncate(k);
        Ok(matches)
    }

    async fn chunks_for_path(&self, file_path: &str) -> Result<Vec<Chunk>> {
        let files = self.files.read().await;
        Ok(files.get(file_path).cloned().unwrap_or_default())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom <= f32::EPSILON {
        return None;
    }
    let score = a.dot(&b) / denom;
    score.is_finite().then_some(score)
}
