use crate::error::Result;
use scout_chunker::{Chunk, ChunkId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const FINGERPRINT_SCHEMA_VERSION: u32 = 1;

/// Hash a file's raw content for cheap change detection
#[must_use]
pub fn file_fingerprint(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Per-chunk identity + content pair as last committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFingerprint {
    pub chunk_id: ChunkId,
    pub content_hash: String,
}

impl From<&Chunk> for ChunkFingerprint {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            content_hash: chunk.content_hash.clone(),
        }
    }
}

/// Last committed state for one file: what the Diff Engine diffs against.
/// Owned exclusively by the Coordinator; one snapshot per path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub file_fingerprint: String,
    pub chunks: Vec<ChunkFingerprint>,
    pub committed_at_unix_ms: u64,
}

impl FileSnapshot {
    #[must_use]
    pub fn from_chunks(file_fingerprint: String, chunks: &[Chunk]) -> Self {
        Self {
            file_fingerprint,
            chunks: chunks.iter().map(ChunkFingerprint::from).collect(),
            committed_at_unix_ms: unix_now_ms(),
        }
    }

    #[must_use]
    pub fn from_fingerprints(file_fingerprint: String, chunks: Vec<ChunkFingerprint>) -> Self {
        Self {
            file_fingerprint,
            chunks,
            committed_at_unix_ms: unix_now_ms(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedFingerprints {
    schema_version: u32,
    files: HashMap<String, FileSnapshot>,
}

/// path → committed snapshot map, persisted so a restarted process diffs
/// against real prior state instead of re-embedding the world.
pub struct FingerprintStore {
    path: PathBuf,
    files: HashMap<String, FileSnapshot>,
}

impl FingerprintStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            files: HashMap::new(),
        }
    }

    /// Load persisted fingerprints. Corrupt state is rebuildable, so it is
    /// discarded with a warning rather than surfaced as fatal.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut store = Self::new(path.as_ref());
        if !store.path.exists() {
            return Ok(store);
        }

        let bytes = tokio::fs::read(&store.path).await?;
        match serde_json::from_slice::<PersistedFingerprints>(&bytes) {
            Ok(persisted) if persisted.schema_version == FINGERPRINT_SCHEMA_VERSION => {
                store.files = persisted.files;
            }
            Ok(persisted) => {
                log::warn!(
                    "Fingerprint store {} has schema {}, expected {FINGERPRINT_SCHEMA_VERSION}; starting empty",
                    store.path.display(),
                    persisted.schema_version
                );
            }
            Err(err) => {
                log::warn!(
                    "Failed to parse fingerprint store {}: {err}; starting empty",
                    store.path.display()
                );
            }
        }
        Ok(store)
    }

    #[must_use]
    pub fn get(&self, file_path: &str) -> Option<&FileSnapshot> {
        self.files.get(file_path)
    }

    #[must_use]
    pub fn current_fingerprint(&self, file_path: &str) -> Option<&str> {
        self.files
            .get(file_path)
            .map(|snap| snap.file_fingerprint.as_str())
    }

    pub fn set(&mut self, file_path: impl Into<String>, snapshot: FileSnapshot) {
        self.files.insert(file_path.into(), snapshot);
    }

    pub fn remove(&mut self, file_path: &str) -> Option<FileSnapshot> {
        self.files.remove(file_path)
    }

    /// All tracked paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.keys().cloned().collect();
        paths.sort();
        paths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Persist atomically (tmp file + rename).
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedFingerprints {
            schema_version: FINGERPRINT_SCHEMA_VERSION,
            files: self.files.clone(),
        };
        let bytes = serde_json::to_vec(&persisted)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
