use crate::coordinator::{CommitResult, Coordinator};
use crate::diff::diff;
use crate::error::{IndexerError, Result};
use crate::fingerprints::file_fingerprint;
use crate::scanner::FileScanner;
use crate::stats::IndexStats;
use scout_chunker::{ChunkExtractor, ExtractorConfig};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Bulk project indexer: scans, extracts, diffs and applies through the
/// shared [`Coordinator`]. The live watcher drives the same per-path entry
/// points, so both writers obey one serialization regime.
pub struct ProjectIndexer {
    root: PathBuf,
    extractor: ChunkExtractor,
    coordinator: Arc<Coordinator>,
    max_file_bytes: u64,
}

impl ProjectIndexer {
    pub fn new(root: impl AsRef<Path>, coordinator: Arc<Coordinator>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            return Err(IndexerError::InvalidPath(format!(
                "Path does not exist: {}",
                root.display()
            )));
        }
        let config = ExtractorConfig::default();
        let max_file_bytes = config.max_parse_bytes as u64;
        Ok(Self {
            root,
            extractor: ChunkExtractor::new(config),
            coordinator,
            max_file_bytes,
        })
    }

    /// Cap the size of files picked up by the scanner and accepted by the
    /// extractor. Larger files are skipped rather than indexed partially.
    #[must_use]
    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self.extractor = ChunkExtractor::new(ExtractorConfig {
            max_parse_bytes: usize::try_from(max).unwrap_or(usize::MAX),
            ..ExtractorConfig::default()
        });
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Index the whole project incrementally: unchanged files are no-ops,
    /// deleted files get full-removal changesets, per-file failures never
    /// abort the pass.
    pub async fn index(&self) -> Result<IndexStats> {
        const MAX_CONCURRENT: usize = 16;

        let start = Instant::now();
        let mut stats = IndexStats::new();

        log::info!("Indexing project at {}", self.root.display());

        let files = FileScanner::new(&self.root)
            .with_max_file_bytes(self.max_file_bytes)
            .scan();
        let live: HashSet<String> = files.iter().map(|p| self.normalize_path(p)).collect();

        // Purge paths that disappeared since the last committed pass.
        for tracked in self.coordinator.tracked_paths().await {
            if !live.contains(&tracked) {
                match self.remove_path(&tracked).await {
                    Ok(result) => stats.record_removal(&result),
                    Err(err) => {
                        log::warn!("Failed to remove {tracked}: {err}");
                        stats.add_error(format!("{tracked}: {err}"));
                    }
                }
            }
        }

        // Reads run in bounded parallel batches; applies run per file so a
        // failure stays scoped to its path.
        for batch in files.chunks(MAX_CONCURRENT) {
            let mut tasks = Vec::with_capacity(batch.len());
            for file_path in batch {
                let file_path = file_path.clone();
                tasks.push(tokio::spawn(async move {
                    let content = tokio::fs::read_to_string(&file_path)
                        .await
                        .map_err(|e| format!("{}: {e}", file_path.display()))?;
                    Ok::<_, String>((file_path, content))
                }));
            }

            for task in tasks {
                match task.await {
                    Ok(Ok((file_path, content))) => {
                        let rel = self.normalize_path(&file_path);
                        match self.sync_content(&rel, &content).await {
                            Ok(result) => stats.record_commit(&result),
                            Err(err) => {
                                log::warn!("Failed to index {rel}: {err}");
                                stats.add_error(format!("{rel}: {err}"));
                            }
                        }
                    }
                    Ok(Err(err)) => stats.add_error(err),
                    Err(err) => stats.add_error(format!("Task panicked: {err}")),
                }
            }
        }

        self.coordinator.persist_caches().await?;

        #[allow(clippy::cast_possible_truncation)]
        {
            stats.time_ms = (start.elapsed().as_millis() as u64).max(1);
        }
        log::info!(
            "Indexing completed: {} files, +{} ~{} -{} chunks, {} errors in {}ms",
            stats.files,
            stats.chunks_added,
            stats.chunks_updated,
            stats.chunks_removed,
            stats.errors.len(),
            stats.time_ms
        );
        Ok(stats)
    }

    /// Reindex one path relative to the project root. A path missing on
    /// disk becomes a full-removal changeset, which is how watcher delete
    /// events flow through.
    pub async fn sync_path(&self, rel: &str) -> Result<CommitResult> {
        let abs = self.root.join(rel);
        match tokio::fs::metadata(&abs).await {
            Err(err) if err.kind() == ErrorKind::NotFound => return self.remove_path(rel).await,
            Err(err) => return Err(err.into()),
            Ok(meta) if meta.is_dir() => {
                return Ok(noop_result(rel));
            }
            Ok(_) => {}
        }

        match tokio::fs::read_to_string(&abs).await {
            Ok(content) => self.sync_content(rel, &content).await,
            // Deleted between the metadata call and the read.
            Err(err) if err.kind() == ErrorKind::NotFound => self.remove_path(rel).await,
            Err(err) => Err(err.into()),
        }
    }

    /// Extract-diff-apply for known content, with one automatic retry when
    /// a concurrent writer superseded our base snapshot.
    pub async fn sync_content(&self, rel: &str, content: &str) -> Result<CommitResult> {
        let fingerprint = file_fingerprint(content);

        // Duplicate or out-of-order events degrade to a no-op here without
        // paying for extraction.
        if let Some(snapshot) = self.coordinator.snapshot_for(rel).await {
            if snapshot.file_fingerprint == fingerprint {
                log::debug!("Fingerprint unchanged for {rel}; skipping");
                return Ok(noop_result(rel));
            }
        }

        match self.apply_fresh(rel, content, &fingerprint).await {
            Err(err) if err.is_stale() => {
                log::debug!("Changeset for {rel} went stale; rediffing");
                self.apply_fresh(rel, content, &fingerprint).await
            }
            other => other,
        }
    }

    /// Commit a full-removal changeset for a path (deleted file).
    pub async fn remove_path(&self, rel: &str) -> Result<CommitResult> {
        match self.apply_removal(rel).await {
            Err(err) if err.is_stale() => {
                log::debug!("Removal of {rel} went stale; rediffing");
                self.apply_removal(rel).await
            }
            other => other,
        }
    }

    async fn apply_fresh(
        &self,
        rel: &str,
        content: &str,
        fingerprint: &str,
    ) -> Result<CommitResult> {
        let snapshot = self.coordinator.snapshot_for(rel).await;
        let chunks = self.extractor.extract(rel, content);
        let changeset = diff(rel, snapshot.as_ref(), chunks, Some(fingerprint.to_string()));
        self.coordinator.apply(changeset).await
    }

    async fn apply_removal(&self, rel: &str) -> Result<CommitResult> {
        let snapshot = self.coordinator.snapshot_for(rel).await;
        let changeset = diff(rel, snapshot.as_ref(), vec![], None);
        self.coordinator.apply(changeset).await
    }

    fn normalize_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut normalized = relative.to_string_lossy().to_string();
        if normalized.contains('\\') {
            normalized = normalized.replace('\\', "/");
        }
        normalized
    }
}

fn noop_result(rel: &str) -> CommitResult {
    CommitResult {
        file_path: rel.to_string(),
        added: 0,
        updated: 0,
        removed: 0,
        embedded: 0,
        no_op: true,
        file_removed: false,
    }
}
