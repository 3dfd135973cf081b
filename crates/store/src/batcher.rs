use crate::cache::EmbeddingCache;
use crate::embedder::{EmbeddingProvider, ProviderError};
use scout_chunker::{Chunk, ChunkId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Texts per provider call (provider limits)
    pub batch_size: usize,
    /// Retries on transient transport failure before giving up
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    pub initial_backoff: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Deduplicates and batches embedding requests by content fingerprint.
///
/// Chunks whose fingerprint already has a cached vector never reach the
/// provider; identical fragments across files cost one embedding call.
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    config: BatcherConfig,
}

impl EmbeddingBatcher {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        config: BatcherConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            config,
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Resolve vectors for every chunk, consulting the cache first and
    /// filling misses through the provider in bounded batches.
    ///
    /// Fails without partial cache pollution semantics to worry about: the
    /// cache only ever gains completed batches, and the caller aborts its
    /// apply on error.
    pub async fn resolve(
        &self,
        chunks: &[Chunk],
    ) -> Result<HashMap<ChunkId, Vec<f32>>, ProviderError> {
        let model_id = self.provider.model_id().to_string();

        let mut by_hash: HashMap<String, Vec<f32>> = HashMap::new();
        // Deterministic order: first appearance in the changeset.
        let mut missing_hashes: Vec<String> = Vec::new();
        let mut missing_texts: Vec<String> = Vec::new();

        for chunk in chunks {
            if by_hash.contains_key(&chunk.content_hash) {
                continue;
            }
            if let Some(vector) = self.cache.get(&chunk.content_hash, &model_id) {
                by_hash.insert(chunk.content_hash.clone(), vector);
            } else if !missing_hashes.contains(&chunk.content_hash) {
                missing_hashes.push(chunk.content_hash.clone());
                missing_texts.push(chunk.text.clone());
            }
        }

        if !missing_hashes.is_empty() {
            log::debug!(
                "Embedding {} unique texts ({} chunks, {} cache hits)",
                missing_hashes.len(),
                chunks.len(),
                by_hash.len()
            );
        }

        for (hash_batch, text_batch) in missing_hashes
            .chunks(self.config.batch_size.max(1))
            .zip(missing_texts.chunks(self.config.batch_size.max(1)))
        {
            let vectors = self.embed_with_retry(text_batch).await?;
            if vectors.len() != text_batch.len() {
                return Err(ProviderError::InvalidResponse(format!(
                    "expected {} vectors, got {}",
                    text_batch.len(),
                    vectors.len()
                )));
            }
            for (hash, vector) in hash_batch.iter().zip(vectors) {
                self.cache.insert(hash, &model_id, vector.clone());
                by_hash.insert(hash.clone(), vector);
            }
        }

        let mut resolved = HashMap::with_capacity(chunks.len());
        for chunk in chunks {
            if let Some(vector) = by_hash.get(&chunk.content_hash) {
                resolved.insert(chunk.chunk_id.clone(), vector.clone());
            }
        }
        Ok(resolved)
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;
        loop {
            match self.provider.embed(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Embedding batch failed (attempt {attempt}/{}): {err}; retrying in {backoff:?}",
                        self.config.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
