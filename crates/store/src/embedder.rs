use async_trait::async_trait;
use thiserror::Error;

pub const DEFAULT_DIMENSION: usize = 256;

/// Embedding computation failure.
///
/// `Transport` is the only retryable variant; auth rejections and malformed
/// responses abort the enclosing apply immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Capability boundary: compute embedding vectors for a batch of texts.
///
/// Concrete HTTP clients live outside this workspace; deployments plug
/// their own implementation in here.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identity the returned vectors belong to. Participates in
    /// cache keys, so it must change whenever the vector space does.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed a batch of texts. Must return exactly one vector per input,
    /// in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Deterministic offline provider projecting token hashes into a fixed
/// dimension. Good enough for exact-duplicate detection, local smoke use
/// and the test suite; not a substitute for a learned model.
pub struct HashingProvider {
    dimension: usize,
    model_id: String,
}

impl HashingProvider {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("hashing-{dimension}"),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let index = u64::from_le_bytes(bytes[..8].try_into().unwrap_or_default());
            #[allow(clippy::cast_possible_truncation)]
            let slot = (index % self.dimension as u64) as usize;
            // Sign from a second hash byte spreads tokens over both halves
            // of each axis instead of piling up positive mass.
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_provider_is_deterministic() {
        let provider = HashingProvider::new(64);
        let texts = vec!["fn main() {}".to_string()];
        let a = provider.embed(&texts).await.unwrap();
        let b = provider.embed(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn vectors_are_normalized() {
        let provider = HashingProvider::new(64);
        let out = provider
            .embed(&["let x = compute_total(y);".to_string()])
            .await
            .unwrap();
        let norm: f32 = out[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn transport_is_the_only_retryable_error() {
        assert!(ProviderError::Transport("timeout".into()).is_retryable());
        assert!(!ProviderError::Auth("bad key".into()).is_retryable());
        assert!(!ProviderError::InvalidResponse("short batch".into()).is_retryable());
    }
}
