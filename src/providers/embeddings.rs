//! Embeddings provider: maps a batch of strings to fixed-dimension unit
//! vectors.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::error::{Error, Result};

#[async_trait]
pub trait EmbeddingsProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output vector dimension. Part of the embedding index's validity key
    /// alongside `model_id`, `names_hash`, and `descs_hash`.
    fn dimensions(&self) -> usize;

    /// Identifier used as the index's `embedModelId`.
    fn model_id(&self) -> &str;
}

/// Local ONNX embedding model via `fastembed`, run off the async runtime
/// via `spawn_blocking`.
pub struct FastEmbedProvider {
    model: std::sync::Arc<std::sync::Mutex<TextEmbedding>>,
    model_id: String,
    dim: usize,
}

impl FastEmbedProvider {
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::MultilingualE5Small).with_show_download_progress(false),
        )
        .map_err(|e| Error::Provider(format!("failed to initialize embedding model: {}", e)))?;

        info!("loaded fastembed model multilingual-e5-small (dim=384)");

        Ok(FastEmbedProvider {
            model: std::sync::Arc::new(std::sync::Mutex::new(model)),
            model_id: "multilingual-e5-small".to_string(),
            dim: 384,
        })
    }
}

#[async_trait]
impl EmbeddingsProvider for FastEmbedProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let owned: Vec<String> = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| Error::Provider("embedding model mutex poisoned".to_string()))?;
            guard
                .embed(owned, None)
                .map_err(|e| Error::Provider(format!("embedding failed: {}", e)))
        })
        .await
        .map_err(|e| Error::Internal(format!("embedding task panicked: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Deterministic hash-based embedding stub: no model download, usable
/// offline and in tests. Not semantically meaningful beyond lexical overlap,
/// but stable and unit-normalized like a real embedding.
pub struct HashEmbeddingProvider {
    dim: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        HashEmbeddingProvider { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.to_lowercase().split_whitespace() {
            let mut h: u64 = 1469598103934665603; // FNV offset basis
            for b in token.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(1099511628211); // FNV prime
            }
            let idx = (h as usize) % self.dim;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingsProvider for HashEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        "hash-stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_provider_is_deterministic_and_unit_norm() {
        let provider = HashEmbeddingProvider::new(32);
        let a = provider.embed(&["hello world".to_string()]).await.unwrap();
        let b = provider.embed(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);

        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[tokio::test]
    async fn hash_provider_distinguishes_different_text() {
        let provider = HashEmbeddingProvider::new(32);
        let out = provider
            .embed(&["alpha beta".to_string(), "gamma delta".to_string()])
            .await
            .unwrap();
        assert_ne!(out[0], out[1]);
    }
}
