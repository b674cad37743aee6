//! Embedding Index: a persisted `name -> vector` table used for semantic
//! tool search, keyed against the embedding model identity and content
//! hashes so a model swap or catalog edit forces a rebuild rather than
//! silently serving stale vectors.

use sha1::{Digest, Sha1};

use crate::error::Result;
use crate::providers::EmbeddingsProvider;

/// SHA-1 over the JSON array form of `items`, used for `names_hash` and
/// `descs_hash`. Order-sensitive by design: reordering the catalog should
/// also invalidate the index, since vector positions are tied to `names`.
pub fn hash_strings(items: &[String]) -> String {
    let encoded = serde_json::to_string(items).unwrap_or_default();
    let mut hasher = Sha1::new();
    hasher.update(encoded.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingIndex {
    pub embed_key: String,
    pub names_hash: String,
    pub descs_hash: String,
    pub dim: usize,
    pub names: Vec<String>,
    pub vecs: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    /// The index is valid only when every one of the model id, the hash of
    /// the current catalog names, the hash of their descriptions, and the
    /// vector dimension agree with what it was built from.
    pub fn is_valid(&self, embed_key: &str, names_hash: &str, descs_hash: &str, dim: usize) -> bool {
        self.embed_key == embed_key
            && self.names_hash == names_hash
            && self.descs_hash == descs_hash
            && self.dim == dim
            && self.names.len() == self.vecs.len()
    }

    /// Build a fresh index over `names`/`descs` (parallel arrays), batching
    /// embedding calls `batch_size` at a time.
    pub async fn build(
        provider: &dyn EmbeddingsProvider,
        names: &[String],
        descs: &[String],
        batch_size: usize,
    ) -> Result<Self> {
        let names_hash = hash_strings(names);
        let descs_hash = hash_strings(descs);
        let mut vecs = Vec::with_capacity(descs.len());

        let step = batch_size.max(1);
        for chunk in descs.chunks(step) {
            let batch: Vec<String> = chunk.to_vec();
            let embedded = provider.embed(&batch).await?;
            vecs.extend(embedded);
        }

        Ok(EmbeddingIndex {
            embed_key: provider.model_id().to_string(),
            names_hash,
            descs_hash,
            dim: provider.dimensions(),
            names: names.to_vec(),
            vecs,
        })
    }

    /// Append a single new name/vector pair without touching existing
    /// entries or recomputing the content hashes. Used when `getOrLoad`
    /// surfaces a tool during `search` that predates the last full rebuild;
    /// the next full rebuild (triggered by a hash/model mismatch) reconciles
    /// the hashes against the grown catalog.
    pub fn append(&mut self, name: String, vector: Vec<f32>) {
        self.names.push(name);
        self.vecs.push(vector);
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Rank all entries by cosine similarity to `query_vec`, descending.
    pub fn rank(&self, query_vec: &[f32]) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = self
            .names
            .iter()
            .zip(self.vecs.iter())
            .map(|(name, vec)| (name.clone(), cosine_similarity(query_vec, vec)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Load a persisted index from `path`, if present and parseable. A missing
/// or corrupt file is not an error — the caller rebuilds from scratch.
pub async fn load_index(path: &std::path::Path) -> Option<EmbeddingIndex> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Persist `index` to `path` via a write-then-rename, matching the run
/// store's atomic-write convention.
pub async fn save_index(index: &EmbeddingIndex, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(index)?;
    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
