//! The tool registry: composes the catalog, the embedding index, and the
//! dynamic cache into the single surface the planner and agent controller
//! use — `search`, `get`, `getOrLoad`, `list`, `rebuildIndex`,
//! `recordUsage`, `register`, `unregister`, `preloadSimilar`,
//! `smartPreload`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::clock::now_ms;
use crate::config::ResourceBounds;
use crate::error::Result;
use crate::providers::EmbeddingsProvider;
use crate::tools::traits::Tool;

use super::cache::DynamicCache;
use super::catalog::{Catalog, CatalogEntry};
use super::index::{cosine_similarity, hash_strings, load_index, save_index, EmbeddingIndex};

/// One catalog entry ranked against a search query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredTool {
    pub name: String,
    pub description: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
struct UsageStats {
    count: u32,
    last_used_ms: i64,
}

pub struct ToolRegistry {
    catalog: RwLock<Catalog>,
    cache: Arc<DynamicCache>,
    index: RwLock<EmbeddingIndex>,
    embeddings: Arc<dyn EmbeddingsProvider>,
    usage: Mutex<HashMap<String, UsageStats>>,
    search_cache: moka::future::Cache<String, Vec<ScoredTool>>,
    query_embed_cache: moka::future::Cache<String, Vec<f32>>,
    index_path: PathBuf,
    batch_size: usize,
}

impl ToolRegistry {
    pub async fn new(data_dir: &Path, embeddings: Arc<dyn EmbeddingsProvider>, bounds: &ResourceBounds) -> Self {
        let index_path = data_dir.join("tools").join("index.json");
        let index = load_index(&index_path).await.unwrap_or_default();

        let cache = Arc::new(DynamicCache::new(
            bounds.max_cache_size,
            bounds.max_cache_bytes,
            bounds.idle_timeout_secs as i64 * 1000,
        ));
        cache.spawn_sweeper(std::time::Duration::from_secs(bounds.cache_sweep_secs));

        ToolRegistry {
            catalog: RwLock::new(Catalog::new()),
            cache,
            index: RwLock::new(index),
            embeddings,
            usage: Mutex::new(HashMap::new()),
            search_cache: moka::future::Cache::builder()
                .time_to_live(std::time::Duration::from_secs(bounds.search_cache_ttl_secs))
                .max_capacity(1000)
                .build(),
            query_embed_cache: moka::future::Cache::builder()
                .max_capacity(bounds.max_embed_cache as u64)
                .build(),
            index_path,
            batch_size: bounds.index_batch_size.max(1),
        }
    }

    /// Register a tool: adds its catalog metadata and makes it immediately
    /// available in the dynamic cache. There is no separate "load" step for
    /// in-process tools — building them is cheap; `getOrLoad` exists for
    /// catalog entries with no in-process constructor.
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let entry = CatalogEntry {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            categories: tool.categories().iter().map(|s| s.to_string()).collect(),
            sensitive: tool.sensitive(),
            priority: tool.priority(),
            source_path: None,
        };
        self.catalog.write().await.insert(entry);
        self.cache.insert(tool.name().to_string(), tool).await;
        self.search_cache.invalidate_all();
    }

    pub async fn unregister(&self, name: &str) {
        self.catalog.write().await.remove(name);
        self.cache.remove(name).await;
        self.search_cache.invalidate_all();
    }

    /// Scan a manifest directory (`DATA_DIR/tools/*.json`) and merge any
    /// discovered entries into the catalog. These entries have no
    /// in-process constructor; `getOrLoad` on them resolves to `None`.
    pub async fn scan_manifest_dir(&self, dir: &Path) -> Result<usize> {
        self.catalog.write().await.scan_dir(dir)
    }

    /// Return an already-loaded tool, never triggering a load.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.cache.get(name).await
    }

    /// Resolve a tool, loading it if the catalog knows about it but the
    /// cache doesn't. Built-in tools are always already cached via
    /// `register`, so this only does real work for manifest-only entries —
    /// which, absent a dynamic plugin loader, resolve to `None`.
    pub async fn get_or_load(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if let Some(tool) = self.cache.get(name).await {
            return Some(tool);
        }
        if !self.catalog.read().await.contains(name) {
            return None;
        }
        self.cache
            .get_or_load(name, || async move {
                Err::<Arc<dyn Tool>, String>("no in-process loader registered for this tool".to_string())
            })
            .await
    }

    pub async fn list(&self, category: Option<&str>, loaded_only: bool) -> Vec<CatalogEntry> {
        let catalog = self.catalog.read().await;
        let mut entries: Vec<CatalogEntry> = match category {
            Some(c) => catalog.by_category(c).into_iter().cloned().collect(),
            None => catalog.list().into_iter().cloned().collect(),
        };
        drop(catalog);

        if loaded_only {
            let mut kept = Vec::with_capacity(entries.len());
            for entry in entries {
                if self.cache.contains(&entry.name).await {
                    kept.push(entry);
                }
            }
            entries = kept;
        }
        entries
    }

    pub async fn record_usage(&self, name: &str) {
        let mut usage = self.usage.lock().await;
        let stats = usage.entry(name.to_string()).or_default();
        stats.count += 1;
        stats.last_used_ms = now_ms();
    }

    fn usage_boost(stats: Option<&UsageStats>, now_ms: i64) -> f32 {
        let stats = match stats {
            Some(s) => s,
            None => return 0.0,
        };
        let frequency = (0.01 * stats.count as f32).min(0.10);
        let days_since_used = ((now_ms - stats.last_used_ms) as f32 / 86_400_000.0).max(0.0);
        let recency = 0.05 * (1.0 - days_since_used / 30.0).max(0.0);
        frequency + recency
    }

    /// Force a full index rebuild from the current catalog, regardless of
    /// whether the existing index is still valid.
    pub async fn rebuild_index(&self) -> Result<()> {
        let (names, descs) = {
            let catalog = self.catalog.read().await;
            (catalog.names(), catalog.descriptions())
        };
        let fresh = EmbeddingIndex::build(self.embeddings.as_ref(), &names, &descs, self.batch_size).await?;
        *self.index.write().await = fresh;
        save_index(&*self.index.read().await, &self.index_path).await?;
        self.search_cache.invalidate_all();
        Ok(())
    }

    /// Bring the index in line with the current catalog: a full rebuild if
    /// the model identity, content hashes, or dimension no longer match; an
    /// incremental per-tool append if the catalog has only grown since the
    /// index was last built (the common case when `register` adds a tool
    /// mid-run).
    async fn ensure_index_fresh(&self) {
        let (names, descs) = {
            let catalog = self.catalog.read().await;
            (catalog.names(), catalog.descriptions())
        };
        let names_hash = hash_strings(&names);
        let descs_hash = hash_strings(&descs);
        let dim = self.embeddings.dimensions();
        let embed_key = self.embeddings.model_id().to_string();

        let is_valid = {
            let idx = self.index.read().await;
            idx.is_valid(&embed_key, &names_hash, &descs_hash, dim)
        };
        if is_valid {
            return;
        }

        let can_append_only = {
            let idx = self.index.read().await;
            idx.embed_key == embed_key && idx.dim == dim && {
                let current: HashSet<&String> = names.iter().collect();
                idx.names.iter().all(|n| current.contains(n))
            }
        };

        if can_append_only && !{ self.index.read().await.names.is_empty() } {
            let existing: HashSet<String> = self.index.read().await.names.iter().cloned().collect();
            for (name, desc) in names.iter().zip(descs.iter()) {
                if existing.contains(name) {
                    continue;
                }
                match self.embeddings.embed(&[desc.clone()]).await {
                    Ok(mut vecs) => {
                        if let Some(v) = vecs.pop() {
                            self.index.write().await.append(name.clone(), v);
                        }
                    }
                    Err(e) => warn!(tool = %name, error = %e, "failed to embed tool for incremental index update"),
                }
            }
        } else {
            match EmbeddingIndex::build(self.embeddings.as_ref(), &names, &descs, self.batch_size).await {
                Ok(fresh) => {
                    *self.index.write().await = fresh;
                    if let Err(e) = save_index(&*self.index.read().await, &self.index_path).await {
                        warn!(error = %e, "failed to persist rebuilt embedding index");
                    }
                }
                Err(e) => warn!(error = %e, "failed to rebuild embedding index"),
            }
        }
    }

    /// Semantic search over the catalog: `score = cosine_similarity +
    /// usageBoost`. Results are cached by `query|topk` for
    /// `search_cache_ttl_secs`.
    pub async fn search(&self, query: &str, topk: usize) -> Vec<ScoredTool> {
        let cache_key = format!("{query}|{topk}");
        if let Some(hit) = self.search_cache.get(&cache_key).await {
            return hit;
        }

        self.ensure_index_fresh().await;

        let query_vec = match self.query_embed_cache.get(query).await {
            Some(v) => v,
            None => {
                let v = match self.embeddings.embed(&[query.to_string()]).await {
                    Ok(mut vecs) => vecs.pop().unwrap_or_default(),
                    Err(e) => {
                        warn!(error = %e, "failed to embed search query");
                        Vec::new()
                    }
                };
                self.query_embed_cache.insert(query.to_string(), v.clone()).await;
                v
            }
        };

        let now = now_ms();
        let catalog = self.catalog.read().await;
        let index = self.index.read().await;
        let usage = self.usage.lock().await;

        let mut scored: Vec<ScoredTool> = catalog
            .list()
            .into_iter()
            .filter_map(|entry| {
                let pos = index.position(&entry.name)?;
                let sim = cosine_similarity(&query_vec, &index.vecs[pos]);
                let boost = Self::usage_boost(usage.get(&entry.name), now);
                Some(ScoredTool {
                    name: entry.name.clone(),
                    description: entry.description.clone(),
                    score: sim + boost,
                })
            })
            .collect();
        drop(usage);
        drop(index);
        drop(catalog);

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(topk);

        // Materialize every returned candidate that isn't cached yet, per
        // §4.1: "search ... must also perform an on-demand load for any
        // returned candidates not currently cached before returning them."
        for candidate in &scored {
            let _ = self.get_or_load(&candidate.name).await;
        }

        self.search_cache.insert(cache_key, scored.clone()).await;
        scored
    }

    /// `search`, then resolve each surviving candidate to its loaded `Tool`
    /// object (dropping any whose load failed). This is the `[Tool]`-typed
    /// surface the Planner consumes.
    pub async fn search_tools(&self, query: &str, topk: usize) -> Vec<Arc<dyn Tool>> {
        let mut tools = Vec::new();
        for candidate in self.search(query, topk).await {
            if let Some(tool) = self.get(&candidate.name).await {
                tools.push(tool);
            }
        }
        tools
    }

    /// Warm the cache with tools whose descriptions resemble `name`'s own.
    pub async fn preload_similar(&self, name: &str, k: usize) {
        let description = match self.catalog.read().await.get(name) {
            Some(entry) => entry.description.clone(),
            None => return,
        };
        for candidate in self.search(&description, k + 1).await.into_iter().filter(|c| c.name != name).take(k) {
            let _ = self.get_or_load(&candidate.name).await;
        }
    }

    /// Warm the cache with the top `k` tools for an upcoming task, ahead of
    /// planning.
    pub async fn smart_preload(&self, task_description: &str, k: usize) {
        for candidate in self.search(task_description, k).await {
            let _ = self.get_or_load(&candidate.name).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.catalog.read().await.len()
    }
}
