//! Dynamic Tool Cache: an LRU + idle-timeout cache of loaded tool objects,
//! bounded by count and estimated byte size, with deduplicated concurrent
//! loads via an in-flight future map.
//!
//! Unlike the embedding and search-result caches (plain moka TTL caches, see
//! `registry.rs`), this cache needs a custom per-entry eviction score that
//! moka's stock eviction policies cannot express, so it is hand-rolled on
//! top of a mutex-guarded map — the same "small `name -> future` map behind
//! a mutex" shape the specification calls for in its concurrency notes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::{FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::now_ms;
use crate::tools::traits::Tool;

type LoadResult = Result<Arc<dyn Tool>, String>;
type SharedLoad = Shared<Pin<Box<dyn Future<Output = LoadResult> + Send>>>;

struct CacheEntry {
    tool: Arc<dyn Tool>,
    load_time: i64,
    last_access: i64,
    access_count: u64,
    estimated_bytes: u64,
    is_core: bool,
}

/// LRU-biased eviction score: `lastAccess - accessCount * 60000`. Lower
/// scores are evicted first, so frequently-used entries (high
/// `access_count`) are pushed toward a very negative score and survive.
fn eviction_score(entry: &CacheEntry) -> i64 {
    entry.last_access - (entry.access_count as i64) * 60_000
}

fn estimate_bytes(tool: &Arc<dyn Tool>) -> u64 {
    256 + tool.description().len() as u64 + tool.name().len() as u64
}

pub struct DynamicCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, SharedLoad>>,
    max_size: usize,
    max_bytes: u64,
    idle_timeout_ms: i64,
}

impl DynamicCache {
    pub fn new(max_size: usize, max_bytes: u64, idle_timeout_ms: i64) -> Self {
        DynamicCache {
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            max_size,
            max_bytes,
            idle_timeout_ms,
        }
    }

    /// Synchronous lookup of an already-loaded tool. Never triggers loading.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(name) {
            entry.last_access = now_ms();
            entry.access_count += 1;
            return Some(entry.tool.clone());
        }
        None
    }

    /// Currently loaded tools.
    pub async fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.entries.lock().await.values().map(|e| e.tool.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Insert a tool directly into the cache (used for built-in tools and
    /// explicit `register()` calls, bypassing the load-dedup path).
    pub async fn insert(&self, name: String, tool: Arc<dyn Tool>) {
        let size = estimate_bytes(&tool);
        let mut entries = self.entries.lock().await;
        self.evict_to_fit_locked(&mut entries, size);
        let now = now_ms();
        let is_core = tool.categories().contains(&"core");
        entries.insert(
            name,
            CacheEntry {
                tool,
                load_time: now,
                last_access: now,
                access_count: 0,
                estimated_bytes: size,
                is_core,
            },
        );
    }

    pub async fn remove(&self, name: &str) {
        self.entries.lock().await.remove(name);
    }

    /// Presence check that does not bump LRU/usage stats, for read-only
    /// listings.
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.lock().await.contains_key(name)
    }

    /// Dynamic cache policy (§4.1): cached -> bump stats and return;
    /// in-flight -> await it; else start a load, dedup concurrent callers on
    /// the same name, insert with eviction on completion.
    pub async fn get_or_load<F, Fut>(&self, name: &str, loader: F) -> Option<Arc<dyn Tool>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn Tool>, String>> + Send + 'static,
    {
        if let Some(tool) = self.get(name).await {
            return Some(tool);
        }

        let shared = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(name) {
                existing.clone()
            } else {
                let fut: Pin<Box<dyn Future<Output = LoadResult> + Send>> = Box::pin(loader());
                let shared = fut.shared();
                in_flight.insert(name.to_string(), shared.clone());
                shared
            }
        };

        let result = shared.await;
        self.in_flight.lock().await.remove(name);

        match result {
            Ok(tool) => {
                self.insert_loaded(name.to_string(), tool.clone()).await;
                Some(tool)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool load failed");
                None
            }
        }
    }

    async fn insert_loaded(&self, name: String, tool: Arc<dyn Tool>) {
        let size = estimate_bytes(&tool);
        let mut entries = self.entries.lock().await;
        self.evict_to_fit_locked(&mut entries, size);
        let now = now_ms();
        let is_core = tool.categories().contains(&"core");
        entries.insert(
            name,
            CacheEntry {
                tool,
                load_time: now,
                last_access: now,
                access_count: 1,
                estimated_bytes: size,
                is_core,
            },
        );
    }

    fn evict_to_fit_locked(&self, entries: &mut HashMap<String, CacheEntry>, incoming: u64) {
        loop {
            let total_bytes: u64 = entries.values().map(|e| e.estimated_bytes).sum();
            if entries.len() < self.max_size && total_bytes + incoming <= self.max_bytes {
                break;
            }
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| eviction_score(e))
                .map(|(name, _)| name.clone());
            match victim {
                Some(name) => {
                    debug!(tool = %name, "evicting tool from dynamic cache");
                    entries.remove(&name);
                }
                None => break,
            }
        }
    }

    /// Total bytes and count invariant check, exposed for tests.
    pub async fn invariants_hold(&self) -> bool {
        let entries = self.entries.lock().await;
        let total: u64 = entries.values().map(|e| e.estimated_bytes).sum();
        entries.len() <= self.max_size && total <= self.max_bytes
    }

    /// Evict entries idle longer than `idle_timeout_ms`, except tools in
    /// category `core`. Intended to be called from a periodic sweep task.
    pub async fn sweep_idle(&self) {
        let now = now_ms();
        let mut entries = self.entries.lock().await;
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, e)| !e.is_core && now - e.last_access > self.idle_timeout_ms)
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            debug!(tool = %name, "idle sweep evicting tool");
            entries.remove(&name);
        }
    }

    /// Spawn the periodic idle-sweep background task.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: std::time::Duration) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cache.sweep_idle().await;
            }
        });
    }

    #[cfg(test)]
    pub async fn entry_load_time(&self, name: &str) -> Option<i64> {
        self.entries.lock().await.get(name).map(|e| e.load_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::CalculatorTool;

    fn calc() -> Arc<dyn Tool> {
        Arc::new(CalculatorTool::default())
    }

    #[tokio::test]
    async fn get_or_load_deduplicates_concurrent_loads() {
        let cache = Arc::new(DynamicCache::new(100, 50 * 1024 * 1024, 10 * 60 * 1000));
        let call_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let call_count = call_count.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("calculator", move || {
                        call_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        async move {
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok::<Arc<dyn Tool>, String>(Arc::new(CalculatorTool::default()))
                        }
                    })
                    .await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_some());
        }
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn eviction_respects_count_bound() {
        let cache = DynamicCache::new(2, 50 * 1024 * 1024, 10 * 60 * 1000);
        cache.insert("a".to_string(), calc()).await;
        cache.insert("b".to_string(), calc()).await;
        cache.insert("c".to_string(), calc()).await;
        assert!(cache.len().await <= 2);
        assert!(cache.invariants_hold().await);
    }

    #[tokio::test]
    async fn idle_sweep_skips_core_category() {
        use crate::tools::builtin::WebSearchTool; // categories include "core"

        let cache = DynamicCache::new(100, 50 * 1024 * 1024, 0);
        cache.insert("web_search".to_string(), Arc::new(WebSearchTool::new())).await;
        cache.insert("calculator".to_string(), calc()).await;

        cache.sweep_idle().await;

        assert!(cache.get("web_search").await.is_some());
    }
}
