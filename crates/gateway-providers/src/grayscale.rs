use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gateway_core::{CapabilityKind, GatewayError, GatewayResult, ProviderConfig};
use log::{debug, warn};
use rand::Rng;
use tokio::sync::{Mutex, RwLock};

type GrayscaleKey = (CapabilityKind, String);

/// Selection strategy for a `(category, name)` grayscale entry. Default is
/// `Weight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Weight,
    Health,
    RoundRobin,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Weight
    }
}

/// Mirrors a provider config row plus the cached health score/active flag
/// the router reads without hitting storage on every `pick`.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub config: ProviderConfig,
}

impl VersionInfo {
    pub fn is_active(&self) -> bool {
        self.config.is_active
    }

    pub fn health_score(&self) -> u8 {
        self.config.health_score
    }

    pub fn weight(&self) -> u8 {
        self.config.weight
    }
}

/// Cached snapshot for one `(category, name)`. Immutable once built — a
/// refresh builds a brand new entry and swaps the `Arc` in the outer cache
/// rather than mutating this one in place, per spec §9's copy-on-write
/// design note. `rr_cursor` is the one exception: it is genuinely per-entry
/// mutable state that must survive the entry's own lifetime between
/// `pick`s, so it is an atomic rather than living behind the cache's lock.
#[derive(Debug)]
pub struct GrayscaleEntry {
    pub strategy: Strategy,
    pub versions: Vec<VersionInfo>,
    rr_cursor: AtomicUsize,
}

impl Clone for GrayscaleEntry {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy,
            versions: self.versions.clone(),
            rr_cursor: AtomicUsize::new(self.rr_cursor.load(Ordering::SeqCst)),
        }
    }
}

impl GrayscaleEntry {
    fn new(strategy: Strategy, versions: Vec<VersionInfo>) -> Self {
        Self {
            strategy,
            versions,
            rr_cursor: AtomicUsize::new(0),
        }
    }

    fn active_versions(&self) -> Vec<&VersionInfo> {
        self.versions.iter().filter(|v| v.is_active()).collect()
    }
}

/// The Grayscale Router (C3): picks one active version per
/// `(category, name)` request according to a declarative strategy, with hot
/// weight updates and cache refresh without restart (spec §4.2).
pub struct GrayscaleRouter {
    store: Arc<gateway_storage::ConfigStore>,
    cache: RwLock<HashMap<GrayscaleKey, Arc<GrayscaleEntry>>>,
    /// Coalesces concurrent first-time loaders behind one in-flight call
    /// per key, per spec §5 ("the grayscale loader coalesces concurrent
    /// loaders behind one in-flight call").
    load_locks: RwLock<HashMap<GrayscaleKey, Arc<Mutex<()>>>>,
}

impl GrayscaleRouter {
    pub fn new(store: Arc<gateway_storage::ConfigStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            load_locks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn pick(&self, category: CapabilityKind, name: &str) -> GatewayResult<ProviderConfig> {
        let started = std::time::Instant::now();
        let key = (category, name.to_string());
        let entry = self.get_or_load(&key).await?;
        let picked = self.select(&entry, category, name);
        metrics::histogram!("gateway_grayscale_pick_seconds", "name" => name.to_string())
            .record(started.elapsed().as_secs_f64());
        picked
    }

    pub async fn refresh(&self, category: CapabilityKind, name: &str) -> GatewayResult<()> {
        let key = (category, name.to_string());
        self.load(&key).await?;
        Ok(())
    }

    pub async fn set_weight(
        &self,
        category: CapabilityKind,
        name: &str,
        version: &str,
        new_weight: u8,
    ) -> GatewayResult<()> {
        self.store
            .set_weight(category, name.to_string(), version.to_string(), new_weight)
            .await?;
        self.refresh(category, name).await
    }

    pub async fn set_default(
        &self,
        category: CapabilityKind,
        name: &str,
        version: &str,
    ) -> GatewayResult<()> {
        self.store
            .set_default(category, name.to_string(), version.to_string())
            .await?;
        self.refresh(category, name).await
    }

    pub async fn status(&self, category: CapabilityKind, name: &str) -> GatewayResult<Arc<GrayscaleEntry>> {
        let key = (category, name.to_string());
        self.get_or_load(&key).await
    }

    /// Returns the `(category, name)` pairs currently cached, consulted by
    /// the health-update loop so it only recomputes scores for entries
    /// actually in use.
    pub async fn cached_keys(&self) -> Vec<(CapabilityKind, String)> {
        self.cache.read().await.keys().cloned().collect()
    }

    async fn get_or_load(&self, key: &GrayscaleKey) -> GatewayResult<Arc<GrayscaleEntry>> {
        if let Some(entry) = self.cache.read().await.get(key) {
            return Ok(entry.clone());
        }
        self.load(key).await
    }

    /// Loads (or reloads) a single key's snapshot. Idempotent: concurrent
    /// callers for the same key share one in-flight load via the per-key
    /// mutex, then all observe the freshly swapped entry.
    async fn load(&self, key: &GrayscaleKey) -> GatewayResult<Arc<GrayscaleEntry>> {
        let lock = {
            let mut locks = self.load_locks.write().await;
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited for the lock;
        // re-check isn't required for correctness (we always rebuild from
        // storage here), but callers that only wanted a cached read use
        // `get_or_load`'s fast path above and never reach this branch.
        debug!("loading grayscale entry for {:?}/{}", key.0, key.1);
        // Strategy is operator-chosen runtime behavior (set via
        // `set_strategy`), not a persisted provider-config field, so a
        // refresh preserves whatever strategy was already cached instead of
        // resetting to the default.
        let previous_strategy = self
            .cache
            .read()
            .await
            .get(key)
            .map(|e| e.strategy)
            .unwrap_or_default();
        let versions = self
            .store
            .list_versions(key.0, key.1.clone())
            .await?
            .into_iter()
            .map(|config| VersionInfo { config })
            .collect();
        let new_entry = Arc::new(GrayscaleEntry::new(previous_strategy, versions));

        let mut cache = self.cache.write().await;
        cache.insert(key.clone(), new_entry.clone());
        Ok(new_entry)
    }

    fn select(
        &self,
        entry: &GrayscaleEntry,
        category: CapabilityKind,
        name: &str,
    ) -> GatewayResult<ProviderConfig> {
        let no_live_version = || GatewayError::NoLiveVersion {
            category: category.to_string(),
            name: name.to_string(),
        };

        match entry.strategy {
            Strategy::Weight => {
                let active = entry.active_versions();
                let total: u32 = active.iter().map(|v| v.weight() as u32).sum();
                if total == 0 || active.is_empty() {
                    return Err(no_live_version());
                }
                let draw = rand::thread_rng().gen_range(0..total);
                let mut running = 0u32;
                for v in active {
                    running += v.weight() as u32;
                    if running > draw {
                        return Ok(v.config.clone());
                    }
                }
                // Unreachable given total > 0, but keep the contract total.
                Err(no_live_version())
            }
            Strategy::Health => {
                let active = entry.active_versions();
                active
                    .into_iter()
                    .max_by_key(|v| v.health_score())
                    .map(|v| v.config.clone())
                    .ok_or_else(no_live_version)
            }
            Strategy::RoundRobin => {
                let active = entry.active_versions();
                if active.is_empty() {
                    return Err(no_live_version());
                }
                let idx = entry.rr_cursor.fetch_add(1, Ordering::SeqCst) % active.len();
                Ok(active[idx].config.clone())
            }
        }
    }
}

/// Sets the selection strategy for a cached entry directly, bypassing
/// storage. Exposed separately from `GrayscaleRouter`'s storage-backed
/// operations because strategy is operator-chosen runtime behavior, not a
/// persisted provider-config field (spec §4.2 shows `strategy` living on
/// the in-memory `GrayscaleEntry`, not the DB row).
impl GrayscaleRouter {
    pub async fn set_strategy(&self, category: CapabilityKind, name: &str, strategy: Strategy) {
        let key = (category, name.to_string());
        let mut cache = self.cache.write().await;
        let new_entry = match cache.get(&key) {
            Some(existing) => {
                let mut cloned = (**existing).clone();
                cloned.strategy = strategy;
                Arc::new(cloned)
            }
            None => Arc::new(GrayscaleEntry::new(strategy, Vec::new())),
        };
        cache.insert(key, new_entry);
    }
}
