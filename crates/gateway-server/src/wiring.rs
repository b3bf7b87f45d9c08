use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use gateway_adapters::{AdapterFactory, EchoAdapter, ProviderAdapter};
use gateway_core::{CapabilityKind, Deadline, GatewayRuntimeConfig, ProviderKey};
use gateway_providers::{AdapterPoolFactory, CapabilityResolver, GrayscaleRouter, HealthChecker, Pool, ProbeMode, ProbeTarget};
use gateway_storage::{ConfigStore, Database};
use log::info;
use serde_json::json;
use tokio::sync::RwLock;

use gateway_memory::DefaultMemoryFacade;

/// Constructs `EchoAdapter` instances. No vendor HTTP/WebSocket adapters
/// live in this workspace (spec §1 non-goal); wiring pools against the
/// in-repo reference adapter is the only adapter type the process actually
/// has to offer at startup.
struct EchoAdapterFactory;

#[async_trait]
impl AdapterFactory for EchoAdapterFactory {
    async fn create(&self) -> Result<Box<dyn ProviderAdapter>> {
        let mut adapter = EchoAdapter::default();
        adapter.initialize().await?;
        Ok(Box::new(adapter))
    }
}

type AdapterPool = Pool<Box<dyn ProviderAdapter>>;

/// Lazily creates and caches one bounded pool per `ProviderKey`, all built
/// against `EchoAdapterFactory` since real vendor adapters are out of
/// scope. Mirrors the teacher's per-engine `ConnectionPool` registry,
/// generalized to a process-wide map keyed by capability/name/version
/// instead of one pool per CLI invocation.
pub struct PoolRegistry {
    pools: RwLock<HashMap<ProviderKey, Arc<AdapterPool>>>,
    capacity: usize,
    idle_timeout: Duration,
}

impl PoolRegistry {
    pub fn new(capacity: usize, idle_timeout: Duration) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            capacity,
            idle_timeout,
        }
    }

    pub async fn pool_for(&self, key: &ProviderKey) -> Arc<AdapterPool> {
        if let Some(pool) = self.pools.read().await.get(key) {
            return pool.clone();
        }
        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.get(key) {
            return pool.clone();
        }
        let factory = Arc::new(AdapterPoolFactory::new(Arc::new(EchoAdapterFactory)));
        let pool = Arc::new(Pool::new(key.to_string(), self.capacity, self.idle_timeout, factory));
        pool.spawn_idle_sweeper();
        pools.insert(key.clone(), pool.clone());
        pool
    }
}

/// Health probe that acquires a lease from a pool, invokes a synthetic
/// request (functional mode) or just releases immediately (basic mode),
/// and reports success/failure back to the `HealthChecker`.
struct PoolProbeTarget {
    pool: Arc<AdapterPool>,
}

#[async_trait]
impl ProbeTarget for PoolProbeTarget {
    async fn probe(&self, mode: ProbeMode) -> bool {
        let lease = match self.pool.acquire(Deadline::after(Duration::from_secs(2))).await {
            Ok(lease) => lease,
            Err(_) => return false,
        };
        let ok = match mode {
            ProbeMode::Basic => true,
            ProbeMode::Functional => lease.get().invoke(json!({"probe": true})).await.is_ok(),
        };
        self.pool.release(lease, ok).await;
        ok
    }
}

/// Everything the operator HTTP surface and the background health loop
/// need, assembled once at startup.
pub struct Wiring {
    pub config_store: Arc<ConfigStore>,
    pub router: Arc<GrayscaleRouter>,
    pub resolver: Arc<CapabilityResolver>,
    pub memory: Arc<DefaultMemoryFacade>,
    pub pool_registry: Arc<PoolRegistry>,
    pub health_checker: Arc<HealthChecker>,
}

impl Wiring {
    pub async fn build(config: &GatewayRuntimeConfig, db: Database) -> anyhow::Result<Self> {
        let Database {
            config_store,
            memory_store,
            ..
        } = db;
        let config_store = Arc::new(config_store);
        let router = Arc::new(GrayscaleRouter::new(config_store.clone()));
        let resolver = Arc::new(CapabilityResolver::new(config_store.clone()));
        let memory = Arc::new(DefaultMemoryFacade::new(
            Arc::new(memory_store),
            config.memory_worker_pool_size,
            config.memory_worker_pool_size * 32,
            config.default_memory_recall_limit,
        ));
        let pool_registry = Arc::new(PoolRegistry::new(
            config.default_pool_capacity,
            config.default_pool_idle_timeout(),
        ));
        let health_checker = Arc::new(HealthChecker::new(
            config_store.clone(),
            router.clone(),
            ProbeMode::Basic,
            0.5,
            10,
            config.health_check_interval(),
        ));

        register_probe_targets(&config_store, &router, &pool_registry, &health_checker).await?;

        Ok(Self {
            config_store,
            router,
            resolver,
            memory,
            pool_registry,
            health_checker,
        })
    }

    pub fn spawn_background_tasks(&self) {
        self.health_checker.clone().spawn_loop();
        info!("health check loop started");
    }
}

/// Registers one probe target per active provider version currently
/// configured, so the first health-check pass has something to probe
/// without waiting for a grayscale `pick` to populate the router cache.
/// Also primes the router's cache for every `(category, name)` pair seen
/// here: `HealthChecker::check_all` only walks `GrayscaleRouter::cached_keys`,
/// so without this the health loop would sit idle until some caller
/// happened to `pick` first.
async fn register_probe_targets(
    config_store: &Arc<ConfigStore>,
    router: &Arc<GrayscaleRouter>,
    pool_registry: &Arc<PoolRegistry>,
    health_checker: &Arc<HealthChecker>,
) -> anyhow::Result<()> {
    let mut seen_names = std::collections::HashSet::new();
    for category in [
        CapabilityKind::Asr,
        CapabilityKind::Tts,
        CapabilityKind::Llm,
        CapabilityKind::Vlllm,
        CapabilityKind::Vad,
    ] {
        for config in config_store.list_provider_configs(Some(category)).await? {
            let key = config.key();
            let pool = pool_registry.pool_for(&key).await;
            health_checker
                .register(key, Arc::new(PoolProbeTarget { pool }))
                .await;
            if seen_names.insert((config.category, config.name.clone())) {
                router.refresh(config.category, &config.name).await?;
            }
        }
    }
    Ok(())
}
