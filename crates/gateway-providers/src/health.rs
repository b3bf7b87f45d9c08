use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::{CapabilityKind, GatewayResult, ProviderKey};
use gateway_storage::ConfigStore;
use log::{debug, warn};

use crate::grayscale::GrayscaleRouter;

/// How a version is probed. Spec §4.5: basic is a reachability/handshake
/// check, functional runs a synthetic request through the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    Basic,
    Functional,
}

/// Something the health checker can probe for a single provider version.
/// Registered per `ProviderKey` by whoever owns the live adapter instances
/// (the pool registry, in `gateway-server`); the checker itself holds no
/// adapters directly, mirroring how `techgopal-ultrafast-ai-gateway`'s
/// `HealthChecker` is handed a provider map rather than owning connections.
#[async_trait]
pub trait ProbeTarget: Send + Sync {
    async fn probe(&self, mode: ProbeMode) -> bool;
}

/// Periodic liveness/functional probe loop (C6). Smooths `health_score`
/// toward 100 on success and toward a floor on failure, writing through
/// `ConfigStore` (storage-authoritative, spec §9 Open Question resolution)
/// and triggering a `GrayscaleRouter::refresh` so C3's cache picks up the
/// change on the next `pick`. Grounded on
/// `techgopal-ultrafast-ai-gateway::advanced_routing::HealthChecker`'s
/// global provider-status map plus the teacher's
/// `connection_pool::health_check_all` periodic-loop shape.
pub struct HealthChecker {
    store: Arc<ConfigStore>,
    router: Arc<GrayscaleRouter>,
    targets: tokio::sync::RwLock<HashMap<ProviderKey, Arc<dyn ProbeTarget>>>,
    mode: ProbeMode,
    smoothing_factor: f64,
    floor: u8,
    interval: Duration,
}

impl HealthChecker {
    pub fn new(
        store: Arc<ConfigStore>,
        router: Arc<GrayscaleRouter>,
        mode: ProbeMode,
        smoothing_factor: f64,
        floor: u8,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            router,
            targets: tokio::sync::RwLock::new(HashMap::new()),
            mode,
            smoothing_factor,
            floor,
            interval,
        }
    }

    pub async fn register(&self, key: ProviderKey, target: Arc<dyn ProbeTarget>) {
        self.targets.write().await.insert(key, target);
    }

    pub async fn deregister(&self, key: &ProviderKey) {
        self.targets.write().await.remove(key);
    }

    /// Smooths `old` toward 100 (success) or `floor` (failure) by
    /// `smoothing_factor`, clamped to `[0, 100]`.
    fn smooth(old: u8, success: bool, smoothing_factor: f64, floor: u8) -> u8 {
        let target = if success { 100.0 } else { floor as f64 };
        let new_value = old as f64 + (target - old as f64) * smoothing_factor;
        new_value.round().clamp(0.0, 100.0) as u8
    }

    /// Runs one pass over every `(category, name)` pair currently cached by
    /// the grayscale router, probing each of its active versions that has a
    /// registered target and writing back the smoothed score.
    pub async fn check_all(&self) -> GatewayResult<()> {
        for (category, name) in self.router.cached_keys().await {
            self.check_one(category, &name).await?;
        }
        Ok(())
    }

    async fn check_one(&self, category: CapabilityKind, name: &str) -> GatewayResult<()> {
        let versions = self.store.list_versions(category, name.to_string()).await?;
        let mut any_checked = false;
        for version in versions.into_iter().filter(|v| v.is_active) {
            let key = version.key();
            let target = self.targets.read().await.get(&key).cloned();
            let Some(target) = target else {
                debug!("no health probe target registered for {key}, skipping");
                continue;
            };
            let success = target.probe(self.mode).await;
            let new_score = Self::smooth(version.health_score, success, self.smoothing_factor, self.floor);
            if !success {
                warn!("health probe failed for {key}, score {} -> {new_score}", version.health_score);
            }
            self.store
                .update_health_score(category, name.to_string(), version.version.clone(), new_score)
                .await?;
            any_checked = true;
        }
        if any_checked {
            self.router.refresh(category, name).await?;
        }
        Ok(())
    }

    /// Spawns the periodic check loop, same shape as the teacher's
    /// `tokio::select! { _ = interval.tick() => ... }` cleanup task.
    pub fn spawn_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = self.check_all().await {
                    // Spec §7: health check failures never fail a user
                    // request; they only fail to adjust scores this round.
                    warn!("health check pass failed: {err:#}");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::ProviderConfig;
    use serde_json::Map;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    struct FixedProbe(AtomicBool);

    #[async_trait]
    impl ProbeTarget for FixedProbe {
        async fn probe(&self, _mode: ProbeMode) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    async fn seeded_checker(
        smoothing_factor: f64,
        floor: u8,
    ) -> (Arc<ConfigStore>, Arc<GrayscaleRouter>, HealthChecker) {
        let store = Arc::new(ConfigStore::open_in_memory().await.unwrap());
        store
            .create_provider_config(ProviderConfig {
                id: Uuid::new_v4(),
                category: CapabilityKind::Llm,
                name: "openai".into(),
                version: "v1".into(),
                weight: 100,
                is_active: true,
                is_default: true,
                adapter_type: "openai".into(),
                props: Map::new(),
                health_score: 80,
            })
            .await
            .unwrap();
        let router = Arc::new(GrayscaleRouter::new(store.clone()));
        router.refresh(CapabilityKind::Llm, "openai").await.unwrap();
        let checker = HealthChecker::new(
            store.clone(),
            router.clone(),
            ProbeMode::Basic,
            smoothing_factor,
            floor,
            Duration::from_secs(30),
        );
        (store, router, checker)
    }

    #[test]
    fn smooth_moves_toward_100_on_success() {
        assert_eq!(HealthChecker::smooth(80, true, 0.5, 0), 90);
    }

    #[test]
    fn smooth_moves_toward_floor_on_failure() {
        assert_eq!(HealthChecker::smooth(80, false, 0.5, 0), 40);
    }

    #[test]
    fn smooth_clamps_to_valid_range() {
        assert_eq!(HealthChecker::smooth(100, true, 1.0, 0), 100);
        assert_eq!(HealthChecker::smooth(0, false, 1.0, 0), 0);
    }

    #[tokio::test]
    async fn check_all_raises_score_on_success_and_refreshes_router() {
        let (store, _router, checker) = seeded_checker(0.5, 0).await;
        checker
            .register(
                ProviderKey {
                    category: CapabilityKind::Llm,
                    name: "openai".into(),
                    version: "v1".into(),
                },
                Arc::new(FixedProbe(AtomicBool::new(true))),
            )
            .await;
        checker.check_all().await.unwrap();
        let versions = store
            .list_versions(CapabilityKind::Llm, "openai".into())
            .await
            .unwrap();
        assert_eq!(versions[0].health_score, 90);
    }

    #[tokio::test]
    async fn check_all_lowers_score_on_failure() {
        let (store, _router, checker) = seeded_checker(0.5, 0).await;
        checker
            .register(
                ProviderKey {
                    category: CapabilityKind::Llm,
                    name: "openai".into(),
                    version: "v1".into(),
                },
                Arc::new(FixedProbe(AtomicBool::new(false))),
            )
            .await;
        checker.check_all().await.unwrap();
        let versions = store
            .list_versions(CapabilityKind::Llm, "openai".into())
            .await
            .unwrap();
        assert_eq!(versions[0].health_score, 40);
    }

    #[tokio::test]
    async fn check_all_skips_versions_with_no_registered_target() {
        let (store, _router, checker) = seeded_checker(0.5, 0).await;
        checker.check_all().await.unwrap();
        let versions = store
            .list_versions(CapabilityKind::Llm, "openai".into())
            .await
            .unwrap();
        assert_eq!(versions[0].health_score, 80);
    }
}
