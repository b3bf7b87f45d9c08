use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::{BindingSource, CapabilityKind, EffectiveBinding, GatewayError, GatewayResult};
use gateway_storage::ConfigStore;
use log::debug;
use serde_json::Value;
use strum::IntoEnumIterator;

/// The Capability Resolver (C2): for `(device, user?, capability-kind)`
/// returns the effective capability binding using the device -> user ->
/// system fallback chain (spec §4.1). Deterministic for a given snapshot of
/// storage; returns the *logical* binding only, never a concrete version —
/// version selection is deferred to the grayscale router (C3).
pub struct CapabilityResolver {
    store: Arc<ConfigStore>,
}

impl CapabilityResolver {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        device_id: &str,
        user_id: Option<&str>,
        kind: CapabilityKind,
    ) -> GatewayResult<EffectiveBinding> {
        debug!("resolving capability {kind} for device={device_id} user={user_id:?}");

        if let Some(device_binding) = self
            .store
            .get_device_binding(device_id.to_string(), kind)
            .await?
        {
            return Ok(EffectiveBinding {
                source: BindingSource::Device,
                priority: (device_binding.priority as u16).clamp(1, 99),
                kind,
                name: device_binding.provider_name,
                config_data: device_binding
                    .config_override
                    .and_then(|raw| serde_json::from_str::<Value>(&raw).ok()),
            });
        }

        if let Some(user_id) = user_id {
            if let Some(user_binding) = self
                .store
                .get_active_user_binding(user_id.to_string(), kind)
                .await?
            {
                return Ok(EffectiveBinding {
                    source: BindingSource::User,
                    priority: 100,
                    kind,
                    name: user_binding.provider_name,
                    config_data: None,
                });
            }
        }

        if let Some(name) = self.store.get_system_default(kind).await? {
            return Ok(EffectiveBinding {
                source: BindingSource::System,
                priority: 200,
                kind,
                name,
                config_data: None,
            });
        }

        Err(GatewayError::NotFound)
    }

    /// Resolves every capability kind for the given context, omitting kinds
    /// that return `NotFound` rather than failing the whole call — spec
    /// §4.1 only specifies the per-kind contract, and callers asking for
    /// "everything available" expect partial results over a hard failure.
    pub async fn resolve_all(
        &self,
        device_id: &str,
        user_id: Option<&str>,
    ) -> GatewayResult<HashMap<CapabilityKind, EffectiveBinding>> {
        let mut out = HashMap::new();
        for kind in CapabilityKind::iter() {
            match self.resolve(device_id, user_id, kind).await {
                Ok(binding) => {
                    out.insert(kind, binding);
                }
                Err(GatewayError::NotFound) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(out)
    }
}
