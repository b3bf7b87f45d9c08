use std::collections::HashMap;
use std::env;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Process-wide runtime configuration: listen address, storage path,
/// health-check cadence, default pool sizing and the memory worker pool
/// size. Loaded from a TOML file and then overridden by environment
/// variables, mirroring the teacher's `load_engine_config` shape (parse to
/// an intermediate value, apply env/credential resolvers, then deserialize
/// to the typed struct) generalized from a single per-engine config blob to
/// one process-wide struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRuntimeConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_pool_capacity")]
    pub default_pool_capacity: usize,
    #[serde(default = "default_pool_idle_secs")]
    pub default_pool_idle_secs: u64,
    #[serde(default = "default_memory_worker_pool_size")]
    pub memory_worker_pool_size: usize,
    #[serde(default = "default_memory_recall_limit")]
    pub default_memory_recall_limit: usize,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_storage_path() -> String {
    "gateway.sqlite3".to_string()
}
fn default_health_check_interval_secs() -> u64 {
    30
}
fn default_pool_capacity() -> usize {
    4
}
fn default_pool_idle_secs() -> u64 {
    300
}
fn default_memory_worker_pool_size() -> usize {
    8
}
fn default_memory_recall_limit() -> usize {
    5
}

impl Default for GatewayRuntimeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            storage_path: default_storage_path(),
            health_check_interval_secs: default_health_check_interval_secs(),
            default_pool_capacity: default_pool_capacity(),
            default_pool_idle_secs: default_pool_idle_secs(),
            memory_worker_pool_size: default_memory_worker_pool_size(),
            default_memory_recall_limit: default_memory_recall_limit(),
            bearer_token: None,
        }
    }
}

impl GatewayRuntimeConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn default_pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.default_pool_idle_secs)
    }
}

/// Loads runtime configuration from TOML file content, then applies
/// environment overrides named `GATEWAY_<FIELD_UPPER>`. File content is
/// optional: an empty string yields all-default config so the server can
/// run from environment alone, matching the teacher's tolerance for partial
/// override maps.
pub fn load_runtime_config(
    toml_content: &str,
    env_overrides: &HashMap<String, String>,
) -> Result<GatewayRuntimeConfig, GatewayError> {
    debug!("loading gateway runtime configuration");
    let mut config: GatewayRuntimeConfig = if toml_content.trim().is_empty() {
        GatewayRuntimeConfig::default()
    } else {
        toml::from_str(toml_content)
            .map_err(|e| GatewayError::config_invalid(format!("invalid TOML config: {e}")))?
    };

    apply_env_overrides(&mut config, env_overrides);
    debug!("resolved gateway runtime configuration: {config:?}");
    Ok(config)
}

/// Reads the actual process environment for override keys, separated from
/// `load_runtime_config` so tests can supply a fake override map instead of
/// mutating the real environment.
pub fn env_overrides_from_process() -> HashMap<String, String> {
    let keys = [
        "GATEWAY_LISTEN_ADDR",
        "GATEWAY_STORAGE_PATH",
        "GATEWAY_HEALTH_CHECK_INTERVAL_SECS",
        "GATEWAY_DEFAULT_POOL_CAPACITY",
        "GATEWAY_DEFAULT_POOL_IDLE_SECS",
        "GATEWAY_MEMORY_WORKER_POOL_SIZE",
        "GATEWAY_DEFAULT_MEMORY_RECALL_LIMIT",
        "GATEWAY_BEARER_TOKEN",
    ];
    keys.iter()
        .filter_map(|k| env::var(k).ok().map(|v| (k.to_string(), v)))
        .collect()
}

fn apply_env_overrides(config: &mut GatewayRuntimeConfig, overrides: &HashMap<String, String>) {
    if let Some(v) = overrides.get("GATEWAY_LISTEN_ADDR") {
        config.listen_addr = v.clone();
    }
    if let Some(v) = overrides.get("GATEWAY_STORAGE_PATH") {
        config.storage_path = v.clone();
    }
    if let Some(v) = overrides.get("GATEWAY_HEALTH_CHECK_INTERVAL_SECS") {
        if let Ok(n) = v.parse() {
            config.health_check_interval_secs = n;
        }
    }
    if let Some(v) = overrides.get("GATEWAY_DEFAULT_POOL_CAPACITY") {
        if let Ok(n) = v.parse() {
            config.default_pool_capacity = n;
        }
    }
    if let Some(v) = overrides.get("GATEWAY_DEFAULT_POOL_IDLE_SECS") {
        if let Ok(n) = v.parse() {
            config.default_pool_idle_secs = n;
        }
    }
    if let Some(v) = overrides.get("GATEWAY_MEMORY_WORKER_POOL_SIZE") {
        if let Ok(n) = v.parse() {
            config.memory_worker_pool_size = n;
        }
    }
    if let Some(v) = overrides.get("GATEWAY_DEFAULT_MEMORY_RECALL_LIMIT") {
        if let Ok(n) = v.parse() {
            config.default_memory_recall_limit = n;
        }
    }
    if let Some(v) = overrides.get("GATEWAY_BEARER_TOKEN") {
        config.bearer_token = Some(v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_yields_defaults() {
        let cfg = load_runtime_config("", &HashMap::new()).unwrap();
        assert_eq!(cfg.listen_addr, default_listen_addr());
        assert_eq!(cfg.default_pool_capacity, default_pool_capacity());
    }

    #[test]
    fn toml_content_is_parsed() {
        let toml = r#"
            listen_addr = "127.0.0.1:9000"
            default_pool_capacity = 16
        "#;
        let cfg = load_runtime_config(toml, &HashMap::new()).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.default_pool_capacity, 16);
    }

    #[test]
    fn env_overrides_win_over_file() {
        let toml = r#"listen_addr = "127.0.0.1:9000""#;
        let mut overrides = HashMap::new();
        overrides.insert("GATEWAY_LISTEN_ADDR".to_string(), "0.0.0.0:7000".to_string());
        let cfg = load_runtime_config(toml, &overrides).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:7000");
    }

    #[test]
    fn invalid_toml_is_config_invalid() {
        let err = load_runtime_config("not = [valid", &HashMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::ConfigInvalid { .. }));
    }
}
