use std::str::FromStr;

use anyhow::anyhow;
use chrono::Utc;
use gateway_core::{CapabilityKind, GatewayError, GatewayResult, ProviderConfig, ProviderKey};
use log::debug;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::schema::SCHEMA_SQL;

/// The Config Store (C1): durable, read-mostly storage of provider configs,
/// capability bindings and system defaults, accessed through a uniform DAO
/// as spec §6 requires. Backed by the embedded SQLite dialect; all SQL here
/// is plain enough it would port to a server dialect by swapping the
/// connection type, per the `Dialect` seam in `crate::dialect`.
#[derive(Clone)]
pub struct ConfigStore {
    conn: Connection,
}

impl ConfigStore {
    pub async fn open(path: &str) -> GatewayResult<Self> {
        debug!("opening config store at {path}");
        let conn = Connection::open(path)
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))?;
        let store = Self { conn };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> GatewayResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))?;
        let store = Self { conn };
        store.migrate().await?;
        Ok(store)
    }

    /// Hands out a clone of the underlying connection so `SessionStore` and
    /// `MemoryStore` can share the same database file/handle instead of
    /// each opening their own.
    pub fn connection(&self) -> Connection {
        self.conn.clone()
    }

    async fn migrate(&self) -> GatewayResult<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA_SQL)?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    // ---- provider_configs -------------------------------------------------

    pub async fn create_provider_config(&self, cfg: ProviderConfig) -> GatewayResult<Uuid> {
        cfg.validate()?;
        let id = cfg.id;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO provider_configs
                        (id, category, name, version, weight, is_active, is_default, adapter_type, props, health_score)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        cfg.id.to_string(),
                        cfg.category.to_string(),
                        cfg.name,
                        cfg.version,
                        cfg.weight,
                        cfg.is_active,
                        cfg.is_default,
                        cfg.adapter_type,
                        serde_json::to_string(&cfg.props).unwrap_or_else(|_| "{}".into()),
                        cfg.health_score,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))?;
        Ok(id)
    }

    pub async fn update_provider_config(&self, cfg: ProviderConfig) -> GatewayResult<()> {
        cfg.validate()?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE provider_configs SET
                        category = ?2, name = ?3, version = ?4, weight = ?5,
                        is_active = ?6, is_default = ?7, adapter_type = ?8,
                        props = ?9, health_score = ?10
                     WHERE id = ?1",
                    params![
                        cfg.id.to_string(),
                        cfg.category.to_string(),
                        cfg.name,
                        cfg.version,
                        cfg.weight,
                        cfg.is_active,
                        cfg.is_default,
                        cfg.adapter_type,
                        serde_json::to_string(&cfg.props).unwrap_or_else(|_| "{}".into()),
                        cfg.health_score,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn delete_provider_config(&self, id: Uuid) -> GatewayResult<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM provider_configs WHERE id = ?1",
                    params![id.to_string()],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn list_provider_configs(
        &self,
        category: Option<CapabilityKind>,
    ) -> GatewayResult<Vec<ProviderConfig>> {
        let category = category.map(|c| c.to_string());
        self.conn
            .call(move |conn| {
                let mut rows = Vec::new();
                if let Some(cat) = &category {
                    let mut stmt = conn.prepare(
                        "SELECT id, category, name, version, weight, is_active, is_default, adapter_type, props, health_score
                         FROM provider_configs WHERE category = ?1 ORDER BY name, version",
                    )?;
                    let mut q = stmt.query(params![cat])?;
                    while let Some(row) = q.next()? {
                        rows.push(row_to_provider_config(row)?);
                    }
                } else {
                    let mut stmt = conn.prepare(
                        "SELECT id, category, name, version, weight, is_active, is_default, adapter_type, props, health_score
                         FROM provider_configs ORDER BY category, name, version",
                    )?;
                    let mut q = stmt.query([])?;
                    while let Some(row) = q.next()? {
                        rows.push(row_to_provider_config(row)?);
                    }
                }
                Ok(rows)
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn list_versions(
        &self,
        category: CapabilityKind,
        name: String,
    ) -> GatewayResult<Vec<ProviderConfig>> {
        let category = category.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, category, name, version, weight, is_active, is_default, adapter_type, props, health_score
                     FROM provider_configs WHERE category = ?1 AND name = ?2 ORDER BY version",
                )?;
                let mut q = stmt.query(params![category, name])?;
                let mut rows = Vec::new();
                while let Some(row) = q.next()? {
                    rows.push(row_to_provider_config(row)?);
                }
                Ok(rows)
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn get_provider_config_by_key(
        &self,
        key: ProviderKey,
    ) -> GatewayResult<Option<ProviderConfig>> {
        let category = key.category.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, category, name, version, weight, is_active, is_default, adapter_type, props, health_score
                     FROM provider_configs WHERE category = ?1 AND name = ?2 AND version = ?3",
                    params![category, key.name, key.version],
                    row_to_provider_config,
                )
                .optional()
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    /// Atomically updates a version's weight and returns the new value.
    /// Spec §4.2 `set_weight`; the caller (grayscale router) refreshes its
    /// cache after this returns.
    pub async fn set_weight(
        &self,
        category: CapabilityKind,
        name: String,
        version: String,
        new_weight: u8,
    ) -> GatewayResult<()> {
        if new_weight > 100 {
            return Err(GatewayError::config_invalid(format!(
                "weight {new_weight} out of range [0,100]"
            )));
        }
        let category = category.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE provider_configs SET weight = ?4
                     WHERE category = ?1 AND name = ?2 AND version = ?3",
                    params![category, name, version, new_weight],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    /// Clears `is_default` on all siblings and sets it on the target
    /// version inside a single transaction, resolving spec §9's Open
    /// Question ("the spec requires it to be atomic") in favor of atomicity.
    pub async fn set_default(
        &self,
        category: CapabilityKind,
        name: String,
        version: String,
    ) -> GatewayResult<()> {
        let category = category.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE provider_configs SET is_default = 0 WHERE category = ?1 AND name = ?2",
                    params![category, name],
                )?;
                let updated = tx.execute(
                    "UPDATE provider_configs SET is_default = 1
                     WHERE category = ?1 AND name = ?2 AND version = ?3",
                    params![category, name, version],
                )?;
                if updated == 0 {
                    return Err(rusqlite::Error::QueryReturnedNoRows);
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn update_health_score(
        &self,
        category: CapabilityKind,
        name: String,
        version: String,
        score: u8,
    ) -> GatewayResult<()> {
        let category = category.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE provider_configs SET health_score = ?4
                     WHERE category = ?1 AND name = ?2 AND version = ?3",
                    params![category, name, version, score],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    // ---- capability bindings ----------------------------------------------

    /// Device bindings where `device_id = d AND kind = k AND is_enabled`.
    /// Spec §4.1 assumes exactly one active binding per `(device, kind)`;
    /// if storage somehow holds more than one the first by `id` wins rather
    /// than erroring, since this is a read path that must stay available.
    pub async fn get_device_binding(
        &self,
        device_id: String,
        kind: CapabilityKind,
    ) -> GatewayResult<Option<DeviceBindingRow>> {
        let kind = kind.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT provider_name, priority, config_override
                     FROM device_capabilities
                     WHERE device_id = ?1 AND kind = ?2 AND is_enabled = 1
                     ORDER BY id LIMIT 1",
                    params![device_id, kind],
                    |row| {
                        Ok(DeviceBindingRow {
                            provider_name: row.get(0)?,
                            priority: row.get(1)?,
                            config_override: row.get(2)?,
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    /// Active user bindings, newest first; spec §4.1 step 2 ("newest wins").
    pub async fn get_active_user_binding(
        &self,
        user_id: String,
        kind: CapabilityKind,
    ) -> GatewayResult<Option<UserBindingRow>> {
        let kind = kind.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT provider_name, config_override
                     FROM user_capabilities
                     WHERE user_id = ?1 AND kind = ?2 AND is_active = 1
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    params![user_id, kind],
                    |row| {
                        Ok(UserBindingRow {
                            provider_name: row.get(0)?,
                            config_override: row.get(1)?,
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    /// `"default.<kind>" -> provider name` lookup, spec §4.1 step 3.
    pub async fn get_system_default(&self, kind: CapabilityKind) -> GatewayResult<Option<String>> {
        let key = format!("default.{kind}");
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT value FROM system_configs WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn set_system_default(
        &self,
        kind: CapabilityKind,
        provider_name: String,
    ) -> GatewayResult<()> {
        let key = format!("default.{kind}");
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO system_configs(key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, provider_name],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn upsert_device_binding(
        &self,
        id: Uuid,
        device_id: String,
        kind: CapabilityKind,
        provider_name: String,
        priority: u8,
        config_override: Option<String>,
    ) -> GatewayResult<()> {
        let kind = kind.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO device_capabilities
                        (id, device_id, kind, provider_name, priority, config_override, is_enabled, is_active, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 1, ?7)",
                    params![id.to_string(), device_id, kind, provider_name, priority, config_override, now],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }

    pub async fn upsert_user_binding(
        &self,
        id: Uuid,
        user_id: String,
        kind: CapabilityKind,
        provider_name: String,
        config_override: Option<String>,
    ) -> GatewayResult<()> {
        let kind = kind.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO user_capabilities
                        (id, user_id, kind, provider_name, config_override, is_active, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
                    params![id.to_string(), user_id, kind, provider_name, config_override, now],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| GatewayError::storage(anyhow!(e)))
    }
}

#[derive(Debug, Clone)]
pub struct DeviceBindingRow {
    pub provider_name: String,
    pub priority: u8,
    pub config_override: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserBindingRow {
    pub provider_name: String,
    pub config_override: Option<String>,
}

fn row_to_provider_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProviderConfig> {
    let id: String = row.get(0)?;
    let category: String = row.get(1)?;
    let props_raw: String = row.get(8)?;
    let props = serde_json::from_str(&props_raw).unwrap_or_default();
    Ok(ProviderConfig {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        category: CapabilityKind::from_str(&category).unwrap_or(CapabilityKind::Llm),
        name: row.get(2)?,
        version: row.get(3)?,
        weight: row.get(4)?,
        is_active: row.get(5)?,
        is_default: row.get(6)?,
        adapter_type: row.get(7)?,
        props,
        health_score: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn sample_config(name: &str, version: &str, weight: u8, is_default: bool) -> ProviderConfig {
        ProviderConfig {
            id: Uuid::new_v4(),
            category: CapabilityKind::Llm,
            name: name.to_string(),
            version: version.to_string(),
            weight,
            is_active: true,
            is_default,
            adapter_type: "openai".to_string(),
            props: Map::new(),
            health_score: 100,
        }
    }

    #[tokio::test]
    async fn create_and_list_provider_configs_roundtrip() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        store
            .create_provider_config(sample_config("openai", "v1", 70, true))
            .await
            .unwrap();
        store
            .create_provider_config(sample_config("openai", "v2", 30, false))
            .await
            .unwrap();

        let versions = store
            .list_versions(CapabilityKind::Llm, "openai".into())
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, "v1");
        assert_eq!(versions[1].weight, 30);
    }

    #[tokio::test]
    async fn set_default_is_atomic_and_exclusive() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        store
            .create_provider_config(sample_config("openai", "v1", 70, true))
            .await
            .unwrap();
        store
            .create_provider_config(sample_config("openai", "v2", 30, false))
            .await
            .unwrap();

        store
            .set_default(CapabilityKind::Llm, "openai".into(), "v2".into())
            .await
            .unwrap();

        let versions = store
            .list_versions(CapabilityKind::Llm, "openai".into())
            .await
            .unwrap();
        let defaults: Vec<_> = versions.iter().filter(|v| v.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].version, "v2");
    }

    #[tokio::test]
    async fn set_weight_then_read_back_yields_new_weight() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        store
            .create_provider_config(sample_config("openai", "v1", 70, true))
            .await
            .unwrap();
        store
            .set_weight(CapabilityKind::Llm, "openai".into(), "v1".into(), 55)
            .await
            .unwrap();
        let cfg = store
            .get_provider_config_by_key(ProviderKey {
                category: CapabilityKind::Llm,
                name: "openai".into(),
                version: "v1".into(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cfg.weight, 55);
    }

    #[tokio::test]
    async fn system_default_roundtrips() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        assert!(store.get_system_default(CapabilityKind::Llm).await.unwrap().is_none());
        store
            .set_system_default(CapabilityKind::Llm, "openai".into())
            .await
            .unwrap();
        assert_eq!(
            store.get_system_default(CapabilityKind::Llm).await.unwrap(),
            Some("openai".to_string())
        );
    }

    #[tokio::test]
    async fn device_binding_lookup_ignores_disabled_rows() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        store
            .upsert_device_binding(
                Uuid::new_v4(),
                "d1".into(),
                CapabilityKind::Llm,
                "openai".into(),
                1,
                None,
            )
            .await
            .unwrap();
        let found = store
            .get_device_binding("d1".into(), CapabilityKind::Llm)
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().provider_name, "openai");
    }
}
