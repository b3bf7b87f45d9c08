//! The Config Store (C1): durable, read-mostly storage for provider
//! configs, capability bindings and system defaults, plus the session and
//! memory persistence `gateway-memory` builds on. All SQL is built against
//! the `Dialect` seam so a server backend could be added without touching
//! the DAOs.

pub mod config_store;
pub mod dialect;
pub mod memory_store;
pub mod schema;
pub mod session_store;

pub use config_store::{ConfigStore, DeviceBindingRow, UserBindingRow};
pub use dialect::{Dialect, SqliteDialect};
pub use memory_store::MemoryStore;
pub use session_store::SessionStore;

/// Opens a single SQLite-backed connection and the three DAOs over it, so
/// callers (typically `gateway-server`'s wiring code) get one consistent
/// database handle instead of juggling separate connections per DAO.
pub struct Database {
    pub config_store: ConfigStore,
    pub session_store: SessionStore,
    pub memory_store: MemoryStore,
}

impl Database {
    pub async fn open(path: &str) -> gateway_core::GatewayResult<Self> {
        let config_store = ConfigStore::open(path).await?;
        let session_store = SessionStore::new(config_store.connection());
        let memory_store = MemoryStore::new(config_store.connection());
        Ok(Self {
            config_store,
            session_store,
            memory_store,
        })
    }

    pub async fn open_in_memory() -> gateway_core::GatewayResult<Self> {
        let config_store = ConfigStore::open_in_memory().await?;
        let session_store = SessionStore::new(config_store.connection());
        let memory_store = MemoryStore::new(config_store.connection());
        Ok(Self {
            config_store,
            session_store,
            memory_store,
        })
    }
}
