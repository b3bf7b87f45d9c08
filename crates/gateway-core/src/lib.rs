//! Shared domain types, error kinds and ambient primitives (clock, deadline,
//! runtime configuration) used by every other crate in the gateway
//! workspace.

pub mod clock;
pub mod config;
pub mod deadline;
pub mod error;
pub mod types;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{load_runtime_config, GatewayRuntimeConfig};
pub use deadline::Deadline;
pub use error::{GatewayError, GatewayResult};
pub use types::{
    AdapterProps, BindingSource, CapabilityBinding, CapabilityKind, EffectiveBinding, Message,
    MemoryRecord, MemoryType, ProviderConfig, ProviderInstanceHandle, ProviderKey, Role, Scope,
    Session, SessionStatus, ToolCall,
};
