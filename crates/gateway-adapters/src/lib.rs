//! The provider adapter contract (spec §6) plus small reference adapters
//! (`MockAdapter`, `EchoAdapter`) used by the pool and router's own tests.
//! No concrete vendor HTTP/WebSocket client lives here — those stay out of
//! scope per spec §1; only the abstract interface and in-repo test doubles
//! do.

pub mod mock;

pub use mock::{EchoAdapter, FlakyAdapter, MockAdapter};

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One or more capability-kind methods plus lifecycle hooks. Adapters
/// declare no global state; construction takes a typed config drawn from
/// the provider-config `props` map (see `gateway_core::AdapterProps`).
#[async_trait]
pub trait ProviderAdapter: Send + Sync + fmt::Debug {
    async fn initialize(&mut self) -> Result<()>;
    async fn cleanup(&mut self) -> Result<()>;

    /// Generic capability invocation: a JSON request in, a JSON response
    /// out. Concrete capability-kind methods (`transcribe`, `synthesize`,
    /// `stream_chat`, ...) are vendor-adapter concerns out of this crate's
    /// scope; this single entry point is what the pool's factories and
    /// tests exercise.
    async fn invoke(&self, request: Value) -> Result<Value>;

    /// Whether the adapter currently considers itself able to serve
    /// traffic; consulted by the health checker's functional probe mode.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Constructs a `ProviderAdapter` for a given adapter type and typed props.
/// The factory registries mapping `(capability kind) -> constructor` are
/// process-wide but initialized once at startup and never mutated
/// afterward (spec §9 "Global mutable state").
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn ProviderAdapter>>;
}
