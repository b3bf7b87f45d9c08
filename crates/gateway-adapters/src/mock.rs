use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{AdapterFactory, ProviderAdapter};

/// Echoes the request back under a `result` key. Used by pool and router
/// tests that only need a cheap, deterministic adapter to lease.
#[derive(Debug, Default)]
pub struct EchoAdapter {
    initialized: bool,
}

#[async_trait]
impl ProviderAdapter for EchoAdapter {
    async fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.initialized = false;
        Ok(())
    }

    async fn invoke(&self, request: Value) -> Result<Value> {
        if !self.initialized {
            return Err(anyhow!("adapter used before initialize()"));
        }
        Ok(json!({ "result": request }))
    }
}

/// Counts constructions and invocations; used by pool fairness/contract
/// tests (spec §8 S5, invariant 1/7) to assert the factory is invoked
/// exactly as often as expected.
#[derive(Debug)]
pub struct MockAdapter {
    pub id: u32,
    invocations: AtomicU32,
}

impl MockAdapter {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            invocations: AtomicU32::new(0),
        }
    }

    pub fn invocation_count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn invoke(&self, request: Value) -> Result<Value> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "adapter_id": self.id, "echo": request }))
    }
}

/// Factory that hands out sequentially-numbered `MockAdapter`s, for pool
/// tests asserting lazy construction order.
pub struct CountingMockFactory {
    next_id: Arc<AtomicU32>,
}

impl CountingMockFactory {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn created_count(&self) -> u32 {
        self.next_id.load(Ordering::SeqCst)
    }
}

impl Default for CountingMockFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdapterFactory for CountingMockFactory {
    async fn create(&self) -> Result<Box<dyn ProviderAdapter>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut adapter = MockAdapter::new(id);
        adapter.initialize().await?;
        Ok(Box::new(adapter))
    }
}

/// Fails construction a fixed number of times before succeeding; used to
/// exercise `FactoryError` propagation and the pool's slot-reservation
/// rollback on factory failure.
pub struct FlakyAdapter;

pub struct FlakyFactory {
    failures_remaining: AtomicU32,
}

impl FlakyFactory {
    pub fn new(failures: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl AdapterFactory for FlakyFactory {
    async fn create(&self) -> Result<Box<dyn ProviderAdapter>> {
        let remaining = self.failures_remaining.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| if n > 0 { Some(n - 1) } else { Some(0) },
        );
        if let Ok(n) = remaining {
            if n > 0 {
                return Err(anyhow!("simulated factory failure"));
            }
        }
        let mut adapter = EchoAdapter::default();
        adapter.initialize().await?;
        Ok(Box::new(adapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_adapter_requires_initialize_before_invoke() {
        let adapter = EchoAdapter::default();
        assert!(adapter.invoke(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn echo_adapter_echoes_request() {
        let mut adapter = EchoAdapter::default();
        adapter.initialize().await.unwrap();
        let out = adapter.invoke(json!({"a": 1})).await.unwrap();
        assert_eq!(out, json!({"result": {"a": 1}}));
    }

    #[tokio::test]
    async fn flaky_factory_fails_then_succeeds() {
        let factory = FlakyFactory::new(2);
        assert!(factory.create().await.is_err());
        assert!(factory.create().await.is_err());
        assert!(factory.create().await.is_ok());
    }
}
