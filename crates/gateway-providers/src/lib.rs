//! Capability resolution, grayscale routing, provider instance pooling and
//! health checking (C2/C3/C4/C6) — the provider-selection and
//! resource-management substrate.

pub mod grayscale;
pub mod health;
pub mod pool;
pub mod resolver;

pub use grayscale::{GrayscaleEntry, GrayscaleRouter, Strategy, VersionInfo};
pub use health::{HealthChecker, ProbeMode, ProbeTarget};
pub use pool::{AdapterPoolFactory, Lease, Pool, ResourceFactory};
pub use resolver::CapabilityResolver;
