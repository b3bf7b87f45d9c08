use thiserror::Error;

/// Domain-level failure kinds shared by every layer of the gateway core.
///
/// The pool, router and resolver never swallow one of these except during
/// destruction paths (logged only, see each call site).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no binding found for the requested capability")]
    NotFound,

    #[error("grayscale entry for ({category:?}, {name}) has no active version")]
    NoLiveVersion { category: String, name: String },

    #[error("pool for {key} is exhausted")]
    PoolExhausted { key: String },

    #[error("acquire on pool {key} timed out after {waited_ms}ms")]
    AcquireTimedOut { key: String, waited_ms: u64 },

    #[error("factory failed to construct a provider instance: {source}")]
    FactoryError {
        #[source]
        source: anyhow::Error,
    },

    #[error("provider adapter call failed: {source}")]
    AdapterError {
        #[source]
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {source}")]
    StorageError {
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("pool {key} is closed")]
    Closed { key: String },
}

impl GatewayError {
    pub fn storage(source: impl Into<anyhow::Error>) -> Self {
        GatewayError::StorageError {
            source: source.into(),
        }
    }

    pub fn config_invalid(reason: impl Into<String>) -> Self {
        GatewayError::ConfigInvalid {
            reason: reason.into(),
        }
    }

    pub fn factory(source: impl Into<anyhow::Error>) -> Self {
        GatewayError::FactoryError {
            source: source.into(),
        }
    }

    pub fn adapter(source: impl Into<anyhow::Error>) -> Self {
        GatewayError::AdapterError {
            source: source.into(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
