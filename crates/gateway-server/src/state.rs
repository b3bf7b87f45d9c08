use std::sync::Arc;

use gateway_providers::{CapabilityResolver, GrayscaleRouter};
use gateway_storage::ConfigStore;

/// Shared application state for the operator HTTP surface. Grounded on
/// `dragon-panic-nclav::nclav-api::state::AppState` (a small `Clone` struct
/// of `Arc`-wrapped collaborators handed to every handler via axum's
/// `State` extractor).
#[derive(Clone)]
pub struct AppState {
    pub config_store: Arc<ConfigStore>,
    pub router: Arc<GrayscaleRouter>,
    pub resolver: Arc<CapabilityResolver>,
    pub bearer_token: Arc<String>,
}
