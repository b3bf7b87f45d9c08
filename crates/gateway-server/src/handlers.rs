use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use gateway_core::{CapabilityKind, ProviderConfig};
use gateway_providers::Strategy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

fn parse_category(raw: &str) -> Result<CapabilityKind, ApiError> {
    CapabilityKind::from_str(raw).map_err(|_| ApiError::bad_request(format!("unknown capability category '{raw}'")))
}

// ── Provider configs ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListProviderConfigsQuery {
    pub category: Option<String>,
}

pub async fn list_provider_configs(
    State(state): State<AppState>,
    Query(query): Query<ListProviderConfigsQuery>,
) -> Result<Json<Vec<ProviderConfig>>, ApiError> {
    let category = query.category.as_deref().map(parse_category).transpose()?;
    let configs = state.config_store.list_provider_configs(category).await?;
    Ok(Json(configs))
}

pub async fn create_provider_config(
    State(state): State<AppState>,
    Json(config): Json<ProviderConfig>,
) -> Result<Json<Value>, ApiError> {
    let id = state.config_store.create_provider_config(config.clone()).await?;
    state.router.refresh(config.category, &config.name).await?;
    Ok(Json(json!({ "id": id })))
}

pub async fn update_provider_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut config): Json<ProviderConfig>,
) -> Result<Json<Value>, ApiError> {
    config.id = id;
    state.config_store.update_provider_config(config.clone()).await?;
    state.router.refresh(config.category, &config.name).await?;
    Ok(Json(json!({ "status": "updated" })))
}

pub async fn delete_provider_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.config_store.delete_provider_config(id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

pub async fn list_versions(
    State(state): State<AppState>,
    Path((category, name)): Path<(String, String)>,
) -> Result<Json<Vec<ProviderConfig>>, ApiError> {
    let category = parse_category(&category)?;
    let versions = state.config_store.list_versions(category, name).await?;
    Ok(Json(versions))
}

// ── Grayscale ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GrayscaleStatusView {
    pub strategy: &'static str,
    pub versions: Vec<ProviderConfig>,
}

fn strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Weight => "weight",
        Strategy::Health => "health",
        Strategy::RoundRobin => "round_robin",
    }
}

pub async fn get_grayscale_status(
    State(state): State<AppState>,
    Path((category, name)): Path<(String, String)>,
) -> Result<Json<GrayscaleStatusView>, ApiError> {
    let category = parse_category(&category)?;
    let entry = state.router.status(category, &name).await?;
    Ok(Json(GrayscaleStatusView {
        strategy: strategy_label(entry.strategy),
        versions: entry.versions.iter().map(|v| v.config.clone()).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetWeightBody {
    pub version: String,
    pub weight: u8,
}

pub async fn set_weight(
    State(state): State<AppState>,
    Path((category, name)): Path<(String, String)>,
    Json(body): Json<SetWeightBody>,
) -> Result<Json<Value>, ApiError> {
    let category = parse_category(&category)?;
    state.router.set_weight(category, &name, &body.version, body.weight).await?;
    Ok(Json(json!({ "status": "updated" })))
}

#[derive(Debug, Deserialize)]
pub struct SetDefaultBody {
    pub version: String,
}

pub async fn set_default(
    State(state): State<AppState>,
    Path((category, name)): Path<(String, String)>,
    Json(body): Json<SetDefaultBody>,
) -> Result<Json<Value>, ApiError> {
    let category = parse_category(&category)?;
    state.router.set_default(category, &name, &body.version).await?;
    Ok(Json(json!({ "status": "updated" })))
}

pub async fn refresh_grayscale(
    State(state): State<AppState>,
    Path((category, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let category = parse_category(&category)?;
    state.router.refresh(category, &name).await?;
    Ok(Json(json!({ "status": "refreshed" })))
}

// ── Capability resolution ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CapabilitiesQuery {
    pub user_id: Option<String>,
}

pub async fn device_capabilities_with_fallback(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<CapabilitiesQuery>,
) -> Result<Json<Value>, ApiError> {
    let bindings = state
        .resolver
        .resolve_all(&device_id, query.user_id.as_deref())
        .await?;
    Ok(Json(json!(bindings)))
}
