use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

/// Builds the operator HTTP surface (spec §6). Grounded on
/// `yiyousiow000814-API-Router::orchestrator::gateway::build_router`'s
/// `Router::new().route(...).with_state(state)` shape, with the bearer-auth
/// check lifted out of each handler (that gateway's `require_gateway_auth`)
/// into one `route_layer` guarding every route, plus `TraceLayer` for
/// request logging per `dragon-panic-nclav::nclav-api::app::build_app`.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/configs/provider",
            get(handlers::list_provider_configs).post(handlers::create_provider_config),
        )
        .route(
            "/configs/provider/:id",
            put(handlers::update_provider_config).delete(handlers::delete_provider_config),
        )
        .route(
            "/configs/provider/:category/:name/versions",
            get(handlers::list_versions),
        )
        .route(
            "/configs/provider/:category/:name/grayscale",
            get(handlers::get_grayscale_status),
        )
        .route(
            "/configs/provider/:category/:name/weight",
            put(handlers::set_weight),
        )
        .route(
            "/configs/provider/:category/:name/default",
            put(handlers::set_default),
        )
        .route(
            "/configs/provider/:category/:name/refresh",
            post(handlers::refresh_grayscale),
        )
        .route(
            "/devices/:id/capabilities/with-fallback",
            get(handlers::device_capabilities_with_fallback),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use gateway_core::{CapabilityKind, ProviderConfig};
    use gateway_providers::{CapabilityResolver, GrayscaleRouter};
    use gateway_storage::ConfigStore;
    use tower::util::ServiceExt;
    use uuid::Uuid;

    use super::*;

    const TEST_TOKEN: &str = "test-token";

    fn sample_config(name: &str) -> ProviderConfig {
        ProviderConfig {
            id: Uuid::new_v4(),
            category: CapabilityKind::Llm,
            name: name.to_string(),
            version: "v1".to_string(),
            weight: 100,
            is_active: true,
            is_default: true,
            adapter_type: "echo".to_string(),
            props: Default::default(),
            health_score: 100,
        }
    }

    async fn test_app() -> Router {
        let store = Arc::new(ConfigStore::open_in_memory().await.unwrap());
        let router = Arc::new(GrayscaleRouter::new(store.clone()));
        let resolver = Arc::new(CapabilityResolver::new(store.clone()));
        let state = AppState {
            config_store: store,
            router,
            resolver,
            bearer_token: Arc::new(TEST_TOKEN.to_string()),
        };
        build_app(state)
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {TEST_TOKEN}"))
    }

    #[tokio::test]
    async fn unauthenticated_request_returns_401() {
        let app = test_app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/configs/provider")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_provider_configs_empty_returns_200() {
        let app = test_app().await;
        let resp = app
            .oneshot(
                authed(Request::builder().uri("/configs/provider"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_then_fetch_versions_round_trips() {
        let app = test_app().await;
        let body = serde_json::to_string(&sample_config("chat")).unwrap();
        let resp = app
            .clone()
            .oneshot(
                authed(
                    Request::builder()
                        .method("POST")
                        .uri("/configs/provider")
                        .header("content-type", "application/json"),
                )
                .body(Body::from(body))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(
                authed(Request::builder().uri("/configs/provider/llm/chat/versions"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn grayscale_status_unknown_name_returns_error() {
        let app = test_app().await;
        let resp = app
            .oneshot(
                authed(Request::builder().uri("/configs/provider/llm/nonexistent/grayscale"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp.status().is_client_error() || resp.status().is_server_error());
    }

    #[tokio::test]
    async fn device_capabilities_with_fallback_returns_200() {
        let app = test_app().await;
        let resp = app
            .oneshot(
                authed(Request::builder().uri("/devices/dev-1/capabilities/with-fallback"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
