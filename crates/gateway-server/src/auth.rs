use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Requires a valid `Authorization: Bearer <token>` header on every route it
/// wraps. Grounded on
/// `dragon-panic-nclav::nclav-api::auth::require_bearer_token`.
pub async fn require_bearer_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == state.bearer_token.as_str() => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, "unauthorized\n").into_response(),
    }
}
