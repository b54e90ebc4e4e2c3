use axum::{
    body::Body,
    extract::{Query, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::warn;

use crate::handlers::error::ApiError;
use crate::state::AppState;

/// Rejects calls whose `sessionkey` does not match the configured key.
/// Without a configured key every call is let through.
pub async fn session_middleware(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(expected) = state.session_key.as_deref() {
        if params.get("sessionkey").map(String::as_str) != Some(expected) {
            let command = params.get("command").cloned().unwrap_or_default();
            warn!(%command, "rejected call with a bad session key");
            return ApiError::Unauthorized.for_command(&command).into_response();
        }
    }

    next.run(req).await
}
