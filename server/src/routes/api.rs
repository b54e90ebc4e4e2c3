use axum::{middleware::from_fn_with_state, routing::get, Router};

use crate::handlers::service_handler::dispatch;
use crate::middleware::session_middleware::session_middleware;
use crate::state::AppState;

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api", get(dispatch))
        .layer(from_fn_with_state(state.clone(), session_middleware))
        .with_state(state)
}
