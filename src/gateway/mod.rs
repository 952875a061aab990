pub mod api;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;

const MAX_BODY_BYTES: usize = 40 * 1024 * 1024;

pub fn router(state: Arc<api::AppState>) -> Router {
    Router::new()
        .route("/health", get(api::handle_health))
        .route("/api/scenarios", get(api::handle_scenarios))
        .route("/api/generate", post(api::handle_generate))
        .route("/api/diagnostics", get(api::handle_diagnostics))
        // base64 图片体积较大
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
