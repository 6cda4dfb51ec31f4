use crate::state::AppState;
use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

/// Liveness probe, answered without policy enforcement
async fn healthy() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/healthy", get(healthy))
}
