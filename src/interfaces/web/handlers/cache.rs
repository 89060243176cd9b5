use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::super::AppState;

pub async fn keys(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut keys = state.manager.store_keys();
    keys.sort();
    Json(serde_json::json!(keys))
}

pub async fn cache_state(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "state": state.manager.cache_state(),
        "error": state.manager.cache_error(),
        "ready": state.manager.is_cache_ready(),
        "timestamp": state.manager.cache_timestamp(),
        "parsingInterval": state.manager.refresh_duration(),
    }))
}

/// Refresh trigger. Reports whether a new task was started or an in-flight
/// one was reused; refresh failures themselves surface via `/cache/state`.
pub async fn populate(State(state): State<AppState>) -> Response {
    match state.manager.schedule_refresh() {
        Ok(outcome) => {
            Json(serde_json::json!({ "task_started": outcome.started_new() })).into_response()
        }
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": 503,
                "message": err.to_string(),
            })),
        )
            .into_response(),
    }
}
