use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use super::super::AppState;
use super::not_found;

pub async fn names(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.repository.server_names()))
}

pub async fn info(Path(server): Path<String>, State(state): State<AppState>) -> Response {
    match state.repository.server_info_or_die(&server) {
        Ok(info) => Json(info).into_response(),
        Err(err) => not_found(err),
    }
}

pub async fn applications(Path(server): Path<String>, State(state): State<AppState>) -> Response {
    match state.repository.server_info_or_die(&server) {
        Ok(info) => Json(serde_json::json!(info.application_keys)).into_response(),
        Err(err) => not_found(err),
    }
}
