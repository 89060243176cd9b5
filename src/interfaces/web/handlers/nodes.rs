use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use super::super::AppState;
use super::not_found;

pub async fn names(Path(server): Path<String>, State(state): State<AppState>) -> Response {
    match state.repository.node_names(&server) {
        Ok(names) => Json(serde_json::json!(names)).into_response(),
        Err(err) => not_found(err),
    }
}

pub async fn stats(Path(server): Path<String>, State(state): State<AppState>) -> Response {
    match state.repository.node_stats(&server) {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => not_found(err),
    }
}

pub async fn single(
    Path((server, node)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    match state.repository.node_or_die(&server, &node) {
        Ok(info) => Json(info).into_response(),
        Err(err) => not_found(err),
    }
}
