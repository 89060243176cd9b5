use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use super::super::AppState;
use super::not_found;
use crate::core::index::{FolderInfo, ORDER_METHOD_SYSTEM};
use crate::core::repository::RepositoryError;

fn respond(result: Result<Vec<FolderInfo>, RepositoryError>) -> Response {
    match result {
        Ok(folders) => Json(folders).into_response(),
        Err(err) => not_found(err),
    }
}

pub async fn all(Path(server): Path<String>, State(state): State<AppState>) -> Response {
    respond(state.repository.folders(&server, None, None))
}

pub async fn active(Path(server): Path<String>, State(state): State<AppState>) -> Response {
    let methods = [Some(ORDER_METHOD_SYSTEM.to_string())];
    respond(state.repository.folders(&server, Some(&methods), None))
}

pub async fn disabled(Path(server): Path<String>, State(state): State<AppState>) -> Response {
    respond(state.repository.folders(&server, Some(&[None]), None))
}

pub async fn single(
    Path((server, folder)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    match state.repository.folder_or_die(&server, &folder) {
        Ok(info) => Json(info).into_response(),
        Err(err) => not_found(err),
    }
}
