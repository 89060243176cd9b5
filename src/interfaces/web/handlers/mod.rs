pub(crate) mod cache;
pub(crate) mod folders;
pub(crate) mod meta;
pub(crate) mod nodes;
pub(crate) mod servers;
pub(crate) mod tasks;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::core::repository::RepositoryError;

pub(crate) fn not_found(err: RepositoryError) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "status": 404,
            "message": err.to_string(),
        })),
    )
        .into_response()
}
