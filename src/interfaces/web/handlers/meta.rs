use axum::Json;

use super::super::router::API_ROUTES;

pub async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "version": env!("CARGO_PKG_VERSION"),
        "discovery_endpoint": "/discover",
    }))
}

pub async fn discover() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "routes": API_ROUTES }))
}
