use axum::Json;
use axum::extract::State;

use super::super::AppState;

pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "tasks": state.manager.task_runner().list_tasks(),
    }))
}
