use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::get,
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{cache, folders, meta, nodes, servers, tasks};

/// Route table, also served by `/discover`.
pub(crate) const API_ROUTES: &[&str] = &[
    "/",
    "/discover",
    "/cache/keys",
    "/cache/state",
    "/cache/populate",
    "/tasks",
    "/servers",
    "/servers/{server}",
    "/servers/{server}/applications",
    "/servers/{server}/folders/all",
    "/servers/{server}/folders/active",
    "/servers/{server}/folders/disabled",
    "/servers/{server}/folder/{folder}",
    "/servers/{server}/nodes",
    "/servers/{server}/nodes/stats",
    "/servers/{server}/node/{node}",
];

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(meta::index))
        .route("/discover", get(meta::discover))
        .route("/cache/keys", get(cache::keys))
        .route("/cache/state", get(cache::cache_state))
        .route(
            "/cache/populate",
            get(cache::populate)
                .post(cache::populate)
                .put(cache::populate),
        )
        .route("/tasks", get(tasks::list))
        .route("/servers", get(servers::names))
        .route("/servers/{server}", get(servers::info))
        .route("/servers/{server}/applications", get(servers::applications))
        .route("/servers/{server}/folders/all", get(folders::all))
        .route("/servers/{server}/folders/active", get(folders::active))
        .route("/servers/{server}/folders/disabled", get(folders::disabled))
        .route("/servers/{server}/folder/{folder}", get(folders::single))
        .route("/servers/{server}/nodes", get(nodes::names))
        .route("/servers/{server}/nodes/stats", get(nodes::stats))
        .route("/servers/{server}/node/{node}", get(nodes::single))
        .layer(middleware::from_fn(security_headers))
        .layer(build_cors())
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}
