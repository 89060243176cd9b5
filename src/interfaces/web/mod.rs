mod handlers;
mod router;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::manager::CacheManager;
use crate::core::repository::Repository;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) manager: CacheManager,
    pub(crate) repository: Repository,
}

pub struct ApiServer {
    host: String,
    port: u16,
    manager: CacheManager,
}

impl ApiServer {
    pub fn new(host: impl Into<String>, port: u16, manager: CacheManager) -> Self {
        Self {
            host: host.into(),
            port,
            manager,
        }
    }

    pub async fn run(self) -> Result<()> {
        let state = AppState {
            repository: Repository::new(self.manager.clone()),
            manager: self.manager.clone(),
        };
        let app = router::build_api_router(state);

        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("API server listening on http://{addr}");

        // kick off the first snapshot as soon as the server is up
        self.manager.schedule_refresh()?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped. Draining the worker pool...");
        self.manager.shutdown(true);
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
