//! HTTP server and process lifecycle

pub mod auth;
pub mod routes;
pub mod state;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::pipeline::spawn_workers;
use state::AppState;

/// Shutdown drain deadline for in-flight jobs
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Ingestion HTTP server with its worker pools
pub struct IngestServer {
    state: AppState,
}

impl IngestServer {
    /// Create a new server with validated config
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let state = AppState::new(config)?;
        Ok(Self { state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Listen address from config
    pub fn address(&self) -> String {
        format!(
            "{}:{}",
            self.state.config().server.host,
            self.state.config().server.port
        )
    }

    fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let max_upload = self.state.config().server.max_file_size_bytes as usize;

        Router::new()
            .route("/health", get(health_check))
            .merge(routes::routes(max_upload))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Start the worker pools and serve until interrupted, then drain
    /// in-flight jobs up to the deadline
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid listen address: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = spawn_workers(Arc::new(self.state.pipeline_context()), shutdown_rx);

        let router = self.build_router();
        tracing::info!("Listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind {}: {}", addr, e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutdown signal received");
            })
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        // Drain: workers finish their in-flight job, then stop. Anything
        // still processing past the deadline will be re-served on restart.
        let _ = shutdown_tx.send(true);
        let drain = futures_util::future::join_all(workers);
        if tokio::time::timeout(DRAIN_DEADLINE, drain).await.is_err() {
            tracing::warn!(
                "Drain deadline of {}s exceeded, abandoning in-flight jobs",
                DRAIN_DEADLINE.as_secs()
            );
        }
        Ok(())
    }
}

/// Liveness probe; the detailed per-dependency report is internal-scoped
async fn health_check() -> &'static str {
    "OK"
}
