//! HTTP server for document conversion

pub mod routes;
pub mod state;
pub mod upload;

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use state::AppState;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    // CORS layer - must be added first (outermost)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_size = state.config().server.max_upload_size;

    Router::new()
        .route("/health", get(routes::info::health))
        .route("/ready", get(readiness))
        .merge(routes::api_routes(max_upload_size))
        .with_state(state)
        // Middleware layers (order matters - applied bottom to top)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Conversion HTTP server
pub struct ConvertServer {
    config: ServiceConfig,
    state: AppState,
}

impl ConvertServer {
    /// Create a new server; spawns the job worker
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let state = AppState::new(config.clone()).await?;
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until Ctrl+C, then release every job workspace
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = build_router(self.state.clone());

        tracing::info!("Starting conversion server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(begin_shutdown(self.state.clone(), ctrl_c()))
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)));

        self.state.shutdown().await;
        served
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Wait for `signal`, then report not ready while in-flight requests drain
async fn begin_shutdown<F>(state: AppState, signal: F)
where
    F: Future<Output = ()>,
{
    signal.await;
    state.set_ready(false);
    tracing::info!("Shutdown signal received, draining connections");
}

/// Readiness check endpoint
async fn readiness(state: axum::extract::State<AppState>) -> axum::http::StatusCode {
    if state.is_ready() {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    }
}
