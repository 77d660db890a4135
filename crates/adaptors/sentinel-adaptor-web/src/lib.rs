//! HTTP/SSE adapter for sentinel
//!
//! Exposes the scan orchestrator as a small REST surface:
//! - live scan streams (single space, all spaces, resume) over SSE
//! - pause, last-scan metadata and per-space statuses
//! - the policy-gated, audit-logged reveal endpoint
//! - a health probe covering the content source and the stores

#![warn(missing_docs)]
#![warn(clippy::all)]

mod handlers;
mod sse;

pub use sse::to_sse_event;

use axum::routing::{get, post};
use axum::Router;
use sentinel_core::resilience::HealthChecker;
use sentinel_core::{ScanOrchestrator, ScanQueryService, SubscriberRegistry};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Web adapter configuration
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Enable permissive CORS
    pub enable_cors: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            enable_cors: true,
        }
    }
}

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    /// Scan orchestrator
    pub orchestrator: Arc<ScanOrchestrator>,
    /// Live subscriber registry
    pub registry: Arc<SubscriberRegistry>,
    /// Query service for metadata, statuses and reveals
    pub query: Arc<ScanQueryService>,
    /// Health checker
    pub health: Arc<HealthChecker>,
}

impl AppState {
    /// New state over the given services
    pub fn new(orchestrator: Arc<ScanOrchestrator>, query: Arc<ScanQueryService>) -> Self {
        Self {
            orchestrator,
            registry: Arc::new(SubscriberRegistry::new()),
            query,
            health: Arc::new(HealthChecker::new()),
        }
    }
}

/// Build the router with every endpoint mounted
pub fn build_router(state: AppState, config: &WebConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/scan/stream", get(handlers::stream_all_handler))
        .route(
            "/api/scan/spaces/:space_key/stream",
            get(handlers::stream_space_handler),
        )
        .route(
            "/api/scan/:scan_id/resume",
            get(handlers::resume_handler),
        )
        .route("/api/scan/:scan_id/pause", post(handlers::pause_handler))
        .route("/api/scan/last", get(handlers::last_scan_handler))
        .route(
            "/api/scan/:scan_id/spaces",
            get(handlers::space_statuses_handler),
        )
        .route(
            "/api/scan/:scan_id/pages/:page_id/reveal",
            post(handlers::reveal_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    router
}

/// Serve the adapter until the shutdown future resolves
pub async fn serve(
    state: AppState,
    config: WebConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> sentinel_core::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Sentinel web adapter listening on {}", addr);
    axum::serve(listener, build_router(state, &config))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
