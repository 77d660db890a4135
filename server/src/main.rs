//! Sentinel server entry point
//!
//! Wires the SQLite stores, the document extractor, the REST content
//! source and the analyzer client into the orchestrator, then serves the
//! HTTP/SSE adapter until interrupted.

mod detector;
mod source;

use anyhow::Context;
use async_trait::async_trait;
use sentinel_adaptor_web::{AppState, WebConfig};
use sentinel_core::checkpoint::CheckpointManager;
use sentinel_core::config::{get_env_int, get_env_or};
use sentinel_core::ports::{AuditStore, CheckpointStore, ConfigStore, EventStore};
use sentinel_core::shutdown::ShutdownHook;
use sentinel_core::{
    load_env, AesGcmCipher, AuditService, ScanConfig, ScanOrchestrator, ScanQueryService,
    ShutdownManager,
};
use sentinel_extract::DocumentExtractor;
use sentinel_storage_sql::SqliteScanStore;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct PurgeWorkerHook {
    handle: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl ShutdownHook for PurgeWorkerHook {
    fn name(&self) -> &str {
        "audit_purge_worker"
    }

    async fn on_shutdown(&self) -> sentinel_core::Result<()> {
        self.handle.abort();
        Ok(())
    }
}

fn init_logging() {
    let level = std::env::var("SENTINEL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env().ok();
    init_logging();

    let scan_config = ScanConfig::from_env();

    let database_url = get_env_or("SENTINEL_DATABASE_URL", "sqlite://sentinel.db");
    let store = Arc::new(
        SqliteScanStore::new(&database_url)
            .await
            .context("opening the sentinel database")?,
    );
    let events: Arc<dyn EventStore> = store.clone();
    let checkpoint_store: Arc<dyn CheckpointStore> = store.clone();
    let audit_store: Arc<dyn AuditStore> = store.clone();
    let config_store: Arc<dyn ConfigStore> = store.clone();

    let encryption_key = get_env_or("SENTINEL_ENCRYPTION_KEY", "");
    if encryption_key.is_empty() {
        anyhow::bail!("SENTINEL_ENCRYPTION_KEY must be set");
    }
    let cipher = Arc::new(AesGcmCipher::new(encryption_key));

    let content_url = get_env_or("SENTINEL_CONTENT_URL", "http://localhost:8090");
    let analyzer_url = get_env_or("SENTINEL_ANALYZER_URL", "http://localhost:5002");
    let language = get_env_or("SENTINEL_ANALYZER_LANGUAGE", "fr");
    info!(
        "Scanning content at {} with analyzer {}",
        content_url, analyzer_url
    );

    let source = Arc::new(source::RestContentSource::new(content_url));
    let pii_detector = Arc::new(detector::HttpPiiDetector::new(analyzer_url, language));

    let checkpoints = CheckpointManager::new(checkpoint_store);
    let retention_days = get_env_int("SENTINEL_AUDIT_RETENTION_DAYS", scan_config.retention_days);
    let audit = AuditService::new(audit_store, retention_days);
    let purge_handle = audit.spawn_purge_task(scan_config.purge_interval);

    let orchestrator = Arc::new(ScanOrchestrator::new(
        source,
        Arc::new(DocumentExtractor::new()),
        pii_detector,
        events.clone(),
        checkpoints.clone(),
        cipher.clone(),
        scan_config.clone(),
    ));
    let query = Arc::new(ScanQueryService::new(
        events,
        checkpoints,
        audit,
        cipher,
        config_store,
    ));

    let web_config = WebConfig {
        host: get_env_or("SENTINEL_HOST", "127.0.0.1"),
        port: get_env_int("SENTINEL_PORT", 3000),
        enable_cors: true,
    };
    let state = AppState::new(orchestrator, query);

    let shutdown = Arc::new(ShutdownManager::new(scan_config.cancel_grace));
    shutdown.register_hook(PurgeWorkerHook {
        handle: purge_handle,
    });

    let on_signal = shutdown.clone();
    sentinel_adaptor_web::serve(state, web_config, async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Failed to listen for shutdown signal");
        }
        info!("Shutdown requested, draining in-flight work");
        on_signal.shutdown().await;
    })
    .await
    .context("serving the web adapter")?;

    info!("Sentinel server stopped");
    Ok(())
}
