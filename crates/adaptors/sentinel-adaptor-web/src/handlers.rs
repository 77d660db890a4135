//! Endpoint handlers for the web adapter

use crate::sse::to_sse_event;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, BoxStream, StreamExt};
use sentinel_core::fanout::with_keepalive;
use sentinel_core::orchestrator::ScanEventReceiver;
use sentinel_core::types::ScanEvent;
use sentinel_core::SentinelError;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

type EventStream = Sse<BoxStream<'static, Result<Event, Infallible>>>;

/// Error wrapper mapping domain failures to HTTP statuses
pub(crate) struct ApiError(SentinelError);

impl From<SentinelError> for ApiError {
    fn from(e: SentinelError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SentinelError::PolicyDenied(_) => StatusCode::FORBIDDEN,
            SentinelError::NotFound(_) => StatusCode::NOT_FOUND,
            SentinelError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn scan_sse(
    state: &AppState,
    scan_id: String,
    replay: Vec<ScanEvent>,
    rx: ScanEventReceiver,
) -> EventStream {
    // Claiming the slot preempts any previous subscriber of this scan
    let mut slot = state.registry.claim(&scan_id);
    let interval = state.orchestrator.config().keepalive_interval;
    let live = ReceiverStream::new(with_keepalive(scan_id, rx, interval));
    let stop = Box::pin(async move { slot.preempted().await });

    let frames = stream::iter(replay)
        .chain(live)
        .map(|event| Ok(to_sse_event(&event)))
        .take_until(stop)
        .boxed();
    Sse::new(frames)
}

/// Start a scan over every space and stream it live
pub(crate) async fn stream_all_handler(State(state): State<AppState>) -> EventStream {
    let (scan_id, rx) = state.orchestrator.stream_all_spaces();
    info!("Started multi-space scan {}", scan_id);
    scan_sse(&state, scan_id, Vec::new(), rx)
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamParams {
    /// Restrict the scan to pages modified since this instant
    since: Option<chrono::DateTime<chrono::Utc>>,
}

/// Start a scan of one space and stream it live
///
/// With `?since=<rfc3339>` only pages modified after the cutoff are scanned.
pub(crate) async fn stream_space_handler(
    State(state): State<AppState>,
    Path(space_key): Path<String>,
    Query(params): Query<StreamParams>,
) -> EventStream {
    let (scan_id, rx) = match params.since {
        Some(since) => state.orchestrator.stream_space_since(&space_key, since),
        None => state.orchestrator.stream_space(&space_key),
    };
    info!("Started scan {} of space {}", scan_id, space_key);
    scan_sse(&state, scan_id, Vec::new(), rx)
}

/// Resume a previous scan: replay its stored events, then stream the rest
pub(crate) async fn resume_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<EventStream, ApiError> {
    let replay = state.query.replay_events(&scan_id).await?;
    info!(
        "Resuming scan {} with {} stored events to replay",
        scan_id,
        replay.len()
    );
    let rx = state.orchestrator.resume_all_spaces(&scan_id);
    Ok(scan_sse(&state, scan_id, replay, rx))
}

/// Pause every non-terminal space of a scan
pub(crate) async fn pause_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.orchestrator.checkpoints().pause_scan(&scan_id).await?;
    info!("Paused scan {}", scan_id);
    Ok(Json(json!({ "scanId": scan_id, "status": "PAUSED" })))
}

/// Metadata of the most recent scan
pub(crate) async fn last_scan_handler(
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    match state.query.last_scan().await? {
        Some(summary) => Ok(Json(summary).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no scan recorded" })),
        )
            .into_response()),
    }
}

/// Per-space statuses of a scan
pub(crate) async fn space_statuses_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<Vec<sentinel_core::SpaceStatusSummary>>, ApiError> {
    Ok(Json(state.query.space_statuses(&scan_id).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RevealParams {
    purpose: Option<String>,
}

/// Reveal sensitive values of a page; policy-checked and audit-logged
pub(crate) async fn reveal_handler(
    State(state): State<AppState>,
    Path((scan_id, page_id)): Path<(String, String)>,
    Query(params): Query<RevealParams>,
) -> Result<Json<Vec<sentinel_core::ScanResult>>, ApiError> {
    let purpose = params.purpose.as_deref().unwrap_or("reveal");
    let results = state
        .query
        .reveal_page_items(&scan_id, &page_id, purpose)
        .await?;
    Ok(Json(results))
}

/// Connectivity of the content source and the stores
pub(crate) async fn health_handler(State(state): State<AppState>) -> Response {
    let source = state.orchestrator.source().clone();
    state
        .health
        .check("content_source", async move { source.probe().await })
        .await;
    let query = state.query.clone();
    state
        .health
        .check("event_store", async move { query.last_scan().await })
        .await;

    let overall = state.health.overall_health();
    let checks: Vec<serde_json::Value> = state
        .health
        .get_all_checks()
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "status": c.status.as_str(),
                "responseTimeMs": c.response_time_ms,
            })
        })
        .collect();

    let status = match overall {
        sentinel_core::resilience::HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (
        status,
        Json(json!({ "status": overall.as_str(), "checks": checks })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use crate::{build_router, AppState, WebConfig};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sentinel_core::checkpoint::CheckpointManager;
    use sentinel_core::testing::{
        FixtureDetector, FixtureExtractor, FixtureSource, InMemoryAuditStore,
        InMemoryCheckpointStore, InMemoryConfigStore, InMemoryEventStore, PlainCipher,
    };
    use sentinel_core::types::{Checkpoint, ScanStatus};
    use sentinel_core::{
        AuditService, ScanConfig, ScanOrchestrator, ScanQueryService,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> (AppState, CheckpointManager) {
        let source = Arc::new(
            FixtureSource::new("http://example/")
                .with_space("SP", "Space")
                .with_page("SP", "p-1", "One", "body"),
        );
        let events = Arc::new(InMemoryEventStore::new());
        let checkpoints = CheckpointManager::new(Arc::new(InMemoryCheckpointStore::new()));
        let audit = AuditService::new(Arc::new(InMemoryAuditStore::new()), 730);
        let cipher = Arc::new(PlainCipher);
        let config_store = Arc::new(InMemoryConfigStore::new());

        let orchestrator = Arc::new(ScanOrchestrator::new(
            source,
            Arc::new(FixtureExtractor::default()),
            Arc::new(FixtureDetector::empty()),
            events.clone(),
            checkpoints.clone(),
            cipher.clone(),
            ScanConfig::default(),
        ));
        let query = Arc::new(ScanQueryService::new(
            events,
            checkpoints.clone(),
            audit,
            cipher,
            config_store,
        ));
        (AppState::new(orchestrator, query), checkpoints)
    }

    fn router(state: AppState) -> axum::Router {
        build_router(state, &WebConfig::default())
    }

    #[tokio::test]
    async fn test_health_is_ok_with_reachable_source() {
        let (state, _) = state();
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_pause_transitions_running_checkpoints() {
        let (state, checkpoints) = state();
        checkpoints
            .save(Checkpoint::running("s1", "SP"))
            .await
            .unwrap();

        let response = router(state)
            .oneshot(
                Request::post("/api/scan/s1/pause")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let paused = checkpoints
            .find_by_scan_and_space("s1", "SP")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paused.status, ScanStatus::Paused);
    }

    #[tokio::test]
    async fn test_reveal_denied_without_policy() {
        let (state, _) = state();
        let response = router(state)
            .oneshot(
                Request::post("/api/scan/s1/pages/p-1/reveal?purpose=test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_last_scan_is_404_when_empty() {
        let (state, _) = state();
        let response = router(state)
            .oneshot(Request::get("/api/scan/last").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_space_statuses_empty_for_unknown_scan() {
        let (state, _) = state();
        let response = router(state)
            .oneshot(
                Request::get("/api/scan/unknown/spaces")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
        assert!(parsed.is_empty());
    }
}
