//! HTTP gateway for pbar.
//!
//! The queue collaborator POSTs a batch of notifications to `/v1/batches`
//! and receives the identifiers it must redeliver. Also exposes health and
//! read-only session inspection.
//!
//! Built on Axum.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use pbar_core::model::{MilestoneSession, QueueBatch};
use pbar_core::outcome::BatchResponse;
use pbar_core::store::SessionStore;
use pbar_pipeline::BatchCoordinator;

/// Largest accepted request body (a full queue batch of maximum-size messages).
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub coordinator: Arc<BatchCoordinator>,
    pub sessions: Arc<dyn SessionStore>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/batches", post(batch_handler))
        .route("/v1/milestones/{milestone_id}/sessions", get(sessions_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// The coordinator and stores are built once by the caller and shared by
/// every request.
pub async fn start(
    config: &pbar_config::GatewayConfig,
    coordinator: Arc<BatchCoordinator>,
    sessions: Arc<dyn SessionStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(Arc::new(GatewayState {
        coordinator,
        sessions,
    }));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sessions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn health_handler(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.sessions.name().to_string();
    match state.sessions.count().await {
        Ok(count) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                version: env!("CARGO_PKG_VERSION"),
                store,
                sessions: Some(count),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check: store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    version: env!("CARGO_PKG_VERSION"),
                    store,
                    sessions: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Process a queue batch. Always 200: per-item failures travel in the body.
async fn batch_handler(
    State(state): State<SharedState>,
    Json(batch): Json<QueueBatch>,
) -> Json<BatchResponse> {
    info!(size = batch.records.len(), "Batch received");
    let report = state.coordinator.process_batch(batch.records).await;
    Json(report.to_response())
}

async fn sessions_handler(
    State(state): State<SharedState>,
    Path(milestone_id): Path<String>,
) -> Result<Json<Vec<MilestoneSession>>, (StatusCode, String)> {
    state
        .sessions
        .sessions_for_milestone(&milestone_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(milestone_id = %milestone_id, error = %e, "Session listing failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })
}
