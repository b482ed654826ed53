//! HTTP server for Alertmanager webhooks.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::HookConfig;
use crate::dedup::within_window;
use crate::dispatch::SuccessCriterion;
use crate::error::PayloadError;
use crate::pipeline::{BatchSummary, WebhookPipeline};

/// Server state shared across handlers.
pub struct ServerState {
    /// Alert processing pipeline
    pub pipeline: WebhookPipeline,
    /// Configuration
    pub config: HookConfig,
}

impl ServerState {
    /// Build the production state from configuration.
    pub async fn from_config(config: HookConfig) -> Self {
        let pipeline = WebhookPipeline::from_config(&config).await;
        Self { pipeline, config }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the server fails to bind or serve.
pub async fn run_server(state: Arc<ServerState>, addr: &str) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Heap dump webhook listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

// ============================================================================
// Request/Response types
// ============================================================================

/// Webhook response body.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WebhookResponse {
    /// Batch processed (individual alerts may have been skipped)
    Success(BatchSummary),
    /// Request rejected
    Error { message: String },
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Overall server status.
#[derive(Debug, Serialize)]
struct ServerStatus {
    status: &'static str,
    alert_name: String,
    namespace: String,
    dedup_window_secs: u64,
    success_criterion: SuccessCriterion,
    handled: Vec<HandledEntry>,
}

/// One entry of the dedup record.
#[derive(Debug, Serialize)]
struct HandledEntry {
    key: String,
    last_processed: DateTime<Utc>,
    suppressed: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Alertmanager webhook handler.
async fn webhook_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();

    async move {
        let payload = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(e) => return payload_error(PayloadError::InvalidJson(e)),
        };

        match state.pipeline.handle(payload).await {
            Ok(summary) => (StatusCode::OK, Json(WebhookResponse::Success(summary))).into_response(),
            Err(e) => payload_error(e),
        }
    }
    .instrument(info_span!("webhook", %request_id))
    .await
}

fn payload_error(e: PayloadError) -> Response {
    warn!(error = %e, "Rejecting webhook payload");
    (
        StatusCode::BAD_REQUEST,
        Json(WebhookResponse::Error {
            message: e.to_string(),
        }),
    )
        .into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(ToString::to_string))
        .unwrap_or_else(|| "internal error".to_string());
    error!(%message, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(WebhookResponse::Error { message }),
    )
        .into_response()
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Server status handler.
async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let dedup = state.pipeline.dedup();
    let now = Utc::now();
    let handled = dedup
        .snapshot()
        .await
        .into_iter()
        .map(|(key, last_processed)| HandledEntry {
            key: key.to_string(),
            last_processed,
            suppressed: within_window(last_processed, now, dedup.window()),
        })
        .collect();

    Json(ServerStatus {
        status: "running",
        alert_name: state.config.alert_name.clone(),
        namespace: state.config.namespace.clone(),
        dedup_window_secs: state.config.dedup_window_secs,
        success_criterion: state.config.success_criterion,
        handled,
    })
}
