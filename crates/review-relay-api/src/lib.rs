//! # Review-Relay HTTP API
//!
//! HTTP server for receiving payment-provider webhooks and feeding them into
//! the review-request pipeline.
//!
//! This service provides:
//! - Per-provider webhook endpoints with signature verification
//! - Health check endpoints
//! - A transaction audit listing endpoint
//! - Prometheus metrics
//!
//! ## Endpoints
//!
//! | Method | Path                   | Purpose                          |
//! |--------|------------------------|----------------------------------|
//! | POST   | `/webhooks/{provider}` | Receive a webhook delivery       |
//! | GET    | `/health`              | Liveness check                   |
//! | GET    | `/ready`               | Readiness check                  |
//! | GET    | `/metrics`             | Prometheus metrics               |
//! | GET    | `/api/transactions`    | Recent transaction audit records |
//!
//! Webhook deliveries are acknowledged as soon as they verify and parse.
//! Normalization, merchant resolution, and dispatch run on a detached task,
//! so provider retry timers never see pipeline latency.

// Public modules
pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;


use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use prometheus::TextEncoder;
use review_relay_core::{
    Provider, Timestamp, TransactionLogStore, TransactionPipeline, VerifierRegistry, WebhookEvent,
};
use serde_json::Value;
use std::{str::FromStr, sync::Arc, time::Instant};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

pub use config::{
    LoggingConfig, PipelineConfig, ProvidersConfig, ServerConfig, ServiceConfig, ShopifyConfig,
    SquareConfig, StripeConfig,
};
pub use errors::{ConfigError, ServiceError, WebhookRejection};
pub use metrics::ServiceMetrics;
pub use responses::{
    DefaultHealthChecker, HealthCheckResult, HealthChecker, HealthResponse, HealthStatus,
    ReadinessResponse, TransactionListParams, TransactionListResponse, WebhookAck,
};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Signature verifiers keyed by provider
    pub verifiers: Arc<VerifierRegistry>,

    /// Pipeline that turns verified deliveries into review requests
    pub pipeline: Arc<TransactionPipeline>,

    /// Audit log store backing the transaction listing endpoint
    pub log_store: Arc<dyn TransactionLogStore>,

    /// Health checker for system monitoring
    pub health_checker: Arc<dyn HealthChecker>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        verifiers: Arc<VerifierRegistry>,
        pipeline: Arc<TransactionPipeline>,
        log_store: Arc<dyn TransactionLogStore>,
        health_checker: Arc<dyn HealthChecker>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config,
            verifiers,
            pipeline,
            log_store,
            health_checker,
            metrics,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_body_size;

    let webhook_routes = Router::new().route("/webhooks/{provider}", post(handle_webhook));

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    let api_routes = Router::new().route("/api/transactions", get(list_transactions));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(api_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    verifiers: Arc<VerifierRegistry>,
    pipeline: Arc<TransactionPipeline>,
    log_store: Arc<dyn TransactionLogStore>,
    health_checker: Arc<dyn HealthChecker>,
) -> Result<(), ServiceError> {
    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;

    let shutdown_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout_seconds);
    let address = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::new(config, verifiers, pipeline, log_store, health_checker, metrics);
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", address);

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
        }
    };

    // In-flight requests complete before the listener closes; detached
    // pipeline tasks race the process exit.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle a webhook delivery from a payment provider.
///
/// Only the fast path runs inside the request:
/// 1. Resolve the provider from the URL segment
/// 2. Verify the signature against the raw body (fail closed)
/// 3. Parse the payload and extract the event identity
/// 4. Return HTTP 200 immediately
///
/// Everything after the acknowledgement happens in [`process_delivery`] on a
/// detached task.
#[instrument(skip(state, headers, body), fields(provider = %provider))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookRejection> {
    let provider_label = Provider::from_str(&provider).map_or("unknown", |p| p.as_str());
    state.metrics.record_received(provider_label);

    match accept_delivery(&state, &provider, &headers, &body) {
        Ok(event) => {
            info!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                correlation_id = %event.correlation_id,
                "Accepted webhook delivery"
            );

            let pipeline = Arc::clone(&state.pipeline);
            let metrics = Arc::clone(&state.metrics);
            tokio::spawn(async move {
                process_delivery(pipeline, metrics, event).await;
            });

            Ok(Json(WebhookAck { received: true }))
        }
        Err(rejection) => {
            warn!(error = %rejection, "Rejected webhook delivery");
            state
                .metrics
                .record_rejected(provider_label, rejection.reason_label());
            Err(rejection)
        }
    }
}

/// Verify and parse a delivery without touching any store.
///
/// Everything here is synchronous. Rejections happen before the event id is
/// claimed, so a provider retry after a rejection is processed normally.
fn accept_delivery(
    state: &AppState,
    provider_segment: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<WebhookEvent, WebhookRejection> {
    let provider =
        Provider::from_str(provider_segment).map_err(|_| WebhookRejection::UnknownProvider {
            provider: provider_segment.to_string(),
        })?;

    let verifier = state
        .verifiers
        .get(provider)
        .ok_or_else(|| WebhookRejection::NotConfigured {
            provider: provider.to_string(),
        })?;

    let header_name = verifier.expected_header();
    let signature = headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookRejection::MissingSignature {
            header: header_name,
        })?;

    // The specific verification failure is logged here; the HTTP response
    // stays generic regardless of which check failed
    verifier.verify(body, signature).map_err(|error| {
        warn!(provider = %provider, error = %error, "Webhook signature rejected");
        WebhookRejection::SignatureRejected
    })?;

    let payload: Value =
        serde_json::from_slice(body).map_err(|error| WebhookRejection::MalformedPayload {
            message: error.to_string(),
        })?;

    extract_event(provider, headers, payload)
}

/// Pull the provider's event identity out of a verified delivery.
///
/// Stripe and Square carry identity in the payload envelope. Shopify carries
/// it in headers, with the shop domain doubling as the merchant account hint.
fn extract_event(
    provider: Provider,
    headers: &HeaderMap,
    payload: Value,
) -> Result<WebhookEvent, WebhookRejection> {
    match provider {
        Provider::Stripe => {
            let event_id = payload_str(&payload, "id")
                .ok_or(WebhookRejection::MissingEventIdentity { field: "id" })?;
            let event_type = payload_str(&payload, "type")
                .ok_or(WebhookRejection::MissingEventIdentity { field: "type" })?;
            Ok(WebhookEvent::new(provider, event_id, event_type, payload))
        }
        Provider::Square => {
            let event_id = payload_str(&payload, "event_id")
                .ok_or(WebhookRejection::MissingEventIdentity { field: "event_id" })?;
            let event_type = payload_str(&payload, "type")
                .ok_or(WebhookRejection::MissingEventIdentity { field: "type" })?;
            Ok(WebhookEvent::new(provider, event_id, event_type, payload))
        }
        Provider::Shopify => {
            let event_id = header_str(headers, "x-shopify-webhook-id").ok_or(
                WebhookRejection::MissingEventIdentity {
                    field: "X-Shopify-Webhook-Id",
                },
            )?;
            let event_type = header_str(headers, "x-shopify-topic").ok_or(
                WebhookRejection::MissingEventIdentity {
                    field: "X-Shopify-Topic",
                },
            )?;

            let event = WebhookEvent::new(provider, event_id, event_type, payload);
            Ok(match header_str(headers, "x-shopify-shop-domain") {
                Some(domain) => event.with_account_hint(domain),
                None => event,
            })
        }
    }
}

fn payload_str(payload: &Value, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Run the pipeline for an accepted delivery on a background task.
///
/// The provider already holds a 200 and will not retry, so failures here are
/// terminal for the delivery; they are preserved in logs and metrics.
async fn process_delivery(
    pipeline: Arc<TransactionPipeline>,
    metrics: Arc<ServiceMetrics>,
    event: WebhookEvent,
) {
    let provider = event.provider;
    let started = Instant::now();

    match pipeline.process(&event).await {
        Ok(outcome) => metrics.record_outcome(provider, &outcome),
        Err(error) => {
            error!(
                provider = %provider,
                event_id = %event.event_id,
                correlation_id = %event.correlation_id,
                error = %error,
                "Webhook processing failed after acknowledgement"
            );
            metrics.record_failure(provider);
        }
    }

    metrics.record_processing_duration(provider, started.elapsed());
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic health check endpoint
#[instrument(skip(state))]
async fn handle_health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let status = state.health_checker.check_health().await;

    let response = HealthResponse {
        status: if status.is_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: Timestamp::now(),
        checks: status.checks,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if status.is_healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Readiness check for load balancers
#[instrument(skip(state))]
async fn handle_readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let is_ready = state.health_checker.check_readiness().await;

    let response = ReadinessResponse {
        ready: is_ready,
        timestamp: Timestamp::now(),
    };

    if is_ready {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// List recent transaction audit records, newest first
#[instrument(skip(state))]
async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<TransactionListParams>,
) -> Result<Json<TransactionListResponse>, StatusCode> {
    let limit = params.effective_limit();

    let transactions = state.log_store.recent(limit).await.map_err(|error| {
        error!(error = %error, "Failed to read transaction log");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let count = transactions.len();
    Ok(Json(TransactionListResponse {
        transactions,
        count,
    }))
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(_state): State<AppState>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode_to_string(&metric_families)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
