//! HTTP API for policy submission, workload status, health checks and
//! Prometheus metrics

use autoscaler_lib::{
    health::{ComponentStatus, HealthRegistry},
    models::{PolicyDescriptor, StatusReport},
    observability::{AutoscalerMetrics, StructuredLogger},
    registry::StatusRegistry,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: StatusRegistry,
    pub health_registry: HealthRegistry,
    pub metrics: AutoscalerMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        registry: StatusRegistry,
        health_registry: HealthRegistry,
        metrics: AutoscalerMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            registry,
            health_registry,
            metrics,
            logger,
        }
    }
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(error: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
}

/// Store a scaling policy, replacing any existing one for the same deployment
async fn set_policy(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PolicyDescriptor>, JsonRejection>,
) -> Response {
    let descriptor = match payload {
        Ok(Json(descriptor)) => descriptor,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected malformed policy");
            return bad_request(rejection.body_text());
        }
    };

    if descriptor.scale_down.cpu_percentage >= descriptor.scale_up.cpu_percentage {
        warn!(
            deployment = %descriptor.deployment.name,
            namespace = %descriptor.deployment.namespace,
            scale_up = descriptor.scale_up.cpu_percentage,
            scale_down = descriptor.scale_down.cpu_percentage,
            "Scale-down threshold is not below scale-up threshold"
        );
    }

    let policy = match descriptor.into_policy() {
        Ok(policy) => policy,
        Err(e) => {
            warn!(error = %e, "Rejected invalid policy");
            return bad_request(e.to_string());
        }
    };

    state
        .logger
        .log_policy_set(&policy.key, policy.min_replicas, policy.max_replicas);
    state.registry.set_policy(policy).await;
    state
        .metrics
        .set_policies_active(state.registry.policy_count().await as i64);

    (
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Policy set successfully",
        }),
    )
        .into_response()
}

/// Status of every workload the scheduler has sampled
async fn list_deployments(State(state): State<Arc<AppState>>) -> Json<Vec<StatusReport>> {
    Json(state.registry.list_statuses().await)
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/policies", post(set_policy))
        .route("/deployments", get(list_deployments))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
