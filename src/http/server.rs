//! Operational HTTP endpoints.
//!
//! # Responsibilities
//! - Expose the cached health report and breaker snapshots, read-only
//! - Wire up middleware (timeout, tracing)
//! - Serve with graceful shutdown
//!
//! # Endpoints
//! - `GET /health` — aggregate status + per-dependency records + breakers
//! - `GET /breakers` — all breaker snapshots
//! - `GET /breakers/{name}` — one breaker snapshot, 404 if unknown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::ListenerConfig;
use crate::health::aggregator::{DependencyHealthRecord, HealthAggregator, OverallStatus};
use crate::resilience::circuit_breaker::BreakerSnapshot;
use crate::resilience::registry::BreakerRegistry;

/// State injected into ops handlers.
#[derive(Clone)]
struct OpsState {
    registry: Arc<BreakerRegistry>,
    aggregator: Arc<HealthAggregator>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: OverallStatus,
    dependencies: std::collections::BTreeMap<String, DependencyHealthRecord>,
    breakers: Vec<BreakerSnapshot>,
}

/// Read-only introspection server for dashboards and orchestration.
pub struct OpsServer {
    router: Router,
}

impl OpsServer {
    pub fn new(
        config: &ListenerConfig,
        registry: Arc<BreakerRegistry>,
        aggregator: Arc<HealthAggregator>,
    ) -> Self {
        let state = OpsState {
            registry,
            aggregator,
        };
        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/breakers", get(breakers_handler))
            .route("/breakers/{name}", get(breaker_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.request_timeout_secs.max(1),
            )))
            .layer(TraceLayer::new_for_http());
        Self { router }
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Ops server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Ops server stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<OpsState>) -> Response {
    let report = state.aggregator.report();
    let status_code = match report.status {
        OverallStatus::Healthy | OverallStatus::Degraded => StatusCode::OK,
        OverallStatus::Unhealthy | OverallStatus::Unknown => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = HealthResponse {
        status: report.status,
        dependencies: report.dependencies,
        breakers: state.registry.snapshots(),
    };
    (status_code, Json(body)).into_response()
}

async fn breakers_handler(State(state): State<OpsState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.registry.snapshots())
}

async fn breaker_handler(
    State(state): State<OpsState>,
    Path(name): Path<String>,
) -> Response {
    match state.registry.get(&name) {
        Some(breaker) => Json(breaker.snapshot()).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown dependency").into_response(),
    }
}
