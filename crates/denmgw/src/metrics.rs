//! Gateway observability: Prometheus metrics and liveness probes.
//!
//! Metric names carry a `denmgw_` prefix. The exporter serves `/metrics`
//! beside `/health` and `/ready` on its own listener, keeping the
//! operational surface off the public DENM port.

use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Records one `POST /denm` submission and its outcome
/// (`success`, `invalid_json` or `rejected`).
pub fn record_http_request(outcome: &'static str) {
    metrics::counter!("denmgw_http_requests_total", "outcome" => outcome).increment(1);
}

/// Records a DENM handed to the broker, with the time the publish took
/// from envelope parse to link settlement.
pub fn record_denm_published(elapsed: Duration) {
    metrics::counter!("denmgw_denm_published_total").increment(1);
    metrics::histogram!("denmgw_publish_duration_seconds").record(elapsed.as_secs_f64());
}

/// Records a DENM decoded from the broker and fanned out.
pub fn record_denm_received() {
    metrics::counter!("denmgw_denm_received_total").increment(1);
}

/// Records a message thrown away, labeled with why
/// (`outbound`, `decode` or `non_binary`).
pub fn record_denm_discarded(reason: &'static str) {
    metrics::counter!("denmgw_denm_discarded_total", "reason" => reason).increment(1);
}

/// Publishes the current number of open WebSocket observers.
#[allow(clippy::cast_precision_loss)]
pub fn update_ws_observers(count: usize) {
    metrics::gauge!("denmgw_ws_observers").set(count as f64);
}

/// Flag the startup code flips once the broker links are attached;
/// `/ready` reports it.
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    /// Creates a flag that starts out not ready.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the readiness state.
    pub fn mark(&self, ready: bool) {
        self.0.store(ready, Ordering::Relaxed);
    }

    /// Whether the gateway has finished starting up.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Serves `/metrics`, `/health` and `/ready` until the process exits.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed or the listener
/// cannot be bound.
pub async fn serve_metrics(addr: SocketAddr, readiness: Readiness) -> anyhow::Result<()> {
    let recorder = PrometheusBuilder::new().install_recorder()?;

    let router = Router::new()
        .route(
            "/metrics",
            get(move || std::future::ready(recorder.render())),
        )
        .route(
            "/health",
            get(|| async { Json(json!({"status": "healthy"})) }),
        )
        .route(
            "/ready",
            get(move || {
                let readiness = readiness.clone();
                async move {
                    let ready = readiness.is_ready();
                    let code = if ready {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    (code, Json(json!({"ready": ready})))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics endpoint on {addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
