//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the webhook listener is up)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Labels for admission request metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RequestLabels {
    pub intent: String,
    pub outcome: String,
}

impl EncodeLabelSet for RequestLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("intent", self.intent.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-intent metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct IntentLabels {
    pub intent: String,
}

impl EncodeLabelSet for IntentLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("intent", self.intent.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for violation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ViolationLabels {
    pub kind: String,
}

impl EncodeLabelSet for ViolationLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the admission engine
pub struct Metrics {
    /// Decisions by intent and outcome
    pub requests_total: Family<RequestLabels, Counter>,
    /// Validation violations by kind
    pub violations_total: Family<ViolationLabels, Counter>,
    /// Patch operations emitted
    pub patch_operations_total: Counter,
    /// Decision latency
    pub decision_duration_seconds: Family<IntentLabels, Histogram>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "nfadmission_requests",
            "Total number of admission decisions",
            requests_total.clone(),
        );

        let violations_total = Family::<ViolationLabels, Counter>::default();
        registry.register(
            "nfadmission_violations",
            "Total number of validation violations",
            violations_total.clone(),
        );

        let patch_operations_total = Counter::default();
        registry.register(
            "nfadmission_patch_operations",
            "Total number of JSON patch operations emitted",
            patch_operations_total.clone(),
        );

        let decision_duration_seconds =
            Family::<IntentLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.0001, 2.0, 15))
            });
        registry.register(
            "nfadmission_decision_duration_seconds",
            "Duration of admission decisions in seconds",
            decision_duration_seconds.clone(),
        );

        Self {
            requests_total,
            violations_total,
            patch_operations_total,
            decision_duration_seconds,
            registry,
        }
    }

    /// Record a finished decision
    pub fn record_decision(&self, intent: &str, outcome: &str, duration_secs: f64) {
        self.requests_total
            .get_or_create(&RequestLabels {
                intent: intent.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.decision_duration_seconds
            .get_or_create(&IntentLabels {
                intent: intent.to_string(),
            })
            .observe(duration_secs);
    }

    /// Record one validation violation
    pub fn record_violation(&self, kind: &str) {
        self.violations_total
            .get_or_create(&ViolationLabels {
                kind: kind.to_string(),
            })
            .inc();
    }

    /// Record the size of an emitted patch
    pub fn record_patch(&self, operations: usize) {
        self.patch_operations_total
            .inc_by(u64::try_from(operations).unwrap_or(u64::MAX));
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the webhook server is accepting requests
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the webhook listener is bound.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the plain-HTTP health server on `0.0.0.0:<port>`
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
