//! Admission webhook server.
//!
//! Provides HTTPS endpoints for Kubernetes admission webhooks:
//! - `POST /mutate` - MutatingWebhookConfiguration target
//! - `POST /validate` - ValidatingWebhookConfiguration target
//! - `GET /healthz` - Liveness on the TLS port
//!
//! Both admission endpoints accept any object kind and hand it to the
//! [`DecisionEngine`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use thiserror::Error;
use tracing::{debug, error, info};

use super::decision::{Decision, DecisionEngine, DecisionRequest, Intent};
use crate::config::ServerConfig;
use crate::health::HealthState;
use crate::namespace::NamespaceLookup;

/// Namespace assumed when neither the request nor the object names one
const FALLBACK_NAMESPACE: &str = "default";

/// Create the webhook router
pub fn create_webhook_router<L: NamespaceLookup>(engine: Arc<DecisionEngine<L>>) -> Router {
    Router::new()
        .route("/mutate", post(mutate::<L>))
        .route("/validate", post(validate::<L>))
        .route("/healthz", get(healthz))
        .with_state(engine)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn mutate<L: NamespaceLookup>(
    State(engine): State<Arc<DecisionEngine<L>>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    admit(&engine, Intent::Mutate, review).await
}

async fn validate<L: NamespaceLookup>(
    State(engine): State<Arc<DecisionEngine<L>>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    admit(&engine, Intent::Validate, review).await
}

/// Shared handler body for both intents
async fn admit<L: NamespaceLookup>(
    engine: &DecisionEngine<L>,
    intent: Intent,
    review: AdmissionReview<DynamicObject>,
) -> (StatusCode, Json<AdmissionReview<DynamicObject>>) {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            return (
                StatusCode::BAD_REQUEST,
                Json(AdmissionResponse::invalid(e.to_string()).into_review()),
            );
        }
    };

    let uid = &request.uid;
    debug!(
        uid = %uid,
        intent = %intent,
        operation = ?request.operation,
        kind = %request.kind.kind,
        namespace = ?request.namespace,
        name = ?request.name,
        "Processing admission request"
    );

    if request.operation == Operation::Delete {
        debug!(uid = %uid, "Admission request allowed (DELETE)");
        return allow(&request);
    }
    let Some(object) = &request.object else {
        debug!(uid = %uid, "Admission request allowed (no object)");
        return allow(&request);
    };

    let namespace = request
        .namespace
        .clone()
        .or_else(|| object.metadata.namespace.clone())
        .unwrap_or_else(|| FALLBACK_NAMESPACE.to_string());
    let raw = match serde_json::to_vec(object) {
        Ok(raw) => raw,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize admission object");
            return (
                StatusCode::OK,
                Json(AdmissionResponse::from(&request).deny(e.to_string()).into_review()),
            );
        }
    };

    let decision = engine
        .decide(&DecisionRequest {
            intent,
            kind: request.kind.kind.clone(),
            namespace,
            object: raw,
        })
        .await;

    let response = match decision {
        Decision::Allow => AdmissionResponse::from(&request),
        Decision::Patch(patch) => match AdmissionResponse::from(&request).with_patch(patch) {
            Ok(response) => response,
            Err(e) => {
                error!(uid = %uid, error = %e, "Failed to attach patch");
                AdmissionResponse::from(&request).deny(e.to_string())
            }
        },
        Decision::Deny(message) => AdmissionResponse::from(&request).deny(message),
    };
    info!(uid = %uid, intent = %intent, allowed = response.allowed, "Admission request decided");
    (StatusCode::OK, Json(response.into_review()))
}

fn allow(
    request: &AdmissionRequest<DynamicObject>,
) -> (StatusCode, Json<AdmissionReview<DynamicObject>>) {
    (
        StatusCode::OK,
        Json(AdmissionResponse::from(request).into_review()),
    )
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS on `0.0.0.0:<webhook_port>`.
///
/// Marks the engine's health state ready once the listener is bound.
pub async fn run_webhook_server<L: NamespaceLookup>(
    engine: Arc<DecisionEngine<L>>,
    server: &ServerConfig,
) -> Result<(), WebhookError> {
    let tls = RustlsConfig::from_pem_file(
        PathBuf::from(&server.tls_cert_path),
        PathBuf::from(&server.tls_key_path),
    )
    .await
    .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let handle = Handle::new();
    if let Some(health) = engine.health().cloned() {
        tokio::spawn(mark_ready_when_bound(handle.clone(), health));
    }
    let app = create_webhook_router(engine);

    let addr = SocketAddr::from(([0, 0, 0, 0], server.webhook_port));
    info!(port = server.webhook_port, "Starting webhook server with TLS");

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}

/// Flip readiness once the listener reports a bound address. A failed bind
/// resolves to `None` and leaves the state not ready.
async fn mark_ready_when_bound(handle: Handle, health: Arc<HealthState>) {
    if let Some(addr) = handle.listening().await {
        info!(%addr, "Webhook listener bound");
        health.set_ready(true).await;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::namespace::StaticNamespaceLookup;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn router() -> Router {
        let lookup = StaticNamespaceLookup::new()
            .with_namespace("free5gc", [("5g.kkarczmarek.dev/admission-webhook", "true")]);
        create_webhook_router(Arc::new(DecisionEngine::new(
            lookup,
            Arc::new(Config::default()),
        )))
    }

    fn review(operation: &str, namespace: &str, object: Value) -> Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": { "group": "", "version": "v1", "kind": "Pod" },
                "resource": { "group": "", "version": "v1", "resource": "pods" },
                "requestKind": { "group": "", "version": "v1", "kind": "Pod" },
                "requestResource": { "group": "", "version": "v1", "resource": "pods" },
                "name": "app",
                "namespace": namespace,
                "operation": operation,
                "userInfo": { "username": "admin" },
                "object": object,
                "oldObject": null,
                "dryRun": false,
                "options": null
            }
        })
    }

    fn pod(image: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "app", "namespace": "free5gc" },
            "spec": { "containers": [{ "name": "app", "image": image }] }
        })
    }

    async fn post(path: &str, body: &Value) -> (StatusCode, Value) {
        let response = router()
            .oneshot(
                Request::post(path)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_mutate_returns_json_patch() {
        let (status, body) = post("/mutate", &review("CREATE", "free5gc", pod("docker.io/app:1.0"))).await;
        assert_eq!(status, StatusCode::OK);
        let response = &body["response"];
        assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(response["allowed"], true);
        assert_eq!(response["patchType"], "JSONPatch");

        let bytes: Vec<u8> = response["patch"]
            .as_array()
            .expect("patch is a byte array")
            .iter()
            .map(|b| b.as_u64().unwrap() as u8)
            .collect();
        let patch: json_patch::Patch = serde_json::from_slice(&bytes).unwrap();
        let json_patch::PatchOperation::Add(first) = &patch.0[0] else {
            panic!("expected an add, got {:?}", patch.0[0]);
        };
        assert_eq!(first.path.to_string(), "/metadata/labels");
        assert_eq!(first.value, json!({}));
    }

    #[tokio::test]
    async fn test_validate_denies_with_message() {
        let (status, body) =
            post("/validate", &review("CREATE", "free5gc", pod("quay.io/app:latest"))).await;
        assert_eq!(status, StatusCode::OK);
        let response = &body["response"];
        assert_eq!(response["allowed"], false);
        let message = response["status"]["message"].as_str().unwrap();
        assert!(message.contains("quay.io"));
    }

    #[tokio::test]
    async fn test_delete_is_allowed() {
        let (_, body) = post("/validate", &review("DELETE", "free5gc", Value::Null)).await;
        assert_eq!(body["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn test_malformed_review_is_invalid() {
        let body = json!({ "apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview" });
        let (status, body) = post("/validate", &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn test_ready_once_listener_bound() {
        let handle = Handle::new();
        let health = Arc::new(HealthState::new());
        tokio::spawn(
            axum_server::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
                .handle(handle.clone())
                .serve(router().into_make_service()),
        );

        mark_ready_when_bound(handle.clone(), health.clone()).await;
        assert!(health.is_ready().await);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_not_ready_when_port_taken() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let handle = Handle::new();
        let health = Arc::new(HealthState::new());
        let serve = tokio::spawn(
            axum_server::bind(addr)
                .handle(handle.clone())
                .serve(router().into_make_service()),
        );

        mark_ready_when_bound(handle, health.clone()).await;
        assert!(!health.is_ready().await);
        assert!(serve.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
