//! Applying a mutation patch and deciding again yields no further changes.

use nf_admission::resource::WorkloadKind;
use nf_admission::{Config, Decision, Intent};
use serde_json::{Value, json};

use crate::common::fixtures::{
    WorkloadBuilder, apply, compliant_container, container, engine, key, request,
};

async fn assert_converges(namespace: &str, object: Value) {
    let engine = engine(Config::default());
    let first = engine
        .decide(&request(Intent::Mutate, namespace, &object))
        .await;
    assert!(
        matches!(first, Decision::Patch(_)),
        "expected a patch, got {first:?}"
    );

    let patched = apply(&object, &first);
    let second = engine
        .decide(&request(Intent::Mutate, namespace, &patched))
        .await;
    assert_eq!(second, Decision::Allow, "second pass on {patched}");
}

#[tokio::test]
async fn test_bare_pod_in_project_namespace() {
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "amf")
        .annotation(&key("n6-cidr"), "10.100.10.0/24")
        .container(container("amf", "ghcr.io/free5gc/amf:v3.4.0"))
        .build();
    assert_converges("free5gc", pod).await;
}

#[tokio::test]
async fn test_upf_with_sidecar_and_existing_volumes() {
    let upf = WorkloadBuilder::new(WorkloadKind::Deployment, "upf")
        .label("nf", "upf")
        .annotation(&key("tcpdump-enabled"), "true")
        .annotation(&key("slice-id"), "urllc-7")
        .volume(json!({ "name": "config", "configMap": { "name": "upf-config" } }))
        .container(json!({
            "name": "upf",
            "image": "ghcr.io/free5gc/upf:v3.4.0",
            "ports": [{ "name": "gtpu", "containerPort": 2152, "protocol": "UDP" }],
        }))
        .build();
    assert_converges("free5gc", upf).await;
}

#[tokio::test]
async fn test_cron_job_without_template_metadata() {
    let job = WorkloadBuilder::new(WorkloadKind::CronJob, "report")
        .without_template_metadata()
        .container(container("report", "docker.io/report:2"))
        .build();
    assert_converges("tenant", job).await;
}

#[tokio::test]
async fn test_partial_security_and_resources() {
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "smf")
        .label("app", "smf")
        .container(json!({
            "name": "smf",
            "image": "ghcr.io/free5gc/smf:v3.4.0",
            "securityContext": { "privileged": true, "seccompProfile": { "type": "" } },
            "resources": {
                "requests": { "cpu": "0", "memory": "1Gi" },
                "limits": { "cpu": "20m" },
            },
        }))
        .init_container(compliant_container("init", "ghcr.io/free5gc/init:v1"))
        .build();
    assert_converges("tenant", pod).await;
}
