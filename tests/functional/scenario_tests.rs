//! End-to-end admission scenarios.

use nf_admission::resource::WorkloadKind;
use nf_admission::{Config, Decision, Intent};
use serde_json::json;

use crate::common::fixtures::{
    WorkloadBuilder, adds, apply, compliant_container, container, engine, key, request,
};

// ============================================================================
// Mutation
// ============================================================================

/// A bare pod with no labels in the project namespace gets a label map and
/// both identity labels, in that order, before anything else.
#[tokio::test]
async fn test_bare_pod_in_project_namespace() {
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "amf")
        .container(compliant_container("amf", "ghcr.io/free5gc/amf:v3.4.0"))
        .build();

    let decision = engine(Config::default())
        .decide(&request(Intent::Mutate, "free5gc", &pod))
        .await;
    let ops = adds(decision.patch().expect("patch"));

    assert_eq!(
        ops,
        vec![
            ("/metadata/labels".to_string(), json!({})),
            ("/metadata/labels/project".to_string(), json!("free5gc")),
            (
                "/metadata/labels/app.kubernetes.io~1part-of".to_string(),
                json!("free5gc")
            ),
        ]
    );
}

/// Outside the project namespace an already hardened pod needs nothing.
#[tokio::test]
async fn test_compliant_pod_elsewhere_is_unchanged() {
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "web")
        .label("app", "web")
        .container(compliant_container("web", "docker.io/library/nginx:1.27"))
        .build();

    let decision = engine(Config::default())
        .decide(&request(Intent::Mutate, "tenant", &pod))
        .await;
    assert_eq!(decision, Decision::Allow);
}

/// A UPF deployment that opts in to packet capture with no volumes gets the
/// sidecar appended and a volume list holding only the capture volume.
#[tokio::test]
async fn test_upf_sidecar_creates_volume_list() {
    let upf = WorkloadBuilder::new(WorkloadKind::Deployment, "upf")
        .label("nf", "upf")
        .annotation(&key("tcpdump-enabled"), "true")
        .annotation(&key("slice-id"), "embb-01")
        .container(compliant_container("upf", "ghcr.io/free5gc/upf:v3.4.0"))
        .build();

    let decision = engine(Config::default())
        .decide(&request(Intent::Mutate, "tenant", &upf))
        .await;
    let ops = adds(decision.patch().expect("patch"));

    let sidecar = ops
        .iter()
        .find(|(path, _)| path == "/spec/template/spec/containers/-")
        .map(|(_, value)| value)
        .expect("sidecar appended");
    assert_eq!(sidecar["name"], "tcpdump-sidecar");
    assert_eq!(sidecar["image"], "docker.io/nicolaka/netshoot:v0.13");
    assert_eq!(sidecar["volumeMounts"][0]["mountPath"], "/data");
    assert_eq!(sidecar["env"], json!([{ "name": "UPF_SLICE_ID", "value": "embb-01" }]));

    let volumes = ops
        .iter()
        .find(|(path, _)| path == "/spec/template/spec/volumes")
        .map(|(_, value)| value)
        .expect("volume list created");
    assert_eq!(volumes, &json!([{ "name": "tcpdump-data", "emptyDir": {} }]));

    let patched = apply(&upf, &decision);
    let containers = patched["spec"]["template"]["spec"]["containers"]
        .as_array()
        .unwrap();
    assert_eq!(containers.len(), 2);
    assert_eq!(containers[1]["name"], "tcpdump-sidecar");
    let ports: Vec<_> = containers[0]["ports"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["containerPort"].as_i64().unwrap())
        .collect();
    assert_eq!(ports, vec![2152, 8805]);
}

/// Without the opt-in annotation a UPF only gets its ports.
#[tokio::test]
async fn test_upf_without_capture_opt_in() {
    let upf = WorkloadBuilder::new(WorkloadKind::StatefulSet, "upf")
        .label("app.kubernetes.io/name", "free5gc-upf")
        .annotation(&key("tcpdump-enabled"), "false")
        .container(compliant_container("upf", "ghcr.io/free5gc/upf:v3.4.0"))
        .build();

    let decision = engine(Config::default())
        .decide(&request(Intent::Mutate, "tenant", &upf))
        .await;
    let paths: Vec<_> = adds(decision.patch().expect("patch"))
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(paths, vec!["/spec/template/spec/containers/0/ports"]);
}

/// Slice annotations become labels in the project namespace, with CIDR
/// slashes made label-safe.
#[tokio::test]
async fn test_slice_annotations_become_labels() {
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "smf")
        .label("app", "smf")
        .annotation(&key("sst"), "1")
        .annotation(&key("ue-pool-cidr"), "10.60.0.0/16")
        .annotation(&key("dnn"), "")
        .container(compliant_container("smf", "ghcr.io/free5gc/smf:v3.4.0"))
        .build();

    let decision = engine(Config::default())
        .decide(&request(Intent::Mutate, "free5gc", &pod))
        .await;
    let patched = apply(&pod, &decision);
    let labels = &patched["metadata"]["labels"];
    assert_eq!(labels["5g.kkarczmarek.dev/sst"], "1");
    assert_eq!(labels["5g.kkarczmarek.dev/ue-pool-cidr"], "10.60.0.0-16");
    assert!(labels.get("5g.kkarczmarek.dev/dnn").is_none());
    assert_eq!(labels["project"], "free5gc");
}

/// Existing quantities are kept; only missing ones are filled.
#[tokio::test]
async fn test_defaulting_keeps_existing_values() {
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "nrf")
        .label("app", "nrf")
        .container(json!({
            "name": "nrf",
            "image": "ghcr.io/free5gc/nrf:v3.4.0",
            "resources": { "requests": { "cpu": "250m" } },
        }))
        .build();

    let decision = engine(Config::default())
        .decide(&request(Intent::Mutate, "tenant", &pod))
        .await;
    let patched = apply(&pod, &decision);
    let resources = &patched["spec"]["containers"][0]["resources"];
    assert_eq!(resources["requests"]["cpu"], "250m");
    assert_eq!(resources["requests"]["memory"], "128Mi");
    assert_eq!(resources["limits"]["cpu"], "500m");
    assert_eq!(resources["limits"]["memory"], "512Mi");
}

// ============================================================================
// Validation
// ============================================================================

/// `docker.io/app` with latest denial on and only docker.io allowed: exactly
/// one Forbidden for the missing tag.
#[tokio::test]
async fn test_untagged_image_single_violation() {
    let mut config = Config::default();
    config.allowed_registries = vec!["docker.io".to_string()];
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "app")
        .container(compliant_container("app", "docker.io/app"))
        .build();

    let decision = engine(config)
        .decide(&request(Intent::Validate, "tenant", &pod))
        .await;
    let message = decision.message().expect("denied");
    assert!(!message.starts_with('['), "single violation: {message}");
    assert!(message.starts_with("spec.containers[0].image: Forbidden"));
}

/// `n6@10.100.10.5/24` against data plane `10.100.50.0/24`: one Forbidden
/// naming the address.
#[tokio::test]
async fn test_nf_address_outside_data_plane() {
    let mut config = Config::default();
    config.data_plane_cidr = "10.100.50.0/24".parse().unwrap();
    let upf = WorkloadBuilder::new(WorkloadKind::Pod, "upf")
        .label("nf", "upf")
        .annotation(&key("5g-networks"), "n6@10.100.10.5/24")
        .container(compliant_container("upf", "ghcr.io/free5gc/upf:v3.4.0"))
        .build();

    let decision = engine(config)
        .decide(&request(Intent::Validate, "tenant", &upf))
        .await;
    let message = decision.message().expect("denied");
    assert!(!message.starts_with('['));
    assert!(message.contains("Forbidden"));
    assert!(message.contains("10.100.10.5"));
}

/// Independent problems are all reported, none short-circuits another.
#[tokio::test]
async fn test_all_violations_reported() {
    let pod = WorkloadBuilder::new(WorkloadKind::DaemonSet, "probe")
        .label("app.kubernetes.io/part-of", "free5gc")
        .annotation(&key("required-ports"), "9090")
        .host_network()
        .volume(json!({ "name": "host", "hostPath": { "path": "/var/run" } }))
        .container(json!({
            "name": "probe",
            "image": "quay.io/probe:latest",
            "securityContext": {
                "privileged": true,
                "capabilities": { "add": ["NET_ADMIN"] },
            },
        }))
        .build();

    let decision = engine(Config::default())
        .decide(&request(Intent::Validate, "tenant", &pod))
        .await;
    let message = decision.message().expect("denied");
    for expected in [
        "metadata.namespace: Forbidden",
        "spec.template.spec.hostNetwork: Forbidden",
        "spec.template.spec.containers[0].resources: Required value",
        "latest",
        "\"quay.io\"",
        "securityContext.privileged: Forbidden",
        "capabilities.add[0]: Forbidden",
        "spec.template.spec.volumes[0].hostPath: Forbidden",
        "required port 9090",
    ] {
        assert!(message.contains(expected), "{expected} missing from {message}");
    }
}

/// Namespace labels lift the capability and hostPath restrictions.
#[tokio::test]
async fn test_namespace_permissions() {
    let mut privileged = compliant_container("upf", "ghcr.io/free5gc/upf:v3.4.0");
    privileged["securityContext"]["capabilities"]["add"] = json!(["NET_ADMIN", "net_raw"]);
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "upf")
        .volume(json!({ "name": "tun", "hostPath": { "path": "/dev/net/tun" } }))
        .container(privileged)
        .build();

    let engine = engine(Config::default());
    let denied = engine
        .decide(&request(Intent::Validate, "tenant", &pod))
        .await;
    assert_eq!(denied.message().unwrap().matches("Forbidden").count(), 3);

    let allowed = engine.decide(&request(Intent::Validate, "lab", &pod)).await;
    assert_eq!(allowed, Decision::Allow);
}

/// Network attachment CIDRs are only checked when the resource opts in.
#[tokio::test]
async fn test_network_attachment_opt_in() {
    let networks = r#"[{"name":"n3net","ips":["10.10.3.5/24"]}]"#;
    let base = WorkloadBuilder::new(WorkloadKind::Pod, "upf")
        .annotation("k8s.v1.cni.cncf.io/networks", networks)
        .container(compliant_container("upf", "ghcr.io/free5gc/upf:v3.4.0"));

    let engine = engine(Config::default());
    let silent = engine
        .decide(&request(Intent::Validate, "tenant", &base.clone().build()))
        .await;
    assert_eq!(silent, Decision::Allow);

    let checked = base
        .annotation(&key("validate-networks"), "yes")
        .build();
    let decision = engine
        .decide(&request(Intent::Validate, "tenant", &checked))
        .await;
    assert_eq!(
        decision.message().unwrap(),
        "metadata.annotations[k8s.v1.cni.cncf.io/networks]: Forbidden: IP 10.10.3.5 not in 192.168.50.0/24"
    );
}

// ============================================================================
// Gate and failure handling
// ============================================================================

/// Ungated namespaces are left alone entirely, whatever the content.
#[tokio::test]
async fn test_ungated_namespace_is_pure() {
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "anything")
        .host_network()
        .container(container("x", "quay.io/x:latest"))
        .build();

    let engine = engine(Config::default());
    for intent in [Intent::Mutate, Intent::Validate] {
        let decision = engine.decide(&request(intent, "ungated", &pod)).await;
        assert_eq!(decision, Decision::Allow);
    }
}

/// An unknown namespace denies instead of skipping checks.
#[tokio::test]
async fn test_lookup_failure_fails_closed() {
    let pod = WorkloadBuilder::new(WorkloadKind::Pod, "app")
        .container(compliant_container("app", "docker.io/app:1.0"))
        .build();

    let engine = engine(Config::default());
    for intent in [Intent::Mutate, Intent::Validate] {
        let decision = engine.decide(&request(intent, "nowhere", &pod)).await;
        assert!(!decision.is_allowed());
        assert!(decision.message().unwrap().contains("nowhere"));
    }
}

/// Kinds outside the workload set pass through untouched.
#[tokio::test]
async fn test_unhandled_kind_passes() {
    let service = json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": "amf" },
        "spec": { "ports": [{ "port": 80 }] },
    });
    let decision = engine(Config::default())
        .decide(&request(Intent::Validate, "tenant", &service))
        .await;
    assert_eq!(decision, Decision::Allow);
}

/// A document that does not match its declared kind is denied.
#[tokio::test]
async fn test_malformed_workload_denied() {
    let broken = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": "broken" },
        "spec": { "selector": {}, "template": { "spec": { "containers": 7 } } },
    });
    let decision = engine(Config::default())
        .decide(&request(Intent::Mutate, "tenant", &broken))
        .await;
    assert!(decision.message().unwrap().starts_with("failed to decode Deployment"));
}
