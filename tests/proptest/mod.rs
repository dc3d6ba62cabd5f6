// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for nf-admission.
//!
//! Uses proptest to generate random workloads and verify decision invariants.

#[path = "../common/mod.rs"]
mod common;

use std::collections::BTreeMap;

use proptest::option;
use proptest::prelude::*;
use proptest::sample::select;
use serde_json::{Map, Value, json};

use nf_admission::resource::WorkloadKind;
use nf_admission::{Config, Decision, DecisionEngine, DecisionRequest, Intent, StaticNamespaceLookup};

use common::fixtures::{WorkloadBuilder, apply, compliant_container, engine, key, request};

const CPU: &[&str] = &["0", "20m", "100m", "1", "2500m"];
const MEMORY: &[&str] = &["0", "64Mi", "1Gi", "300M"];
const IMAGES: &[&str] = &[
    "ghcr.io/free5gc/upf:v3.4.0",
    "docker.io/app",
    "quay.io/probe:latest",
    "public.ecr.aws/x/y@sha256:abc",
];

fn decide(engine: &DecisionEngine<StaticNamespaceLookup>, request: &DecisionRequest) -> Decision {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(engine.decide(request))
}

/// Strategy for a `requests`/`limits` map with any subset of cpu and memory.
fn resource_list() -> impl Strategy<Value = Value> {
    (option::of(select(CPU)), option::of(select(MEMORY))).prop_map(|(cpu, memory)| {
        let mut list = Map::new();
        if let Some(cpu) = cpu {
            list.insert("cpu".to_string(), json!(cpu));
        }
        if let Some(memory) = memory {
            list.insert("memory".to_string(), json!(memory));
        }
        Value::Object(list)
    })
}

/// Strategy for a partially filled security context.
fn security_context() -> impl Strategy<Value = Value> {
    (
        option::of(any::<bool>()),
        option::of(any::<bool>()),
        option::of(option::of(prop_oneof![Just(json!([])), Just(json!(["ALL"]))])),
        option::of(select(&["", "RuntimeDefault"][..])),
    )
        .prop_map(|(privileged, escalation, capabilities, seccomp)| {
            let mut sc = Map::new();
            if let Some(p) = privileged {
                sc.insert("privileged".to_string(), json!(p));
            }
            if let Some(e) = escalation {
                sc.insert("allowPrivilegeEscalation".to_string(), json!(e));
            }
            if let Some(caps) = capabilities {
                let caps = match caps {
                    Some(drop) => json!({ "drop": drop }),
                    None => json!({}),
                };
                sc.insert("capabilities".to_string(), caps);
            }
            if let Some(kind) = seccomp {
                sc.insert("seccompProfile".to_string(), json!({ "type": kind }));
            }
            Value::Object(sc)
        })
}

prop_compose! {
    /// Strategy for a container without a name.
    fn arb_container()(
        image in select(IMAGES),
        resources in option::of((option::of(resource_list()), option::of(resource_list()))),
        security in option::of(security_context()),
        gtpu in any::<bool>(),
    ) -> Value {
        let mut c = Map::new();
        c.insert("image".to_string(), json!(image));
        if let Some((requests, limits)) = resources {
            let mut r = Map::new();
            if let Some(requests) = requests {
                r.insert("requests".to_string(), requests);
            }
            if let Some(limits) = limits {
                r.insert("limits".to_string(), limits);
            }
            c.insert("resources".to_string(), Value::Object(r));
        }
        if let Some(security) = security {
            c.insert("securityContext".to_string(), security);
        }
        if gtpu {
            c.insert(
                "ports".to_string(),
                json!([{ "name": "gtpu", "containerPort": 2152, "protocol": "UDP" }]),
            );
        }
        Value::Object(c)
    }
}

prop_compose! {
    /// Strategy for a workload of any kind with random pod content.
    fn arb_workload()(
        kind in select(WorkloadKind::ALL.to_vec()),
        labels in option::of(prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..3)),
        template_metadata in any::<bool>(),
        network_function in any::<bool>(),
        capture in any::<bool>(),
        sst in option::of("[0-9]{1,3}"),
        volumes in any::<bool>(),
        containers in prop::collection::vec(arb_container(), 1..4),
    ) -> (WorkloadKind, Value) {
        let mut builder = WorkloadBuilder::new(kind, "workload");
        if let Some(labels) = labels {
            builder = builder.empty_labels();
            for (k, v) in &labels {
                builder = builder.label(k, v);
            }
        }
        if network_function {
            builder = builder.label("nf", "upf");
        }
        if capture {
            builder = builder.annotation(&key("tcpdump-enabled"), "true");
        }
        if let Some(sst) = &sst {
            builder = builder.annotation(&key("sst"), sst);
        }
        // Template kinds can drop their metadata only when nothing lives there
        if !template_metadata && !network_function && !capture && sst.is_none() {
            builder = builder.without_template_metadata();
        }
        if volumes {
            builder = builder.volume(json!({ "name": "config", "configMap": { "name": "cfg" } }));
        }
        for (i, mut container) in containers.into_iter().enumerate() {
            container["name"] = json!(format!("c{i}"));
            builder = builder.container(container);
        }
        (kind, builder.build())
    }
}

/// The pod spec inside a workload document
fn pod_spec(kind: WorkloadKind, doc: &Value) -> &Value {
    match kind {
        WorkloadKind::Pod => &doc["spec"],
        WorkloadKind::CronJob => &doc["spec"]["jobTemplate"]["spec"]["template"]["spec"],
        _ => &doc["spec"]["template"]["spec"],
    }
}

/// The pod labels inside a workload document
fn pod_labels(kind: WorkloadKind, doc: &Value) -> &Value {
    match kind {
        WorkloadKind::Pod => &doc["metadata"]["labels"],
        WorkloadKind::CronJob => &doc["spec"]["jobTemplate"]["spec"]["template"]["metadata"]["labels"],
        _ => &doc["spec"]["template"]["metadata"]["labels"],
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Applying the mutation patch and mutating again produces no patch.
    #[test]
    fn mutation_is_idempotent(
        (_, workload) in arb_workload(),
        namespace in select(&["tenant", "free5gc"][..]),
    ) {
        let engine = engine(Config::default());
        let first = decide(&engine, &request(Intent::Mutate, namespace, &workload));
        prop_assert!(first.is_allowed(), "first pass denied: {:?}", first);

        let patched = apply(&workload, &first);
        let second = decide(&engine, &request(Intent::Mutate, namespace, &patched));
        prop_assert_eq!(second, Decision::Allow);
    }

    /// Defaulting never changes a value that was already set.
    #[test]
    fn defaulting_is_non_destructive(
        (kind, workload) in arb_workload(),
        namespace in select(&["tenant", "free5gc"][..]),
    ) {
        let engine = engine(Config::default());
        let decision = decide(&engine, &request(Intent::Mutate, namespace, &workload));
        let patched = apply(&workload, &decision);

        let before = pod_spec(kind, &workload)["containers"].as_array().unwrap();
        let after = pod_spec(kind, &patched)["containers"].as_array().unwrap();
        for (original, mutated) in before.iter().zip(after) {
            for section in ["requests", "limits"] {
                for name in ["cpu", "memory"] {
                    let value = &original["resources"][section][name];
                    if value.is_string() && value != "0" {
                        prop_assert_eq!(value, &mutated["resources"][section][name]);
                    }
                }
            }
            for field in ["privileged", "allowPrivilegeEscalation"] {
                let value = &original["securityContext"][field];
                if !value.is_null() {
                    prop_assert_eq!(value, &mutated["securityContext"][field]);
                }
            }
            prop_assert_eq!(&original["image"], &mutated["image"]);
            prop_assert_eq!(&original["name"], &mutated["name"]);
        }

        let labels: BTreeMap<String, String> =
            serde_json::from_value(pod_labels(kind, &workload).clone()).unwrap_or_default();
        for (k, v) in labels {
            if !v.is_empty() {
                prop_assert_eq!(&pod_labels(kind, &patched)[&k], &json!(v));
            }
        }
    }

    /// Ungated namespaces are never mutated or denied.
    #[test]
    fn closed_gate_is_pure((_, workload) in arb_workload()) {
        let engine = engine(Config::default());
        for intent in [Intent::Mutate, Intent::Validate] {
            let decision = decide(&engine, &request(intent, "ungated", &workload));
            prop_assert_eq!(decision, Decision::Allow);
        }
    }

    /// N containers with one independent problem each yield N violations.
    #[test]
    fn violations_are_complete(count in 1usize..6) {
        let mut builder = WorkloadBuilder::new(WorkloadKind::Pod, "many").label("app", "many");
        for i in 0..count {
            let mut c = compliant_container(&format!("c{i}"), "ghcr.io/free5gc/nf:v1");
            c["securityContext"]["privileged"] = json!(true);
            builder = builder.container(c);
        }

        let engine = engine(Config::default());
        let decision = decide(&engine, &request(Intent::Validate, "tenant", &builder.build()));
        let message = decision.message().unwrap().to_string();
        prop_assert_eq!(message.matches("securityContext.privileged: Forbidden").count(), count);
        prop_assert_eq!(message.starts_with('['), count > 1);
    }
}
