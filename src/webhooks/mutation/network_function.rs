//! Network-function workloads: default data-plane ports and the packet
//! capture sidecar.

use json_patch::PatchOperation;
use serde_json::{Value, json};

use crate::config::{CAPTURE_MOUNT_PATH, CAPTURE_VOLUME_NAME, SIDECAR_CONTAINER_NAME};
use crate::resource::ContainerGroup;
use crate::webhooks::context::RuleContext;
use crate::webhooks::patch::add;
use crate::webhooks::workload_class::{
    has_sidecar, is_affirmative, is_network_function, primary_container,
};

/// GTP-U and PFCP, both UDP
const NF_PORTS: [(&str, i32); 2] = [("gtpu", 2152), ("pfcp", 8805)];
const NF_PORT_PROTOCOL: &str = "UDP";

/// Sidecar environment variables, in slice annotation order
const SIDECAR_ENV: [&str; 6] = [
    "UPF_SLICE_ID",
    "UPF_SST",
    "UPF_SD",
    "UPF_DNN",
    "UPF_UE_POOL_CIDR",
    "UPF_N6_CIDR",
];

fn port(name: &str, number: i32) -> Value {
    json!({ "name": name, "containerPort": number, "protocol": NF_PORT_PROTOCOL })
}

/// Declare the GTP-U and PFCP ports on the primary container
pub fn default_ports(ctx: &RuleContext<'_>) -> Vec<PatchOperation> {
    if !is_network_function(ctx.view) {
        return Vec::new();
    }
    let Some((index, container)) = primary_container(ctx.view) else {
        return Vec::new();
    };
    let ports_addr = ctx
        .container(ContainerGroup::Containers, index)
        .field("ports");

    if container.ports.as_ref().is_none_or(Vec::is_empty) {
        let all: Vec<Value> = NF_PORTS.iter().map(|(n, p)| port(n, *p)).collect();
        return vec![add(&ports_addr, Value::Array(all))];
    }

    NF_PORTS
        .iter()
        .filter(|(_, number)| !container.declares_port(*number, NF_PORT_PROTOCOL))
        // Port names must stay unique within a container
        .filter(|(name, _)| !container.declares_port_name(name))
        .map(|(name, number)| add(&ports_addr.append(), port(name, *number)))
        .collect()
}

/// Append the capture sidecar and its volume when the workload opts in
pub fn inject_sidecar(ctx: &RuleContext<'_>) -> Vec<PatchOperation> {
    let view = ctx.view;
    if !is_network_function(view) || has_sidecar(view) {
        return Vec::new();
    }
    let opted_in = view
        .metadata
        .annotation(&ctx.config.keys.tcpdump_annotation)
        .is_some_and(is_affirmative);
    if !opted_in {
        return Vec::new();
    }

    let spec = ctx.pod_spec();
    let mut ops = vec![add(
        &spec.field("containers").append(),
        sidecar_container(ctx),
    )];

    let volume = json!({ "name": CAPTURE_VOLUME_NAME, "emptyDir": {} });
    match &view.pod_spec.volumes {
        None => ops.push(add(&spec.field("volumes"), json!([volume]))),
        Some(volumes) if !volumes.iter().any(|v| v.name == CAPTURE_VOLUME_NAME) => {
            ops.push(add(&spec.field("volumes").append(), volume));
        }
        Some(_) => {}
    }
    ops
}

fn sidecar_container(ctx: &RuleContext<'_>) -> Value {
    let config = ctx.config;
    let defaults = &config.defaults;

    let env: Vec<Value> = SIDECAR_ENV
        .iter()
        .zip(&config.keys.slice_annotations)
        .filter_map(|(name, key)| {
            let value = ctx.view.metadata.annotation(key).filter(|v| !v.is_empty())?;
            Some(json!({ "name": name, "value": value }))
        })
        .collect();

    let mut container = json!({
        "name": SIDECAR_CONTAINER_NAME,
        "image": config.sidecar_image,
        "imagePullPolicy": "IfNotPresent",
        "command": ["tcpdump"],
        "args": ["-i", "any", "-w", format!("{CAPTURE_MOUNT_PATH}/trace.pcap")],
        "securityContext": {
            "allowPrivilegeEscalation": false,
            "capabilities": {
                "add": ["NET_ADMIN", "NET_RAW"],
                "drop": ["ALL"],
            },
            "seccompProfile": { "type": "RuntimeDefault" },
        },
        "resources": {
            "requests": {
                "cpu": defaults.cpu_request.as_str(),
                "memory": defaults.memory_request.as_str(),
            },
            "limits": {
                "cpu": defaults.cpu_limit.as_str(),
                "memory": defaults.memory_limit.as_str(),
            },
        },
        "volumeMounts": [
            { "name": CAPTURE_VOLUME_NAME, "mountPath": CAPTURE_MOUNT_PATH },
        ],
    });
    if !env.is_empty() {
        if let Some(obj) = container.as_object_mut() {
            obj.insert("env".to_string(), Value::Array(env));
        }
    }
    container
}
