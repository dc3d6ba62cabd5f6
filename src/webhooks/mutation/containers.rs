//! Per-container security hardening and resource defaults.

use json_patch::PatchOperation;
use serde_json::{Map, Value, json};

use crate::config::ResourceDefaults;
use crate::resource::{ContainerSpec, Quantity, ResourceList, SecurityDescriptor};
use crate::webhooks::address::Address;
use crate::webhooks::context::RuleContext;
use crate::webhooks::patch::add;

const RESOURCE_NAMES: [&str; 2] = ["cpu", "memory"];

/// Harden and default every container, then every init container
pub fn harden_containers(ctx: &RuleContext<'_>) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    for (group, index, container) in ctx.view.pod_spec.all_containers() {
        let addr = ctx.container(group, index);
        security_defaults(&addr, container, &mut ops);
        resource_defaults(&addr, container, &ctx.config.defaults, &mut ops);
    }
    ops
}

/// Restricted security context, filling only what is missing
fn security_defaults(addr: &Address, container: &ContainerSpec, ops: &mut Vec<PatchOperation>) {
    let sc_addr = addr.field("securityContext");
    let Some(sc) = &container.security else {
        ops.push(add(
            &sc_addr,
            json!({
                "allowPrivilegeEscalation": false,
                "capabilities": { "drop": ["ALL"] },
                "seccompProfile": { "type": "RuntimeDefault" },
            }),
        ));
        return;
    };

    // The API server rejects privileged containers that disallow escalation
    if sc.allow_privilege_escalation.is_none() && sc.privileged != Some(true) {
        ops.push(add(
            &sc_addr.field("allowPrivilegeEscalation"),
            Value::Bool(false),
        ));
    }

    match &sc.capabilities {
        None => ops.push(add(
            &sc_addr.field("capabilities"),
            json!({ "drop": ["ALL"] }),
        )),
        Some(caps) if caps.drop.as_ref().is_none_or(Vec::is_empty) => ops.push(add(
            &sc_addr.field("capabilities").field("drop"),
            json!(["ALL"]),
        )),
        Some(_) => {}
    }

    seccomp_defaults(&sc_addr, sc, ops);
}

fn seccomp_defaults(sc_addr: &Address, sc: &SecurityDescriptor, ops: &mut Vec<PatchOperation>) {
    match sc.seccomp_profile.as_deref() {
        None => ops.push(add(
            &sc_addr.field("seccompProfile"),
            json!({ "type": "RuntimeDefault" }),
        )),
        Some("") => ops.push(add(
            &sc_addr.field("seccompProfile").field("type"),
            json!("RuntimeDefault"),
        )),
        Some(_) => {}
    }
}

/// Fill missing or zero requests and limits from the configured defaults
fn resource_defaults(
    addr: &Address,
    container: &ContainerSpec,
    defaults: &ResourceDefaults,
    ops: &mut Vec<PatchOperation>,
) {
    let res_addr = addr.field("resources");
    let (requests, limits) = match &container.resources {
        Some(r) if r.requests.is_some() || r.limits.is_some() => {
            (r.requests.as_ref(), r.limits.as_ref())
        }
        _ => {
            let requests = default_map(|r| defaults.request(r));
            let limits = default_map(|r| defaults.limit(r));
            ops.push(add(
                &res_addr,
                json!({ "requests": requests, "limits": limits }),
            ));
            return;
        }
    };

    fill_list(
        &res_addr.field("requests"),
        requests,
        |r| clamp_request(defaults.request(r), present(limits, r)),
        ops,
    );
    fill_list(
        &res_addr.field("limits"),
        limits,
        |r| clamp_limit(defaults.limit(r), present(requests, r)),
        ops,
    );
}

/// Add the whole map when absent, otherwise only its missing keys
fn fill_list<'a, F>(
    list_addr: &Address,
    existing: Option<&ResourceList>,
    default_for: F,
    ops: &mut Vec<PatchOperation>,
) where
    F: Fn(&str) -> &'a Quantity,
{
    match existing {
        None => ops.push(add(list_addr, default_map(default_for))),
        Some(_) => {
            for name in RESOURCE_NAMES {
                if present(existing, name).is_none() {
                    ops.push(add(
                        &list_addr.key(name),
                        Value::from(default_for(name).as_str()),
                    ));
                }
            }
        }
    }
}

fn default_map<'a, F>(default_for: F) -> Value
where
    F: Fn(&str) -> &'a Quantity,
{
    let map: Map<String, Value> = RESOURCE_NAMES
        .into_iter()
        .map(|name| (name.to_string(), Value::from(default_for(name).as_str())))
        .collect();
    Value::Object(map)
}

/// A quantity counts as present when set and non-zero
fn present<'a>(list: Option<&'a ResourceList>, name: &str) -> Option<&'a Quantity> {
    list?.get(name).filter(|q| !q.is_zero())
}

/// A defaulted request never exceeds an existing limit
fn clamp_request<'a>(default: &'a Quantity, limit: Option<&'a Quantity>) -> &'a Quantity {
    match (default.value(), limit.and_then(|l| l.value().map(|v| (l, v)))) {
        (Some(d), Some((limit, l))) if d > l => limit,
        _ => default,
    }
}

/// A defaulted limit never falls below an existing request
fn clamp_limit<'a>(default: &'a Quantity, request: Option<&'a Quantity>) -> &'a Quantity {
    match (default.value(), request.and_then(|r| r.value().map(|v| (r, v)))) {
        (Some(d), Some((request, r))) if d < r => request,
        _ => default,
    }
}
