//! Network attachment and network-function address policies.
//!
//! Both check addresses against the data-plane CIDR. Attachment scanning is
//! opt-in per resource and can be switched off globally.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use super::Violation;
use crate::config::{CidrValidation, NETWORKS_ANNOTATION};
use crate::resource::Ipv4Cidr;
use crate::webhooks::context::RuleContext;
use crate::webhooks::workload_class::{is_affirmative, is_network_function};

/// Anything shaped like a dotted-quad CIDR, wherever it sits. Groups are
/// unbounded so oversized literals surface as invalid instead of being skipped.
static CIDR_RE: LazyLock<Option<regex::Regex>> =
    LazyLock::new(|| regex::Regex::new(r"\d+(?:\.\d+){3,}/\d+").ok());

/// Scan the network attachment annotation for CIDR literals outside the data plane
pub fn validate_attachments(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let config = ctx.config;
    if config.cidr_validation == CidrValidation::Disabled {
        return Vec::new();
    }
    let metadata = &ctx.view.metadata;
    let opted_in = metadata
        .annotation(&config.keys.validate_networks_annotation)
        .is_some_and(is_affirmative);
    let Some(networks) = metadata.annotation(NETWORKS_ANNOTATION) else {
        return Vec::new();
    };
    if !opted_in {
        return Vec::new();
    }
    let Some(re) = CIDR_RE.as_ref() else {
        return Vec::new();
    };

    let field = ctx.annotation(NETWORKS_ANNOTATION);
    let data_plane = config.data_plane_cidr;
    re.find_iter(networks)
        .filter_map(|m| {
            let literal = m.as_str();
            match literal.parse::<Ipv4Cidr>() {
                Err(_) => Some(Violation::invalid(&field, literal, "not a valid CIDR")),
                Ok(cidr) if !data_plane.contains(cidr.address()) => Some(Violation::forbidden(
                    &field,
                    format!("IP {} not in {data_plane}", cidr.address()),
                )),
                Ok(_) => None,
            }
        })
        .collect()
}

/// Check `name@ip/prefix` interface entries of network-function workloads
pub fn validate_nf_addresses(ctx: &RuleContext<'_>) -> Vec<Violation> {
    if !is_network_function(ctx.view) {
        return Vec::new();
    }
    let key = &ctx.config.keys.nf_networks_annotation;
    let Some(raw) = ctx.view.metadata.annotation(key) else {
        return Vec::new();
    };

    let field = ctx.annotation(key);
    let data_plane = ctx.config.data_plane_cidr;
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match parse_interface(entry) {
            None => Some(Violation::invalid(&field, entry, "must be name@ip/prefix")),
            Some((name, address)) if !data_plane.contains(address) => {
                Some(Violation::forbidden(
                    &field,
                    format!("{name} address {address} is not in data-plane CIDR {data_plane}"),
                ))
            }
            Some(_) => None,
        })
        .collect()
}

/// Parse `name@ip/prefix` into the interface name and its address
fn parse_interface(entry: &str) -> Option<(&str, Ipv4Addr)> {
    let (name, cidr) = entry.split_once('@')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let cidr: Ipv4Cidr = cidr.trim().parse().ok()?;
    Some((name, cidr.address()))
}
