//! Per-container policies: resources, images, privilege and capabilities.
//!
//! Applied to containers and init containers alike.

use super::Violation;
use crate::config::{ALLOW_NET_ADMIN_LABEL, Config};
use crate::resource::{ContainerSpec, Quantity};
use crate::webhooks::address::Address;
use crate::webhooks::context::RuleContext;

/// Capabilities gated by the namespace's allow-netadmin label
const NET_CAPABILITIES: [&str; 2] = ["NET_ADMIN", "NET_RAW"];

const RESOURCE_NAMES: [&str; 2] = ["cpu", "memory"];

/// Validate every container and init container
pub fn validate(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (group, index, container) in ctx.view.pod_spec.all_containers() {
        let addr = ctx.container(group, index);
        validate_resources(&addr, container, &mut violations);
        validate_image(&addr, container, ctx.config, &mut violations);
        validate_privileges(&addr, container, ctx.namespace.allow_net_admin, &mut violations);
    }
    violations
}

fn validate_resources(addr: &Address, container: &ContainerSpec, out: &mut Vec<Violation>) {
    let res_addr = addr.field("resources");
    let resources = container.resources.as_ref();
    let requests = resources.and_then(|r| r.requests.as_ref());
    let limits = resources.and_then(|r| r.limits.as_ref());

    // Unparseable quantities are reported on their own and count as present
    let mut complete = true;
    for (section, list) in [("requests", requests), ("limits", limits)] {
        for name in RESOURCE_NAMES {
            match list.and_then(|l| l.get(name)) {
                Some(q) if !q.is_valid() => out.push(Violation::invalid(
                    &res_addr.field(section).field(name),
                    q.as_str(),
                    "must be a valid resource quantity",
                )),
                Some(q) if !q.is_zero() => {}
                _ => complete = false,
            }
        }
    }

    if !complete {
        out.push(Violation::required(
            &res_addr,
            "requests/limits cpu+memory required",
        ));
        return;
    }

    for name in RESOURCE_NAMES {
        let request = requests.and_then(|l| l.get(name)).and_then(Quantity::value);
        let Some(limit) = limits.and_then(|l| l.get(name)) else {
            continue;
        };
        let below = match (request, limit.value()) {
            (Some(req), Some(lim)) => lim < req,
            _ => false,
        };
        if below {
            out.push(below_request(&res_addr, name, limit));
        }
    }
}

fn below_request(res_addr: &Address, name: &str, limit: &Quantity) -> Violation {
    Violation::invalid(
        &res_addr.field("limits").field(name),
        limit.as_str(),
        format!("must be >= requests.{name}"),
    )
}

fn validate_image(
    addr: &Address,
    container: &ContainerSpec,
    config: &Config,
    out: &mut Vec<Violation>,
) {
    let Some(image) = container.image.as_deref().filter(|i| !i.is_empty()) else {
        return;
    };
    let image_addr = addr.field("image");

    if config.deny_latest_tag {
        match image_tag(image) {
            ImageTag::Digest | ImageTag::Tag(_) => {}
            ImageTag::Latest => out.push(Violation::forbidden(
                &image_addr,
                "image tag ':latest' is forbidden; use pinned tag or digest",
            )),
            ImageTag::Missing => out.push(Violation::forbidden(
                &image_addr,
                "image tag is required; use pinned tag or digest",
            )),
        }
    }

    if !registry_allowed(image, &config.allowed_registries) {
        out.push(Violation::forbidden(
            &image_addr,
            format!("image registry {:?} not allowed", registry(image)),
        ));
    }
}

fn validate_privileges(
    addr: &Address,
    container: &ContainerSpec,
    allow_net_admin: bool,
    out: &mut Vec<Violation>,
) {
    let sc_addr = addr.field("securityContext");
    if container.is_privileged() {
        out.push(Violation::forbidden(
            &sc_addr.field("privileged"),
            "privileged is forbidden",
        ));
    }

    if allow_net_admin {
        return;
    }
    for (i, cap) in container.added_capabilities().iter().enumerate() {
        if let Some(gated) = NET_CAPABILITIES
            .iter()
            .find(|gated| cap.eq_ignore_ascii_case(gated))
        {
            out.push(Violation::forbidden(
                &sc_addr.field("capabilities").field("add").index(i),
                format!("{gated} requires namespace label {ALLOW_NET_ADMIN_LABEL}=true"),
            ));
        }
    }
}

/// Tag state of an image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTag<'a> {
    /// Pinned by `@sha256:...`
    Digest,
    Tag(&'a str),
    Latest,
    Missing,
}

/// Classify the tag of `image`. The tag separator is a `:` after the last
/// `/`, so a registry port (`registry:5000/app`) is not mistaken for a tag.
pub fn image_tag(image: &str) -> ImageTag<'_> {
    if image.contains('@') {
        return ImageTag::Digest;
    }
    let last = image.rsplit('/').next().unwrap_or(image);
    match last.split_once(':') {
        Some((_, "latest")) => ImageTag::Latest,
        Some((_, tag)) if !tag.is_empty() => ImageTag::Tag(tag),
        _ => ImageTag::Missing,
    }
}

/// The part of the image reference before the first `/`
pub fn registry(image: &str) -> &str {
    image.split_once('/').map_or(image, |(registry, _)| registry)
}

/// Registry equals, or starts with, an allowed entry (case-insensitive)
pub fn registry_allowed(image: &str, allowed: &[String]) -> bool {
    let registry = registry(image).to_ascii_lowercase();
    allowed
        .iter()
        .map(|a| a.trim().to_ascii_lowercase())
        .filter(|a| !a.is_empty())
        .any(|a| registry == a || registry.starts_with(&a))
}
