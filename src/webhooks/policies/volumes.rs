//! hostPath volume gating.

use super::Violation;
use crate::config::ALLOW_HOST_PATH_LABEL;
use crate::resource::VolumeSource;
use crate::webhooks::context::RuleContext;

/// hostPath volumes need the namespace's allow-hostpath label
pub fn validate(ctx: &RuleContext<'_>) -> Vec<Violation> {
    if ctx.namespace.allow_host_path {
        return Vec::new();
    }

    let volumes = ctx.pod_spec().field("volumes");
    ctx.view
        .pod_spec
        .volumes()
        .iter()
        .enumerate()
        .filter_map(|(i, volume)| match &volume.source {
            VolumeSource::HostPath { path } => Some(Violation::forbidden(
                &volumes.index(i).field("hostPath"),
                format!(
                    "hostPath {path:?} requires namespace label {ALLOW_HOST_PATH_LABEL}=true"
                ),
            )),
            _ => None,
        })
        .collect()
}
