//! Workload classification shared by mutation and validation.

use crate::config::{
    APP_NAME_LABEL, NF_APP_NAME, NF_CONTAINER_NAME, NF_LABEL, NF_LABEL_VALUE, PART_OF_LABEL,
    SIDECAR_CONTAINER_NAME,
};
use crate::resource::{ContainerSpec, ResourceView};

use super::context::RuleContext;

/// Annotation values that switch a per-resource feature on
pub fn is_affirmative(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Whether the resource belongs to the managed project, by part-of label or namespace
pub fn is_project_member(ctx: &RuleContext<'_>) -> bool {
    let project = &ctx.config.project;
    ctx.view.metadata.label(PART_OF_LABEL) == Some(project.part_of_label_value.as_str())
        || ctx.namespace.name == project.namespace
}

/// Whether the resource is a user-plane network function
pub fn is_network_function(view: &ResourceView) -> bool {
    view.metadata.label(NF_LABEL) == Some(NF_LABEL_VALUE)
        || view.metadata.label(APP_NAME_LABEL) == Some(NF_APP_NAME)
        || view
            .pod_spec
            .containers
            .iter()
            .any(|c| c.name == NF_CONTAINER_NAME)
}

/// The container that carries the network function's ports: the first one
/// named `upf`, else the first container that is not the capture sidecar
pub fn primary_container(view: &ResourceView) -> Option<(usize, &ContainerSpec)> {
    let containers = &view.pod_spec.containers;
    containers
        .iter()
        .enumerate()
        .find(|(_, c)| c.name == NF_CONTAINER_NAME)
        .or_else(|| {
            containers
                .iter()
                .enumerate()
                .find(|(_, c)| c.name != SIDECAR_CONTAINER_NAME)
        })
}

/// Whether the capture sidecar is already present
pub fn has_sidecar(view: &ResourceView) -> bool {
    view.pod_spec
        .containers
        .iter()
        .any(|c| c.name == SIDECAR_CONTAINER_NAME)
}
