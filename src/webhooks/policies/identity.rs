//! Namespace identity and host network policies.

use super::Violation;
use crate::config::PART_OF_LABEL;
use crate::webhooks::address::Address;
use crate::webhooks::context::RuleContext;

/// Workloads claiming the project's part-of identity must live in the project namespace
pub fn validate_namespace(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let project = &ctx.config.project;
    let claims_project =
        ctx.view.metadata.label(PART_OF_LABEL) == Some(project.part_of_label_value.as_str());

    if claims_project && ctx.namespace.name != project.namespace {
        // Namespace is a property of the submitted object, never of the template
        let field = Address::root().field("metadata").field("namespace");
        vec![Violation::forbidden(
            &field,
            format!("must be {:?}", project.namespace),
        )]
    } else {
        Vec::new()
    }
}

/// Host networking is never allowed
pub fn validate_host_network(ctx: &RuleContext<'_>) -> Vec<Violation> {
    if ctx.view.pod_spec.host_network {
        vec![Violation::forbidden(
            &ctx.pod_spec().field("hostNetwork"),
            "hostNetwork not allowed",
        )]
    } else {
        Vec::new()
    }
}
