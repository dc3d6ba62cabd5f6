//! Label rules: scaffolding, project identity, slice metadata.

use json_patch::PatchOperation;
use serde_json::{Value, json};

use crate::config::{PART_OF_LABEL, PROJECT_LABEL};
use crate::webhooks::context::RuleContext;
use crate::webhooks::patch::add;
use crate::webhooks::workload_class::is_project_member;

/// Make sure a label map exists before any label key is added
pub fn scaffold_labels(ctx: &RuleContext<'_>) -> Vec<PatchOperation> {
    let metadata = &ctx.view.metadata;
    if !metadata.present {
        vec![add(&ctx.metadata(), json!({ "labels": {} }))]
    } else if metadata.labels.is_none() {
        vec![add(&ctx.labels(), json!({}))]
    } else {
        Vec::new()
    }
}

/// Project and part-of labels for workloads in the project namespace.
/// Existing non-empty values are left alone.
pub fn project_labels(ctx: &RuleContext<'_>) -> Vec<PatchOperation> {
    let project = &ctx.config.project;
    if ctx.namespace.name != project.namespace {
        return Vec::new();
    }

    [
        (PROJECT_LABEL, &project.project_label_value),
        (PART_OF_LABEL, &project.part_of_label_value),
    ]
    .into_iter()
    .filter(|(key, _)| ctx.view.metadata.label(key).is_none_or(str::is_empty))
    .map(|(key, value)| add(&ctx.labels().key(key), Value::from(value.as_str())))
    .collect()
}

/// Mirror slice annotations into labels for project members
pub fn propagate_slice_labels(ctx: &RuleContext<'_>) -> Vec<PatchOperation> {
    if !is_project_member(ctx) {
        return Vec::new();
    }

    let metadata = &ctx.view.metadata;
    ctx.config
        .keys
        .slice_annotations
        .iter()
        .filter_map(|key| {
            let value = metadata.annotation(key).filter(|v| !v.is_empty())?;
            let value = label_value(key, value);
            if metadata.label(key) == Some(value.as_str()) {
                return None;
            }
            Some(add(&ctx.labels().key(key), Value::String(value)))
        })
        .collect()
}

/// Label values may not contain `/`, which CIDR annotations always do
fn label_value(key: &str, value: &str) -> String {
    if key.ends_with("-cidr") {
        value.replace('/', "-")
    } else {
        value.to_string()
    }
}
