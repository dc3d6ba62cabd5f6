//! Mutation rules.
//!
//! Rules run in a fixed order and their operations are concatenated. Later
//! rules rely on structure created by earlier ones (the label map must exist
//! before label keys are added), so the order below is part of the contract:
//!
//! 1. Label scaffolding
//! 2. Project labels
//! 3. Slice annotation propagation
//! 4. Container hardening and resource defaults
//! 5. Network function ports and capture sidecar

mod containers;
mod labels;
mod network_function;

use json_patch::PatchOperation;
use tracing::trace;

use super::context::RuleContext;

/// A mutation rule: pure function from rule inputs to patch operations
pub type MutationRule = fn(&RuleContext<'_>) -> Vec<PatchOperation>;

/// All mutation rules in evaluation order
pub const MUTATION_RULES: &[(&str, MutationRule)] = &[
    ("label-scaffolding", labels::scaffold_labels),
    ("project-labels", labels::project_labels),
    ("slice-labels", labels::propagate_slice_labels),
    ("container-defaults", containers::harden_containers),
    ("nf-ports", network_function::default_ports),
    ("capture-sidecar", network_function::inject_sidecar),
];

/// Run every mutation rule in order and concatenate their operations
pub fn mutate(ctx: &RuleContext<'_>) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    for (name, rule) in MUTATION_RULES {
        let emitted = rule(ctx);
        trace!(rule = name, operations = emitted.len(), "Mutation rule evaluated");
        ops.extend(emitted);
    }
    ops
}
