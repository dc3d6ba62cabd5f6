//! Validation policies.
//!
//! Every policy runs on every request; violations are collected and reported
//! together so a rejected workload shows its whole compliance gap at once.
//!
//! - `identity`: project namespace and host network
//! - `containers`: resources, images, privilege, capabilities
//! - `volumes`: hostPath gating
//! - `ports`: required-ports annotation
//! - `networks`: network attachment and network-function addresses

pub mod containers;
pub mod identity;
pub mod networks;
pub mod ports;
pub mod volumes;

use std::fmt;

use tracing::trace;

use super::address::Address;
use super::context::RuleContext;

/// Category of a violation, mirroring Kubernetes field error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// A required value is missing
    Required,
    /// A value is present but malformed or out of range
    Invalid,
    /// A value is well-formed but not allowed by policy
    Forbidden,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Required => "Required value",
            ViolationKind::Invalid => "Invalid value",
            ViolationKind::Forbidden => "Forbidden",
        }
    }

    /// Short lowercase name used as a metric label
    pub fn label(&self) -> &'static str {
        match self {
            ViolationKind::Required => "required",
            ViolationKind::Invalid => "invalid",
            ViolationKind::Forbidden => "forbidden",
        }
    }
}

/// One policy violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Kubernetes field path of the offending field
    pub field: String,
    pub kind: ViolationKind,
    /// Offending value, for `Invalid`
    pub value: Option<String>,
    pub detail: String,
}

impl Violation {
    pub fn required(field: &Address, detail: impl Into<String>) -> Self {
        Self {
            field: field.field_path(),
            kind: ViolationKind::Required,
            value: None,
            detail: detail.into(),
        }
    }

    pub fn invalid(field: &Address, value: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            field: field.field_path(),
            kind: ViolationKind::Invalid,
            value: Some(value.into()),
            detail: detail.into(),
        }
    }

    pub fn forbidden(field: &Address, detail: impl Into<String>) -> Self {
        Self {
            field: field.field_path(),
            kind: ViolationKind::Forbidden,
            value: None,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind.as_str())?;
        if let Some(value) = &self.value {
            write!(f, ": {value:?}")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Join violations into one denial message: a single violation as-is,
/// several as `[a, b, ...]`. `None` when there are no violations.
pub fn aggregate_message(violations: &[Violation]) -> Option<String> {
    match violations {
        [] => None,
        [only] => Some(only.to_string()),
        many => {
            let joined: Vec<String> = many.iter().map(Violation::to_string).collect();
            Some(format!("[{}]", joined.join(", ")))
        }
    }
}

/// A validation rule: pure function from rule inputs to violations
pub type ValidationRule = fn(&RuleContext<'_>) -> Vec<Violation>;

/// All validation rules, in reporting order
pub const VALIDATION_RULES: &[(&str, ValidationRule)] = &[
    ("namespace-identity", identity::validate_namespace),
    ("host-network", identity::validate_host_network),
    ("containers", containers::validate),
    ("host-path", volumes::validate),
    ("required-ports", ports::validate),
    ("network-attachments", networks::validate_attachments),
    ("nf-addresses", networks::validate_nf_addresses),
];

/// Run every validation rule and collect all violations
pub fn validate_all(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (name, rule) in VALIDATION_RULES {
        let found = rule(ctx);
        trace!(rule = name, violations = found.len(), "Validation rule evaluated");
        violations.extend(found);
    }
    violations
}
