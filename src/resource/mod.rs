//! Resource model adapter.
//!
//! Decodes the supported workload kinds into one canonical [`ResourceView`]
//! so policy rules never look at the kind again.
//!
//! - Pod: metadata and spec at the document root
//! - Deployment, StatefulSet, DaemonSet, ReplicaSet, Job: pod template at `/spec/template`
//! - CronJob: pod template at `/spec/jobTemplate/spec/template`

mod cidr;
mod quantity;
mod view;

pub use cidr::{CidrError, Ipv4Cidr};
pub use quantity::{Quantity, parse_quantity};
pub use view::*;

use std::fmt;

/// Workload kinds the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    /// All supported kinds
    pub const ALL: [WorkloadKind; 7] = [
        WorkloadKind::Pod,
        WorkloadKind::Deployment,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
        WorkloadKind::ReplicaSet,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
    ];

    /// Map an admission request kind (e.g. `"Deployment"`) to a workload kind.
    /// Returns `None` for kinds the engine does not handle.
    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "Pod",
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "CronJob",
        }
    }

    /// Where the pod template lives for this kind
    pub fn origin(&self) -> TemplatePath {
        match self {
            WorkloadKind::Pod => TemplatePath::Pod,
            WorkloadKind::CronJob => TemplatePath::JobTemplate,
            _ => TemplatePath::PodTemplate,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural location of the pod metadata and spec inside the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplatePath {
    /// Bare pod: `/metadata`, `/spec`
    Pod,
    /// Workload template: `/spec/template/metadata`, `/spec/template/spec`
    PodTemplate,
    /// CronJob template: `/spec/jobTemplate/spec/template/...`
    JobTemplate,
}

impl TemplatePath {
    /// Path segments leading to the object holding `metadata` and `spec`
    pub fn prefix(&self) -> &'static [&'static str] {
        match self {
            TemplatePath::Pod => &[],
            TemplatePath::PodTemplate => &["spec", "template"],
            TemplatePath::JobTemplate => &["spec", "jobTemplate", "spec", "template"],
        }
    }

    /// Whether the view was extracted from a nested template
    pub fn is_template(&self) -> bool {
        !matches!(self, TemplatePath::Pod)
    }
}
