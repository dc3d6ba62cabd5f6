//! Admission webhooks for network-function workloads.
//!
//! Two rule sets run against a canonical view of the submitted workload:
//! - Mutation: ordered rules emitting JSON Patch `add` operations
//! - Validation: independent rules collecting every violation
//!
//! Both are gated per namespace and served by one TLS server.

pub mod address;
pub mod context;
pub mod decision;
pub mod mutation;
pub mod patch;
pub mod policies;
mod server;
pub mod workload_class;

pub use decision::{Decision, DecisionEngine, DecisionRequest, Intent};
pub use policies::{Violation, ViolationKind, aggregate_message};
pub use server::{WebhookError, create_webhook_router, run_webhook_server};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
