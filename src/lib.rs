//! nf-admission library crate
//!
//! Admission control for 5G network-function workloads: namespace gating,
//! defaulting patches and policy validation for Pods and the workload kinds
//! that template them.

pub mod config;
pub mod error;
pub mod health;
pub mod namespace;
pub mod resource;
pub mod webhooks;

pub use config::Config;
pub use error::{Error, Result};
pub use health::HealthState;
pub use namespace::{KubeNamespaceLookup, NamespaceLookup, StaticNamespaceLookup};
pub use webhooks::{
    Decision, DecisionEngine, DecisionRequest, Intent, WebhookError, run_webhook_server,
};
