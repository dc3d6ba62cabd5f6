//! Admission decision engine.
//!
//! Turns one [`DecisionRequest`] into a [`Decision`]: resolve the workload
//! kind, decode the object, consult the namespace gate, then run either the
//! mutation or the validation rule set. Errors never escape; each one maps to
//! a denial.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use json_patch::Patch;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::context::RuleContext;
use super::mutation::mutate;
use super::patch::synthesize;
use super::policies::{aggregate_message, validate_all};
use crate::config::Config;
use crate::error::Result;
use crate::health::HealthState;
use crate::namespace::{NamespaceLookup, resolve};
use crate::resource::{ResourceView, WorkloadKind};

/// Which webhook the request arrived on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    Mutate,
    Validate,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Mutate => "mutate",
            Intent::Validate => "validate",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-independent admission request
#[derive(Clone, Debug)]
pub struct DecisionRequest {
    pub intent: Intent,
    /// Declared kind, e.g. `Deployment`
    pub kind: String,
    /// Namespace the object is admitted into
    pub namespace: String,
    /// Raw JSON of the submitted object
    pub object: Vec<u8>,
}

/// Outcome of a decision
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// Admit unchanged
    Allow,
    /// Admit with the given patch applied
    Patch(Patch),
    /// Reject with a message
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Deny(_))
    }

    /// Denial message, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            Decision::Deny(message) => Some(message),
            _ => None,
        }
    }

    /// Patch to apply, if any
    pub fn patch(&self) -> Option<&Patch> {
        match self {
            Decision::Patch(patch) => Some(patch),
            _ => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Patch(_) => "patch",
            Decision::Deny(_) => "deny",
        }
    }
}

/// Decision engine shared by all request handlers
pub struct DecisionEngine<L> {
    lookup: L,
    config: Arc<Config>,
    health: Option<Arc<HealthState>>,
}

impl<L: NamespaceLookup> DecisionEngine<L> {
    pub fn new(lookup: L, config: Arc<Config>) -> Self {
        Self {
            lookup,
            config,
            health: None,
        }
    }

    /// Record decision metrics into `health`
    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn health(&self) -> Option<&Arc<HealthState>> {
        self.health.as_ref()
    }

    /// Decide one admission request
    pub async fn decide(&self, request: &DecisionRequest) -> Decision {
        let started = Instant::now();
        let decision = match self.evaluate(request).await {
            Ok(decision) => decision,
            Err(e) => {
                if e.is_internal() {
                    error!(
                        intent = %request.intent,
                        kind = %request.kind,
                        namespace = %request.namespace,
                        error = %e,
                        "Internal error while deciding admission"
                    );
                } else {
                    warn!(
                        intent = %request.intent,
                        kind = %request.kind,
                        namespace = %request.namespace,
                        error = %e,
                        "Admission request denied"
                    );
                }
                Decision::Deny(e.to_string())
            }
        };

        if let Some(health) = &self.health {
            health.metrics.record_decision(
                request.intent.as_str(),
                decision.outcome(),
                started.elapsed().as_secs_f64(),
            );
        }
        decision
    }

    async fn evaluate(&self, request: &DecisionRequest) -> Result<Decision> {
        let Some(kind) = WorkloadKind::from_kind(&request.kind) else {
            debug!(kind = %request.kind, "Kind not handled, allowing");
            return Ok(Decision::Allow);
        };

        let view = ResourceView::decode(kind, &request.object)?;
        let namespace = resolve(&self.lookup, &request.namespace, &self.config).await?;
        if !namespace.enabled {
            debug!(namespace = %namespace.name, "Namespace not opted in, allowing");
            return Ok(Decision::Allow);
        }

        let ctx = RuleContext::new(&view, &namespace, &self.config);
        match request.intent {
            Intent::Mutate => self.mutate(&ctx, &request.object),
            Intent::Validate => Ok(self.validate(&ctx)),
        }
    }

    fn mutate(&self, ctx: &RuleContext<'_>, object: &[u8]) -> Result<Decision> {
        let ops = mutate(ctx);
        let count = ops.len();
        let source: Value = serde_json::from_slice(object)?;
        match synthesize(&source, ops)? {
            Some(patch) => {
                info!(
                    kind = %ctx.view.kind,
                    namespace = %ctx.namespace.name,
                    operations = count,
                    "Mutation patch generated"
                );
                if let Some(health) = &self.health {
                    health.metrics.record_patch(count);
                }
                Ok(Decision::Patch(patch))
            }
            None => Ok(Decision::Allow),
        }
    }

    fn validate(&self, ctx: &RuleContext<'_>) -> Decision {
        let violations = validate_all(ctx);
        if let Some(health) = &self.health {
            for v in &violations {
                health.metrics.record_violation(v.kind.label());
            }
        }
        match aggregate_message(&violations) {
            Some(message) => {
                warn!(
                    kind = %ctx.view.kind,
                    namespace = %ctx.namespace.name,
                    violations = violations.len(),
                    message = %message,
                    "Admission request denied"
                );
                Decision::Deny(message)
            }
            None => Decision::Allow,
        }
    }
}
