//! Namespace gate.
//!
//! The engine only acts in namespaces that opt in through a label. The same
//! lookup supplies the capability flags later rules consult, so each decision
//! reads the namespace exactly once.

use std::collections::BTreeMap;
use std::future::Future;

use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use thiserror::Error;
use tracing::debug;

use crate::config::{ALLOW_HOST_PATH_LABEL, ALLOW_NET_ADMIN_LABEL, Config};
use crate::error::{Error, Result};

/// Failures of the namespace store
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("namespace {0:?} not found")]
    NotFound(String),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Read access to namespace labels.
///
/// Abstracted so the engine can be exercised without a cluster.
pub trait NamespaceLookup: Send + Sync + 'static {
    /// Labels of namespace `name`
    fn namespace_labels(
        &self,
        name: &str,
    ) -> impl Future<Output = std::result::Result<BTreeMap<String, String>, LookupError>> + Send;
}

/// Namespace lookup through the Kubernetes API
#[derive(Clone)]
pub struct KubeNamespaceLookup {
    api: Api<Namespace>,
}

impl KubeNamespaceLookup {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

impl NamespaceLookup for KubeNamespaceLookup {
    async fn namespace_labels(
        &self,
        name: &str,
    ) -> std::result::Result<BTreeMap<String, String>, LookupError> {
        match self.api.get_opt(name).await? {
            Some(ns) => Ok(ns.metadata.labels.unwrap_or_default()),
            None => Err(LookupError::NotFound(name.to_string())),
        }
    }
}

/// Fixed namespace table, for tests and offline evaluation
#[derive(Debug, Clone, Default)]
pub struct StaticNamespaceLookup {
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
}

impl StaticNamespaceLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register namespace `name` with `labels`
    pub fn with_namespace<I, K, V>(mut self, name: &str, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.namespaces.insert(
            name.to_string(),
            labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

impl NamespaceLookup for StaticNamespaceLookup {
    async fn namespace_labels(
        &self,
        name: &str,
    ) -> std::result::Result<BTreeMap<String, String>, LookupError> {
        self.namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(name.to_string()))
    }
}

/// Snapshot of the namespace for one decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceContext {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Namespace opted in to admission control
    pub enabled: bool,
    /// `NET_ADMIN`/`NET_RAW` capabilities allowed
    pub allow_net_admin: bool,
    /// hostPath volumes allowed
    pub allow_host_path: bool,
}

impl NamespaceContext {
    /// Derive the gate and capability flags from namespace labels
    pub fn from_labels(name: &str, labels: BTreeMap<String, String>, config: &Config) -> Self {
        let flag = |key: &str| labels.get(key).is_some_and(|v| v == "true");
        let enabled = flag(&config.keys.admission_label);
        let allow_net_admin = flag(ALLOW_NET_ADMIN_LABEL);
        let allow_host_path = flag(ALLOW_HOST_PATH_LABEL);
        Self {
            name: name.to_string(),
            labels,
            enabled,
            allow_net_admin,
            allow_host_path,
        }
    }
}

/// Fetch namespace `name` once and build its context.
///
/// Lookup failures are returned as [`Error::NamespaceLookup`]; callers deny.
pub async fn resolve<L: NamespaceLookup>(
    lookup: &L,
    name: &str,
    config: &Config,
) -> Result<NamespaceContext> {
    let labels = lookup
        .namespace_labels(name)
        .await
        .map_err(|source| Error::NamespaceLookup {
            namespace: name.to_string(),
            source,
        })?;
    let ctx = NamespaceContext::from_labels(name, labels, config);
    debug!(
        namespace = %ctx.name,
        enabled = ctx.enabled,
        allow_net_admin = ctx.allow_net_admin,
        allow_host_path = ctx.allow_host_path,
        "Resolved namespace context"
    );
    Ok(ctx)
}
