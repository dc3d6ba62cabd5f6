//! Canonical view of a submitted workload.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Pod, PodSpec, PodTemplateSpec, ResourceRequirements,
    SecurityContext, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;

use super::{Quantity, TemplatePath, WorkloadKind};
use crate::error::{Error, Result};

/// Canonical form of a submitted pod or workload template
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceView {
    pub kind: WorkloadKind,
    pub origin: TemplatePath,
    pub metadata: MetadataView,
    pub pod_spec: PodSpecView,
}

/// Object metadata relevant to policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataView {
    /// Name of the submitted object (outer object for templates)
    pub name: Option<String>,
    /// Namespace recorded on the submitted object, if any
    pub namespace: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    pub annotations: Option<BTreeMap<String, String>>,
    /// Whether the metadata object exists in the document.
    /// Always true for bare pods; templates may omit it.
    pub present: bool,
}

impl MetadataView {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.as_ref()?.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.as_ref()?.get(key).map(String::as_str)
    }
}

/// Pod specification relevant to policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodSpecView {
    pub containers: Vec<ContainerSpec>,
    pub init_containers: Vec<ContainerSpec>,
    /// `None` when the document has no `volumes` field
    pub volumes: Option<Vec<VolumeSpec>>,
    pub host_network: bool,
}

/// Which container list a container belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerGroup {
    Containers,
    InitContainers,
}

impl ContainerGroup {
    /// Field name in the pod spec
    pub fn field(&self) -> &'static str {
        match self {
            ContainerGroup::Containers => "containers",
            ContainerGroup::InitContainers => "initContainers",
        }
    }
}

impl PodSpecView {
    /// Containers followed by init containers, with their group and index
    pub fn all_containers(&self) -> impl Iterator<Item = (ContainerGroup, usize, &ContainerSpec)> {
        let containers = self
            .containers
            .iter()
            .enumerate()
            .map(|(i, c)| (ContainerGroup::Containers, i, c));
        let init = self
            .init_containers
            .iter()
            .enumerate()
            .map(|(i, c)| (ContainerGroup::InitContainers, i, c));
        containers.chain(init)
    }

    pub fn volumes(&self) -> &[VolumeSpec] {
        self.volumes.as_deref().unwrap_or_default()
    }
}

/// A container or init container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: Option<String>,
    /// `None` when the container has no `ports` field
    pub ports: Option<Vec<PortSpec>>,
    /// `None` when the container has no `resources` field
    pub resources: Option<ResourceSpec>,
    pub security: Option<SecurityDescriptor>,
    pub volume_mounts: Vec<VolumeMountSpec>,
}

impl ContainerSpec {
    /// Whether the container declares `number` with `protocol`
    pub fn declares_port(&self, number: i32, protocol: &str) -> bool {
        self.ports
            .iter()
            .flatten()
            .any(|p| p.number == number && p.protocol.eq_ignore_ascii_case(protocol))
    }

    /// Whether any declared port already uses `name`
    pub fn declares_port_name(&self, name: &str) -> bool {
        self.ports
            .iter()
            .flatten()
            .any(|p| p.name.as_deref() == Some(name))
    }

    /// Whether the container explicitly runs privileged
    pub fn is_privileged(&self) -> bool {
        self.security
            .as_ref()
            .and_then(|s| s.privileged)
            .unwrap_or(false)
    }

    /// Capabilities requested in `securityContext.capabilities.add`
    pub fn added_capabilities(&self) -> &[String] {
        self.security
            .as_ref()
            .and_then(|s| s.capabilities.as_ref())
            .map(|c| c.add.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: Option<String>,
    pub number: i32,
    /// Defaults to `TCP` when the document omits it
    pub protocol: String,
}

/// `resources` block of a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSpec {
    pub requests: Option<ResourceList>,
    pub limits: Option<ResourceList>,
}

/// CPU and memory entries of a requests or limits map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceList {
    pub cpu: Option<Quantity>,
    pub memory: Option<Quantity>,
}

impl ResourceList {
    fn from_map(
        map: &BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>,
    ) -> Self {
        Self {
            cpu: map.get("cpu").map(Quantity::from),
            memory: map.get("memory").map(Quantity::from),
        }
    }

    /// Look up `cpu` or `memory`
    pub fn get(&self, resource: &str) -> Option<&Quantity> {
        match resource {
            "cpu" => self.cpu.as_ref(),
            "memory" => self.memory.as_ref(),
            _ => None,
        }
    }
}

/// Container `securityContext`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityDescriptor {
    pub privileged: Option<bool>,
    pub allow_privilege_escalation: Option<bool>,
    pub capabilities: Option<CapabilitySet>,
    /// Seccomp profile type; an empty string counts as unset
    pub seccomp_profile: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitySet {
    pub add: Vec<String>,
    /// `None` when the document has no `drop` field
    pub drop: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMountSpec {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    EmptyDir,
    HostPath { path: String },
    Other,
}

impl ResourceView {
    /// Decode `raw` as `kind` and extract the canonical view.
    ///
    /// Fails with [`Error::Decode`] when the document does not match the
    /// declared kind's shape.
    pub fn decode(kind: WorkloadKind, raw: &[u8]) -> Result<Self> {
        match kind {
            WorkloadKind::Pod => {
                let pod: Pod = decode_as(kind, raw)?;
                Ok(Self::from_pod(pod))
            }
            WorkloadKind::Deployment => {
                let d: Deployment = decode_as(kind, raw)?;
                let template = d.spec.map(|s| s.template);
                Self::from_template(kind, d.metadata, template)
            }
            WorkloadKind::StatefulSet => {
                let s: StatefulSet = decode_as(kind, raw)?;
                let template = s.spec.map(|s| s.template);
                Self::from_template(kind, s.metadata, template)
            }
            WorkloadKind::DaemonSet => {
                let d: DaemonSet = decode_as(kind, raw)?;
                let template = d.spec.map(|s| s.template);
                Self::from_template(kind, d.metadata, template)
            }
            WorkloadKind::ReplicaSet => {
                let r: ReplicaSet = decode_as(kind, raw)?;
                let template = r.spec.and_then(|s| s.template);
                Self::from_template(kind, r.metadata, template)
            }
            WorkloadKind::Job => {
                let j: Job = decode_as(kind, raw)?;
                let template = j.spec.map(|s| s.template);
                Self::from_template(kind, j.metadata, template)
            }
            WorkloadKind::CronJob => {
                let c: CronJob = decode_as(kind, raw)?;
                let template = c
                    .spec
                    .and_then(|s| s.job_template.spec)
                    .map(|s| s.template);
                Self::from_template(kind, c.metadata, template)
            }
        }
    }

    fn from_pod(pod: Pod) -> Self {
        Self {
            kind: WorkloadKind::Pod,
            origin: TemplatePath::Pod,
            metadata: MetadataView {
                name: pod.metadata.name,
                namespace: pod.metadata.namespace,
                labels: pod.metadata.labels,
                annotations: pod.metadata.annotations,
                present: true,
            },
            pod_spec: pod.spec.map(PodSpecView::from).unwrap_or_default(),
        }
    }

    fn from_template(
        kind: WorkloadKind,
        outer: ObjectMeta,
        template: Option<PodTemplateSpec>,
    ) -> Result<Self> {
        let template = template.ok_or_else(|| Error::Decode {
            kind: kind.to_string(),
            source: <serde_json::Error as serde::de::Error>::custom("missing pod template"),
        })?;
        let present = template.metadata.is_some();
        let meta = template.metadata.unwrap_or_default();

        Ok(Self {
            kind,
            origin: kind.origin(),
            metadata: MetadataView {
                name: outer.name,
                namespace: outer.namespace,
                labels: meta.labels,
                annotations: meta.annotations,
                present,
            },
            pod_spec: template.spec.map(PodSpecView::from).unwrap_or_default(),
        })
    }
}

fn decode_as<T: DeserializeOwned>(kind: WorkloadKind, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|source| Error::Decode {
        kind: kind.to_string(),
        source,
    })
}

impl From<PodSpec> for PodSpecView {
    fn from(spec: PodSpec) -> Self {
        Self {
            containers: spec.containers.iter().map(ContainerSpec::from).collect(),
            init_containers: spec
                .init_containers
                .iter()
                .flatten()
                .map(ContainerSpec::from)
                .collect(),
            volumes: spec
                .volumes
                .map(|vols| vols.iter().map(VolumeSpec::from).collect()),
            host_network: spec.host_network.unwrap_or(false),
        }
    }
}

impl From<&Container> for ContainerSpec {
    fn from(c: &Container) -> Self {
        Self {
            name: c.name.clone(),
            image: c.image.clone(),
            ports: c
                .ports
                .as_ref()
                .map(|ports| ports.iter().map(PortSpec::from).collect()),
            resources: c.resources.as_ref().map(ResourceSpec::from),
            security: c.security_context.as_ref().map(SecurityDescriptor::from),
            volume_mounts: c
                .volume_mounts
                .iter()
                .flatten()
                .map(|m| VolumeMountSpec {
                    name: m.name.clone(),
                    mount_path: m.mount_path.clone(),
                })
                .collect(),
        }
    }
}

impl From<&ContainerPort> for PortSpec {
    fn from(p: &ContainerPort) -> Self {
        Self {
            name: p.name.clone(),
            number: p.container_port,
            protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
        }
    }
}

impl From<&ResourceRequirements> for ResourceSpec {
    fn from(r: &ResourceRequirements) -> Self {
        Self {
            requests: r.requests.as_ref().map(ResourceList::from_map),
            limits: r.limits.as_ref().map(ResourceList::from_map),
        }
    }
}

impl From<&SecurityContext> for SecurityDescriptor {
    fn from(sc: &SecurityContext) -> Self {
        Self {
            privileged: sc.privileged,
            allow_privilege_escalation: sc.allow_privilege_escalation,
            capabilities: sc.capabilities.as_ref().map(|caps| CapabilitySet {
                add: caps.add.clone().unwrap_or_default(),
                drop: caps.drop.clone(),
            }),
            seccomp_profile: sc.seccomp_profile.as_ref().map(|p| p.type_.clone()),
        }
    }
}

impl From<&Volume> for VolumeSpec {
    fn from(v: &Volume) -> Self {
        let source = if let Some(host_path) = &v.host_path {
            VolumeSource::HostPath {
                path: host_path.path.clone(),
            }
        } else if v.empty_dir.is_some() {
            VolumeSource::EmptyDir
        } else {
            VolumeSource::Other
        };
        Self {
            name: v.name.clone(),
            source,
        }
    }
}
