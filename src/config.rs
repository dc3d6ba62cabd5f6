//! Process configuration.
//!
//! Loaded once from the environment at startup and shared read-only
//! (`Arc<Config>`) with every request. Nothing mutates it afterwards.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::resource::{Ipv4Cidr, Quantity};

/// Label identifying the project a workload belongs to
pub const PROJECT_LABEL: &str = "project";
/// Recommended label naming the application suite
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
/// Recommended label naming the application
pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";

/// Namespace label allowing `NET_ADMIN`/`NET_RAW`
pub const ALLOW_NET_ADMIN_LABEL: &str = "allow-netadmin";
/// Namespace label allowing hostPath volumes
pub const ALLOW_HOST_PATH_LABEL: &str = "allow-hostpath";

/// Multus network attachment annotation
pub const NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

/// `nf=upf` marks a user-plane function
pub const NF_LABEL: &str = "nf";
pub const NF_LABEL_VALUE: &str = "upf";
/// `app.kubernetes.io/name` value of the user-plane function chart
pub const NF_APP_NAME: &str = "free5gc-upf";
/// Conventional name of the user-plane function's main container
pub const NF_CONTAINER_NAME: &str = "upf";

/// Reserved name of the injected packet-capture container
pub const SIDECAR_CONTAINER_NAME: &str = "tcpdump-sidecar";
/// Empty-dir volume holding capture files
pub const CAPTURE_VOLUME_NAME: &str = "tcpdump-data";
pub const CAPTURE_MOUNT_PATH: &str = "/data";

/// Slice annotations mirrored into labels, relative to the annotation domain
pub const SLICE_ANNOTATIONS: [&str; 6] = ["slice-id", "sst", "sd", "dnn", "ue-pool-cidr", "n6-cidr"];

const DEFAULT_CPU_REQUEST: &str = "50m";
const DEFAULT_MEM_REQUEST: &str = "128Mi";
const DEFAULT_CPU_LIMIT: &str = "500m";
const DEFAULT_MEM_LIMIT: &str = "512Mi";
const DEFAULT_REGISTRIES: &str = "ghcr.io,public.ecr.aws,docker.io";
const DEFAULT_DATA_CIDR: Ipv4Cidr = Ipv4Cidr::from_parts(Ipv4Addr::new(192, 168, 50, 0), 24);
const DEFAULT_SIDECAR_IMAGE: &str = "docker.io/nicolaka/netshoot:v0.13";

/// Older variable names, read when the current name is unset
const LEGACY_PROJECT_NAMESPACE: &str = "FREE5GC_NAMESPACE";
const LEGACY_SIDECAR_IMAGE: &str = "TCPDUMP_IMAGE";
const DEFAULT_PROJECT: &str = "free5gc";
const DEFAULT_ANNOTATION_DOMAIN: &str = "5g.kkarczmarek.dev";
const DEFAULT_TLS_CERT: &str = "/tls/tls.crt";
const DEFAULT_TLS_KEY: &str = "/tls/tls.key";
const DEFAULT_WEBHOOK_PORT: u16 = 8443;
const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Default resource requirements applied by mutation
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDefaults {
    pub cpu_request: Quantity,
    pub memory_request: Quantity,
    pub cpu_limit: Quantity,
    pub memory_limit: Quantity,
}

impl ResourceDefaults {
    /// Default request for `cpu` or `memory`
    pub fn request(&self, resource: &str) -> &Quantity {
        match resource {
            "cpu" => &self.cpu_request,
            _ => &self.memory_request,
        }
    }

    /// Default limit for `cpu` or `memory`
    pub fn limit(&self, resource: &str) -> &Quantity {
        match resource {
            "cpu" => &self.cpu_limit,
            _ => &self.memory_limit,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, q) in [
            ("DEFAULT_CPU_REQUEST", &self.cpu_request),
            ("DEFAULT_MEM_REQUEST", &self.memory_request),
            ("DEFAULT_CPU_LIMIT", &self.cpu_limit),
            ("DEFAULT_MEM_LIMIT", &self.memory_limit),
        ] {
            match q.value() {
                None => {
                    return Err(Error::Config(format!("{name}: invalid quantity '{q}'")));
                }
                Some(v) if v <= 0.0 => {
                    return Err(Error::Config(format!("{name}: must be positive (got '{q}')")));
                }
                Some(_) => {}
            }
        }
        for (resource, limit_key, request_key) in [
            ("cpu", "DEFAULT_CPU_LIMIT", "DEFAULT_CPU_REQUEST"),
            ("memory", "DEFAULT_MEM_LIMIT", "DEFAULT_MEM_REQUEST"),
        ] {
            if self.limit(resource).value() < self.request(resource).value() {
                return Err(Error::Config(format!(
                    "{limit_key} '{}' is below {request_key} '{}'",
                    self.limit(resource),
                    self.request(resource)
                )));
            }
        }
        Ok(())
    }
}

impl Default for ResourceDefaults {
    fn default() -> Self {
        Self {
            cpu_request: Quantity::new(DEFAULT_CPU_REQUEST),
            memory_request: Quantity::new(DEFAULT_MEM_REQUEST),
            cpu_limit: Quantity::new(DEFAULT_CPU_LIMIT),
            memory_limit: Quantity::new(DEFAULT_MEM_LIMIT),
        }
    }
}

/// How network attachment CIDR validation is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CidrValidation {
    /// Only for resources carrying the validate-networks annotation
    #[default]
    Annotation,
    /// Never
    Disabled,
}

/// Identity of the managed project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    /// Namespace the project's workloads must live in
    pub namespace: String,
    /// Value of the `project` label
    pub project_label_value: String,
    /// Value of the `app.kubernetes.io/part-of` label
    pub part_of_label_value: String,
}

/// Label and annotation keys under the project's annotation domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyKeys {
    /// Namespace opt-in label
    pub admission_label: String,
    /// Slice annotations mirrored into labels
    pub slice_annotations: Vec<String>,
    /// Per-resource opt-in for the capture sidecar
    pub tcpdump_annotation: String,
    /// Ports that must be declared by some container
    pub required_ports_annotation: String,
    /// Per-resource opt-in for network attachment CIDR checks
    pub validate_networks_annotation: String,
    /// `name@ip/prefix` interface list of network functions
    pub nf_networks_annotation: String,
}

impl PolicyKeys {
    pub fn for_domain(domain: &str) -> Self {
        let key = |name: &str| format!("{domain}/{name}");
        Self {
            admission_label: key("admission-webhook"),
            slice_annotations: SLICE_ANNOTATIONS.iter().map(|name| key(name)).collect(),
            tcpdump_annotation: key("tcpdump-enabled"),
            required_ports_annotation: key("required-ports"),
            validate_networks_annotation: key("validate-networks"),
            nf_networks_annotation: key("5g-networks"),
        }
    }
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub tls_cert_path: String,
    pub tls_key_path: String,
    pub webhook_port: u16,
    pub health_port: u16,
}

/// Immutable engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub defaults: ResourceDefaults,
    /// Allowed image registries, in configured order
    pub allowed_registries: Vec<String>,
    pub deny_latest_tag: bool,
    pub data_plane_cidr: Ipv4Cidr,
    pub cidr_validation: CidrValidation,
    pub sidecar_image: String,
    pub project: ProjectIdentity,
    pub keys: PolicyKeys,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: ResourceDefaults::default(),
            allowed_registries: split_list(DEFAULT_REGISTRIES),
            deny_latest_tag: true,
            data_plane_cidr: DEFAULT_DATA_CIDR,
            cidr_validation: CidrValidation::default(),
            sidecar_image: DEFAULT_SIDECAR_IMAGE.to_string(),
            project: ProjectIdentity {
                namespace: DEFAULT_PROJECT.to_string(),
                project_label_value: DEFAULT_PROJECT.to_string(),
                part_of_label_value: DEFAULT_PROJECT.to_string(),
            },
            keys: PolicyKeys::for_domain(DEFAULT_ANNOTATION_DOMAIN),
            server: ServerConfig {
                tls_cert_path: DEFAULT_TLS_CERT.to_string(),
                tls_key_path: DEFAULT_TLS_KEY.to_string(),
                webhook_port: DEFAULT_WEBHOOK_PORT,
                health_port: DEFAULT_HEALTH_PORT,
            },
        }
    }
}

impl Config {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset or empty variables fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let quantity = |key: &str, fallback: &Quantity| {
            get(key).map(Quantity::new).unwrap_or_else(|| fallback.clone())
        };
        let resource_defaults = ResourceDefaults {
            cpu_request: quantity("DEFAULT_CPU_REQUEST", &defaults.defaults.cpu_request),
            memory_request: quantity("DEFAULT_MEM_REQUEST", &defaults.defaults.memory_request),
            cpu_limit: quantity("DEFAULT_CPU_LIMIT", &defaults.defaults.cpu_limit),
            memory_limit: quantity("DEFAULT_MEM_LIMIT", &defaults.defaults.memory_limit),
        };
        resource_defaults.validate()?;

        let allowed_registries = match get("ALLOWED_REGISTRIES") {
            Some(list) => split_list(&list),
            None => defaults.allowed_registries,
        };
        if allowed_registries.is_empty() {
            return Err(Error::Config(
                "ALLOWED_REGISTRIES must list at least one registry".to_string(),
            ));
        }

        let deny_latest_tag = match get("DENY_LATEST_TAG") {
            Some(v) => parse_flag("DENY_LATEST_TAG", &v)?,
            None => defaults.deny_latest_tag,
        };

        let data_plane_cidr = match get("DATA_CIDR") {
            Some(v) => v
                .parse::<Ipv4Cidr>()
                .map_err(|e| Error::Config(format!("DATA_CIDR: {e}")))?,
            None => defaults.data_plane_cidr,
        };

        let cidr_validation = match get("CIDR_VALIDATION").as_deref().map(str::trim) {
            None => defaults.cidr_validation,
            Some(v) if v.eq_ignore_ascii_case("annotation") => CidrValidation::Annotation,
            Some(v) if v.eq_ignore_ascii_case("disabled") => CidrValidation::Disabled,
            Some(other) => {
                return Err(Error::Config(format!(
                    "CIDR_VALIDATION: expected 'annotation' or 'disabled', got '{other}'"
                )));
            }
        };

        let project_namespace = get("PROJECT_NAMESPACE")
            .or_else(|| get(LEGACY_PROJECT_NAMESPACE))
            .unwrap_or(defaults.project.namespace);
        let project = ProjectIdentity {
            namespace: project_namespace,
            project_label_value: get("PROJECT_LABEL_VALUE")
                .unwrap_or(defaults.project.project_label_value),
            part_of_label_value: get("PARTOF_LABEL_VALUE")
                .unwrap_or(defaults.project.part_of_label_value),
        };

        let keys = match get("ANNOTATION_DOMAIN") {
            Some(domain) => PolicyKeys::for_domain(domain.trim()),
            None => defaults.keys,
        };

        let port = |key: &str, fallback: u16| -> Result<u16> {
            match get(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("{key}: invalid port '{v}'"))),
                None => Ok(fallback),
            }
        };
        let server = ServerConfig {
            tls_cert_path: get("TLS_CERT_FILE").unwrap_or(defaults.server.tls_cert_path),
            tls_key_path: get("TLS_KEY_FILE").unwrap_or(defaults.server.tls_key_path),
            webhook_port: port("WEBHOOK_PORT", defaults.server.webhook_port)?,
            health_port: port("HEALTH_PORT", defaults.server.health_port)?,
        };

        Ok(Self {
            defaults: resource_defaults,
            allowed_registries,
            deny_latest_tag,
            data_plane_cidr,
            cidr_validation,
            sidecar_image: get("SIDECAR_IMAGE")
                .or_else(|| get(LEGACY_SIDECAR_IMAGE))
                .unwrap_or(defaults.sidecar_image),
            project,
            keys,
            server,
        })
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}
