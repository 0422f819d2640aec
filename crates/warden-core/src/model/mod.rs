//! The normalized `Constraint` record and its supporting types.
//!
//! Everything downstream of the adapters (§4.B) operates on these types, not
//! on raw cluster objects.

pub mod accessors;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A namespace used to derive deterministic per-subpath Constraint UIDs from
/// a source object's UID. Fixed so the same (source UID, subpath) pair always
/// yields the same Constraint UID across restarts.
const SUBPATH_UID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x5f, 0x3c, 0x12, 0x8a, 0x9e, 0x41, 0x4e, 0x7a, 0xb0, 0x2d, 0x61, 0x0c, 0x4d, 0x9b, 0xf3, 0x77,
]);

/// Derives the Constraint UID for one of several obligations carried by a
/// single source object (e.g. one webhook entry among many in a single
/// `ValidatingWebhookConfiguration`).
///
/// Returns `source_uid` unchanged when `subpath` is empty, since a source
/// that yields exactly one Constraint needs no disambiguation.
#[must_use]
pub fn derive_uid(source_uid: &str, subpath: &str) -> String {
    if subpath.is_empty() {
        return source_uid.to_string();
    }
    let name = format!("{source_uid}/{subpath}");
    Uuid::new_v5(&SUBPATH_UID_NAMESPACE, name.as_bytes()).to_string()
}

/// A Kubernetes group/version/resource triple identifying a watched kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gvr {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl Gvr {
    #[must_use]
    pub fn new(group: impl Into<String>, version: impl Into<String>, resource: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), resource: resource.into() }
    }
}

impl std::fmt::Display for Gvr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// A (kind, apiVersion, name, namespace, uid) tuple identifying a workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub kind: String,
    pub api_version: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

/// Normalized severity. Ordered Critical < Warning < Info so that a sort by
/// `Severity` naturally produces Critical-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl Severity {
    /// The cluster Event type this severity maps to (§4.G).
    #[must_use]
    pub fn event_type(self) -> &'static str {
        match self {
            Self::Critical | Self::Warning => "Warning",
            Self::Info => "Normal",
        }
    }
}

/// What kind of obligation a Constraint represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    NetworkIngress,
    NetworkEgress,
    Admission,
    ResourceLimit,
    MeshPolicy,
    MissingResource,
    Unknown,
}

impl std::fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NetworkIngress => "network-ingress",
            Self::NetworkEgress => "network-egress",
            Self::Admission => "admission",
            Self::ResourceLimit => "resource-limit",
            Self::MeshPolicy => "mesh-policy",
            Self::MissingResource => "missing-resource",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// The short verb describing what a Constraint does to a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Deny,
    Restrict,
    Warn,
    Audit,
    Limit,
    Intercept,
    Missing,
    Unknown,
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Deny => "deny",
            Self::Restrict => "restrict",
            Self::Warn => "warn",
            Self::Audit => "audit",
            Self::Limit => "limit",
            Self::Intercept => "intercept",
            Self::Missing => "missing",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deny" => Ok(Self::Deny),
            "restrict" => Ok(Self::Restrict),
            "warn" => Ok(Self::Warn),
            "audit" => Ok(Self::Audit),
            "limit" => Ok(Self::Limit),
            "intercept" => Ok(Self::Intercept),
            "missing" => Ok(Self::Missing),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown effect '{other}'")),
        }
    }
}

/// Privacy scope controlling how much of a Constraint is rendered into a
/// notification or report entry. Ordered Summary < Detailed < Full so callers
/// can clamp a requested level against a configured ceiling with `min`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    #[default]
    Summary,
    Detailed,
    Full,
}

impl std::fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Summary => "summary",
            Self::Detailed => "detailed",
            Self::Full => "full",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DetailLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Self::Summary),
            "detailed" => Ok(Self::Detailed),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown detail level '{other}'")),
        }
    }
}

/// One normalized policy obligation, produced by an adapter from a source
/// cluster object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub uid: String,
    pub source: Gvr,
    pub name: String,
    pub namespace: String,
    pub affected_namespaces: Vec<String>,
    pub workload_selector: Option<LabelSelector>,
    pub namespace_selector: Option<LabelSelector>,
    pub constraint_type: ConstraintType,
    pub effect: Effect,
    pub severity: Severity,
    pub summary: String,
    pub remediation_hint: Option<String>,
    pub details: BTreeMap<String, Value>,
    pub tags: Vec<String>,
    pub raw_object: Value,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl Constraint {
    /// Deduplicates `affected_namespaces` and ensures `namespace` is a member
    /// for namespace-scoped constraints, per the §3 invariant.
    pub fn normalize_affected_namespaces(&mut self) {
        if !self.namespace.is_empty() && !self.affected_namespaces.iter().any(|n| n == &self.namespace) {
            self.affected_namespaces.push(self.namespace.clone());
        }
        self.affected_namespaces.sort();
        self.affected_namespaces.dedup();
    }

    /// Whether this constraint is in scope for `namespace`: either it names
    /// the namespace explicitly, or it is cluster-scoped (empty
    /// `affected_namespaces` on a constraint with no `namespace`).
    #[must_use]
    pub fn applies_to_namespace(&self, namespace: &str) -> bool {
        if self.namespace.is_empty() && self.affected_namespaces.is_empty() {
            return true;
        }
        self.affected_namespaces.iter().any(|n| n == namespace)
    }
}

/// One dropped packet/connection reported by the drop-stream client (§4.J).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDrop {
    pub source: FlowEndpoint,
    pub destination: FlowEndpoint,
    pub l4: L4Info,
    pub drop_reason: String,
    pub observed_at: DateTime<Utc>,
}

/// One side of a `FlowDrop`: a workload's identity and network position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEndpoint {
    pub namespace: String,
    pub pod_name: String,
    pub labels: BTreeMap<String, String>,
    pub workload_ref: Option<WorkloadRef>,
    pub security_identity: Option<String>,
    pub ip: String,
}

/// Layer-4 descriptor for a `FlowDrop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L4Info {
    pub protocol: String,
    pub source_port: u32,
    pub destination_port: u32,
    pub tcp_flags: Option<String>,
}
