//! Custom resource definitions the operator owns: `Profile` (adapter/severity
//! overrides, §4.B), `NotificationPolicy` (detail-level resolution, §4.G),
//! and `Report` (the per-namespace aggregate the reconciler writes, §4.I).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overrides adapter selection, severity, or debounce for resources matching
/// a GVR, without redeploying the operator.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "warden.io",
    version = "v1alpha1",
    kind = "Profile",
    plural = "profiles",
    singular = "profile",
    shortname = "wprof",
    namespaced = false
)]
pub struct ProfileSpec {
    pub group: String,
    pub version: String,
    pub resource: String,
    #[serde(default)]
    pub force_constraint_like: bool,
    pub force_adapter: Option<String>,
    pub force_severity: Option<String>,
    pub force_debounce_secs: Option<u64>,
    pub selector_path: Option<Vec<String>>,
    pub namespace_selector_path: Option<Vec<String>>,
    pub effect_path: Option<Vec<String>>,
    pub summary_path: Option<Vec<String>>,
}

/// Resolves a detail level for a given viewer namespace, scoping how much of
/// a Constraint a dispatched event or report entry reveals.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "warden.io",
    version = "v1alpha1",
    kind = "NotificationPolicy",
    plural = "notificationpolicies",
    singular = "notificationpolicy",
    shortname = "wnp",
    namespaced = true
)]
pub struct NotificationPolicySpec {
    /// Detail level granted to this namespace's own viewers (summary,
    /// detailed, full).
    pub detail_level: String,
    /// Free-text remediation contact surfaced in summary-level renderings.
    pub remediation_contact: Option<String>,
}

/// One entry in the machine-readable section of a namespace `Report`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReportEntry {
    pub uid: String,
    pub constraint_type: String,
    pub severity: String,
    pub effect: String,
    pub source_name: String,
    pub source_resource: String,
    pub affected_workloads: Vec<String>,
    pub remediation_steps: Vec<String>,
    pub resource_metrics: Option<BTreeMap<String, serde_json::Value>>,
    pub tags: Vec<String>,
}

/// The aggregate report one namespace's constraints and missing-resource
/// findings reduce to, written by the reconciler (§4.I).
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "warden.io",
    version = "v1alpha1",
    kind = "Report",
    plural = "reports",
    singular = "report",
    shortname = "wrpt",
    namespaced = true,
    status = "ReportStatus"
)]
pub struct ReportSpec {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReportStatus {
    pub schema_version: String,
    pub detail_level: String,
    pub total_count: u32,
    pub critical_count: u32,
    pub warning_count: u32,
    pub info_count: u32,
    pub last_updated: Option<String>,
    /// Human-readable one-line-per-constraint summaries, sorted
    /// Critical -> Warning -> Info.
    pub summary_lines: Vec<String>,
    pub entries: Vec<ReportEntry>,
}
