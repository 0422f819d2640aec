//! Constraint/workload fixture builders shared across warden-core's and
//! warden-operator's integration tests.

use std::collections::BTreeMap;

use warden_core::model::{Constraint, ConstraintType, Effect, Gvr, Severity, WorkloadRef};

/// A minimal, valid `NetworkPolicy`-sourced `Constraint` in `namespace`,
/// overridable by the caller for anything that matters to a specific test.
#[must_use]
pub fn sample_constraint(namespace: &str) -> Constraint {
    Constraint {
        uid: format!("{namespace}/deny-all"),
        source: Gvr::new("networking.k8s.io", "v1", "networkpolicies"),
        name: "deny-all".to_string(),
        namespace: namespace.to_string(),
        affected_namespaces: vec![namespace.to_string()],
        workload_selector: None,
        namespace_selector: None,
        constraint_type: ConstraintType::NetworkIngress,
        effect: Effect::Deny,
        severity: Severity::Critical,
        summary: "denies all ingress".to_string(),
        remediation_hint: None,
        details: BTreeMap::new(),
        tags: vec![],
        raw_object: serde_json::Value::Null,
        observed_at: chrono::Utc::now(),
    }
}

/// A `WorkloadRef` for `kind/name` in `namespace`.
#[must_use]
pub fn sample_workload_ref(kind: &str, namespace: &str, name: &str) -> WorkloadRef {
    WorkloadRef {
        kind: kind.to_string(),
        api_version: "apps/v1".to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
        uid: format!("{namespace}/{name}"),
    }
}
