//! Kyverno `ClusterPolicy`/`Policy` adapter: severity mapped from the
//! policy's validation failure action (its closest analog to an enforcement
//! mode).

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{derive_uid, Constraint, ConstraintType, Effect, Gvr, Severity};

pub struct KyvernoAdapter;

impl super::Adapter for KyvernoAdapter {
    fn name(&self) -> &'static str {
        "kyverno"
    }

    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>> {
        let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str).unwrap_or_default();
        let name = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default();
        let namespace =
            object.get("metadata").and_then(|m| m.get("namespace")).and_then(Value::as_str).unwrap_or_default();

        let failure_action =
            object.get("spec").and_then(|s| s.get("validationFailureAction")).and_then(Value::as_str).unwrap_or("Audit");
        let (severity, effect) = if failure_action.eq_ignore_ascii_case("enforce") {
            (Severity::Critical, Effect::Deny)
        } else {
            (Severity::Info, Effect::Audit)
        };

        let rule_count =
            object.get("spec").and_then(|s| s.get("rules")).and_then(Value::as_array).map_or(0, Vec::len);

        Ok(vec![Constraint {
            uid: derive_uid(uid, ""),
            source: gvr.clone(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            affected_namespaces: if namespace.is_empty() { vec![] } else { vec![namespace.to_string()] },
            workload_selector: None,
            namespace_selector: None,
            constraint_type: ConstraintType::Admission,
            effect,
            severity,
            summary: format!("Kyverno policy '{name}' with {rule_count} rule(s), mode {failure_action}"),
            remediation_hint: None,
            details: BTreeMap::from([("ruleCount".to_string(), Value::Number(rule_count.into()))]),
            tags: vec!["admission".to_string(), "kyverno".to_string()],
            raw_object: object.clone(),
            observed_at: chrono::Utc::now(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Adapter;
    use serde_json::json;

    #[test]
    fn enforce_mode_is_critical() {
        let gvr = Gvr::new("kyverno.io", "v1", "clusterpolicies");
        let object = json!({
            "metadata": {"uid": "u1", "name": "require-labels"},
            "spec": {"validationFailureAction": "Enforce", "rules": [{}, {}]}
        });
        let constraints = KyvernoAdapter.parse(&gvr, &object).unwrap();
        assert_eq!(constraints[0].severity, Severity::Critical);
    }

    #[test]
    fn audit_mode_is_info() {
        let gvr = Gvr::new("kyverno.io", "v1", "policies");
        let object = json!({
            "metadata": {"uid": "u2", "name": "audit-only", "namespace": "checkout"},
            "spec": {"validationFailureAction": "Audit"}
        });
        let constraints = KyvernoAdapter.parse(&gvr, &object).unwrap();
        assert_eq!(constraints[0].severity, Severity::Info);
    }
}
