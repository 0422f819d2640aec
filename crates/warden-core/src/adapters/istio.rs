//! Istio `AuthorizationPolicy`/`PeerAuthentication` adapter: mesh-level
//! traffic policy, always Warning severity per §4.B.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::accessors::nested_label_selector;
use crate::model::{derive_uid, Constraint, ConstraintType, Effect, Gvr, Severity};

pub struct IstioAdapter;

impl super::Adapter for IstioAdapter {
    fn name(&self) -> &'static str {
        "istio"
    }

    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>> {
        let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str).unwrap_or_default();
        let name = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default();
        let namespace =
            object.get("metadata").and_then(|m| m.get("namespace")).and_then(Value::as_str).unwrap_or_default();

        let selector = nested_label_selector(object, &["spec", "selector"]);
        let action = object.get("spec").and_then(|s| s.get("action")).and_then(Value::as_str).unwrap_or("ALLOW");

        Ok(vec![Constraint {
            uid: derive_uid(uid, ""),
            source: gvr.clone(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            affected_namespaces: vec![namespace.to_string()],
            workload_selector: selector,
            namespace_selector: None,
            constraint_type: ConstraintType::MeshPolicy,
            effect: Effect::Restrict,
            severity: Severity::Warning,
            summary: format!("Istio {} policy '{name}' with action {action}", gvr.resource),
            remediation_hint: None,
            details: BTreeMap::from([("action".to_string(), Value::String(action.to_string()))]),
            tags: vec!["mesh".to_string(), "istio".to_string()],
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
    fn produces_one_warning_constraint() {
        let gvr = Gvr::new("security.istio.io", "v1", "authorizationpolicies");
        let object = json!({
            "metadata": {"uid": "u1", "name": "deny-external", "namespace": "checkout"},
            "spec": {"action": "DENY", "selector": {"matchLabels": {"app": "checkout"}}}
        });
        let constraints = IstioAdapter.parse(&gvr, &object).unwrap();
        assert_eq!(constraints[0].severity, Severity::Warning);
        assert_eq!(constraints[0].constraint_type, ConstraintType::MeshPolicy);
    }
}
