//! Native `NetworkPolicy` adapter: one Constraint per policy-type direction.

use serde_json::Value;

use crate::error::Result;
use crate::model::accessors::{nested_array, nested_label_selector, nested_string_slice};
use crate::model::{derive_uid, Constraint, ConstraintType, Effect, Gvr, Severity};

pub struct NetworkPolicyAdapter;

impl super::Adapter for NetworkPolicyAdapter {
    fn name(&self) -> &'static str {
        "network-policy"
    }

    fn handles(&self) -> &[Gvr] {
        static GVRS: std::sync::OnceLock<Vec<Gvr>> = std::sync::OnceLock::new();
        GVRS.get_or_init(|| vec![Gvr::new("networking.k8s.io", "v1", "networkpolicies")])
    }

    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>> {
        let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str).unwrap_or_default();
        let name = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default();
        let namespace =
            object.get("metadata").and_then(|m| m.get("namespace")).and_then(Value::as_str).unwrap_or_default();

        let pod_selector = nested_label_selector(object, &["spec", "podSelector"]);
        let policy_types = nested_string_slice(object, &["spec", "policyTypes"]);
        let policy_types = if policy_types.is_empty() { vec!["Ingress".to_string()] } else { policy_types };

        let mut out = Vec::with_capacity(policy_types.len());
        for direction in policy_types {
            let rules_path = if direction == "Egress" { "egress" } else { "ingress" };
            let rules = nested_array(object, &["spec", rules_path]);
            let deny_all = rules.is_empty();

            let constraint_type =
                if direction == "Egress" { ConstraintType::NetworkEgress } else { ConstraintType::NetworkIngress };
            let severity = if deny_all { Severity::Critical } else { Severity::Warning };
            let summary = if deny_all {
                format!("denies all {} traffic to selected pods", rules_path)
            } else {
                format!("restricts {} traffic to {} rule(s)", rules_path, rules.len())
            };

            out.push(Constraint {
                uid: derive_uid(uid, &direction.to_lowercase()),
                source: gvr.clone(),
                name: name.to_string(),
                namespace: namespace.to_string(),
                affected_namespaces: vec![namespace.to_string()],
                workload_selector: pod_selector.clone(),
                namespace_selector: None,
                constraint_type,
                effect: if deny_all { Effect::Deny } else { Effect::Restrict },
                severity,
                summary,
                remediation_hint: None,
                details: std::collections::BTreeMap::from([(
                    "ruleCount".to_string(),
                    Value::Number(rules.len().into()),
                )]),
                tags: vec!["network".to_string(), direction.to_lowercase()],
                raw_object: object.clone(),
                observed_at: chrono::Utc::now(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Adapter;
    use serde_json::json;

    fn gvr() -> Gvr {
        Gvr::new("networking.k8s.io", "v1", "networkpolicies")
    }

    #[test]
    fn deny_all_ingress_is_critical() {
        let object = json!({
            "metadata": {"uid": "u1", "name": "deny-all", "namespace": "checkout"},
            "spec": {"podSelector": {}, "policyTypes": ["Ingress"]}
        });
        let constraints = NetworkPolicyAdapter.parse(&gvr(), &object).unwrap();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].constraint_type, ConstraintType::NetworkIngress);
        assert_eq!(constraints[0].severity, Severity::Critical);
        assert!(constraints[0].summary.contains("denies all ingress"));
    }

    #[test]
    fn policy_with_rules_is_warning() {
        let object = json!({
            "metadata": {"uid": "u2", "name": "allow-frontend", "namespace": "checkout"},
            "spec": {
                "podSelector": {"matchLabels": {"app": "checkout"}},
                "policyTypes": ["Ingress"],
                "ingress": [{"from": [{"podSelector": {"matchLabels": {"app": "gateway"}}}]}]
            }
        });
        let constraints = NetworkPolicyAdapter.parse(&gvr(), &object).unwrap();
        assert_eq!(constraints[0].severity, Severity::Warning);
        assert_eq!(constraints[0].effect, Effect::Restrict);
    }

    #[test]
    fn ingress_and_egress_produce_distinct_uids() {
        let object = json!({
            "metadata": {"uid": "u3", "name": "both", "namespace": "checkout"},
            "spec": {"podSelector": {}, "policyTypes": ["Ingress", "Egress"]}
        });
        let constraints = NetworkPolicyAdapter.parse(&gvr(), &object).unwrap();
        assert_eq!(constraints.len(), 2);
        assert_ne!(constraints[0].uid, constraints[1].uid);
    }
}
