//! Cilium network-policy adapter: `CiliumNetworkPolicy` and the cluster-wide
//! `CiliumClusterwideNetworkPolicy` variant, registered by group so either
//! plural reaches it.

use serde_json::Value;

use crate::error::Result;
use crate::model::accessors::{nested_array, nested_bool, nested_label_selector};
use crate::model::{derive_uid, Constraint, ConstraintType, Effect, Gvr, Severity};

pub struct CiliumPolicyAdapter;

impl super::Adapter for CiliumPolicyAdapter {
    fn name(&self) -> &'static str {
        "cilium-policy"
    }

    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>> {
        let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str).unwrap_or_default();
        let name = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default();
        let namespace =
            object.get("metadata").and_then(|m| m.get("namespace")).and_then(Value::as_str).unwrap_or_default();
        let cluster_wide = gvr.resource.eq_ignore_ascii_case("ciliumclusterwidenetworkpolicies");

        let endpoint_selector = nested_label_selector(object, &["spec", "endpointSelector"]);
        let deny = nested_bool(object, &["spec", "egressDeny"]) || nested_bool(object, &["spec", "ingressDeny"]);

        let mut out = Vec::new();
        for (rules_path, constraint_type) in
            [("ingress", ConstraintType::NetworkIngress), ("egress", ConstraintType::NetworkEgress)]
        {
            let rules = nested_array(object, &["spec", rules_path]);
            if rules.is_empty() && !deny {
                continue;
            }
            let severity = if cluster_wide || deny { Severity::Critical } else { Severity::Warning };
            out.push(Constraint {
                uid: derive_uid(uid, rules_path),
                source: gvr.clone(),
                name: name.to_string(),
                namespace: namespace.to_string(),
                affected_namespaces: if cluster_wide { vec![] } else { vec![namespace.to_string()] },
                workload_selector: endpoint_selector.clone(),
                namespace_selector: None,
                constraint_type,
                effect: if deny { Effect::Deny } else { Effect::Restrict },
                severity,
                summary: format!(
                    "{} Cilium {} policy with {} rule(s)",
                    if cluster_wide { "cluster-wide" } else { "namespaced" },
                    rules_path,
                    rules.len()
                ),
                remediation_hint: None,
                details: std::collections::BTreeMap::new(),
                tags: vec!["network".to_string(), "cilium".to_string()],
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

    #[test]
    fn cluster_wide_variant_is_critical() {
        let gvr = Gvr::new("cilium.io", "v2", "ciliumclusterwidenetworkpolicies");
        let object = json!({
            "metadata": {"uid": "u1", "name": "lockdown"},
            "spec": {"endpointSelector": {}, "ingress": [{}]}
        });
        let constraints = CiliumPolicyAdapter.parse(&gvr, &object).unwrap();
        assert_eq!(constraints[0].severity, Severity::Critical);
        assert!(constraints[0].affected_namespaces.is_empty());
    }

    #[test]
    fn namespaced_variant_with_deny_is_critical() {
        let gvr = Gvr::new("cilium.io", "v2", "ciliumnetworkpolicies");
        let object = json!({
            "metadata": {"uid": "u3", "name": "lockdown-ns", "namespace": "checkout"},
            "spec": {"endpointSelector": {}, "ingressDeny": true, "egressDeny": true}
        });
        let constraints = CiliumPolicyAdapter.parse(&gvr, &object).unwrap();
        assert_eq!(constraints.len(), 2);
        assert!(constraints.iter().all(|c| c.severity == Severity::Critical));
        assert!(!constraints[0].affected_namespaces.is_empty());
    }

    #[test]
    fn namespaced_variant_without_rules_or_deny_yields_nothing() {
        let gvr = Gvr::new("cilium.io", "v2", "ciliumnetworkpolicies");
        let object = json!({
            "metadata": {"uid": "u2", "name": "noop", "namespace": "checkout"},
            "spec": {"endpointSelector": {}}
        });
        let constraints = CiliumPolicyAdapter.parse(&gvr, &object).unwrap();
        assert!(constraints.is_empty());
    }
}
