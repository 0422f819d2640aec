//! OPA Gatekeeper constraint adapter: any kind in the
//! `constraints.gatekeeper.sh` group, registered by group since Gatekeeper
//! generates one CRD per constraint template.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{derive_uid, Constraint, ConstraintType, Effect, Gvr, Severity};

pub struct GatekeeperAdapter;

impl super::Adapter for GatekeeperAdapter {
    fn name(&self) -> &'static str {
        "gatekeeper"
    }

    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>> {
        let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str).unwrap_or_default();
        let name = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default();
        let kind = gvr.resource.clone();

        let enforcement_action =
            object.get("spec").and_then(|s| s.get("enforcementAction")).and_then(Value::as_str).unwrap_or("deny");
        let (severity, effect) = match enforcement_action {
            "warn" => (Severity::Warning, Effect::Warn),
            "dryrun" => (Severity::Info, Effect::Audit),
            _ => (Severity::Critical, Effect::Deny),
        };

        let matched_kinds = object
            .get("spec")
            .and_then(|s| s.get("match"))
            .and_then(|m| m.get("kinds"))
            .cloned()
            .unwrap_or(Value::Array(vec![]));

        Ok(vec![Constraint {
            uid: derive_uid(uid, ""),
            source: gvr.clone(),
            name: name.to_string(),
            namespace: String::new(),
            affected_namespaces: vec![],
            workload_selector: None,
            namespace_selector: None,
            constraint_type: ConstraintType::Admission,
            effect,
            severity,
            summary: format!("Gatekeeper {kind} constraint '{name}' ({enforcement_action})"),
            remediation_hint: None,
            details: BTreeMap::from([("matchKinds".to_string(), matched_kinds)]),
            tags: vec!["admission".to_string(), "gatekeeper".to_string()],
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
    fn enforcement_action_drives_severity() {
        let gvr = Gvr::new("constraints.gatekeeper.sh", "v1beta1", "k8srequiredlabels");
        for (action, expected) in [("deny", Severity::Critical), ("warn", Severity::Warning), ("dryrun", Severity::Info)] {
            let object = json!({
                "metadata": {"uid": "u1", "name": "must-have-owner"},
                "spec": {"enforcementAction": action}
            });
            let constraints = GatekeeperAdapter.parse(&gvr, &object).unwrap();
            assert_eq!(constraints[0].severity, expected);
        }
    }
}
