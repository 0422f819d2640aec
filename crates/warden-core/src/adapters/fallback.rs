//! Generic fallback adapter: runs for any kind no specific adapter claims.
//! Always yields exactly one Constraint.

use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::Result;
use crate::model::accessors::nested_value;
use crate::model::{derive_uid, Constraint, ConstraintType, Effect, Gvr, Severity};

const ANNOTATION_SUMMARY: &str = "io/summary";
const ANNOTATION_SEVERITY: &str = "io/severity";
const ANNOTATION_CONSTRAINT_TYPE: &str = "io/constraint-type";

pub struct FallbackAdapter;

impl super::Adapter for FallbackAdapter {
    fn name(&self) -> &'static str {
        "generic-fallback"
    }

    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>> {
        let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str).unwrap_or_default();
        let name = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default();
        let namespace =
            object.get("metadata").and_then(|m| m.get("namespace")).and_then(Value::as_str).unwrap_or_default();
        let annotations = object.get("metadata").and_then(|m| m.get("annotations")).and_then(Value::as_object);

        let annotation = |key: &str| annotations.and_then(|a| a.get(key)).and_then(Value::as_str);

        let severity = annotation(ANNOTATION_SEVERITY)
            .and_then(|s| match s {
                "critical" => Some(Severity::Critical),
                "warning" => Some(Severity::Warning),
                "info" => Some(Severity::Info),
                _ => None,
            })
            .unwrap_or(Severity::Info);

        let constraint_type = annotation(ANNOTATION_CONSTRAINT_TYPE)
            .and_then(|s| ConstraintType::from_str(s).ok())
            .unwrap_or(ConstraintType::Unknown);

        let summary = annotation(ANNOTATION_SUMMARY)
            .map(str::to_string)
            .unwrap_or_else(|| format!("unrecognized {} resource '{name}' treated as a generic constraint", gvr.resource));

        let mut details = BTreeMap::new();
        for (key, path) in [
            ("selector", &["spec", "selector"][..]),
            ("podSelector", &["spec", "podSelector"][..]),
            ("rules", &["spec", "rules"][..]),
            ("matchKinds", &["spec", "match", "kinds"][..]),
            ("parameters", &["spec", "parameters"][..]),
        ] {
            if let Some(value) = nested_value(object, path) {
                details.insert(key.to_string(), value.clone());
            }
        }

        Ok(vec![Constraint {
            uid: derive_uid(uid, ""),
            source: gvr.clone(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            affected_namespaces: if namespace.is_empty() { vec![] } else { vec![namespace.to_string()] },
            workload_selector: None,
            namespace_selector: None,
            constraint_type,
            effect: Effect::Unknown,
            severity,
            summary,
            remediation_hint: None,
            details,
            tags: vec!["fallback".to_string()],
            raw_object: object.clone(),
            observed_at: chrono::Utc::now(),
        }])
    }
}

impl FromStr for ConstraintType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "network-ingress" => Ok(Self::NetworkIngress),
            "network-egress" => Ok(Self::NetworkEgress),
            "admission" => Ok(Self::Admission),
            "resource-limit" => Ok(Self::ResourceLimit),
            "mesh-policy" => Ok(Self::MeshPolicy),
            "missing-resource" => Ok(Self::MissingResource),
            "unknown" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Adapter;
    use serde_json::json;

    #[test]
    fn annotation_overrides_are_honored() {
        let gvr = Gvr::new("example.com", "v1", "widgets");
        let object = json!({
            "metadata": {
                "uid": "u1", "name": "custom-widget",
                "annotations": {"io/summary": "custom summary", "io/severity": "critical", "io/constraint-type": "admission"}
            }
        });
        let constraints = FallbackAdapter.parse(&gvr, &object).unwrap();
        assert_eq!(constraints[0].summary, "custom summary");
        assert_eq!(constraints[0].severity, Severity::Critical);
        assert_eq!(constraints[0].constraint_type, ConstraintType::Admission);
    }

    #[test]
    fn no_annotations_synthesizes_generic_constraint() {
        let gvr = Gvr::new("example.com", "v1", "widgets");
        let object = json!({
            "metadata": {"uid": "u2", "name": "plain-widget", "namespace": "checkout"},
            "spec": {"selector": {"matchLabels": {"app": "x"}}}
        });
        let constraints = FallbackAdapter.parse(&gvr, &object).unwrap();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].severity, Severity::Info);
        assert!(constraints[0].details.contains_key("selector"));
    }
}
