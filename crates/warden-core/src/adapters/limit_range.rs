//! Native `LimitRange` adapter: one Constraint per limit entry.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::accessors::nested_array;
use crate::model::{derive_uid, Constraint, ConstraintType, Effect, Gvr, Severity};

pub struct LimitRangeAdapter;

impl super::Adapter for LimitRangeAdapter {
    fn name(&self) -> &'static str {
        "limit-range"
    }

    fn handles(&self) -> &[Gvr] {
        static GVRS: std::sync::OnceLock<Vec<Gvr>> = std::sync::OnceLock::new();
        GVRS.get_or_init(|| vec![Gvr::new("", "v1", "limitranges")])
    }

    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>> {
        let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str).unwrap_or_default();
        let name = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default();
        let namespace =
            object.get("metadata").and_then(|m| m.get("namespace")).and_then(Value::as_str).unwrap_or_default();

        let limits = nested_array(object, &["spec", "limits"]);
        let mut out = Vec::with_capacity(limits.len().max(1));
        for (index, entry) in limits.iter().enumerate() {
            let entry_type = entry.get("type").and_then(Value::as_str).unwrap_or("Container");
            out.push(Constraint {
                uid: derive_uid(uid, &index.to_string()),
                source: gvr.clone(),
                name: name.to_string(),
                namespace: namespace.to_string(),
                affected_namespaces: vec![namespace.to_string()],
                workload_selector: None,
                namespace_selector: None,
                constraint_type: ConstraintType::ResourceLimit,
                effect: Effect::Limit,
                severity: Severity::Info,
                summary: format!("limit range entry #{index} bounds {entry_type} resources"),
                remediation_hint: None,
                details: BTreeMap::from([("entry".to_string(), entry.clone())]),
                tags: vec!["quota".to_string(), "limit-range".to_string()],
                raw_object: object.clone(),
                observed_at: chrono::Utc::now(),
            });
        }
        if out.is_empty() {
            return Ok(vec![]);
        }
        Ok(out)
    }
}
