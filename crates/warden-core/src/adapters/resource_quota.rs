//! Native `ResourceQuota` adapter: one Constraint per object, severity driven
//! by the highest utilization percentage across its tracked resources.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{derive_uid, Constraint, ConstraintType, Effect, Gvr, Severity};

pub struct ResourceQuotaAdapter;

impl super::Adapter for ResourceQuotaAdapter {
    fn name(&self) -> &'static str {
        "resource-quota"
    }

    fn handles(&self) -> &[Gvr] {
        static GVRS: std::sync::OnceLock<Vec<Gvr>> = std::sync::OnceLock::new();
        GVRS.get_or_init(|| vec![Gvr::new("", "v1", "resourcequotas")])
    }

    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>> {
        let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str).unwrap_or_default();
        let name = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default();
        let namespace =
            object.get("metadata").and_then(|m| m.get("namespace")).and_then(Value::as_str).unwrap_or_default();

        let hard = object.get("spec").and_then(|s| s.get("hard")).and_then(Value::as_object);
        let used = object.get("status").and_then(|s| s.get("used")).and_then(Value::as_object);

        let mut resources = BTreeMap::new();
        let mut max_percent: f64 = 0.0;
        let mut max_resource = String::new();

        if let Some(hard) = hard {
            for (resource, hard_value) in hard {
                let hard_qty = parse_quantity(hard_value);
                let used_qty = used.and_then(|u| u.get(resource)).map(parse_quantity).unwrap_or(0.0);
                let percent = if hard_qty > 0.0 { (used_qty / hard_qty) * 100.0 } else { 0.0 };
                if percent > max_percent {
                    max_percent = percent;
                    max_resource = resource.clone();
                }
                resources.insert(
                    resource.clone(),
                    serde_json::json!({"hard": hard_qty, "used": used_qty, "percent": percent}),
                );
            }
        }

        let severity = if max_percent > 90.0 {
            Severity::Critical
        } else if max_percent >= 75.0 {
            Severity::Warning
        } else {
            Severity::Info
        };

        let summary = if max_resource.is_empty() {
            "resource quota with no tracked resources".to_string()
        } else {
            format!("quota '{name}' is at {max_percent:.0}% of its {max_resource} limit")
        };

        Ok(vec![Constraint {
            uid: derive_uid(uid, ""),
            source: gvr.clone(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            affected_namespaces: vec![namespace.to_string()],
            workload_selector: None,
            namespace_selector: None,
            constraint_type: ConstraintType::ResourceLimit,
            effect: Effect::Limit,
            severity,
            summary,
            remediation_hint: None,
            details: BTreeMap::from([("resources".to_string(), Value::Object(resources.into_iter().collect()))]),
            tags: vec!["quota".to_string()],
            raw_object: object.clone(),
            observed_at: chrono::Utc::now(),
        }])
    }
}

/// Parses a Kubernetes resource quantity string (`"4"`, `"500m"`, `"2Gi"`)
/// into a plain f64, tolerating the suffixes actually seen in quota/limit
/// objects. Unparseable or absent values are `0.0`.
fn parse_quantity(value: &Value) -> f64 {
    let Some(s) = value.as_str() else {
        return value.as_f64().unwrap_or(0.0);
    };
    if let Some(milli) = s.strip_suffix('m') {
        return milli.parse::<f64>().unwrap_or(0.0) / 1000.0;
    }
    const BINARY_SUFFIXES: [(&str, f64); 4] =
        [("Ki", 1e3), ("Mi", 1e6), ("Gi", 1e9), ("Ti", 1e12)];
    for (suffix, multiplier) in BINARY_SUFFIXES {
        if let Some(number) = s.strip_suffix(suffix) {
            return number.parse::<f64>().unwrap_or(0.0) * multiplier;
        }
    }
    s.parse::<f64>().unwrap_or(0.0)
}
