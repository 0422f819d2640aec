//! Validating/mutating admission webhook config adapter: one Constraint per
//! webhook entry within the config object.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::accessors::nested_array;
use crate::model::{derive_uid, Constraint, ConstraintType, Effect, Gvr, Severity};

/// A webhook config carrying this label is assumed to be managed by this
/// system itself and is skipped, per §4.B's webhook-config policy.
const SELF_MANAGED_LABEL: &str = "app.kubernetes.io/managed-by";
const SELF_MANAGED_VALUE: &str = "warden";

pub struct WebhookConfigAdapter {
    kind: &'static str,
}

impl WebhookConfigAdapter {
    #[must_use]
    pub fn validating() -> Self {
        Self { kind: "validatingwebhookconfigurations" }
    }

    #[must_use]
    pub fn mutating() -> Self {
        Self { kind: "mutatingwebhookconfigurations" }
    }
}

impl super::Adapter for WebhookConfigAdapter {
    fn name(&self) -> &'static str {
        "webhook-config"
    }

    fn handles(&self) -> &[Gvr] {
        if self.kind == "validatingwebhookconfigurations" {
            static VALIDATING: std::sync::OnceLock<Vec<Gvr>> = std::sync::OnceLock::new();
            VALIDATING.get_or_init(|| vec![Gvr::new("admissionregistration.k8s.io", "v1", "validatingwebhookconfigurations")])
        } else {
            static MUTATING: std::sync::OnceLock<Vec<Gvr>> = std::sync::OnceLock::new();
            MUTATING.get_or_init(|| vec![Gvr::new("admissionregistration.k8s.io", "v1", "mutatingwebhookconfigurations")])
        }
    }

    fn parse(&self, gvr: &Gvr, object: &Value) -> Result<Vec<Constraint>> {
        let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str).unwrap_or_default();
        let name = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or_default();

        let is_self_managed = object
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.get(SELF_MANAGED_LABEL))
            .and_then(Value::as_str)
            == Some(SELF_MANAGED_VALUE);
        if is_self_managed {
            return Ok(vec![]);
        }

        let webhooks = nested_array(object, &["webhooks"]);
        let mut out = Vec::with_capacity(webhooks.len());
        for (index, webhook) in webhooks.iter().enumerate() {
            let webhook_name = webhook.get("name").and_then(Value::as_str).unwrap_or("unnamed");
            let failure_policy = webhook.get("failurePolicy").and_then(Value::as_str).unwrap_or("Fail");
            let severity = if failure_policy.eq_ignore_ascii_case("ignore") { Severity::Info } else { Severity::Warning };

            let namespace_selector =
                crate::model::accessors::nested_label_selector(webhook, &["namespaceSelector"]);
            let object_selector = crate::model::accessors::nested_label_selector(webhook, &["objectSelector"]);

            out.push(Constraint {
                uid: derive_uid(uid, &index.to_string()),
                source: gvr.clone(),
                name: name.to_string(),
                namespace: String::new(),
                affected_namespaces: vec![],
                workload_selector: object_selector,
                namespace_selector,
                constraint_type: ConstraintType::Admission,
                effect: if failure_policy.eq_ignore_ascii_case("ignore") { Effect::Audit } else { Effect::Intercept },
                severity,
                summary: format!("admission webhook '{webhook_name}' with failurePolicy={failure_policy}"),
                remediation_hint: None,
                details: BTreeMap::from([
                    ("webhookName".to_string(), Value::String(webhook_name.to_string())),
                    ("failurePolicy".to_string(), Value::String(failure_policy.to_string())),
                ]),
                tags: vec!["admission".to_string()],
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
    fn two_entries_yield_distinct_severities() {
        let gvr = Gvr::new("admissionregistration.k8s.io", "v1", "validatingwebhookconfigurations");
        let object = json!({
            "metadata": {"uid": "u1", "name": "cfg"},
            "webhooks": [
                {"name": "validate.example.com", "failurePolicy": "Fail"},
                {"name": "audit.example.com", "failurePolicy": "Ignore"}
            ]
        });
        let constraints = WebhookConfigAdapter::validating().parse(&gvr, &object).unwrap();
        assert_eq!(constraints.len(), 2);
        assert_eq!(constraints[0].severity, Severity::Warning);
        assert_eq!(constraints[1].severity, Severity::Info);
    }

    #[test]
    fn self_managed_config_is_skipped() {
        let gvr = Gvr::new("admissionregistration.k8s.io", "v1", "validatingwebhookconfigurations");
        let object = json!({
            "metadata": {"uid": "u2", "name": "warden-self", "labels": {"app.kubernetes.io/managed-by": "warden"}},
            "webhooks": [{"name": "self.warden.io", "failurePolicy": "Fail"}]
        });
        let constraints = WebhookConfigAdapter::validating().parse(&gvr, &object).unwrap();
        assert!(constraints.is_empty());
    }
}
