//! Renders a dispatched notification's message at a given [`DetailLevel`],
//! withholding cross-namespace specifics below `full` (§4.G, §8 property 5).

use crate::correlator::CorrelatedNotification;
use crate::model::{Constraint, ConstraintType, DetailLevel};

/// The generic, name-free phrase used to describe a constraint type when the
/// viewer is not entitled to see its name (§4.G, §4.I).
#[must_use]
pub fn generic_effect_phrase(constraint_type: ConstraintType) -> &'static str {
    match constraint_type {
        ConstraintType::NetworkIngress => "a network policy restricts ingress to this workload",
        ConstraintType::NetworkEgress => "a network policy restricts egress from this workload",
        ConstraintType::Admission => "an admission policy governs this workload",
        ConstraintType::ResourceLimit => "a resource quota or limit applies to this workload",
        ConstraintType::MeshPolicy => "a mesh policy restricts this workload",
        ConstraintType::MissingResource => "this workload is missing an expected companion resource",
        ConstraintType::Unknown => "a cluster policy affects this workload",
    }
}

/// Renders the message body for `notification.constraint` at `level`,
/// relative to the viewer namespace (`notification.workload.namespace`).
#[must_use]
pub fn render_message(constraint: &Constraint, notification: &CorrelatedNotification, level: DetailLevel) -> String {
    let viewer_namespace = &notification.workload.namespace;
    let same_namespace = constraint.namespace == *viewer_namespace;

    match level {
        DetailLevel::Summary => {
            let mut message = generic_effect_phrase(constraint.constraint_type).to_string();
            if same_namespace {
                message.push_str(&format!(" (constraint '{}')", constraint.name));
            }
            message
        }
        DetailLevel::Detailed => {
            let mut message = format!("{}: {}", constraint.constraint_type, constraint.summary);
            if same_namespace || level == DetailLevel::Full {
                message.push_str(&format!(" [constraint '{}' in namespace '{}']", constraint.name, constraint.namespace));
            }
            message
        }
        DetailLevel::Full => format!(
            "{} ({}): {} — constraint '{}' in namespace '{}', details: {}",
            constraint.constraint_type,
            constraint.source,
            constraint.summary,
            constraint.name,
            constraint.namespace,
            serde_json::to_string(&constraint.details).unwrap_or_default(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Effect, Gvr, Severity, WorkloadRef};
    use std::collections::BTreeMap;

    fn cross_namespace_constraint() -> Constraint {
        Constraint {
            uid: "c1".to_string(),
            source: Gvr::new("networking.k8s.io", "v1", "networkpolicies"),
            name: "deny-all".to_string(),
            namespace: "platform".to_string(),
            affected_namespaces: vec!["platform".to_string(), "checkout".to_string()],
            workload_selector: None,
            namespace_selector: None,
            constraint_type: ConstraintType::NetworkIngress,
            effect: Effect::Deny,
            severity: Severity::Critical,
            summary: "denies all ingress".to_string(),
            remediation_hint: None,
            details: BTreeMap::from([("key".to_string(), serde_json::json!("value"))]),
            tags: vec![],
            raw_object: serde_json::Value::Null,
            observed_at: chrono::Utc::now(),
        }
    }

    fn notification_for(constraint: Constraint, viewer_namespace: &str) -> CorrelatedNotification {
        CorrelatedNotification {
            workload: WorkloadRef {
                kind: "Deployment".to_string(),
                api_version: "apps/v1".to_string(),
                name: "web".to_string(),
                namespace: viewer_namespace.to_string(),
                uid: "wl-1".to_string(),
            },
            constraint,
            reason: "FailedCreate".to_string(),
            message: "blocked".to_string(),
        }
    }

    #[test]
    fn summary_withholds_name_across_namespaces() {
        let notification = notification_for(cross_namespace_constraint(), "checkout");
        let message = render_message(&notification.constraint, &notification, DetailLevel::Summary);
        assert!(!message.contains("deny-all"));
    }

    #[test]
    fn summary_reveals_name_within_same_namespace() {
        let notification = notification_for(cross_namespace_constraint(), "platform");
        let message = render_message(&notification.constraint, &notification, DetailLevel::Summary);
        assert!(message.contains("deny-all"));
    }

    #[test]
    fn detailed_withholds_other_namespace_but_reveals_summary() {
        let notification = notification_for(cross_namespace_constraint(), "checkout");
        let message = render_message(&notification.constraint, &notification, DetailLevel::Detailed);
        assert!(message.contains("denies all ingress"));
        assert!(!message.contains("'platform'"));
        assert!(!message.contains("deny-all"));
    }

    #[test]
    fn detailed_reveals_name_within_same_namespace() {
        let notification = notification_for(cross_namespace_constraint(), "platform");
        let message = render_message(&notification.constraint, &notification, DetailLevel::Detailed);
        assert!(message.contains("deny-all"));
        assert!(message.contains("platform"));
    }

    #[test]
    fn full_includes_every_detail() {
        let notification = notification_for(cross_namespace_constraint(), "checkout");
        let message = render_message(&notification.constraint, &notification, DetailLevel::Full);
        assert!(message.contains("deny-all"));
        assert!(message.contains("platform"));
        assert!(message.contains("key"));
    }
}
