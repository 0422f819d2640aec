//! Built-in requirement rules (§4.F).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{EvalContext, RequirementRule, WorkloadDescriptor};
use crate::error::Result;
use crate::model::{Constraint, ConstraintType, Effect, Gvr, Severity};

fn missing_resource_constraint(
    workload: &WorkloadDescriptor,
    expected_kind: &str,
    summary: String,
    remediation_hint: String,
) -> Constraint {
    Constraint {
        uid: String::new(), // overwritten by the evaluator with a deterministic per-rule UID
        source: Gvr::new("", "", expected_kind.to_lowercase()),
        name: workload.name.clone(),
        namespace: workload.namespace.clone(),
        affected_namespaces: vec![workload.namespace.clone()],
        workload_selector: None,
        namespace_selector: None,
        constraint_type: ConstraintType::MissingResource,
        effect: Effect::Missing,
        severity: Severity::Warning,
        summary,
        remediation_hint: Some(remediation_hint),
        details: BTreeMap::from([("expectedKind".to_string(), Value::String(expected_kind.to_string()))]),
        tags: vec!["missing-resource".to_string()],
        raw_object: Value::Null,
        observed_at: chrono::Utc::now(),
    }
}

/// A workload exposing a port named "metrics" conventionally needs a
/// `ServiceMonitor` targeting it; flags when none exists.
pub struct MetricsScrapeRule;

#[async_trait]
impl RequirementRule for MetricsScrapeRule {
    fn name(&self) -> &'static str {
        "metrics-scrape"
    }

    fn description(&self) -> &'static str {
        "flags workloads exposing a 'metrics' port with no ServiceMonitor targeting them"
    }

    async fn evaluate(&self, workload: &WorkloadDescriptor, ctx: &dyn EvalContext) -> Result<Vec<Constraint>> {
        if !workload.container_port_names.iter().any(|p| p == "metrics") {
            return Ok(vec![]);
        }
        let gvr = Gvr::new("monitoring.coreos.com", "v1", "servicemonitors");
        let matching = ctx.find_matching_resources(&gvr, &workload.namespace, &workload.labels).await?;
        if !matching.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![missing_resource_constraint(
            workload,
            "ServiceMonitor",
            format!("workload '{}' exposes a metrics port but no ServiceMonitor targets it", workload.name),
            "create a ServiceMonitor selecting this workload's labels".to_string(),
        )])
    }
}

/// A sidecar-injected workload conventionally needs a routing rule
/// (`VirtualService`); flags when none targets it.
pub struct SidecarRoutingRule;

#[async_trait]
impl RequirementRule for SidecarRoutingRule {
    fn name(&self) -> &'static str {
        "sidecar-routing"
    }

    fn description(&self) -> &'static str {
        "flags sidecar-injected workloads with no VirtualService routing to them"
    }

    async fn evaluate(&self, workload: &WorkloadDescriptor, ctx: &dyn EvalContext) -> Result<Vec<Constraint>> {
        let injected = workload.annotations.get("sidecar.istio.io/inject").map(String::as_str) == Some("true");
        if !injected {
            return Ok(vec![]);
        }
        let gvr = Gvr::new("networking.istio.io", "v1beta1", "virtualservices");
        let matching = ctx.find_matching_resources(&gvr, &workload.namespace, &workload.labels).await?;
        if !matching.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![missing_resource_constraint(
            workload,
            "VirtualService",
            format!("workload '{}' is sidecar-injected but no VirtualService routes to it", workload.name),
            "create a VirtualService routing to this workload".to_string(),
        )])
    }
}

/// A workload referencing a cert-manager issuer conventionally needs that
/// `ClusterIssuer` to exist; flags when it does not.
pub struct CertIssuerRule;

#[async_trait]
impl RequirementRule for CertIssuerRule {
    fn name(&self) -> &'static str {
        "cert-issuer"
    }

    fn description(&self) -> &'static str {
        "flags workloads referencing a cert-manager ClusterIssuer that does not exist"
    }

    async fn evaluate(&self, workload: &WorkloadDescriptor, ctx: &dyn EvalContext) -> Result<Vec<Constraint>> {
        let Some(issuer_name) = workload.annotations.get("cert-manager.io/issuer") else {
            return Ok(vec![]);
        };
        let gvr = Gvr::new("cert-manager.io", "v1", "clusterissuers");
        let issuers = ctx.list_by_gvr(&gvr, "").await?;
        let exists = issuers
            .iter()
            .any(|issuer| issuer.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str) == Some(issuer_name.as_str()));
        if exists {
            return Ok(vec![]);
        }
        Ok(vec![missing_resource_constraint(
            workload,
            "ClusterIssuer",
            format!("workload '{}' references ClusterIssuer '{issuer_name}' which does not exist", workload.name),
            format!("create a ClusterIssuer named '{issuer_name}'"),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeContext {
        matching: Mutex<Vec<Value>>,
        by_gvr: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl EvalContext for FakeContext {
        async fn get_namespace(&self, _name: &str) -> Option<Value> {
            None
        }
        async fn list_by_gvr(&self, _gvr: &Gvr, _namespace: &str) -> Result<Vec<Value>> {
            Ok(self.by_gvr.lock().unwrap().clone())
        }
        async fn find_matching_resources(
            &self,
            _gvr: &Gvr,
            _namespace: &str,
            _labels: &BTreeMap<String, String>,
        ) -> Result<Vec<Value>> {
            Ok(self.matching.lock().unwrap().clone())
        }
    }

    fn workload_with_metrics_port() -> WorkloadDescriptor {
        WorkloadDescriptor {
            kind: "Deployment".to_string(),
            api_version: "apps/v1".to_string(),
            name: "api".to_string(),
            namespace: "checkout".to_string(),
            uid: "wl-1".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            container_port_names: vec!["metrics".to_string(), "http".to_string()],
        }
    }

    #[tokio::test]
    async fn metrics_port_without_monitor_flags_missing_resource() {
        let ctx = FakeContext { matching: Mutex::new(vec![]), by_gvr: Mutex::new(vec![]) };
        let constraints = MetricsScrapeRule.evaluate(&workload_with_metrics_port(), &ctx).await.unwrap();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].constraint_type, ConstraintType::MissingResource);
    }

    #[tokio::test]
    async fn metrics_port_with_monitor_present_yields_nothing() {
        let ctx = FakeContext { matching: Mutex::new(vec![serde_json::json!({})]), by_gvr: Mutex::new(vec![]) };
        let constraints = MetricsScrapeRule.evaluate(&workload_with_metrics_port(), &ctx).await.unwrap();
        assert!(constraints.is_empty());
    }

    #[tokio::test]
    async fn workload_without_metrics_port_is_skipped() {
        let mut workload = workload_with_metrics_port();
        workload.container_port_names = vec!["http".to_string()];
        let ctx = FakeContext { matching: Mutex::new(vec![]), by_gvr: Mutex::new(vec![]) };
        let constraints = MetricsScrapeRule.evaluate(&workload, &ctx).await.unwrap();
        assert!(constraints.is_empty());
    }

    #[tokio::test]
    async fn cert_issuer_rule_flags_missing_issuer() {
        let mut workload = workload_with_metrics_port();
        workload.annotations.insert("cert-manager.io/issuer".to_string(), "letsencrypt".to_string());
        let ctx = FakeContext { matching: Mutex::new(vec![]), by_gvr: Mutex::new(vec![]) };
        let constraints = CertIssuerRule.evaluate(&workload, &ctx).await.unwrap();
        assert_eq!(constraints.len(), 1);
    }

    #[tokio::test]
    async fn cert_issuer_rule_passes_when_issuer_exists() {
        let mut workload = workload_with_metrics_port();
        workload.annotations.insert("cert-manager.io/issuer".to_string(), "letsencrypt".to_string());
        let ctx = FakeContext {
            matching: Mutex::new(vec![]),
            by_gvr: Mutex::new(vec![serde_json::json!({"metadata": {"name": "letsencrypt"}})]),
        };
        let constraints = CertIssuerRule.evaluate(&workload, &ctx).await.unwrap();
        assert!(constraints.is_empty());
    }
}
