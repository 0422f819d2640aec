//! Reconciles one `Report` object per namespace from the indexer's current
//! state, debounced, with human and machine sections (§4.I).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cluster::ClusterApi;
use crate::config::ReportConfig;
use crate::crds::{ReportEntry, ReportStatus};
use crate::dispatcher::DetailLevelResolver;
use crate::indexer::{ChangeEvent, Indexer};
use crate::metrics::Metrics;
use crate::model::{Constraint, ConstraintType, DetailLevel, Severity};
use crate::selector;

/// Canonical name of the single `Report` object a namespace owns.
const REPORT_NAME: &str = "warden";
const SCHEMA_VERSION: &str = "1";
const WORKLOAD_KINDS: [&str; 3] = ["Deployment", "StatefulSet", "DaemonSet"];

/// Reconciles the `Report` object for each namespace the indexer has
/// constraints in, debounced per namespace.
pub struct ReportReconciler {
    cluster: Arc<dyn ClusterApi>,
    indexer: Arc<Indexer>,
    metrics: Arc<Metrics>,
    config: ReportConfig,
    detail_levels: Arc<DetailLevelResolver>,
    pending: DashMap<String, Instant>,
}

impl ReportReconciler {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        indexer: Arc<Indexer>,
        metrics: Arc<Metrics>,
        config: ReportConfig,
        detail_levels: Arc<DetailLevelResolver>,
    ) -> Self {
        Self { cluster, indexer, metrics, config, detail_levels, pending: DashMap::new() }
    }

    /// Consumes indexer change events, scheduling a debounced reconcile for
    /// every namespace a changed constraint touches.
    pub async fn run(&self, mut changes: mpsc::Receiver<ChangeEvent>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => self.fire_due().await,
                event = changes.recv() => {
                    let Some(event) = event else { return };
                    for namespace in self.touched_namespaces(&event) {
                        self.pending.entry(namespace).or_insert_with(|| Instant::now() + Duration::from_secs(self.config.debounce_secs));
                    }
                }
            }
        }
    }

    fn touched_namespaces(&self, event: &ChangeEvent) -> Vec<String> {
        match event {
            ChangeEvent::Upserted(constraint) if constraint.affected_namespaces.is_empty() => {
                self.indexer.all().into_iter().flat_map(|c| c.affected_namespaces).collect()
            }
            ChangeEvent::Upserted(constraint) => constraint.affected_namespaces.clone(),
            ChangeEvent::Deleted(_) => {
                // A delete's namespace scope is already gone from the
                // indexer; cheapest correct fix is to re-touch every
                // namespace currently tracked so stale entries age out.
                self.indexer.all().into_iter().flat_map(|c| c.affected_namespaces).collect()
            }
        }
    }

    async fn fire_due(&self) {
        let now = Instant::now();
        let due: Vec<String> =
            self.pending.iter().filter(|entry| *entry.value() <= now).map(|entry| entry.key().clone()).collect();
        for namespace in due {
            self.pending.remove(&namespace);
            let timer = self.metrics.report_reconcile_duration_seconds.with_label_values(&[namespace.as_str()]).start_timer();
            if let Err(err) = self.reconcile(&namespace).await {
                tracing::warn!(error = %err, namespace = %namespace, "report reconcile failed");
            }
            timer.observe_duration();
        }
    }

    async fn reconcile(&self, namespace: &str) -> crate::error::Result<()> {
        let constraints = self.indexer.by_namespace(namespace);
        let level = self.detail_levels.resolve(namespace);
        let status = self.build_status(namespace, &constraints, level).await?;
        let status_value = serde_json::to_value(&status).map_err(|e| crate::error::Error::report(e.to_string()))?;
        self.cluster.patch_report_status(namespace, REPORT_NAME, status_value).await
    }

    async fn build_status(&self, namespace: &str, constraints: &[Constraint], level: DetailLevel) -> crate::error::Result<ReportStatus> {
        let mut sorted = constraints.to_vec();
        sorted.sort_by_key(|c| c.severity);

        let critical_count = sorted.iter().filter(|c| c.severity == Severity::Critical).count() as u32;
        let warning_count = sorted.iter().filter(|c| c.severity == Severity::Warning).count() as u32;
        let info_count = sorted.iter().filter(|c| c.severity == Severity::Info).count() as u32;

        let mut summary_lines = Vec::with_capacity(sorted.len());
        let mut entries = Vec::with_capacity(sorted.len());
        for constraint in &sorted {
            let fully_visible = constraint.namespace.is_empty() || constraint.namespace == namespace || level == DetailLevel::Full;
            summary_lines.push(render_summary_line(constraint, fully_visible));
            entries.push(self.build_entry(constraint, namespace, fully_visible).await?);
        }

        Ok(ReportStatus {
            schema_version: SCHEMA_VERSION.to_string(),
            detail_level: level.to_string(),
            total_count: sorted.len() as u32,
            critical_count,
            warning_count,
            info_count,
            last_updated: Some(chrono::Utc::now().to_rfc3339()),
            summary_lines,
            entries,
        })
    }

    async fn build_entry(&self, constraint: &Constraint, namespace: &str, fully_visible: bool) -> crate::error::Result<ReportEntry> {
        let affected_workloads = if fully_visible { self.resolve_affected_workloads(constraint, namespace).await? } else { vec![] };
        let resource_metrics = matches!(constraint.constraint_type, ConstraintType::ResourceLimit)
            .then(|| constraint.details.clone())
            .filter(|d| !d.is_empty());

        Ok(ReportEntry {
            uid: constraint.uid.clone(),
            constraint_type: constraint.constraint_type.to_string(),
            severity: constraint.severity.to_string(),
            effect: constraint.effect.to_string(),
            source_name: if fully_visible { constraint.name.clone() } else { String::new() },
            source_resource: constraint.source.to_string(),
            affected_workloads,
            remediation_steps: constraint.remediation_hint.clone().into_iter().collect(),
            resource_metrics,
            tags: constraint.tags.clone(),
        })
    }

    async fn resolve_affected_workloads(&self, constraint: &Constraint, namespace: &str) -> crate::error::Result<Vec<String>> {
        let mut names = Vec::new();
        for kind in WORKLOAD_KINDS {
            let gvr = crate::model::Gvr::new("apps", "v1", format!("{}s", kind.to_lowercase()));
            let objects = self.cluster.list_objects(&gvr, Some(namespace)).await?;
            for object in objects {
                let labels = crate::model::accessors::nested_string_map(&object, &["metadata", "labels"]);
                if selector::matches(constraint.workload_selector.as_ref(), &labels) {
                    let name = crate::model::accessors::nested_str(&object, &["metadata", "name"]);
                    if !name.is_empty() {
                        names.push(format!("{kind}/{name}"));
                    }
                }
            }
        }
        Ok(names)
    }
}

fn render_summary_line(constraint: &Constraint, fully_visible: bool) -> String {
    if fully_visible {
        format!("[{}] {}: {}", constraint.severity, constraint.name, constraint.summary)
    } else {
        format!("[{}] {}", constraint.severity, crate::dispatcher::generic_effect_phrase(constraint.constraint_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Effect, Gvr};
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use serde_json::json;

    struct FakeCluster;

    #[async_trait]
    impl ClusterApi for FakeCluster {
        async fn list_api_resources(&self) -> crate::error::Result<Vec<crate::cluster::ApiResourceInfo>> {
            Ok(vec![])
        }
        async fn list_objects(&self, _gvr: &Gvr, _namespace: Option<&str>) -> crate::error::Result<Vec<Value>> {
            Ok(vec![])
        }
        async fn watch(
            &self,
            _gvr: &Gvr,
            _namespace: Option<&str>,
        ) -> crate::error::Result<BoxStream<'static, crate::error::Result<crate::cluster::WatchEvent>>> {
            unimplemented!()
        }
        async fn patch_workload(&self, _workload: &crate::model::WorkloadRef, _patch: Value) -> crate::error::Result<()> {
            Ok(())
        }
        async fn patch_report_status(&self, _namespace: &str, _name: &str, _status: Value) -> crate::error::Result<()> {
            Ok(())
        }
        async fn create_event(&self, _request: crate::cluster::ClusterEventRequest) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn sample_constraint(namespace: &str, severity: Severity) -> Constraint {
        Constraint {
            uid: format!("c-{severity}"),
            source: Gvr::new("networking.k8s.io", "v1", "networkpolicies"),
            name: "deny-all".to_string(),
            namespace: namespace.to_string(),
            affected_namespaces: vec![namespace.to_string()],
            workload_selector: None,
            namespace_selector: None,
            constraint_type: ConstraintType::NetworkIngress,
            effect: Effect::Deny,
            severity,
            summary: "denies all ingress".to_string(),
            remediation_hint: None,
            details: BTreeMap::new(),
            tags: vec![],
            raw_object: json!(null),
            observed_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn status_sorts_entries_critical_first() {
        let cluster = Arc::new(FakeCluster);
        let indexer = Arc::new(Indexer::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let resolver = Arc::new(DetailLevelResolver::new(DetailLevel::Full));
        let reconciler = ReportReconciler::new(cluster, indexer, metrics, ReportConfig { debounce_secs: 10 }, resolver);

        let constraints = vec![sample_constraint("checkout", Severity::Info), sample_constraint("checkout", Severity::Critical)];
        let status = reconciler.build_status("checkout", &constraints, DetailLevel::Full).await.unwrap();
        assert_eq!(status.entries[0].severity, "critical");
        assert_eq!(status.critical_count, 1);
        assert_eq!(status.info_count, 1);
    }
}
