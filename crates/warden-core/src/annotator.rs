//! Patches configured workload kinds with a compact summary of the
//! constraints currently affecting them (§4.H).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cluster::ClusterApi;
use crate::config::AnnotatorConfig;
use crate::error::Result;
use crate::indexer::{ChangeEvent, Indexer};
use crate::metrics::Metrics;
use crate::model::{Constraint, Gvr, WorkloadRef};
use crate::profile::ProfileSet;
use crate::selector;

const ANNOTATION_STATUS: &str = "warden.io/status";
const ANNOTATION_LAST_EVALUATED: &str = "warden.io/last-evaluated";
const ANNOTATION_CONSTRAINTS: &str = "warden.io/constraints";
const ANNOTATION_MAX_SEVERITY: &str = "warden.io/max-severity";
const ANNOTATION_CRITICAL_COUNT: &str = "warden.io/critical-count";
const ANNOTATION_WARNING_COUNT: &str = "warden.io/warning-count";
const ANNOTATION_INFO_COUNT: &str = "warden.io/info-count";

fn gvr_for_kind(kind: &str) -> Gvr {
    Gvr::new("apps", "v1", format!("{}s", kind.to_lowercase()))
}

/// One workload identity pending a coalesced patch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WorkloadKey {
    kind: String,
    namespace: String,
    name: String,
}

/// Watches indexer changes and patches affected workloads with a debounced,
/// coalesced annotation summary.
pub struct Annotator {
    cluster: Arc<dyn ClusterApi>,
    indexer: Arc<Indexer>,
    metrics: Arc<Metrics>,
    config: AnnotatorConfig,
    profiles: Arc<ProfileSet>,
    pending: DashMap<WorkloadKey, Instant>,
}

impl Annotator {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        indexer: Arc<Indexer>,
        metrics: Arc<Metrics>,
        config: AnnotatorConfig,
        profiles: Arc<ProfileSet>,
    ) -> Self {
        Self { cluster, indexer, metrics, config, profiles, pending: DashMap::new() }
    }

    /// Consumes indexer change events, scheduling coalesced patches for every
    /// workload the changed constraint could affect.
    pub async fn run(&self, mut changes: mpsc::Receiver<ChangeEvent>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => self.fire_due().await,
                event = changes.recv() => {
                    let Some(event) = event else { return };
                    if let Err(err) = self.handle_change(event).await {
                        tracing::warn!(error = %err, "annotator failed to schedule patch");
                    }
                }
            }
        }
    }

    async fn handle_change(&self, event: ChangeEvent) -> Result<()> {
        let constraint = match event {
            ChangeEvent::Upserted(constraint) => constraint,
            ChangeEvent::Deleted(uid) => {
                // A deletion can only ever narrow what a workload matches;
                // the next change (or a subsequent evaluation) re-patches it
                // correctly, so nothing to schedule here beyond what the
                // indexer itself reconciles on upsert of a replacement.
                let _ = uid;
                return Ok(());
            }
        };

        let debounce_secs = self
            .profiles
            .get(&constraint.source)
            .and_then(|p| p.force_debounce_secs)
            .unwrap_or(self.config.debounce_secs);

        for kind in &self.config.workload_kinds {
            let gvr = gvr_for_kind(kind);
            let namespaces = self.candidate_namespaces(&constraint);
            for namespace in namespaces {
                let objects = self.cluster.list_objects(&gvr, Some(&namespace)).await?;
                for object in objects {
                    let labels = crate::model::accessors::nested_string_map(&object, &["metadata", "labels"]);
                    if !selector::matches(constraint.workload_selector.as_ref(), &labels) {
                        continue;
                    }
                    let Some(name) = object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str) else {
                        continue;
                    };
                    let key = WorkloadKey { kind: kind.clone(), namespace: namespace.clone(), name: name.to_string() };
                    self.pending.entry(key).or_insert_with(|| Instant::now() + Duration::from_secs(debounce_secs));
                }
            }
        }
        Ok(())
    }

    fn candidate_namespaces(&self, constraint: &Constraint) -> Vec<String> {
        if constraint.affected_namespaces.is_empty() {
            // Cluster-scoped: fan out to every namespace currently holding a
            // constraint entry, which is the full set the indexer already
            // tracks; a workload in a namespace with no other constraint
            // still needs to see this one.
            self.indexer.all().into_iter().flat_map(|c| c.affected_namespaces).collect()
        } else {
            constraint.affected_namespaces.clone()
        }
    }

    async fn fire_due(&self) {
        let now = Instant::now();
        let due: Vec<WorkloadKey> =
            self.pending.iter().filter(|entry| *entry.value() <= now).map(|entry| entry.key().clone()).collect();
        for key in due {
            self.pending.remove(&key);
            if let Err(err) = self.patch_workload(&key).await {
                tracing::warn!(error = %err, workload = %key.name, namespace = %key.namespace, "annotator patch failed");
            }
        }
    }

    async fn patch_workload(&self, key: &WorkloadKey) -> Result<()> {
        let gvr = gvr_for_kind(&key.kind);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let objects = self.cluster.list_objects(&gvr, Some(&key.namespace)).await?;
            let Some(object) = objects.into_iter().find(|object| {
                object.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str) == Some(key.name.as_str())
            }) else {
                return Ok(()); // workload gone; nothing to patch
            };
            let labels = crate::model::accessors::nested_string_map(&object, &["metadata", "labels"]);
            let uid = crate::model::accessors::nested_str(&object, &["metadata", "uid"]).to_string();
            let constraints = self.indexer.by_labels(&key.namespace, &labels);
            let patch = build_patch(&constraints);

            let workload_ref = WorkloadRef {
                kind: key.kind.clone(),
                api_version: "apps/v1".to_string(),
                name: key.name.clone(),
                namespace: key.namespace.clone(),
                uid,
            };

            match self.cluster.patch_workload(&workload_ref, patch).await {
                Ok(()) => {
                    self.metrics.annotator_patches_total.inc();
                    return Ok(());
                }
                Err(err) if attempt < self.config.patch_retry_attempts => {
                    self.metrics.annotator_patch_conflicts_total.inc();
                    tracing::debug!(error = %err, attempt, "retrying workload patch after conflict");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn build_patch(constraints: &[Constraint]) -> Value {
    if constraints.is_empty() {
        return serde_json::json!({
            "metadata": {
                "annotations": {
                    ANNOTATION_STATUS: Value::Null,
                    ANNOTATION_LAST_EVALUATED: Value::Null,
                    ANNOTATION_CONSTRAINTS: Value::Null,
                    ANNOTATION_MAX_SEVERITY: Value::Null,
                    ANNOTATION_CRITICAL_COUNT: Value::Null,
                    ANNOTATION_WARNING_COUNT: Value::Null,
                    ANNOTATION_INFO_COUNT: Value::Null,
                }
            }
        });
    }

    let critical = constraints.iter().filter(|c| c.severity == crate::model::Severity::Critical).count();
    let warning = constraints.iter().filter(|c| c.severity == crate::model::Severity::Warning).count();
    let info = constraints.iter().filter(|c| c.severity == crate::model::Severity::Info).count();
    let max_severity = constraints.iter().map(|c| c.severity).min().unwrap_or(crate::model::Severity::Info);

    let summaries: Vec<Value> = constraints
        .iter()
        .map(|c| {
            serde_json::json!({
                "type": c.constraint_type.to_string(),
                "severity": c.severity.to_string(),
                "name": c.name,
                "source": c.source.to_string(),
            })
        })
        .collect();

    let status = format!(
        "{} constraint{} affect{} this workload ({critical} critical, {warning} warning, {info} info)",
        constraints.len(),
        if constraints.len() == 1 { "" } else { "s" },
        if constraints.len() == 1 { "s" } else { "" },
    );

    serde_json::json!({
        "metadata": {
            "annotations": {
                ANNOTATION_STATUS: status,
                ANNOTATION_LAST_EVALUATED: chrono::Utc::now().to_rfc3339(),
                ANNOTATION_CONSTRAINTS: serde_json::to_string(&summaries).unwrap_or_default(),
                ANNOTATION_MAX_SEVERITY: max_severity.to_string(),
                ANNOTATION_CRITICAL_COUNT: critical.to_string(),
                ANNOTATION_WARNING_COUNT: warning.to_string(),
                ANNOTATION_INFO_COUNT: info.to_string(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstraintType, Effect, Severity};

    fn sample_constraint(severity: Severity) -> Constraint {
        Constraint {
            uid: "c1".to_string(),
            source: Gvr::new("networking.k8s.io", "v1", "networkpolicies"),
            name: "deny-all".to_string(),
            namespace: "checkout".to_string(),
            affected_namespaces: vec!["checkout".to_string()],
            workload_selector: None,
            namespace_selector: None,
            constraint_type: ConstraintType::NetworkIngress,
            effect: Effect::Deny,
            severity,
            summary: "denies all ingress".to_string(),
            remediation_hint: None,
            details: BTreeMap::new(),
            tags: vec![],
            raw_object: Value::Null,
            observed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn empty_constraints_nil_out_every_annotation() {
        let patch = build_patch(&[]);
        assert_eq!(patch["metadata"]["annotations"][ANNOTATION_STATUS], Value::Null);
    }

    #[test]
    fn non_empty_constraints_report_counts_and_max_severity() {
        let patch = build_patch(&[sample_constraint(Severity::Critical), sample_constraint(Severity::Warning)]);
        assert_eq!(patch["metadata"]["annotations"][ANNOTATION_CRITICAL_COUNT], "1");
        assert_eq!(patch["metadata"]["annotations"][ANNOTATION_WARNING_COUNT], "1");
        assert_eq!(patch["metadata"]["annotations"][ANNOTATION_MAX_SEVERITY], "critical");
    }
}
