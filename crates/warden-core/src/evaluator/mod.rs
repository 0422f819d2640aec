//! Detects absences the indexer cannot observe directly: a workload that
//! conventionally needs a companion resource it lacks (§4.F).

pub mod rules;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::cluster::ClusterApi;
use crate::config::EvaluatorConfig;
use crate::error::Result;
use crate::indexer::Indexer;
use crate::model::{Constraint, Gvr};
use crate::profile::ProfileSet;
use crate::selector;

/// The workload shape rules evaluate against: enough of a Deployment/
/// StatefulSet/DaemonSet to check ports, labels, and annotations without
/// pulling in the full pod spec type.
#[derive(Debug, Clone)]
pub struct WorkloadDescriptor {
    pub kind: String,
    pub api_version: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub container_port_names: Vec<String>,
}

/// The narrow query interface a rule is allowed: namespace lookup, list by
/// kind, and selector-matched lookup. Backed by the cluster in production,
/// by a fixture in tests.
#[async_trait]
pub trait EvalContext: Send + Sync {
    async fn get_namespace(&self, name: &str) -> Option<Value>;
    async fn list_by_gvr(&self, gvr: &Gvr, namespace: &str) -> Result<Vec<Value>>;
    async fn find_matching_resources(
        &self,
        gvr: &Gvr,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>>;
}

/// A production [`EvalContext`] backed by a live cluster.
pub struct ClusterEvalContext {
    cluster: Arc<dyn ClusterApi>,
}

impl ClusterEvalContext {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl EvalContext for ClusterEvalContext {
    async fn get_namespace(&self, name: &str) -> Option<Value> {
        let gvr = Gvr::new("", "v1", "namespaces");
        self.cluster.list_objects(&gvr, None).await.ok()?.into_iter().find(|ns| {
            ns.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str) == Some(name)
        })
    }

    async fn list_by_gvr(&self, gvr: &Gvr, namespace: &str) -> Result<Vec<Value>> {
        self.cluster.list_objects(gvr, Some(namespace)).await
    }

    async fn find_matching_resources(
        &self,
        gvr: &Gvr,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>> {
        let objects = self.cluster.list_objects(gvr, Some(namespace)).await?;
        Ok(objects
            .into_iter()
            .filter(|obj| {
                let obj_selector = crate::model::accessors::nested_label_selector(obj, &["spec", "selector"]);
                selector::matches(obj_selector.as_ref(), labels)
            })
            .collect())
    }
}

/// A pluggable absence-detection rule.
#[async_trait]
pub trait RequirementRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Returns the Constraints implied by `workload`'s current absence, or
    /// an empty list when the companion resource is present.
    async fn evaluate(&self, workload: &WorkloadDescriptor, ctx: &dyn EvalContext) -> Result<Vec<Constraint>>;
}

/// Tracks, for each (workload UID, rule name) pair, the instant a rule first
/// returned non-empty, so constraints are only emitted after a sustained
/// debounce window (§4.F).
pub struct DebounceTracker {
    window: Duration,
    first_seen: DashMap<(String, String), Instant>,
}

impl DebounceTracker {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, first_seen: DashMap::new() }
    }

    /// Records a non-empty result; returns whether the debounce window has
    /// now elapsed continuously and the result should be emitted.
    pub fn observe_non_empty(&self, workload_uid: &str, rule_name: &str) -> bool {
        self.observe_non_empty_with_window(workload_uid, rule_name, self.window)
    }

    /// Same as [`Self::observe_non_empty`], but checks against `window`
    /// instead of the tracker's default, for a `Profile`'s
    /// `force_debounce_secs` override.
    pub fn observe_non_empty_with_window(&self, workload_uid: &str, rule_name: &str, window: Duration) -> bool {
        let key = (workload_uid.to_string(), rule_name.to_string());
        let first_seen = *self.first_seen.entry(key).or_insert_with(Instant::now);
        first_seen.elapsed() >= window
    }

    /// Clears the first-seen entry when a rule's result becomes empty.
    pub fn observe_empty(&self, workload_uid: &str, rule_name: &str) {
        self.first_seen.remove(&(workload_uid.to_string(), rule_name.to_string()));
    }

    /// Garbage-collects entries older than 2x the debounce window.
    pub fn sweep(&self) {
        let max_age = self.window * 2;
        self.first_seen.retain(|_, seen_at| seen_at.elapsed() < max_age);
    }
}

/// Drives every registered rule over a workload and reconciles the indexer
/// with whichever MissingResource constraints survive debounce.
pub struct Evaluator {
    indexer: Arc<Indexer>,
    debounce: DebounceTracker,
    rules: Vec<Arc<dyn RequirementRule>>,
    profiles: Arc<ProfileSet>,
}

impl Evaluator {
    #[must_use]
    pub fn new(
        indexer: Arc<Indexer>,
        config: &EvaluatorConfig,
        rules: Vec<Arc<dyn RequirementRule>>,
        profiles: Arc<ProfileSet>,
    ) -> Self {
        Self { indexer, debounce: DebounceTracker::new(Duration::from_secs(config.debounce_secs)), rules, profiles }
    }

    /// Runs every rule against `workload`, upserting or retracting indexer
    /// entries as debounce state dictates.
    pub async fn evaluate_workload(&self, workload: &WorkloadDescriptor, ctx: &dyn EvalContext) -> Result<()> {
        for rule in &self.rules {
            let constraints = rule.evaluate(workload, ctx).await?;
            let uid = crate::model::derive_uid(&workload.uid, rule.name());

            if constraints.is_empty() {
                self.debounce.observe_empty(&workload.uid, rule.name());
                self.indexer.delete(&uid);
                continue;
            }

            // Every constraint a rule yields shares one expected-kind source
            // GVR (see `missing_resource_constraint`), so a `Profile`
            // targeting that GVR can override this rule's debounce window.
            let window = constraints
                .first()
                .and_then(|c| self.profiles.get(&c.source))
                .and_then(|p| p.force_debounce_secs)
                .map(Duration::from_secs)
                .unwrap_or(self.debounce.window);

            if self.debounce.observe_non_empty_with_window(&workload.uid, rule.name(), window) {
                for mut constraint in constraints {
                    constraint.uid = uid.clone();
                    self.indexer.upsert(constraint);
                }
            }
        }
        Ok(())
    }

    pub fn sweep_debounce(&self) {
        self.debounce.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_requires_sustained_window() {
        let tracker = DebounceTracker::new(Duration::from_millis(20));
        assert!(!tracker.observe_non_empty("w1", "rule-a"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(tracker.observe_non_empty("w1", "rule-a"));
    }

    #[test]
    fn empty_observation_clears_first_seen() {
        let tracker = DebounceTracker::new(Duration::from_millis(50));
        tracker.observe_non_empty("w1", "rule-a");
        tracker.observe_empty("w1", "rule-a");
        // Immediately non-empty again starts a fresh window.
        assert!(!tracker.observe_non_empty("w1", "rule-a"));
    }
}
