//! Per-kind watch management: one informer task per constraint-like kind,
//! started once and kept for process lifetime.

use std::sync::Arc;

use dashmap::DashSet;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::adapters::Registry;
use crate::cluster::{ClusterApi, WatchEvent};
use crate::indexer::Indexer;
use crate::metrics::Metrics;
use crate::model::accessors::{nested_label_selector, nested_str};
use crate::model::{derive_uid, Constraint, Gvr};
use crate::profile::{ProfileOverride, ProfileSet};

/// Tracks which GVRs already have a running watch task, and starts new ones
/// on demand. Previously-started watches are never torn down by a rescan,
/// per §4.C.
pub struct WatchManager {
    cluster: Arc<dyn ClusterApi>,
    registry: Arc<Registry>,
    indexer: Arc<Indexer>,
    metrics: Arc<Metrics>,
    profiles: Arc<ProfileSet>,
    started: DashSet<Gvr>,
}

impl WatchManager {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        registry: Arc<Registry>,
        indexer: Arc<Indexer>,
        metrics: Arc<Metrics>,
        profiles: Arc<ProfileSet>,
    ) -> Self {
        Self { cluster, registry, indexer, metrics, profiles, started: DashSet::new() }
    }

    /// Starts a watch for `gvr` if one is not already running. Returns
    /// whether a new task was spawned.
    pub fn ensure_started(&self, gvr: Gvr, cancel: CancellationToken) -> bool {
        if !self.started.insert(gvr.clone()) {
            return false;
        }
        self.metrics.discovery_kinds_watched.inc();

        let cluster = self.cluster.clone();
        let registry = self.registry.clone();
        let indexer = self.indexer.clone();
        let metrics = self.metrics.clone();
        let profiles = self.profiles.clone();
        let gvr_for_task = gvr.clone();

        tokio::spawn(async move {
            run_watch_loop(gvr_for_task, cluster, registry, indexer, metrics, profiles, cancel).await;
        });
        true
    }

    #[must_use]
    pub fn is_started(&self, gvr: &Gvr) -> bool {
        self.started.contains(gvr)
    }
}

async fn run_watch_loop(
    gvr: Gvr,
    cluster: Arc<dyn ClusterApi>,
    registry: Arc<Registry>,
    indexer: Arc<Indexer>,
    metrics: Arc<Metrics>,
    profiles: Arc<ProfileSet>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let stream = match cluster.watch(&gvr, None).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(%gvr, error = %err, "watch start failed, retrying");
                tokio::select! {
                    () = tokio::time::sleep(std::time::Duration::from_secs(5)) => continue,
                    () = cancel.cancelled() => return,
                }
            }
        };
        tokio::pin!(stream);

        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                next = stream.next() => {
                    match next {
                        Some(Ok(event)) => handle_event(&gvr, event, &registry, &indexer, &metrics, &profiles),
                        Some(Err(err)) => {
                            tracing::warn!(%gvr, error = %err, "watch stream error, restarting");
                            metrics.discovery_watch_restarts_total.inc();
                            break;
                        }
                        None => {
                            metrics.discovery_watch_restarts_total.inc();
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Resolves the adapter for `gvr`, honoring a `Profile`'s `force_adapter`
/// override (looked up by name) ahead of the registry's own GVR/group/
/// fallback resolution.
fn resolve_adapter(
    gvr: &Gvr,
    registry: &Registry,
    profile: Option<&ProfileOverride>,
) -> Option<Arc<dyn crate::adapters::Adapter>> {
    profile
        .and_then(|p| p.force_adapter.as_deref())
        .and_then(|name| registry.by_name(name))
        .or_else(|| registry.resolve(gvr))
}

/// Applies a `Profile`'s severity and field-path overrides to a freshly
/// parsed Constraint, re-reading the overridden paths from the raw object
/// rather than trusting whatever the adapter that produced it derived.
fn apply_profile_overrides(constraint: &mut Constraint, object: &serde_json::Value, profile: &ProfileOverride) {
    if let Some(severity) = profile.force_severity {
        constraint.severity = severity;
    }
    if let Some(path) = &profile.selector_path {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        constraint.workload_selector = nested_label_selector(object, &path);
    }
    if let Some(path) = &profile.namespace_selector_path {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        constraint.namespace_selector = nested_label_selector(object, &path);
    }
    if let Some(path) = &profile.effect_path {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        if let Ok(effect) = nested_str(object, &path).parse() {
            constraint.effect = effect;
        }
    }
    if let Some(path) = &profile.summary_path {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        let summary = nested_str(object, &path);
        if !summary.is_empty() {
            constraint.summary = summary.to_string();
        }
    }
}

fn handle_event(
    gvr: &Gvr,
    event: WatchEvent,
    registry: &Registry,
    indexer: &Indexer,
    metrics: &Metrics,
    profiles: &ProfileSet,
) {
    match event {
        WatchEvent::Added(object) | WatchEvent::Modified(object) => {
            let profile = profiles.get(gvr);
            let Some(adapter) = resolve_adapter(gvr, registry, profile.as_ref()) else {
                return;
            };
            let source_uid =
                object.get("metadata").and_then(|m| m.get("uid")).and_then(serde_json::Value::as_str).map(str::to_string);
            match adapter.parse(gvr, &object) {
                Ok(constraints) => {
                    for mut constraint in constraints {
                        if let Some(profile) = &profile {
                            apply_profile_overrides(&mut constraint, &object, profile);
                        }
                        let constraint_uid = constraint.uid.clone();
                        indexer.upsert(constraint);
                        if let Some(source_uid) = &source_uid {
                            indexer.register_source_uid(source_uid, &constraint_uid);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(%gvr, adapter = adapter.name(), error = %err, "adapter parse failed");
                    metrics.adapter_parse_errors_total.with_label_values(&[adapter.name()]).inc();
                }
            }
        }
        WatchEvent::Deleted(object) => {
            let uid = object.get("metadata").and_then(|m| m.get("uid")).and_then(serde_json::Value::as_str);
            if let Some(uid) = uid {
                // A source object may have produced multiple Constraints
                // (one per subpath); the indexer removes every UID derived
                // from this source.
                indexer.delete_by_source_uid(uid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use serde_json::json;

    #[test]
    fn derive_uid_used_for_removal_is_consistent_with_adapters() {
        // Sanity check that the indexer's removal key space matches the
        // adapters' derivation scheme (same `derive_uid` function).
        assert_eq!(derive_uid("abc", "0"), derive_uid("abc", "0"));
    }

    fn network_policy_object() -> serde_json::Value {
        json!({
            "metadata": {"uid": "np-1", "name": "restrict", "namespace": "checkout"},
            "spec": {"podSelector": {}, "policyTypes": ["Ingress"], "ingress": [{}]}
        })
    }

    #[test]
    fn force_severity_override_replaces_adapters_own_severity() {
        let gvr = Gvr::new("networking.k8s.io", "v1", "networkpolicies");
        let registry = Registry::with_builtin_adapters();
        let indexer = Indexer::new();
        let metrics = Metrics::new().unwrap();
        let profiles = ProfileSet::new();
        profiles.upsert(gvr.clone(), ProfileOverride { force_severity: Some(Severity::Critical), ..Default::default() });

        handle_event(&gvr, WatchEvent::Added(network_policy_object()), &registry, &indexer, &metrics, &profiles);

        let constraints = indexer.by_namespace("checkout");
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].severity, Severity::Critical);
    }

    #[test]
    fn force_adapter_override_routes_to_named_adapter_instead_of_resolve() {
        let gvr = Gvr::new("networking.k8s.io", "v1", "networkpolicies");
        let registry = Registry::with_builtin_adapters();
        let indexer = Indexer::new();
        let metrics = Metrics::new().unwrap();
        let profiles = ProfileSet::new();
        profiles.upsert(
            gvr.clone(),
            ProfileOverride { force_adapter: Some("generic-fallback".to_string()), ..Default::default() },
        );

        handle_event(&gvr, WatchEvent::Added(network_policy_object()), &registry, &indexer, &metrics, &profiles);

        let constraints = indexer.by_namespace("checkout");
        assert_eq!(constraints.len(), 1);
        assert!(constraints[0].tags.contains(&"fallback".to_string()));
    }

    #[test]
    fn summary_path_override_replaces_adapters_own_summary() {
        let gvr = Gvr::new("networking.k8s.io", "v1", "networkpolicies");
        let registry = Registry::with_builtin_adapters();
        let indexer = Indexer::new();
        let metrics = Metrics::new().unwrap();
        let profiles = ProfileSet::new();
        profiles.upsert(
            gvr.clone(),
            ProfileOverride {
                summary_path: Some(vec!["metadata".to_string(), "name".to_string()]),
                ..Default::default()
            },
        );

        handle_event(&gvr, WatchEvent::Added(network_policy_object()), &registry, &indexer, &metrics, &profiles);

        let constraints = indexer.by_namespace("checkout");
        assert_eq!(constraints[0].summary, "restrict");
    }
}
