//! Watches the operator's own `Profile` and `NotificationPolicy` CRDs and
//! keeps [`ProfileSet`]/[`DetailLevelResolver`] in sync with them, so an
//! operator's `kubectl apply` takes effect without a restart (§4.B, §4.G).

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterApi, WatchEvent};
use crate::crds::{NotificationPolicySpec, ProfileSpec};
use crate::dispatcher::DetailLevelResolver;
use crate::model::accessors::nested_str;
use crate::model::{DetailLevel, Gvr};
use crate::profile::{ProfileOverride, ProfileSet};

fn gvr_profile() -> Gvr {
    Gvr::new("warden.io", "v1alpha1", "profiles")
}

fn gvr_notification_policy() -> Gvr {
    Gvr::new("warden.io", "v1alpha1", "notificationpolicies")
}

/// Starts the `Profile` and `NotificationPolicy` watch tasks. Returns once
/// both are spawned; they run until `cancel` fires.
pub fn spawn_watches(
    cluster: Arc<dyn ClusterApi>,
    profiles: Arc<ProfileSet>,
    detail_levels: Arc<DetailLevelResolver>,
    cancel: CancellationToken,
) {
    tokio::spawn({
        let cluster = cluster.clone();
        let cancel = cancel.clone();
        async move { run_profile_watch(cluster, profiles, cancel).await }
    });
    tokio::spawn(async move { run_notification_policy_watch(cluster, detail_levels, cancel).await });
}

fn parse_profile_spec(object: &serde_json::Value) -> Option<(Gvr, ProfileOverride)> {
    let spec: ProfileSpec = serde_json::from_value(object.get("spec")?.clone()).ok()?;
    let gvr = Gvr::new(spec.group, spec.version, spec.resource);
    let profile_override = ProfileOverride {
        force_constraint_like: spec.force_constraint_like,
        force_adapter: spec.force_adapter,
        force_severity: spec.force_severity.and_then(|s| s.parse().ok()),
        force_debounce_secs: spec.force_debounce_secs,
        selector_path: spec.selector_path,
        namespace_selector_path: spec.namespace_selector_path,
        effect_path: spec.effect_path,
        summary_path: spec.summary_path,
    };
    Some((gvr, profile_override))
}

async fn run_profile_watch(cluster: Arc<dyn ClusterApi>, profiles: Arc<ProfileSet>, cancel: CancellationToken) {
    let gvr = gvr_profile();
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let stream = match cluster.watch(&gvr, None).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(%gvr, error = %err, "profile watch start failed, retrying");
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(5)) => continue,
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
                        Some(Ok(WatchEvent::Added(object) | WatchEvent::Modified(object))) => {
                            match parse_profile_spec(&object) {
                                Some((gvr, profile_override)) => profiles.upsert(gvr, profile_override),
                                None => tracing::warn!("malformed Profile object, skipping"),
                            }
                        }
                        Some(Ok(WatchEvent::Deleted(object))) => {
                            if let Some((gvr, _)) = parse_profile_spec(&object) {
                                profiles.remove(&gvr);
                            }
                        }
                        Some(Err(err)) => {
                            tracing::warn!(%gvr, error = %err, "profile watch stream error, restarting");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }
}

async fn run_notification_policy_watch(
    cluster: Arc<dyn ClusterApi>,
    detail_levels: Arc<DetailLevelResolver>,
    cancel: CancellationToken,
) {
    let gvr = gvr_notification_policy();
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let stream = match cluster.watch(&gvr, None).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(%gvr, error = %err, "notification policy watch start failed, retrying");
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(5)) => continue,
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
                        Some(Ok(WatchEvent::Added(object) | WatchEvent::Modified(object))) => {
                            let namespace = nested_str(&object, &["metadata", "namespace"]);
                            if namespace.is_empty() {
                                continue;
                            }
                            let Some(spec) = object.get("spec").and_then(|s| {
                                serde_json::from_value::<NotificationPolicySpec>(s.clone()).ok()
                            }) else {
                                tracing::warn!(namespace, "malformed NotificationPolicy object, skipping");
                                continue;
                            };
                            match spec.detail_level.parse::<DetailLevel>() {
                                Ok(level) => detail_levels.set_namespace_override(namespace, level),
                                Err(err) => tracing::warn!(namespace, error = %err, "invalid notification policy detail level"),
                            }
                        }
                        Some(Ok(WatchEvent::Deleted(object))) => {
                            let namespace = nested_str(&object, &["metadata", "namespace"]);
                            if !namespace.is_empty() {
                                detail_levels.clear_namespace_override(namespace);
                            }
                        }
                        Some(Err(err)) => {
                            tracing::warn!(%gvr, error = %err, "notification policy watch stream error, restarting");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_spec_parses_typed_fields_from_object() {
        let object = json!({
            "spec": {
                "group": "example.com", "version": "v1", "resource": "widgets",
                "force_constraint_like": true, "force_adapter": "generic-fallback",
                "force_severity": "critical", "force_debounce_secs": 30,
                "selector_path": ["spec", "selector"],
            }
        });
        let (gvr, profile_override) = parse_profile_spec(&object).unwrap();
        assert_eq!(gvr, Gvr::new("example.com", "v1", "widgets"));
        assert!(profile_override.force_constraint_like);
        assert_eq!(profile_override.force_adapter.as_deref(), Some("generic-fallback"));
        assert_eq!(profile_override.force_severity, Some(crate::model::Severity::Critical));
        assert_eq!(profile_override.force_debounce_secs, Some(30));
        assert_eq!(profile_override.selector_path, Some(vec!["spec".to_string(), "selector".to_string()]));
        assert_eq!(profile_override.namespace_selector_path, None);
    }

    #[test]
    fn profile_spec_defaults_when_optional_fields_absent() {
        let object = json!({"spec": {"group": "", "version": "v1", "resource": "widgets"}});
        let (_, profile_override) = parse_profile_spec(&object).unwrap();
        assert!(!profile_override.force_constraint_like);
        assert!(profile_override.force_adapter.is_none());
        assert!(profile_override.force_severity.is_none());
    }

    #[test]
    fn missing_spec_returns_none() {
        let object = json!({"metadata": {"name": "p1"}});
        assert!(parse_profile_spec(&object).is_none());
    }
}
