//! Turns correlated notifications into cluster Events, at most once per
//! (constraint, workload) pair per suppression window (§4.G).

mod render;

pub use render::{generic_effect_phrase, render_message};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterApi, ClusterEventRequest};
use crate::config::DispatcherConfig;
use crate::correlator::CorrelatedNotification;
use crate::dedupe::DedupeCache;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::model::DetailLevel;
use crate::ratelimit::TokenBucket;

/// Resolves the detail level a viewer namespace is entitled to. Defaults to
/// the configured default; a `NotificationPolicy` in that namespace can
/// override it.
#[derive(Default)]
pub struct DetailLevelResolver {
    overrides: DashMap<String, DetailLevel>,
    default: std::sync::RwLock<DetailLevel>,
}

impl DetailLevelResolver {
    #[must_use]
    pub fn new(default: DetailLevel) -> Self {
        Self { overrides: DashMap::new(), default: std::sync::RwLock::new(default) }
    }

    pub fn set_namespace_override(&self, namespace: impl Into<String>, level: DetailLevel) {
        self.overrides.insert(namespace.into(), level);
    }

    pub fn clear_namespace_override(&self, namespace: &str) {
        self.overrides.remove(namespace);
    }

    #[must_use]
    pub fn resolve(&self, namespace: &str) -> DetailLevel {
        self.overrides
            .get(namespace)
            .map(|entry| *entry.value())
            .unwrap_or(*self.default.read().unwrap_or_else(std::sync::PoisonError::into_inner))
    }
}

struct NamespaceLimiter {
    bucket: TokenBucket,
    last_used: AtomicI64,
}

/// Consumes [`CorrelatedNotification`]s and emits at most one cluster Event
/// per (constraint, workload) pair per suppression window.
pub struct Dispatcher {
    cluster: Arc<dyn ClusterApi>,
    metrics: Arc<Metrics>,
    config: DispatcherConfig,
    detail_levels: Arc<DetailLevelResolver>,
    limiters: DashMap<String, NamespaceLimiter>,
    dedupe: DedupeCache<(String, String)>,
    epoch: Instant,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        metrics: Arc<Metrics>,
        config: DispatcherConfig,
        detail_levels: Arc<DetailLevelResolver>,
    ) -> Self {
        let dedupe = DedupeCache::new(Duration::from_secs(config.suppression_window_secs));
        Self { cluster, metrics, config, detail_levels, limiters: DashMap::new(), dedupe, epoch: Instant::now() }
    }

    /// Drains `notifications` until the channel closes or `cancel` fires.
    pub async fn run(&self, mut notifications: mpsc::Receiver<CorrelatedNotification>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                notification = notifications.recv() => {
                    let Some(notification) = notification else { return };
                    if let Err(err) = self.dispatch(&notification).await {
                        tracing::warn!(error = %err, "dispatch failed");
                    }
                }
            }
        }
    }

    async fn dispatch(&self, notification: &CorrelatedNotification) -> Result<()> {
        let namespace = &notification.workload.namespace;
        if !self.consume_namespace_token(namespace) {
            return Ok(());
        }

        let dedupe_key = (notification.constraint.uid.clone(), format!("{namespace}/{}", notification.workload.name));
        if !self.dedupe.check_and_mark(dedupe_key) {
            self.metrics.dispatcher_suppressed_total.inc();
            return Ok(());
        }

        let level = self.detail_levels.resolve(namespace);
        let message = render_message(&notification.constraint, notification, level);
        let request = self.build_event_request(notification, &message, level);
        let severity = notification.constraint.severity;

        self.cluster.create_event(request).await?;
        let severity_label = severity.to_string();
        self.metrics.dispatcher_events_total.with_label_values(&[severity_label.as_str()]).inc();
        tracing::info!(
            constraint_uid = %notification.constraint.uid,
            workload = %notification.workload.name,
            namespace = %namespace,
            severity = %severity,
            "dispatched notification"
        );
        Ok(())
    }

    fn build_event_request(
        &self,
        notification: &CorrelatedNotification,
        message: &str,
        level: DetailLevel,
    ) -> ClusterEventRequest {
        let constraint = &notification.constraint;
        let viewer_namespace = &notification.workload.namespace;
        let same_namespace = constraint.namespace == *viewer_namespace;
        let reveal_name = same_namespace || level == DetailLevel::Full;

        let mut annotations = BTreeMap::new();
        annotations.insert("warden.io/managed-by".to_string(), "warden".to_string());
        annotations.insert("warden.io/constraint-type".to_string(), constraint.constraint_type.to_string());
        if reveal_name {
            annotations.insert("warden.io/constraint-name".to_string(), constraint.name.clone());
        }
        if level >= DetailLevel::Detailed || same_namespace {
            annotations.insert("warden.io/constraint-namespace".to_string(), constraint.namespace.clone());
        }
        annotations.insert("warden.io/source-gvr".to_string(), constraint.source.to_string());
        annotations.insert("warden.io/severity".to_string(), constraint.severity.to_string());
        annotations.insert("warden.io/effect".to_string(), constraint.effect.to_string());
        annotations.insert("warden.io/detail-level".to_string(), level.to_string());
        annotations.insert("warden.io/remediation-type".to_string(), "contact".to_string());
        if let Some(contact) = &self.config.remediation_contact {
            annotations.insert("warden.io/remediation-contact".to_string(), contact.clone());
        }
        let structured_data = serde_json::json!({
            "uid": constraint.uid,
            "constraintType": constraint.constraint_type.to_string(),
            "severity": constraint.severity.to_string(),
            "effect": constraint.effect.to_string(),
            "sourceGvr": constraint.source.to_string(),
            "name": constraint.name,
            "namespace": constraint.namespace,
            "summary": constraint.summary,
            "details": constraint.details,
            "tags": constraint.tags,
        });
        annotations.insert("warden.io/structured-data".to_string(), structured_data.to_string());

        let mut labels = BTreeMap::new();
        labels.insert("warden.io/managed-by".to_string(), "warden".to_string());
        labels.insert("warden.io/severity".to_string(), constraint.severity.to_string());
        labels.insert("warden.io/constraint-type".to_string(), constraint.constraint_type.to_string());

        ClusterEventRequest {
            involved_object: notification.workload.clone(),
            event_type: constraint.severity.event_type().to_string(),
            reason: notification.reason.clone(),
            message: message.to_string(),
            annotations,
            labels,
        }
    }

    fn consume_namespace_token(&self, namespace: &str) -> bool {
        let now_millis = self.epoch.elapsed().as_millis() as i64;
        let consumed = {
            let entry = self.limiters.entry(namespace.to_string()).or_insert_with(|| NamespaceLimiter {
                bucket: TokenBucket::new(u64::from(self.config.burst), u64::from(self.config.rate_per_minute) / 60),
                last_used: AtomicI64::new(now_millis),
            });
            entry.last_used.store(now_millis, Ordering::Relaxed);
            entry.bucket.try_consume()
        };
        consumed
    }

    /// Periodically sweeps the dedupe cache and evicts per-namespace limiters
    /// idle longer than `limiter_idle_eviction_secs`.
    pub async fn run_cleanup(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_secs));
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.dedupe.sweep();
                    self.evict_idle_limiters();
                }
            }
        }
    }

    fn evict_idle_limiters(&self) {
        let now_millis = self.epoch.elapsed().as_millis() as i64;
        let idle_millis = i64::try_from(self.config.limiter_idle_eviction_secs).unwrap_or(i64::MAX) * 1000;
        self.limiters.retain(|_, limiter| now_millis - limiter.last_used.load(Ordering::Relaxed) < idle_millis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ApiResourceInfo, WatchEvent};
    use crate::model::{ConstraintType, Effect, Gvr, Severity, WorkloadRef};
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use serde_json::Value;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeCluster {
        events: StdMutex<Vec<ClusterEventRequest>>,
    }

    #[async_trait]
    impl ClusterApi for FakeCluster {
        async fn list_api_resources(&self) -> Result<Vec<ApiResourceInfo>> {
            Ok(vec![])
        }
        async fn list_objects(&self, _gvr: &Gvr, _namespace: Option<&str>) -> Result<Vec<Value>> {
            Ok(vec![])
        }
        async fn watch(&self, _gvr: &Gvr, _namespace: Option<&str>) -> Result<BoxStream<'static, Result<WatchEvent>>> {
            unimplemented!("not exercised by dispatcher tests")
        }
        async fn patch_workload(&self, _workload: &WorkloadRef, _patch: Value) -> Result<()> {
            Ok(())
        }
        async fn patch_report_status(&self, _namespace: &str, _name: &str, _status: Value) -> Result<()> {
            Ok(())
        }
        async fn create_event(&self, request: ClusterEventRequest) -> Result<()> {
            self.events.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn sample_notification(namespace: &str) -> CorrelatedNotification {
        CorrelatedNotification {
            workload: WorkloadRef {
                kind: "Deployment".to_string(),
                api_version: "apps/v1".to_string(),
                name: "web".to_string(),
                namespace: namespace.to_string(),
                uid: "wl-1".to_string(),
            },
            constraint: crate::model::Constraint {
                uid: "c1".to_string(),
                source: Gvr::new("networking.k8s.io", "v1", "networkpolicies"),
                name: "deny-all".to_string(),
                namespace: namespace.to_string(),
                affected_namespaces: vec![namespace.to_string()],
                workload_selector: None,
                namespace_selector: None,
                constraint_type: ConstraintType::NetworkIngress,
                effect: Effect::Deny,
                severity: Severity::Critical,
                summary: "denies all ingress".to_string(),
                remediation_hint: None,
                details: BTreeMap::new(),
                tags: vec![],
                raw_object: Value::Null,
                observed_at: chrono::Utc::now(),
            },
            reason: "FailedCreate".to_string(),
            message: "blocked".to_string(),
        }
    }

    fn test_dispatcher() -> (Dispatcher, Arc<FakeCluster>) {
        let cluster = Arc::new(FakeCluster::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let config = DispatcherConfig {
            rate_per_minute: 6000,
            burst: 1000,
            suppression_window_secs: 3600,
            cleanup_interval_secs: 300,
            limiter_idle_eviction_secs: 3600,
            default_detail_level: "summary".to_string(),
            remediation_contact: None,
        };
        let resolver = Arc::new(DetailLevelResolver::new(DetailLevel::Summary));
        (Dispatcher::new(cluster.clone(), metrics, config, resolver), cluster)
    }

    #[tokio::test]
    async fn first_dispatch_emits_one_event() {
        let (dispatcher, cluster) = test_dispatcher();
        dispatcher.dispatch(&sample_notification("checkout")).await.unwrap();
        assert_eq!(cluster.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_within_suppression_window_is_dropped() {
        let (dispatcher, cluster) = test_dispatcher();
        let notification = sample_notification("checkout");
        dispatcher.dispatch(&notification).await.unwrap();
        dispatcher.dispatch(&notification).await.unwrap();
        assert_eq!(cluster.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cross_namespace_event_omits_constraint_name_annotation() {
        let (dispatcher, cluster) = test_dispatcher();
        let mut notification = sample_notification("checkout");
        notification.constraint.namespace = "platform".to_string();
        dispatcher.dispatch(&notification).await.unwrap();
        let events = cluster.events.lock().unwrap();
        assert!(!events[0].annotations.contains_key("warden.io/constraint-name"));
    }

    #[tokio::test]
    async fn cross_namespace_event_omits_constraint_name_annotation_at_detailed_level() {
        let (dispatcher, cluster) = test_dispatcher();
        dispatcher.detail_levels.set_namespace_override("checkout", DetailLevel::Detailed);
        let mut notification = sample_notification("checkout");
        notification.constraint.namespace = "platform".to_string();
        dispatcher.dispatch(&notification).await.unwrap();
        let events = cluster.events.lock().unwrap();
        assert!(!events[0].annotations.contains_key("warden.io/constraint-name"));
    }
}
