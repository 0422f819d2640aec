//! Correlates observed warning events and flow drops to indexed Constraints,
//! and enqueues notifications for the dispatcher (§4.E).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::CorrelatorConfig;
use crate::dedupe::DedupeCache;
use crate::indexer::Indexer;
use crate::metrics::Metrics;
use crate::model::{Constraint, FlowDrop, WorkloadRef};
use crate::ratelimit::TokenBucket;

/// Drop reasons that indicate a policy rejected the flow, per §4.E; any
/// other reason (TTL expired, invalid packet, etc.) is ignored.
const POLICY_DROP_REASONS: [&str; 6] =
    ["deny-policy", "l3-l4-policy", "l7-policy", "auth-policy", "ingress-denied", "egress-denied"];

/// An observed cluster warning event, reduced to the fields the correlator
/// needs to find candidate constraints.
#[derive(Debug, Clone)]
pub struct WarningEvent {
    pub event_uid: String,
    pub involved_object: WorkloadRef,
    pub labels: BTreeMap<String, String>,
    pub reason: String,
    pub message: String,
}

/// One correlated pairing of a signal with a Constraint, handed to the
/// dispatcher.
#[derive(Debug, Clone)]
pub struct CorrelatedNotification {
    pub workload: WorkloadRef,
    pub constraint: Constraint,
    pub reason: String,
    pub message: String,
}

pub struct Correlator {
    indexer: Arc<Indexer>,
    metrics: Arc<Metrics>,
    config: CorrelatorConfig,
    rate_limiter: TokenBucket,
    dedupe: DedupeCache<(String, String)>,
    out: mpsc::Sender<CorrelatedNotification>,
}

impl Correlator {
    #[must_use]
    pub fn new(
        indexer: Arc<Indexer>,
        metrics: Arc<Metrics>,
        config: CorrelatorConfig,
        out: mpsc::Sender<CorrelatedNotification>,
    ) -> Self {
        let rate_limiter = TokenBucket::new(u64::from(config.burst), u64::from(config.rate_per_second));
        let dedupe = DedupeCache::new(Duration::from_secs(config.dedupe_window_secs));
        Self { indexer, metrics, config, rate_limiter, dedupe, out }
    }

    /// Processes one warning event: rate-limits, finds candidate constraints
    /// by namespace and label match, dedupes per (event, constraint), and
    /// enqueues a notification per surviving candidate.
    pub fn handle_warning_event(&self, event: &WarningEvent) {
        if !self.rate_limiter.try_consume() {
            self.metrics.correlator_rate_limit_drops_total.inc();
            return;
        }

        let candidates = self.indexer.by_labels(&event.involved_object.namespace, &event.labels);
        for constraint in candidates {
            if !self.dedupe.check_and_mark((event.event_uid.clone(), constraint.uid.clone())) {
                self.metrics.correlator_dedupe_drops_total.inc();
                continue;
            }
            let notification = CorrelatedNotification {
                workload: event.involved_object.clone(),
                constraint,
                reason: event.reason.clone(),
                message: event.message.clone(),
            };
            if self.out.try_send(notification).is_err() {
                tracing::debug!("correlator -> dispatcher channel full, dropping notification");
            }
        }
    }

    /// Processes one normalized flow drop: filters to policy-class reasons,
    /// matches on the destination endpoint's (namespace, labels).
    pub fn handle_flow_drop(&self, drop: &FlowDrop) {
        if !POLICY_DROP_REASONS.contains(&drop.drop_reason.as_str()) {
            return;
        }
        if !self.rate_limiter.try_consume() {
            self.metrics.correlator_rate_limit_drops_total.inc();
            return;
        }

        let Some(workload) = &drop.destination.workload_ref else {
            return;
        };
        let candidates = self.indexer.by_labels(&drop.destination.namespace, &drop.destination.labels);
        for constraint in candidates {
            let dedupe_key = (format!("flowdrop:{}", drop.observed_at.timestamp_nanos_opt().unwrap_or(0)), constraint.uid.clone());
            if !self.dedupe.check_and_mark(dedupe_key) {
                self.metrics.correlator_dedupe_drops_total.inc();
                continue;
            }
            let notification = CorrelatedNotification {
                workload: workload.clone(),
                constraint,
                reason: drop.drop_reason.clone(),
                message: format!("flow dropped: {}", drop.drop_reason),
            };
            if self.out.try_send(notification).is_err() {
                tracing::debug!("correlator -> dispatcher channel full, dropping flow-drop notification");
            }
        }
    }

    /// Runs the periodic dedupe-cache sweep until cancelled.
    pub async fn run_cleanup(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => self.dedupe.sweep(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstraintType, Effect, FlowEndpoint, Gvr, L4Info, Severity};

    fn test_correlator() -> (Correlator, mpsc::Receiver<CorrelatedNotification>, Arc<Indexer>) {
        let indexer = Arc::new(Indexer::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let (tx, rx) = mpsc::channel(16);
        let config = CorrelatorConfig { rate_per_second: 1000, burst: 1000, dedupe_window_secs: 300, sweep_interval_secs: 60 };
        (Correlator::new(indexer.clone(), metrics, config, tx), rx, indexer)
    }

    fn sample_constraint(namespace: &str) -> Constraint {
        Constraint {
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
            raw_object: serde_json::Value::Null,
            observed_at: chrono::Utc::now(),
        }
    }

    fn workload(namespace: &str, name: &str) -> WorkloadRef {
        WorkloadRef {
            kind: "Deployment".to_string(),
            api_version: "apps/v1".to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: format!("{namespace}/{name}"),
        }
    }

    #[test]
    fn matching_warning_event_enqueues_one_notification() {
        let (correlator, mut rx, indexer) = test_correlator();
        indexer.upsert(sample_constraint("checkout"));
        let event = WarningEvent {
            event_uid: "evt-1".to_string(),
            involved_object: workload("checkout", "web"),
            labels: BTreeMap::new(),
            reason: "FailedCreate".to_string(),
            message: "blocked".to_string(),
        };
        correlator.handle_warning_event(&event);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn duplicate_event_uid_is_deduped() {
        let (correlator, mut rx, indexer) = test_correlator();
        indexer.upsert(sample_constraint("checkout"));
        let event = WarningEvent {
            event_uid: "evt-1".to_string(),
            involved_object: workload("checkout", "web"),
            labels: BTreeMap::new(),
            reason: "FailedCreate".to_string(),
            message: "blocked".to_string(),
        };
        correlator.handle_warning_event(&event);
        correlator.handle_warning_event(&event);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_policy_drop_reason_is_ignored() {
        let (correlator, mut rx, indexer) = test_correlator();
        indexer.upsert(sample_constraint("checkout"));
        let drop = FlowDrop {
            source: FlowEndpoint {
                namespace: "checkout".to_string(),
                pod_name: "web-abc".to_string(),
                labels: BTreeMap::new(),
                workload_ref: Some(workload("checkout", "web")),
                security_identity: None,
                ip: "10.0.0.1".to_string(),
            },
            destination: FlowEndpoint {
                namespace: "checkout".to_string(),
                pod_name: "db-xyz".to_string(),
                labels: BTreeMap::new(),
                workload_ref: Some(workload("checkout", "db")),
                security_identity: None,
                ip: "10.0.0.2".to_string(),
            },
            l4: L4Info { protocol: "TCP".to_string(), source_port: 5000, destination_port: 5432, tcp_flags: None },
            drop_reason: "ttl-expired".to_string(),
            observed_at: chrono::Utc::now(),
        };
        correlator.handle_flow_drop(&drop);
        assert!(rx.try_recv().is_err());
    }
}
