//! Prometheus metrics for the Warden pipeline.
//!
//! The core only registers and updates these; exposing them over HTTP is the
//! job of the excluded HTTP/MCP query surface.

use prometheus::{Counter, CounterVec, Gauge, HistogramVec, IntCounterVec, Opts, Registry};

use crate::error::{Error, Result};

/// Handle to every metric the pipeline updates, grouped by owning component.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub adapter_parse_errors_total: CounterVec,
    pub discovery_watch_restarts_total: Counter,
    pub discovery_kinds_watched: Gauge,
    pub indexer_size: Gauge,
    pub correlator_dedupe_drops_total: Counter,
    pub correlator_rate_limit_drops_total: Counter,
    pub dispatcher_events_total: IntCounterVec,
    pub dispatcher_suppressed_total: Counter,
    pub annotator_patch_conflicts_total: Counter,
    pub annotator_patches_total: Counter,
    pub report_reconcile_duration_seconds: HistogramVec,
    pub dropstream_reconnects_total: Counter,
    pub dropstream_frames_dropped_total: Counter,
}

impl Metrics {
    /// Registers every metric against a fresh [`Registry`].
    ///
    /// # Errors
    /// Returns an error if a metric collides with an already-registered name
    /// (should only happen if this is called twice against the same registry).
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let adapter_parse_errors_total = CounterVec::new(
            Opts::new("warden_adapter_parse_errors_total", "Adapter parse failures, by adapter name"),
            &["adapter"],
        )
        .map_err(metric_err)?;
        let discovery_watch_restarts_total = Counter::new(
            "warden_discovery_watch_restarts_total",
            "Watch streams restarted after a disconnect",
        )
        .map_err(metric_err)?;
        let discovery_kinds_watched =
            Gauge::new("warden_discovery_kinds_watched", "Resource kinds currently under watch").map_err(metric_err)?;
        let indexer_size = Gauge::new("warden_indexer_size", "Constraints currently indexed").map_err(metric_err)?;
        let correlator_dedupe_drops_total = Counter::new(
            "warden_correlator_dedupe_drops_total",
            "Correlated notifications skipped due to the dedupe cache",
        )
        .map_err(metric_err)?;
        let correlator_rate_limit_drops_total = Counter::new(
            "warden_correlator_rate_limit_drops_total",
            "Warning events dropped by the correlator's global rate limiter",
        )
        .map_err(metric_err)?;
        let dispatcher_events_total = IntCounterVec::new(
            Opts::new("warden_dispatcher_events_total", "Events emitted by the dispatcher, by severity"),
            &["severity"],
        )
        .map_err(metric_err)?;
        let dispatcher_suppressed_total = Counter::new(
            "warden_dispatcher_suppressed_total",
            "Notifications suppressed by the dispatcher's dedupe cache",
        )
        .map_err(metric_err)?;
        let annotator_patch_conflicts_total = Counter::new(
            "warden_annotator_patch_conflicts_total",
            "Workload patch attempts that hit a resourceVersion conflict",
        )
        .map_err(metric_err)?;
        let annotator_patches_total =
            Counter::new("warden_annotator_patches_total", "Workload annotation patches applied").map_err(metric_err)?;
        let report_reconcile_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "warden_report_reconcile_duration_seconds",
                "Time spent writing a namespace report",
            ),
            &["namespace"],
        )
        .map_err(metric_err)?;
        let dropstream_reconnects_total =
            Counter::new("warden_dropstream_reconnects_total", "Drop-stream reconnect attempts").map_err(metric_err)?;
        let dropstream_frames_dropped_total = Counter::new(
            "warden_dropstream_frames_dropped_total",
            "Drop-stream frames discarded because the consumer channel was full",
        )
        .map_err(metric_err)?;

        for collector in [
            Box::new(adapter_parse_errors_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(discovery_watch_restarts_total.clone()),
            Box::new(discovery_kinds_watched.clone()),
            Box::new(indexer_size.clone()),
            Box::new(correlator_dedupe_drops_total.clone()),
            Box::new(correlator_rate_limit_drops_total.clone()),
            Box::new(dispatcher_events_total.clone()),
            Box::new(dispatcher_suppressed_total.clone()),
            Box::new(annotator_patch_conflicts_total.clone()),
            Box::new(annotator_patches_total.clone()),
            Box::new(report_reconcile_duration_seconds.clone()),
            Box::new(dropstream_reconnects_total.clone()),
            Box::new(dropstream_frames_dropped_total.clone()),
        ] {
            registry.register(collector).map_err(metric_err)?;
        }

        Ok(Self {
            registry,
            adapter_parse_errors_total,
            discovery_watch_restarts_total,
            discovery_kinds_watched,
            indexer_size,
            correlator_dedupe_drops_total,
            correlator_rate_limit_drops_total,
            dispatcher_events_total,
            dispatcher_suppressed_total,
            annotator_patch_conflicts_total,
            annotator_patches_total,
            report_reconcile_duration_seconds,
            dropstream_reconnects_total,
            dropstream_frames_dropped_total,
        })
    }

    /// The backing registry, for a consumer that exposes `/metrics` at the edge.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn metric_err(e: prometheus::Error) -> Error {
    Error::config(format!("metric registration failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_collision() {
        let metrics = Metrics::new().expect("register metrics");
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn counters_increment() {
        let metrics = Metrics::new().unwrap();
        metrics.adapter_parse_errors_total.with_label_values(&["gatekeeper"]).inc();
        let families = metrics.registry().gather();
        let found = families.iter().any(|f| f.get_name() == "warden_adapter_parse_errors_total");
        assert!(found);
    }
}
