//! Configuration type definitions, one struct per component section.

use serde::{Deserialize, Serialize};

use super::defaults;

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log format (json, text).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::logging::DEFAULT_LOG_LEVEL.to_string(),
            format: defaults::logging::DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

/// Discovery engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Interval between classification rescans.
    pub rescan_interval_secs: u64,
    /// Extra apiGroups always treated as constraint-like.
    pub policy_group_allowlist: Vec<String>,
    /// Substrings in a plural resource name that mark it constraint-like.
    pub plural_name_hints: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            rescan_interval_secs: defaults::discovery::DEFAULT_RESCAN_INTERVAL_SECS,
            policy_group_allowlist: vec![
                "networking.k8s.io".to_string(),
                "cilium.io".to_string(),
                "constraints.gatekeeper.sh".to_string(),
                "templates.gatekeeper.sh".to_string(),
                "kyverno.io".to_string(),
                "security.istio.io".to_string(),
                "admissionregistration.k8s.io".to_string(),
            ],
            plural_name_hints: vec![
                "policy".to_string(),
                "policies".to_string(),
                "constraint".to_string(),
                "constraints".to_string(),
                "rule".to_string(),
                "rules".to_string(),
                "quota".to_string(),
                "quotas".to_string(),
                "limit".to_string(),
                "limits".to_string(),
                "authorization".to_string(),
            ],
        }
    }
}

/// Correlator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    pub rate_per_second: u32,
    pub burst: u32,
    pub dedupe_window_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            rate_per_second: defaults::correlator::DEFAULT_RATE_PER_SECOND,
            burst: defaults::correlator::DEFAULT_BURST,
            dedupe_window_secs: defaults::correlator::DEFAULT_DEDUPE_WINDOW_SECS,
            sweep_interval_secs: defaults::correlator::DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

/// Requirement evaluator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub debounce_secs: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { debounce_secs: defaults::evaluator::DEFAULT_DEBOUNCE_SECS }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub rate_per_minute: u32,
    pub burst: u32,
    pub suppression_window_secs: u64,
    pub cleanup_interval_secs: u64,
    pub limiter_idle_eviction_secs: u64,
    /// Default detail level when no `NotificationPolicy` resolves one.
    pub default_detail_level: String,
    pub remediation_contact: Option<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            rate_per_minute: defaults::dispatcher::DEFAULT_RATE_PER_MINUTE,
            burst: defaults::dispatcher::DEFAULT_BURST,
            suppression_window_secs: defaults::dispatcher::DEFAULT_SUPPRESSION_WINDOW_SECS,
            cleanup_interval_secs: defaults::dispatcher::DEFAULT_CLEANUP_INTERVAL_SECS,
            limiter_idle_eviction_secs: defaults::dispatcher::DEFAULT_LIMITER_IDLE_EVICTION_SECS,
            default_detail_level: "summary".to_string(),
            remediation_contact: None,
        }
    }
}

/// Workload annotator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    pub debounce_secs: u64,
    pub patch_retry_attempts: u32,
    pub workload_kinds: Vec<String>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            debounce_secs: defaults::annotator::DEFAULT_DEBOUNCE_SECS,
            patch_retry_attempts: defaults::annotator::DEFAULT_PATCH_RETRY_ATTEMPTS,
            workload_kinds: vec![
                "Deployment".to_string(),
                "StatefulSet".to_string(),
                "DaemonSet".to_string(),
            ],
        }
    }
}

/// Report reconciler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub debounce_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { debounce_secs: defaults::report::DEFAULT_DEBOUNCE_SECS }
    }
}

/// Drop-stream client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropStreamConfig {
    /// gRPC endpoint of the external drop-feed service. Empty disables the client.
    pub endpoint: Option<String>,
    pub min_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub channel_capacity: usize,
}

impl Default for DropStreamConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            min_backoff_secs: defaults::dropstream::DEFAULT_MIN_BACKOFF_SECS,
            max_backoff_secs: defaults::dropstream::DEFAULT_MAX_BACKOFF_SECS,
            channel_capacity: defaults::dropstream::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
