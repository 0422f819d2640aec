//! Configuration default values and constants, mirrored one module per
//! configuration section so each component's defaults stay next to its
//! validation range.

/// Discovery engine defaults.
pub mod discovery {
    /// How often the classification pass re-runs to pick up newly created kinds.
    pub const DEFAULT_RESCAN_INTERVAL_SECS: u64 = 300;
    pub const MIN_RESCAN_INTERVAL_SECS: u64 = 30;
    pub const MAX_RESCAN_INTERVAL_SECS: u64 = 3600;
}

/// Correlator defaults.
pub mod correlator {
    /// Global token-bucket rate applied before any per-constraint matching.
    pub const DEFAULT_RATE_PER_SECOND: u32 = 100;
    pub const DEFAULT_BURST: u32 = 200;
    /// Dedupe window keyed by (event UID, constraint UID).
    pub const DEFAULT_DEDUPE_WINDOW_SECS: u64 = 300;
    pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
}

/// Requirement evaluator defaults.
pub mod evaluator {
    pub const DEFAULT_DEBOUNCE_SECS: u64 = 120;
    pub const MIN_DEBOUNCE_SECS: u64 = 1;
    pub const MAX_DEBOUNCE_SECS: u64 = 3600;
}

/// Dispatcher defaults.
pub mod dispatcher {
    /// Per-namespace token-bucket rate.
    pub const DEFAULT_RATE_PER_MINUTE: u32 = 100;
    pub const DEFAULT_BURST: u32 = 10;
    /// Suppression window keyed by (constraint UID, namespace/workload).
    pub const DEFAULT_SUPPRESSION_WINDOW_SECS: u64 = 3600;
    pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
    pub const DEFAULT_LIMITER_IDLE_EVICTION_SECS: u64 = 3600;
}

/// Workload annotator defaults.
pub mod annotator {
    pub const DEFAULT_DEBOUNCE_SECS: u64 = 30;
    pub const DEFAULT_PATCH_RETRY_ATTEMPTS: u32 = 3;
}

/// Report reconciler defaults.
pub mod report {
    pub const DEFAULT_DEBOUNCE_SECS: u64 = 10;
    pub const SCHEMA_VERSION: &str = "1";
}

/// Drop-stream client defaults.
pub mod dropstream {
    pub const DEFAULT_MIN_BACKOFF_SECS: u64 = 1;
    pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
}

/// Logging defaults.
pub mod logging {
    pub const DEFAULT_LOG_LEVEL: &str = "info";
    pub const DEFAULT_LOG_FORMAT: &str = "text";
}
