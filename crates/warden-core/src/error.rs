//! Error types for warden-core
//!
//! A single crate-wide error hierarchy with per-domain variants, each
//! carrying a human message and an optional boxed source. A small `codes`
//! module gives every variant a stable string identifier for metrics and
//! log correlation, independent of the (free-text) `Display` message.

use thiserror::Error;

/// Stable error code constants, grouped by domain.
pub mod codes {
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    pub const ADAPTER_PARSE_FAILED: &str = "ADAPTER_PARSE_FAILED";
    pub const ADAPTER_REGISTRATION_CONFLICT: &str = "ADAPTER_REGISTRATION_CONFLICT";
    pub const DISCOVERY_FAILED: &str = "DISCOVERY_FAILED";
    pub const WATCH_FAILED: &str = "WATCH_FAILED";
    pub const INDEXER_INVARIANT: &str = "INDEXER_INVARIANT";
    pub const CORRELATOR_FAILED: &str = "CORRELATOR_FAILED";
    pub const EVALUATOR_FAILED: &str = "EVALUATOR_FAILED";
    pub const DISPATCH_FAILED: &str = "DISPATCH_FAILED";
    pub const ANNOTATE_FAILED: &str = "ANNOTATE_FAILED";
    pub const REPORT_FAILED: &str = "REPORT_FAILED";
    pub const DROPSTREAM_FAILED: &str = "DROPSTREAM_FAILED";
    pub const CLUSTER_API_FAILED: &str = "CLUSTER_API_FAILED";
}

/// warden-core result type.
pub type Result<T> = std::result::Result<T, Error>;

/// warden-core error type with a stable code and an optional source.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration failed to load or validate.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An adapter failed to parse an object, or two adapters collided.
    #[error("adapter error: {message}")]
    Adapter {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The discovery engine could not enumerate or watch a resource kind.
    #[error("discovery error: {message}")]
    Discovery {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The indexer observed an invariant violation (should never happen; kept
    /// as a variant so tests can assert on it rather than panicking).
    #[error("indexer error: {message}")]
    Indexer { message: String },

    /// The correlator failed to process a warning event or flow drop.
    #[error("correlator error: {message}")]
    Correlator { message: String },

    /// A requirement rule failed to evaluate.
    #[error("requirement evaluator error: {message}")]
    Evaluator { message: String },

    /// The dispatcher failed to render or emit a notification.
    #[error("dispatcher error: {message}")]
    Dispatch {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The workload annotator failed to patch a workload.
    #[error("annotator error: {message}")]
    Annotate {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The report reconciler failed to write a namespace report.
    #[error("report error: {message}")]
    Report {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The drop-stream client failed to connect or decode a frame.
    #[error("drop-stream error: {message}")]
    DropStream {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The underlying cluster API call failed.
    #[error("cluster API error: {message}")]
    ClusterApi {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    #[must_use]
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(Box::new(source)) }
    }

    #[must_use]
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter { message: message.into(), source: None }
    }

    #[must_use]
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery { message: message.into(), source: None }
    }

    #[must_use]
    pub fn indexer(message: impl Into<String>) -> Self {
        Self::Indexer { message: message.into() }
    }

    #[must_use]
    pub fn correlator(message: impl Into<String>) -> Self {
        Self::Correlator { message: message.into() }
    }

    #[must_use]
    pub fn evaluator(message: impl Into<String>) -> Self {
        Self::Evaluator { message: message.into() }
    }

    #[must_use]
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch { message: message.into(), source: None }
    }

    #[must_use]
    pub fn annotate(message: impl Into<String>) -> Self {
        Self::Annotate { message: message.into(), source: None }
    }

    #[must_use]
    pub fn report(message: impl Into<String>) -> Self {
        Self::Report { message: message.into(), source: None }
    }

    #[must_use]
    pub fn dropstream(message: impl Into<String>) -> Self {
        Self::DropStream { message: message.into(), source: None }
    }

    #[must_use]
    pub fn cluster_api(message: impl Into<String>) -> Self {
        Self::ClusterApi { message: message.into(), source: None }
    }

    /// The stable error code for this variant, for metrics/log correlation.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => codes::CONFIG_INVALID,
            Self::Adapter { .. } => codes::ADAPTER_PARSE_FAILED,
            Self::Discovery { .. } => codes::DISCOVERY_FAILED,
            Self::Indexer { .. } => codes::INDEXER_INVARIANT,
            Self::Correlator { .. } => codes::CORRELATOR_FAILED,
            Self::Evaluator { .. } => codes::EVALUATOR_FAILED,
            Self::Dispatch { .. } => codes::DISPATCH_FAILED,
            Self::Annotate { .. } => codes::ANNOTATE_FAILED,
            Self::Report { .. } => codes::REPORT_FAILED,
            Self::DropStream { .. } => codes::DROPSTREAM_FAILED,
            Self::ClusterApi { .. } => codes::CLUSTER_API_FAILED,
        }
    }
}

impl From<kube::Error> for Error {
    fn from(source: kube::Error) -> Self {
        Self::ClusterApi { message: source.to_string(), source: Some(Box::new(source)) }
    }
}
