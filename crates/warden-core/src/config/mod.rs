//! Layered configuration for the Warden operator.
//!
//! Compiled-in defaults are overridden by an optional TOML file, then by
//! `WARDEN_`-prefixed environment variables. Each component's section is a
//! typed struct with its own `Default` and its own validated ranges.

pub mod core;
pub mod defaults;
pub mod types;

pub use core::Config;
pub use types::{
    AnnotatorConfig, CorrelatorConfig, DiscoveryConfig, DispatcherConfig, DropStreamConfig,
    EvaluatorConfig, LoggingConfig, ReportConfig,
};
