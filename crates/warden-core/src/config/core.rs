//! Core configuration structure and loading pipeline.

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

use super::types::{
    AnnotatorConfig, CorrelatorConfig, DiscoveryConfig, DispatcherConfig, DropStreamConfig,
    EvaluatorConfig, LoggingConfig, ReportConfig,
};

/// Top-level Warden configuration: compiled-in defaults, optionally
/// overridden by a TOML file, optionally overridden again by `WARDEN_`
/// environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub correlator: CorrelatorConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub annotator: AnnotatorConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub dropstream: DropStreamConfig,
}

impl Config {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file, layered over the defaults.
    ///
    /// # Errors
    /// Returns an error if the path is not valid UTF-8, the file cannot be
    /// read, or the contents cannot be parsed as valid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            Error::config(format!(
                "configuration file path contains invalid UTF-8: {}",
                path.as_ref().display()
            ))
        })?;

        Self::from_builder(ConfigBuilder::builder().add_source(File::with_name(path_str)))
            .map_err(|e| Error::config(format!("failed to load configuration from '{path_str}': {e}")))
    }

    /// Loads configuration from defaults plus `WARDEN_`-prefixed environment
    /// variables (double-underscore separated for nested fields, e.g.
    /// `WARDEN_CORRELATOR__RATE_PER_SECOND=50`).
    ///
    /// # Errors
    /// Returns an error if an environment override cannot be applied or the
    /// resulting configuration cannot be deserialized.
    pub fn from_env() -> Result<Self> {
        Self::from_builder(
            ConfigBuilder::builder()
                .add_source(Environment::with_prefix("WARDEN").separator("__")),
        )
        .map_err(|e| Error::config(format!("failed to build configuration from environment: {e}")))
    }

    /// Loads configuration from an optional file, then environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// resulting configuration fails [`Config::validate`].
    pub fn load(file_path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();
        if let Some(path) = file_path {
            let path_str = path.to_str().ok_or_else(|| {
                Error::config(format!("configuration file path contains invalid UTF-8: {}", path.display()))
            })?;
            builder = builder.add_source(File::with_name(path_str).required(false));
        }
        builder = builder.add_source(Environment::with_prefix("WARDEN").separator("__"));

        let cfg = Self::from_builder(builder)
            .map_err(|e| Error::config(format!("failed to build configuration: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_builder(builder: config::ConfigBuilder<config::builder::DefaultState>) -> std::result::Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let builder = builder
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?
            .set_default("discovery.rescan_interval_secs", defaults.discovery.rescan_interval_secs)?
            .set_default("correlator.rate_per_second", i64::from(defaults.correlator.rate_per_second))?
            .set_default("correlator.burst", i64::from(defaults.correlator.burst))?
            .set_default("correlator.dedupe_window_secs", defaults.correlator.dedupe_window_secs)?
            .set_default("correlator.sweep_interval_secs", defaults.correlator.sweep_interval_secs)?
            .set_default("evaluator.debounce_secs", defaults.evaluator.debounce_secs)?
            .set_default("dispatcher.rate_per_minute", i64::from(defaults.dispatcher.rate_per_minute))?
            .set_default("dispatcher.burst", i64::from(defaults.dispatcher.burst))?
            .set_default("dispatcher.suppression_window_secs", defaults.dispatcher.suppression_window_secs)?
            .set_default("dispatcher.cleanup_interval_secs", defaults.dispatcher.cleanup_interval_secs)?
            .set_default("dispatcher.limiter_idle_eviction_secs", defaults.dispatcher.limiter_idle_eviction_secs)?
            .set_default("dispatcher.default_detail_level", defaults.dispatcher.default_detail_level)?
            .set_default("annotator.debounce_secs", defaults.annotator.debounce_secs)?
            .set_default("annotator.patch_retry_attempts", i64::from(defaults.annotator.patch_retry_attempts))?
            .set_default("annotator.workload_kinds", defaults.annotator.workload_kinds)?
            .set_default("report.debounce_secs", defaults.report.debounce_secs)?
            .set_default("dropstream.min_backoff_secs", defaults.dropstream.min_backoff_secs)?
            .set_default("dropstream.max_backoff_secs", defaults.dropstream.max_backoff_secs)?
            .set_default("dropstream.channel_capacity", defaults.dropstream.channel_capacity as i64)?;

        builder.build()?.try_deserialize()
    }

    /// Rejects out-of-range durations/rates before the pipeline starts.
    ///
    /// # Errors
    /// Returns an error describing the first invalid field found.
    pub fn validate(&self) -> Result<()> {
        use super::defaults::{discovery, evaluator};

        if !(discovery::MIN_RESCAN_INTERVAL_SECS..=discovery::MAX_RESCAN_INTERVAL_SECS)
            .contains(&self.discovery.rescan_interval_secs)
        {
            return Err(Error::config(format!(
                "discovery.rescan_interval_secs must be between {} and {}",
                discovery::MIN_RESCAN_INTERVAL_SECS,
                discovery::MAX_RESCAN_INTERVAL_SECS
            )));
        }
        if !(evaluator::MIN_DEBOUNCE_SECS..=evaluator::MAX_DEBOUNCE_SECS)
            .contains(&self.evaluator.debounce_secs)
        {
            return Err(Error::config(format!(
                "evaluator.debounce_secs must be between {} and {}",
                evaluator::MIN_DEBOUNCE_SECS,
                evaluator::MAX_DEBOUNCE_SECS
            )));
        }
        if self.correlator.rate_per_second == 0 {
            return Err(Error::config("correlator.rate_per_second must be positive"));
        }
        if self.dispatcher.rate_per_minute == 0 {
            return Err(Error::config("dispatcher.rate_per_minute must be positive"));
        }
        if self.annotator.workload_kinds.is_empty() {
            return Err(Error::config("annotator.workload_kinds must not be empty"));
        }
        if let Some(endpoint) = &self.dropstream.endpoint {
            if endpoint.is_empty() {
                return Err(Error::config("dropstream.endpoint, if set, must not be empty"));
            }
            if self.dropstream.min_backoff_secs == 0
                || self.dropstream.min_backoff_secs > self.dropstream.max_backoff_secs
            {
                return Err(Error::config(
                    "dropstream.min_backoff_secs must be positive and <= max_backoff_secs",
                ));
            }
        }
        Ok(())
    }
}
