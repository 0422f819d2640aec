//! The discovery engine: enumerates kinds, classifies them, and starts
//! watches for the constraint-like ones (§4.C).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::classify::is_constraint_like;
use super::watch::WatchManager;
use crate::adapters::Registry;
use crate::cluster::ClusterApi;
use crate::config::DiscoveryConfig;
use crate::error::Result;
use crate::indexer::Indexer;
use crate::metrics::Metrics;
use crate::profile::ProfileSet;

pub struct DiscoveryEngine {
    cluster: Arc<dyn ClusterApi>,
    registry: Arc<Registry>,
    profiles: Arc<ProfileSet>,
    config: DiscoveryConfig,
    watches: WatchManager,
}

impl DiscoveryEngine {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        registry: Arc<Registry>,
        indexer: Arc<Indexer>,
        metrics: Arc<Metrics>,
        profiles: Arc<ProfileSet>,
        config: DiscoveryConfig,
    ) -> Self {
        let watches = WatchManager::new(cluster.clone(), registry.clone(), indexer, metrics, profiles.clone());
        Self { cluster, registry, profiles, config, watches }
    }

    /// Runs one classification pass, starting watches for any newly
    /// constraint-like kind. Never tears down an already-started watch.
    ///
    /// # Errors
    /// Returns an error if the API's discovery document could not be
    /// fetched; a partial document (some kinds missing) is tolerated and
    /// processed as-is rather than treated as a failure.
    pub async fn classify_and_start(&self, cancel: &CancellationToken) -> Result<usize> {
        let resources = self.cluster.list_api_resources().await?;
        let mut started = 0;
        for resource in resources {
            if resource.gvr.resource.contains('/') {
                continue; // sub-resources excluded
            }
            if is_constraint_like(
                &resource.gvr,
                resource.schema_marks_policy,
                &self.config,
                &self.registry,
                &self.profiles,
            )
                && self.watches.ensure_started(resource.gvr, cancel.clone())
            {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Runs the periodic rescan loop until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.config.rescan_interval_secs));
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    match self.classify_and_start(&cancel).await {
                        Ok(started) if started > 0 => {
                            tracing::info!(started, "discovery rescan started new watches");
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "discovery rescan failed"),
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn is_watching(&self, gvr: &crate::model::Gvr) -> bool {
        self.watches.is_started(gvr)
    }
}
