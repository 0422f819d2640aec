//! Warden cluster policy explanation operator.
//!
//! Wires the discovery engine, correlator, requirement evaluator,
//! dispatcher, workload annotator, and report reconciler into one process
//! against a live cluster.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use warden_core::adapters::Registry;
use warden_core::cluster::{ClusterApi, KubeClusterApi};
use warden_core::config::Config;
use warden_core::correlator::Correlator;
use warden_core::dispatcher::{Dispatcher, DetailLevelResolver};
use warden_core::evaluator::rules::{CertIssuerRule, MetricsScrapeRule, SidecarRoutingRule};
use warden_core::evaluator::{ClusterEvalContext, EvalContext, Evaluator, RequirementRule};
use warden_core::annotator::Annotator;
use warden_core::discovery::DiscoveryEngine;
use warden_core::dropstream::DropStreamClient;
use warden_core::indexer::Indexer;
use warden_core::logging::init_tracing;
use warden_core::metrics::Metrics;
use warden_core::model::DetailLevel;
use warden_core::profile::ProfileSet;
use warden_core::report::ReportReconciler;

/// Warden cluster policy explanation operator
#[derive(Parser, Debug)]
#[command(name = "warden-operator")]
#[command(about = "Explains why cluster policies affect a workload")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn load_configuration(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_configuration(&args)?;

    init_tracing(&config.logging)?;
    info!("starting warden-operator");

    let client = kube::Client::try_default().await.context("failed to build kube client")?;
    let cluster: Arc<dyn ClusterApi> = Arc::new(KubeClusterApi::new(client));
    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let indexer = Arc::new(Indexer::new());
    let registry = Arc::new(Registry::with_builtin_adapters());
    let profiles = Arc::new(ProfileSet::new());

    let cancel = CancellationToken::new();

    let discovery = Arc::new(DiscoveryEngine::new(
        cluster.clone(),
        registry,
        indexer.clone(),
        metrics.clone(),
        profiles.clone(),
        config.discovery.clone(),
    ));
    tokio::spawn(discovery.clone().run(cancel.clone()));

    let default_detail_level: DetailLevel =
        config.dispatcher.default_detail_level.parse().unwrap_or(DetailLevel::Summary);
    let detail_levels = Arc::new(DetailLevelResolver::new(default_detail_level));

    let (notifications_tx, notifications_rx) = mpsc::channel(1024);
    let correlator = Arc::new(Correlator::new(indexer.clone(), metrics.clone(), config.correlator.clone(), notifications_tx));
    tokio::spawn({
        let correlator = correlator.clone();
        let cancel = cancel.clone();
        async move { correlator.run_cleanup(cancel).await }
    });

    let (drops_tx, mut drops_rx) = mpsc::channel(config.dropstream.channel_capacity);
    let dropstream = Arc::new(DropStreamClient::new(config.dropstream.clone(), metrics.clone(), drops_tx));
    tokio::spawn({
        let dropstream = dropstream.clone();
        let cancel = cancel.clone();
        async move { dropstream.run(cancel).await }
    });
    tokio::spawn({
        let correlator = correlator.clone();
        async move {
            while let Some(drop) = drops_rx.recv().await {
                correlator.handle_flow_drop(&drop);
            }
        }
    });

    let dispatcher = Arc::new(Dispatcher::new(cluster.clone(), metrics.clone(), config.dispatcher.clone(), detail_levels.clone()));
    tokio::spawn({
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        async move { dispatcher.run(notifications_rx, cancel).await }
    });
    tokio::spawn({
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        async move { dispatcher.run_cleanup(cancel).await }
    });

    let annotator = Arc::new(Annotator::new(
        cluster.clone(),
        indexer.clone(),
        metrics.clone(),
        config.annotator.clone(),
        profiles.clone(),
    ));
    tokio::spawn({
        let annotator = annotator.clone();
        let changes = indexer.subscribe();
        let cancel = cancel.clone();
        async move { annotator.run(changes, cancel).await }
    });

    let report_reconciler = Arc::new(ReportReconciler::new(
        cluster.clone(),
        indexer.clone(),
        metrics.clone(),
        config.report.clone(),
        detail_levels.clone(),
    ));
    tokio::spawn({
        let reconciler = report_reconciler.clone();
        let changes = indexer.subscribe();
        let cancel = cancel.clone();
        async move { reconciler.run(changes, cancel).await }
    });

    let rules: Vec<Arc<dyn RequirementRule>> =
        vec![Arc::new(MetricsScrapeRule), Arc::new(SidecarRoutingRule), Arc::new(CertIssuerRule)];
    let evaluator = Arc::new(Evaluator::new(indexer.clone(), &config.evaluator, rules, profiles.clone()));
    let eval_ctx: Arc<dyn EvalContext> = Arc::new(ClusterEvalContext::new(cluster.clone()));
    warden_core::workload_watch::spawn_watches(cluster.clone(), evaluator, eval_ctx, cancel.clone());

    warden_core::profile_watch::spawn_watches(cluster, profiles, detail_levels, cancel.clone());

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, cancelling tasks");
    cancel.cancel();

    Ok(())
}
