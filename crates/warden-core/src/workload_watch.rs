//! Watches workload kinds (Deployments, StatefulSets, DaemonSets) and feeds
//! each add/modify through the [`Evaluator`](crate::evaluator::Evaluator),
//! mirroring the discovery engine's per-kind watch loop (§4.C, §4.F).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterApi, WatchEvent};
use crate::evaluator::{EvalContext, Evaluator, WorkloadDescriptor};
use crate::model::Gvr;

const WORKLOAD_KINDS: [(&str, &str); 3] =
    [("Deployment", "deployments"), ("StatefulSet", "statefulsets"), ("DaemonSet", "daemonsets")];

/// Starts one watch task per workload kind, each driving `evaluator` on
/// every add/modify. Returns once all tasks are spawned; tasks run until
/// `cancel` fires.
pub fn spawn_watches(cluster: Arc<dyn ClusterApi>, evaluator: Arc<Evaluator>, ctx: Arc<dyn EvalContext>, cancel: CancellationToken) {
    for (kind, resource) in WORKLOAD_KINDS {
        let gvr = Gvr::new("apps", "v1", resource);
        let cluster = cluster.clone();
        let evaluator = evaluator.clone();
        let ctx = ctx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            run_watch_loop(kind, gvr, cluster, evaluator, ctx, cancel).await;
        });
    }
}

async fn run_watch_loop(
    kind: &'static str,
    gvr: Gvr,
    cluster: Arc<dyn ClusterApi>,
    evaluator: Arc<Evaluator>,
    ctx: Arc<dyn EvalContext>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let stream = match cluster.watch(&gvr, None).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(%gvr, error = %err, "workload watch start failed, retrying");
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(5)) => continue,
                    () = cancel.cancelled() => return,
                }
            }
        };
        tokio::pin!(stream);

        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                next = stream.next() => {
                    match next {
                        Some(Ok(WatchEvent::Added(object) | WatchEvent::Modified(object))) => {
                            let descriptor = to_workload_descriptor(kind, &gvr, &object);
                            if let Err(err) = evaluator.evaluate_workload(&descriptor, ctx.as_ref()).await {
                                tracing::warn!(%gvr, error = %err, "evaluator run failed");
                            }
                        }
                        Some(Ok(WatchEvent::Deleted(_))) => {
                            // The evaluator only emits MissingResource constraints
                            // for workloads it last observed present; a deleted
                            // workload's indexer entries age out on their own
                            // once nothing re-observes it non-empty.
                        }
                        Some(Err(err)) => {
                            tracing::warn!(%gvr, error = %err, "workload watch stream error, restarting");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }
}

fn to_workload_descriptor(kind: &str, gvr: &Gvr, object: &serde_json::Value) -> WorkloadDescriptor {
    use crate::model::accessors::{nested_array, nested_str, nested_string_map};

    let port_names = nested_array(object, &["spec", "template", "spec", "containers"])
        .iter()
        .flat_map(|container| {
            nested_array(container, &["ports"]).iter().filter_map(|p| p.get("name").and_then(serde_json::Value::as_str).map(str::to_string))
        })
        .collect::<Vec<_>>();

    WorkloadDescriptor {
        kind: kind.to_string(),
        api_version: format!("{}/{}", gvr.group, gvr.version),
        name: nested_str(object, &["metadata", "name"]).to_string(),
        namespace: nested_str(object, &["metadata", "namespace"]).to_string(),
        uid: nested_str(object, &["metadata", "uid"]).to_string(),
        labels: nested_string_map(object, &["metadata", "labels"]),
        annotations: nested_string_map(object, &["metadata", "annotations"]),
        container_port_names: port_names,
    }
}
