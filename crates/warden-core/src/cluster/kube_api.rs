//! Production [`ClusterApi`] implementation over a live `kube::Client`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Event as CoreEvent;
use k8s_openapi::api::core::v1::{EventSource, ObjectReference};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams, PostParams};
use kube::discovery::Discovery;
use kube::runtime::watcher::{self, Config as WatcherConfig, Event as WatcherEvent};
use kube::Client;
use serde_json::Value;
use uuid::Uuid;

use super::{ApiResourceInfo, ClusterApi, ClusterEventRequest, WatchEvent};
use crate::error::{Error, Result};
use crate::model::Gvr;

/// Annotation a CRD's own metadata carries to mark every kind it defines as
/// constraint-like, independent of group/plural-name heuristics (§4.C).
const IS_POLICY_ANNOTATION: &str = "io/is-policy";

pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_resource_for(&self, gvr: &Gvr) -> ApiResource {
        ApiResource {
            group: gvr.group.clone(),
            version: gvr.version.clone(),
            api_version: if gvr.group.is_empty() { gvr.version.clone() } else { format!("{}/{}", gvr.group, gvr.version) },
            kind: gvr.resource.clone(),
            plural: gvr.resource.clone(),
        }
    }

    fn dynamic_api(&self, gvr: &Gvr, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = self.api_resource_for(gvr);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    /// (group, plural) pairs whose CRD carries the `io/is-policy=true`
    /// annotation. A failure to list CRDs (e.g. insufficient RBAC) is
    /// tolerated the same way a partial discovery document is: this signal
    /// is just absent, the other five classification conditions still apply.
    async fn policy_marked_crds(&self) -> BTreeSet<(String, String)> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let Ok(list) = api.list(&Default::default()).await else { return BTreeSet::new() };
        list.items
            .into_iter()
            .filter(|crd| {
                crd.metadata
                    .annotations
                    .as_ref()
                    .and_then(|a| a.get(IS_POLICY_ANNOTATION))
                    .is_some_and(|v| v == "true")
            })
            .map(|crd| (crd.spec.group, crd.spec.names.plural))
            .collect()
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_api_resources(&self) -> Result<Vec<ApiResourceInfo>> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| Error::discovery(format!("discovery document fetch failed: {e}")))?;

        let policy_marked = self.policy_marked_crds().await;

        let mut out = Vec::new();
        for group in discovery.groups() {
            for (api_resource, capabilities) in group.recommended_resources() {
                // Sub-resources (e.g. "pods/status") are excluded per §4.C.
                if api_resource.plural.contains('/') {
                    continue;
                }
                let schema_marks_policy =
                    policy_marked.contains(&(api_resource.group.clone(), api_resource.plural.clone()));
                out.push(ApiResourceInfo {
                    gvr: Gvr::new(api_resource.group.clone(), api_resource.version.clone(), api_resource.plural.clone()),
                    namespaced: capabilities.scope == kube::discovery::Scope::Namespaced,
                    schema_marks_policy,
                });
            }
        }
        Ok(out)
    }

    async fn list_objects(&self, gvr: &Gvr, namespace: Option<&str>) -> Result<Vec<Value>> {
        let api = self.dynamic_api(gvr, namespace);
        let list = api.list(&Default::default()).await.map_err(Error::from)?;
        Ok(list.items.into_iter().filter_map(|obj| serde_json::to_value(obj).ok()).collect())
    }

    async fn watch(&self, gvr: &Gvr, namespace: Option<&str>) -> Result<BoxStream<'static, Result<WatchEvent>>> {
        let api = self.dynamic_api(gvr, namespace);
        let events = watcher::watcher(api, WatcherConfig::default());

        let mapped = events.map(move |event| match event {
            Ok(WatcherEvent::Apply(obj)) => {
                serde_json::to_value(obj).map(WatchEvent::Modified).map_err(|e| Error::discovery(e.to_string()))
            }
            Ok(WatcherEvent::Delete(obj)) => {
                serde_json::to_value(obj).map(WatchEvent::Deleted).map_err(|e| Error::discovery(e.to_string()))
            }
            Ok(WatcherEvent::Init | WatcherEvent::InitApply(_) | WatcherEvent::InitDone) => {
                Ok(WatchEvent::Added(Value::Null))
            }
            Err(e) => Err(Error::discovery(format!("watch stream error: {e}"))),
        });

        Ok(Box::pin(mapped.filter(|event| {
            let keep = !matches!(event, Ok(WatchEvent::Added(Value::Null)));
            futures::future::ready(keep)
        })))
    }

    async fn patch_workload(&self, workload: &crate::model::WorkloadRef, patch: Value) -> Result<()> {
        let resource = ApiResource {
            group: String::new(),
            version: "v1".to_string(),
            api_version: workload.api_version.clone(),
            kind: workload.kind.clone(),
            plural: format!("{}s", workload.kind.to_lowercase()),
        };
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &workload.namespace, &resource);
        api.patch(&workload.name, &PatchParams::apply("warden"), &Patch::Merge(&patch)).await.map_err(Error::from)?;
        Ok(())
    }

    async fn patch_report_status(&self, namespace: &str, name: &str, status: Value) -> Result<()> {
        let api: Api<crate::crds::Report> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({"status": status});
        api.patch_status(name, &PatchParams::apply("warden"), &Patch::Merge(&patch))
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn create_event(&self, request: ClusterEventRequest) -> Result<()> {
        let api: Api<CoreEvent> = Api::namespaced(self.client.clone(), &request.involved_object.namespace);
        let now = Time(chrono::Utc::now());
        let event = CoreEvent {
            metadata: ObjectMeta {
                generate_name: Some(format!("warden-{}-", Uuid::new_v4())),
                namespace: Some(request.involved_object.namespace.clone()),
                annotations: Some(request.annotations.into_iter().collect()),
                labels: Some(request.labels.into_iter().collect()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: Some(request.involved_object.kind.clone()),
                api_version: Some(request.involved_object.api_version.clone()),
                name: Some(request.involved_object.name.clone()),
                namespace: Some(request.involved_object.namespace.clone()),
                uid: Some(request.involved_object.uid.clone()),
                ..Default::default()
            },
            reason: Some(request.reason),
            message: Some(request.message),
            type_: Some(request.event_type),
            source: Some(EventSource { component: Some("warden".to_string()), host: None }),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now),
            count: Some(1),
            ..Default::default()
        };
        api.create(&PostParams::default(), &event).await.map_err(Error::from)?;
        Ok(())
    }
}
