//! An in-memory [`ClusterApi`] fake: records every call it receives and
//! lets a test seed objects/events up front, so integration tests never
//! need a live cluster.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde_json::Value;
use warden_core::cluster::{ApiResourceInfo, ClusterApi, ClusterEventRequest, WatchEvent};
use warden_core::error::Result;
use warden_core::model::{Gvr, WorkloadRef};

/// One recorded call to [`FakeClusterApi::patch_workload`].
#[derive(Debug, Clone)]
pub struct RecordedPatch {
    pub workload: WorkloadRef,
    pub patch: Value,
}

#[derive(Default)]
struct State {
    api_resources: Vec<ApiResourceInfo>,
    objects: BTreeMap<Gvr, Vec<Value>>,
    events: Vec<ClusterEventRequest>,
    workload_patches: Vec<RecordedPatch>,
    report_patches: Vec<(String, String, Value)>,
}

/// A test double for [`ClusterApi`]: every seeded object is returned by
/// `list_objects`/`list_api_resources`; every write call is appended to a
/// recording the test can assert against afterward.
#[derive(Default)]
pub struct FakeClusterApi {
    state: Mutex<State>,
}

impl FakeClusterApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `gvr` as a discoverable resource kind, as if its CRD (if
    /// any) carried the `io/is-policy=true` annotation when `schema_marks_policy`
    /// is set.
    pub fn seed_api_resource(&self, gvr: Gvr, namespaced: bool, schema_marks_policy: bool) {
        self.state.lock().unwrap().api_resources.push(ApiResourceInfo { gvr, namespaced, schema_marks_policy });
    }

    /// Seeds one object as if it already existed in the cluster under `gvr`.
    pub fn seed_object(&self, gvr: Gvr, object: Value) {
        self.state.lock().unwrap().objects.entry(gvr).or_default().push(object);
    }

    #[must_use]
    pub fn events(&self) -> Vec<ClusterEventRequest> {
        self.state.lock().unwrap().events.clone()
    }

    #[must_use]
    pub fn workload_patches(&self) -> Vec<RecordedPatch> {
        self.state.lock().unwrap().workload_patches.clone()
    }

    #[must_use]
    pub fn report_patches(&self) -> Vec<(String, String, Value)> {
        self.state.lock().unwrap().report_patches.clone()
    }
}

#[async_trait]
impl ClusterApi for FakeClusterApi {
    async fn list_api_resources(&self) -> Result<Vec<ApiResourceInfo>> {
        Ok(self.state.lock().unwrap().api_resources.clone())
    }

    async fn list_objects(&self, gvr: &Gvr, namespace: Option<&str>) -> Result<Vec<Value>> {
        let state = self.state.lock().unwrap();
        let Some(objects) = state.objects.get(gvr) else { return Ok(vec![]) };
        Ok(objects
            .iter()
            .filter(|o| match namespace {
                Some(ns) => o.get("metadata").and_then(|m| m.get("namespace")).and_then(Value::as_str) == Some(ns),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn watch(&self, _gvr: &Gvr, _namespace: Option<&str>) -> Result<BoxStream<'static, Result<WatchEvent>>> {
        // Integration tests drive the pipeline directly through indexer/
        // evaluator calls rather than a live watch stream; callers that
        // need one should seed a real stream via a dedicated test.
        Ok(Box::pin(stream::empty()))
    }

    async fn patch_workload(&self, workload: &WorkloadRef, patch: Value) -> Result<()> {
        self.state.lock().unwrap().workload_patches.push(RecordedPatch { workload: workload.clone(), patch });
        Ok(())
    }

    async fn patch_report_status(&self, namespace: &str, name: &str, status: Value) -> Result<()> {
        self.state.lock().unwrap().report_patches.push((namespace.to_string(), name.to_string(), status));
        Ok(())
    }

    async fn create_event(&self, request: ClusterEventRequest) -> Result<()> {
        self.state.lock().unwrap().events.push(request);
        Ok(())
    }
}
