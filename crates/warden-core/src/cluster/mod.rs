//! The `ClusterApi` abstraction (§6): every place the core talks to the
//! orchestrator goes through this trait, so production code runs over a real
//! `kube::Client` and tests run over an in-memory fake with no cluster at
//! all.

mod kube_api;

pub use kube_api::KubeClusterApi;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::Result;
use crate::model::{Gvr, WorkloadRef};

/// One resource kind the discovery engine can see via the API's discovery
/// document.
#[derive(Debug, Clone)]
pub struct ApiResourceInfo {
    pub gvr: Gvr,
    pub namespaced: bool,
    /// Whether the kind's CRD carries the `io/is-policy: "true"` schema
    /// annotation, one of §4.C's six constraint-like classification signals.
    pub schema_marks_policy: bool,
}

/// One add/modify/delete notification from a kind's watch stream. Delete
/// carries the last-known object (a tombstone, already unwrapped).
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Added(Value),
    Modified(Value),
    Deleted(Value),
}

/// A cluster Event to be created, matching the stable annotation/label
/// contract in §6.
#[derive(Debug, Clone)]
pub struct ClusterEventRequest {
    pub involved_object: WorkloadRef,
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub annotations: std::collections::BTreeMap<String, String>,
    pub labels: std::collections::BTreeMap<String, String>,
}

/// Abstracts every cluster interaction the core needs: discovery, watch,
/// workload/report patching, and event creation.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Lists every resource kind the API server serves, for the discovery
    /// engine's classification pass.
    async fn list_api_resources(&self) -> Result<Vec<ApiResourceInfo>>;

    /// Lists every current object of `gvr`, scoped to `namespace` when given.
    async fn list_objects(&self, gvr: &Gvr, namespace: Option<&str>) -> Result<Vec<Value>>;

    /// Opens a resumable watch stream for `gvr`, tolerant of 410-Gone
    /// relists (the stream transparently restarts and re-emits `Added` for
    /// the relisted set).
    async fn watch(&self, gvr: &Gvr, namespace: Option<&str>) -> Result<BoxStream<'static, Result<WatchEvent>>>;

    /// Applies a strategic-merge-style annotation patch to a workload.
    async fn patch_workload(&self, workload: &WorkloadRef, patch: Value) -> Result<()>;

    /// Applies a status patch to this operator's own `Report` object for
    /// `namespace`, creating it if absent.
    async fn patch_report_status(&self, namespace: &str, name: &str, status: Value) -> Result<()>;

    /// Emits a cluster Event.
    async fn create_event(&self, request: ClusterEventRequest) -> Result<()>;
}
