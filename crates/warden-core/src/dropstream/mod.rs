//! Consumes the external drop-feed service's streaming RPC and normalizes
//! each frame into a [`FlowDrop`] for the correlator (§4.J).

mod proto {
    #![allow(clippy::all, clippy::pedantic)]
    tonic::include_proto!("warden.dropstream.v1");
}

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

use crate::config::DropStreamConfig;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::model::{FlowDrop, FlowEndpoint, L4Info, WorkloadRef};

use proto::drop_observer_client::DropObserverClient;
use proto::{DropEvent, Endpoint as ProtoEndpoint, GetDropsRequest};

/// Current state of the drop-stream connection, exposed for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disabled,
    Disconnected,
    Connecting,
    Connected,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disabled,
            _ => Self::Disconnected,
        }
    }
}

impl From<ConnectionState> for u8 {
    fn from(value: ConnectionState) -> Self {
        match value {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Disabled => 3,
        }
    }
}

/// A point-in-time snapshot of the client's lifetime counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropStreamStats {
    pub reconnects: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
}

/// Reconnecting client for the external drop-feed service.
pub struct DropStreamClient {
    config: DropStreamConfig,
    metrics: Arc<Metrics>,
    out: mpsc::Sender<FlowDrop>,
    state: AtomicU8,
    reconnects: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
}

impl DropStreamClient {
    #[must_use]
    pub fn new(config: DropStreamConfig, metrics: Arc<Metrics>, out: mpsc::Sender<FlowDrop>) -> Self {
        let initial_state = if config.endpoint.is_some() { ConnectionState::Disconnected } else { ConnectionState::Disabled };
        Self {
            config,
            metrics,
            out,
            state: AtomicU8::new(initial_state.into()),
            reconnects: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.load(Ordering::Relaxed).into()
    }

    #[must_use]
    pub fn stats(&self) -> DropStreamStats {
        DropStreamStats {
            reconnects: self.reconnects.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.into(), Ordering::Relaxed);
    }

    /// Connects, streams frames until the connection drops or `cancel`
    /// fires, then reconnects with exponential backoff. Returns immediately
    /// if no endpoint is configured.
    pub async fn run(&self, cancel: CancellationToken) {
        let Some(endpoint) = self.config.endpoint.clone() else {
            tracing::info!("drop-stream client disabled: no endpoint configured");
            return;
        };

        let mut backoff = Duration::from_secs(self.config.min_backoff_secs);
        let max_backoff = Duration::from_secs(self.config.max_backoff_secs);
        let mut resume_cursor = String::new();

        loop {
            if cancel.is_cancelled() {
                return;
            }
            self.set_state(ConnectionState::Connecting);
            match self.connect_and_stream(&endpoint, &mut resume_cursor, &cancel).await {
                Ok(()) => {
                    backoff = Duration::from_secs(self.config.min_backoff_secs);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "drop-stream connection failed");
                }
            }
            self.set_state(ConnectionState::Disconnected);
            if cancel.is_cancelled() {
                return;
            }
            self.reconnects.fetch_add(1, Ordering::Relaxed);
            self.metrics.dropstream_reconnects_total.inc();
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    async fn connect_and_stream(&self, endpoint: &str, resume_cursor: &mut String, cancel: &CancellationToken) -> Result<()> {
        let channel = Channel::from_shared(endpoint.to_string())
            .map_err(|e| Error::dropstream(format!("invalid endpoint '{endpoint}': {e}")))?
            .connect()
            .await
            .map_err(|e| Error::dropstream(format!("connect failed: {e}")))?;

        let mut client = DropObserverClient::new(channel);
        let request = GetDropsRequest { resume_cursor: resume_cursor.clone() };
        let mut stream = client
            .get_drops(request)
            .await
            .map_err(|e| Error::dropstream(format!("stream open failed: {e}")))?
            .into_inner();

        self.set_state(ConnectionState::Connected);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                frame = stream.message() => {
                    match frame.map_err(|e| Error::dropstream(format!("stream error: {e}")))? {
                        Some(frame) => {
                            resume_cursor.clone_from(&frame.id);
                            self.frames_received.fetch_add(1, Ordering::Relaxed);
                            let drop = normalize_frame(frame);
                            if self.out.try_send(drop).is_err() {
                                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                                self.metrics.dropstream_frames_dropped_total.inc();
                            }
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

fn normalize_frame(frame: DropEvent) -> FlowDrop {
    let l4 = frame.l4.unwrap_or_default();
    FlowDrop {
        source: normalize_endpoint(frame.source.unwrap_or_default(), frame.source_ip),
        destination: normalize_endpoint(frame.destination.unwrap_or_default(), frame.destination_ip),
        l4: L4Info {
            protocol: l4.protocol,
            source_port: l4.source_port,
            destination_port: l4.destination_port,
            tcp_flags: if l4.tcp_flags.is_empty() { None } else { Some(l4.tcp_flags.join(",")) },
        },
        drop_reason: frame.drop_reason,
        observed_at: chrono::DateTime::from_timestamp_millis(frame.timestamp_unix_millis).unwrap_or_else(chrono::Utc::now),
    }
}

fn normalize_endpoint(endpoint: ProtoEndpoint, ip: String) -> FlowEndpoint {
    let workload_ref = if endpoint.workload_kind.is_empty() || endpoint.workload_name.is_empty() {
        None
    } else {
        Some(WorkloadRef {
            kind: endpoint.workload_kind,
            api_version: String::new(),
            name: endpoint.workload_name,
            namespace: endpoint.namespace.clone(),
            uid: String::new(),
        })
    };
    FlowEndpoint {
        namespace: endpoint.namespace,
        pod_name: endpoint.pod_name,
        labels: endpoint.labels.into_iter().collect(),
        workload_ref,
        security_identity: if endpoint.security_identity.is_empty() { None } else { Some(endpoint.security_identity) },
        ip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_client_reports_disabled_state() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let (tx, _rx) = mpsc::channel(8);
        let client = DropStreamClient::new(DropStreamConfig::default(), metrics, tx);
        assert_eq!(client.state(), ConnectionState::Disabled);
    }

    #[test]
    fn normalize_frame_joins_multiple_tcp_flags() {
        let frame = DropEvent {
            id: "1".to_string(),
            timestamp_unix_millis: 0,
            source: Some(ProtoEndpoint::default()),
            destination: Some(ProtoEndpoint {
                namespace: "checkout".to_string(),
                pod_name: "db-1".to_string(),
                workload_kind: "Deployment".to_string(),
                workload_name: "db".to_string(),
                ..Default::default()
            }),
            source_ip: "10.0.0.1".to_string(),
            destination_ip: "10.0.0.2".to_string(),
            l4: Some(proto::L4Info {
                protocol: "TCP".to_string(),
                source_port: 5000,
                destination_port: 5432,
                tcp_flags: vec!["SYN".to_string(), "ACK".to_string()],
            }),
            drop_reason: "deny-policy".to_string(),
        };
        let drop = normalize_frame(frame);
        assert_eq!(drop.l4.tcp_flags.as_deref(), Some("SYN,ACK"));
        assert!(drop.destination.workload_ref.is_some());
    }
}
