use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use monitoverse_core::Endpoints;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::metric_sample::{MetricKind, MetricSample, MetricStream};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum StreamConnectionState {
    Connecting,
    Open,
    Closed,
    Errored(String),
}

impl StreamConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored(_))
    }
}

/// Point-in-time view of one subscription, oldest sample first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub kind: MetricKind,
    pub samples: Vec<MetricSample>,
    pub connection: StreamConnectionState,
    pub dropped_frames: u64,
}

impl MetricSnapshot {
    fn connecting(kind: MetricKind) -> Self {
        Self {
            kind,
            samples: Vec::new(),
            connection: StreamConnectionState::Connecting,
            dropped_frames: 0,
        }
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.last()
    }
}

/// Opens metric subscriptions against the streaming collaborator.
#[derive(Debug, Clone)]
pub struct StreamingClient {
    endpoints: Endpoints,
    token: Option<String>,
}

impl StreamingClient {
    pub fn new(endpoints: Endpoints, token: Option<String>) -> Self {
        Self { endpoints, token }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Connects to the endpoint for `kind` and starts applying frames in the
    /// background. Must be called inside a tokio runtime.
    pub fn subscribe(
        &self,
        kind: MetricKind,
        sampling_interval_ms: Option<u64>,
    ) -> Result<MetricSubscription> {
        let interval = sampling_interval_ms.map(|value| value.to_string());
        let mut extra = Vec::new();
        if let Some(interval) = interval.as_deref() {
            extra.push(("interval_ms", interval));
        }
        let url = self
            .endpoints
            .websocket_url(kind.endpoint_path(), self.token.as_deref(), &extra)
            .with_context(|| format!("failed to build {} stream url", kind.as_str()))?;

        let (snapshot_tx, snapshot_rx) = watch::channel(MetricSnapshot::connecting(kind));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tracing::debug!(metric = kind.as_str(), path = url.path(), "opening metric stream");
        let task = tokio::spawn(run_metric_stream(
            kind,
            url.to_string(),
            snapshot_tx,
            shutdown_rx,
        ));

        Ok(MetricSubscription {
            kind,
            snapshots: snapshot_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Handle to a live metric stream. Dropping it stops the stream.
#[derive(Debug)]
pub struct MetricSubscription {
    kind: MetricKind,
    snapshots: watch::Receiver<MetricSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MetricSubscription {
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Waits for the next published snapshot. Returns `false` once the driver
    /// has stopped and no further updates will arrive.
    pub async fn changed(&mut self) -> bool {
        self.snapshots.changed().await.is_ok()
    }

    pub fn watch(&self) -> watch::Receiver<MetricSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a snapshot satisfies `predicate`, or the stream ends first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<MetricSnapshot>
    where
        F: FnMut(&MetricSnapshot) -> bool,
    {
        self.snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }

    /// Closes the socket and waits for the driver to finish.
    pub async fn unsubscribe(mut self) -> MetricSnapshot {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(metric = self.kind.as_str(), error = %error, "metric stream task failed");
            }
        }
        self.snapshot()
    }
}

impl Drop for MetricSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_metric_stream(
    kind: MetricKind,
    url: String,
    snapshots: watch::Sender<MetricSnapshot>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connected = tokio::select! {
        _ = &mut shutdown => {
            publish_connection(&snapshots, StreamConnectionState::Closed);
            return;
        }
        connected = connect_async(url.as_str()) => connected,
    };
    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(error) => {
            tracing::warn!(metric = kind.as_str(), error = %error, "metric stream connect failed");
            publish_connection(&snapshots, StreamConnectionState::Errored(error.to_string()));
            return;
        }
    };
    publish_connection(&snapshots, StreamConnectionState::Open);
    tracing::debug!(metric = kind.as_str(), "metric stream open");

    let (mut sink, mut source) = stream.split();
    let mut metric = MetricStream::new(kind);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(error) = sink.send(WsMessage::Close(None)).await {
                    tracing::debug!(metric = kind.as_str(), error = %error, "metric stream close frame not sent");
                }
                publish_connection(&snapshots, StreamConnectionState::Closed);
                return;
            }
            maybe_message = source.next() => {
                let Some(message_result) = maybe_message else {
                    publish_connection(&snapshots, StreamConnectionState::Closed);
                    return;
                };
                let message = match message_result {
                    Ok(message) => message,
                    Err(error) => {
                        tracing::warn!(metric = kind.as_str(), error = %error, "metric stream read failed");
                        publish_connection(&snapshots, StreamConnectionState::Errored(error.to_string()));
                        return;
                    }
                };
                let applied = match message {
                    WsMessage::Text(text) => metric.apply_frame(text.as_str()),
                    WsMessage::Binary(bytes) => metric.apply_bytes(&bytes),
                    WsMessage::Close(_) => {
                        publish_connection(&snapshots, StreamConnectionState::Closed);
                        return;
                    }
                    WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
                };
                if let Err(error) = applied {
                    tracing::warn!(metric = kind.as_str(), error = %error, "dropping metric frame");
                }
                publish_samples(&snapshots, &metric);
            }
        }
    }
}

fn publish_connection(snapshots: &watch::Sender<MetricSnapshot>, state: StreamConnectionState) {
    snapshots.send_modify(|snapshot| snapshot.connection = state);
}

fn publish_samples(snapshots: &watch::Sender<MetricSnapshot>, metric: &MetricStream) {
    snapshots.send_modify(|snapshot| {
        snapshot.samples = metric.samples().to_vec();
        snapshot.dropped_frames = metric.dropped_frames();
    });
}
