//! Streaming client tests grouped by behavior.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as ServerWsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use httpmock::prelude::*;
use monitoverse_core::Endpoints;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

use super::*;

#[derive(Clone)]
struct FakeMetricServer {
    frames: Vec<String>,
    close_after_frames: bool,
    events: mpsc::UnboundedSender<String>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn handle_metric_upgrade(
    State(server): State<FakeMetricServer>,
    Query(query): Query<HashMap<String, String>>,
    websocket: WebSocketUpgrade,
) -> Response {
    server.queries.lock().await.push(query);
    websocket.on_upgrade(move |socket| run_fake_metric_socket(server, socket))
}

async fn run_fake_metric_socket(server: FakeMetricServer, mut socket: WebSocket) {
    for frame in &server.frames {
        if socket
            .send(ServerWsMessage::Text(frame.clone().into()))
            .await
            .is_err()
        {
            return;
        }
    }
    if server.close_after_frames {
        let _ = socket.send(ServerWsMessage::Close(None)).await;
        return;
    }
    while let Some(message) = socket.recv().await {
        match message {
            Ok(ServerWsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    let _ = server.events.send("client_closed".to_string());
}

async fn spawn_fake_metric_server(
    frames: &[&str],
    close_after_frames: bool,
) -> (
    SocketAddr,
    mpsc::UnboundedReceiver<String>,
    Arc<Mutex<Vec<HashMap<String, String>>>>,
) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let queries = Arc::new(Mutex::new(Vec::new()));
    let state = FakeMetricServer {
        frames: frames.iter().map(|frame| frame.to_string()).collect(),
        close_after_frames,
        events: events_tx,
        queries: Arc::clone(&queries),
    };
    let app = Router::new()
        .route("/monitoring/cpu", get(handle_metric_upgrade))
        .route("/monitoring/memory", get(handle_metric_upgrade))
        .route("/monitoring/disk", get(handle_metric_upgrade))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("resolve listener addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, events_rx, queries)
}

fn endpoints_for(addr: SocketAddr) -> Endpoints {
    Endpoints::new(format!("http://{addr}"), format!("ws://{addr}"))
}

async fn wait_for_snapshot<F>(subscription: &mut MetricSubscription, predicate: F) -> MetricSnapshot
where
    F: FnMut(&MetricSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3), subscription.wait_for(predicate))
        .await
        .expect("snapshot should arrive before timeout")
        .expect("stream should publish the expected snapshot")
}

#[test]
fn unit_decode_metric_frame_maps_non_numeric_gauge_to_zero() {
    assert_eq!(
        decode_metric_frame(MetricKind::Cpu, "37.5").expect("decode"),
        MetricValue::Gauge(37.5)
    );
    assert_eq!(
        decode_metric_frame(MetricKind::Memory, "\"busy\"").expect("decode"),
        MetricValue::Gauge(0.0)
    );
    assert_eq!(
        decode_metric_frame(MetricKind::Cpu, "null").expect("decode"),
        MetricValue::Gauge(0.0)
    );
}

#[test]
fn unit_decode_metric_frame_projects_disk_mounts_with_zero_default() {
    let value =
        decode_metric_frame(MetricKind::Disk, r#"{"/": 61.2, "/boot": 12.0}"#).expect("decode");
    assert_eq!(value.mount("/"), Some(61.2));
    assert_eq!(value.mount("/home"), Some(0.0));
    assert_eq!(value.mount("/boot"), None);
    assert_eq!(value.gauge(), None);
}

#[test]
fn regression_decode_metric_frame_rejects_non_json_payloads() {
    let error = decode_metric_frame(MetricKind::Cpu, "not-json").expect_err("must fail");
    assert!(matches!(error, StreamFrameError::NotJson(_)));
}

#[test]
fn unit_metric_kind_maps_endpoint_paths_both_ways() {
    for kind in MetricKind::ALL {
        assert_eq!(MetricKind::from_endpoint_path(kind.endpoint_path()), Some(kind));
    }
    assert_eq!(
        MetricKind::from_endpoint_path("/monitoring/disk/"),
        Some(MetricKind::Disk)
    );
    assert_eq!(MetricKind::from_endpoint_path("/terminal"), None);
}

#[test]
fn functional_metric_stream_keeps_latest_fifty_in_arrival_order() {
    let mut stream = MetricStream::new(MetricKind::Cpu);
    for value in 0..137 {
        stream
            .apply_frame(&value.to_string())
            .expect("numeric frame decodes");
        assert!(stream.samples().len() <= METRIC_WINDOW_CAPACITY);
    }

    let samples = stream.samples().to_vec();
    assert_eq!(samples.len(), METRIC_WINDOW_CAPACITY);
    let indexes = samples
        .iter()
        .map(|sample| sample.sequence_index)
        .collect::<Vec<_>>();
    assert_eq!(indexes, (87..137).collect::<Vec<u64>>());
    assert_eq!(samples[0].value, MetricValue::Gauge(87.0));
    assert_eq!(samples[49].value, MetricValue::Gauge(136.0));
}

#[test]
fn regression_metric_stream_counts_dropped_frames_without_consuming_index() {
    let mut stream = MetricStream::new(MetricKind::Memory);
    stream.apply_frame("10").expect("decode");
    assert!(stream.apply_frame("{oops").is_err());
    assert!(stream.apply_bytes(&[0xff, 0xfe]).is_err());
    let sample = stream.apply_frame("20").expect("decode");

    assert_eq!(sample.sequence_index, 1);
    assert_eq!(stream.dropped_frames(), 2);
    assert_eq!(stream.samples().len(), 2);
}

#[tokio::test]
async fn integration_subscription_sends_token_and_interval_and_accumulates_samples() {
    let (addr, _events, queries) =
        spawn_fake_metric_server(&["12.5", "\"n/a\"", "not-json", "40"], false).await;
    let client = StreamingClient::new(endpoints_for(addr), Some("tok-123".to_string()));
    let mut subscription = client
        .subscribe(MetricKind::Cpu, Some(250))
        .expect("subscribe");

    let snapshot = wait_for_snapshot(&mut subscription, |snapshot| {
        snapshot.samples.len() == 3 && snapshot.dropped_frames == 1
    })
    .await;
    assert_eq!(snapshot.connection, StreamConnectionState::Open);
    let values = snapshot
        .samples
        .iter()
        .map(|sample| (sample.sequence_index, sample.value.gauge()))
        .collect::<Vec<_>>();
    assert_eq!(
        values,
        vec![(0, Some(12.5)), (1, Some(0.0)), (2, Some(40.0))]
    );

    let recorded = queries.lock().await.clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].get("token").map(String::as_str), Some("tok-123"));
    assert_eq!(recorded[0].get("interval_ms").map(String::as_str), Some("250"));

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn integration_disk_subscription_maps_mount_payloads() {
    let (addr, _events, queries) =
        spawn_fake_metric_server(&[r#"{"/": 55.5, "/home": 20.25}"#, r#"{"/home": 21}"#], false)
            .await;
    let client = StreamingClient::new(endpoints_for(addr), None);
    let mut subscription = client.subscribe(MetricKind::Disk, None).expect("subscribe");

    let snapshot = wait_for_snapshot(&mut subscription, |snapshot| snapshot.samples.len() == 2).await;
    assert_eq!(snapshot.samples[0].value.mount("/"), Some(55.5));
    assert_eq!(snapshot.samples[0].value.mount("/home"), Some(20.25));
    assert_eq!(snapshot.samples[1].value.mount("/"), Some(0.0));
    assert_eq!(snapshot.samples[1].value.mount("/home"), Some(21.0));

    let recorded = queries.lock().await.clone();
    assert!(!recorded[0].contains_key("token"));
    assert!(!recorded[0].contains_key("interval_ms"));
    subscription.unsubscribe().await;
}

#[tokio::test]
async fn functional_unsubscribe_sends_close_frame_and_stops_driver() {
    let (addr, mut events, _queries) = spawn_fake_metric_server(&["5"], false).await;
    let client = StreamingClient::new(endpoints_for(addr), Some("tok".to_string()));
    let mut subscription = client
        .subscribe(MetricKind::Memory, None)
        .expect("subscribe");
    wait_for_snapshot(&mut subscription, |snapshot| snapshot.samples.len() == 1).await;

    let final_snapshot = subscription.unsubscribe().await;
    assert_eq!(final_snapshot.connection, StreamConnectionState::Closed);
    assert_eq!(final_snapshot.samples.len(), 1);

    let event = tokio::time::timeout(Duration::from_secs(3), events.recv())
        .await
        .expect("server should observe close before timeout");
    assert_eq!(event.as_deref(), Some("client_closed"));
}

#[tokio::test]
async fn regression_server_close_is_terminal_without_reconnect() {
    let (addr, _events, queries) = spawn_fake_metric_server(&["1", "2"], true).await;
    let client = StreamingClient::new(endpoints_for(addr), Some("tok".to_string()));
    let mut subscription = client.subscribe(MetricKind::Cpu, None).expect("subscribe");

    let snapshot = wait_for_snapshot(&mut subscription, |snapshot| {
        snapshot.connection.is_terminal()
    })
    .await;
    assert_eq!(snapshot.connection, StreamConnectionState::Closed);
    assert_eq!(snapshot.samples.len(), 2);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queries.lock().await.len(), 1);
    assert!(!subscription.changed().await);
}

#[tokio::test]
async fn regression_unreachable_stream_reports_errored_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = StreamingClient::new(endpoints_for(addr), Some("tok".to_string()));
    let mut subscription = client.subscribe(MetricKind::Cpu, None).expect("subscribe");
    let snapshot = wait_for_snapshot(&mut subscription, |snapshot| {
        snapshot.connection.is_terminal()
    })
    .await;
    assert!(matches!(snapshot.connection, StreamConnectionState::Errored(_)));
    assert!(snapshot.samples.is_empty());
}

#[tokio::test]
async fn integration_history_client_decodes_snapshots() {
    let server = MockServer::start();
    let history = server.mock(|when, then| {
        when.method(GET).path("/monitoring/history");
        then.status(200).json_body(serde_json::json!([
            {"id": 1, "timestamp": 1700000000, "cpu": 12.5, "memory": 40.0, "disk_root": 61.0, "disk_home": 20.0},
            {"id": 2, "timestamp": 1700000001, "cpu": 13.0, "memory": 41.0, "disk_root": 61.0, "disk_home": 20.5}
        ]));
    });
    let client = MonitoringHistoryClient::new(Endpoints::new(server.base_url(), "ws://unused"), 2_000)
        .expect("client");

    let snapshots = client.fetch_history().await.expect("fetch history");
    history.assert();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[1].id, 2);
    assert_eq!(snapshots[1].disk_home, 20.5);
}

#[tokio::test]
async fn regression_history_client_treats_null_as_empty_and_reports_status() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/monitoring/history");
        then.status(200).body("null");
    });
    let client = MonitoringHistoryClient::new(Endpoints::new(server.base_url(), "ws://unused"), 2_000)
        .expect("client");
    assert!(client.fetch_history().await.expect("fetch").is_empty());

    let failing = MockServer::start();
    failing.mock(|when, then| {
        when.method(GET).path("/monitoring/history");
        then.status(503).body("maintenance");
    });
    let client = MonitoringHistoryClient::new(Endpoints::new(failing.base_url(), "ws://unused"), 2_000)
        .expect("client");
    let error = client.fetch_history().await.expect_err("must fail");
    assert!(error.to_string().contains("503"));
}
