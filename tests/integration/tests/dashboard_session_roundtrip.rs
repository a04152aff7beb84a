use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as ServerWsMessage, WebSocket, WebSocketUpgrade},
        Path, Query,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use httpmock::prelude::*;
use monitoverse_console::{CommandConsole, ConsoleConnectionState};
use monitoverse_core::Endpoints;
use monitoverse_session::{
    AuthApiClient, AuthApiError, AuthBackend, FileSessionStorage, LoginOutcome, LoginResponse,
    RegisterResponse, SessionGrant, SessionStore, SessionUser, TotpEnrollment,
};
use monitoverse_stream::{MetricKind, StreamConnectionState, StreamingClient};
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::{net::TcpListener, sync::Mutex as AsyncMutex};

const VALID_TOKEN: &str = "jwt-integration";
const WAIT: Duration = Duration::from_secs(3);

struct ScriptedAuth {
    grants: AsyncMutex<VecDeque<Result<SessionGrant, AuthApiError>>>,
}

impl ScriptedAuth {
    fn new(grants: Vec<Result<SessionGrant, AuthApiError>>) -> Self {
        Self {
            grants: AsyncMutex::new(VecDeque::from(grants)),
        }
    }
}

fn unscripted(operation: &str) -> AuthApiError {
    AuthApiError::Transport {
        operation: operation.to_string(),
        reason: "not scripted".to_string(),
    }
}

#[async_trait]
impl AuthBackend for ScriptedAuth {
    async fn login(&self, _email: &str, _password: &str) -> Result<LoginResponse, AuthApiError> {
        Ok(LoginResponse {
            totp_required: true,
            user: None,
            token: None,
        })
    }

    async fn login_with_totp(
        &self,
        _email: &str,
        _password: &str,
        _code: &str,
    ) -> Result<SessionGrant, AuthApiError> {
        self.grants
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("TOTP login failed")))
    }

    async fn register(
        &self,
        _name: &str,
        _email: &str,
        _password: &str,
    ) -> Result<RegisterResponse, AuthApiError> {
        Err(unscripted("Registration failed"))
    }

    async fn generate_totp(&self, _email: &str) -> Result<TotpEnrollment, AuthApiError> {
        Err(unscripted("Failed to generate TOTP"))
    }

    async fn verify_totp(&self, _email: &str, _code: &str) -> Result<bool, AuthApiError> {
        Err(unscripted("Verification failed"))
    }

    async fn enable_totp(&self, _email: &str) -> Result<(), AuthApiError> {
        Err(unscripted("Failed to enable TOTP"))
    }
}

fn operator_grant() -> SessionGrant {
    SessionGrant {
        user: SessionUser {
            id: "u-ops".to_string(),
            email: "ops@monitoverse.dev".to_string(),
            display_name: None,
            totp_enabled: true,
        },
        token: VALID_TOKEN.to_string(),
    }
}

async fn handle_metric(
    Path(metric): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    websocket: WebSocketUpgrade,
) -> Response {
    if query.get("token").map(String::as_str) != Some(VALID_TOKEN) {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }
    websocket.on_upgrade(move |socket| push_metric_frames(metric, socket))
}

async fn push_metric_frames(metric: String, mut socket: WebSocket) {
    let frames = match metric.as_str() {
        "disk" => vec![json!({ "/": 70.0, "/home": 35.5 })],
        _ => (1..=60).map(|value| json!(value)).collect(),
    };
    for frame in frames {
        if socket
            .send(ServerWsMessage::Text(frame.to_string().into()))
            .await
            .is_err()
        {
            return;
        }
    }
    while let Some(Ok(message)) = socket.recv().await {
        if matches!(message, ServerWsMessage::Close(_)) {
            break;
        }
    }
}

async fn handle_terminal(
    Query(query): Query<HashMap<String, String>>,
    websocket: WebSocketUpgrade,
) -> Response {
    if query.get("token").map(String::as_str) != Some(VALID_TOKEN) {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }
    websocket.on_upgrade(run_terminal_socket)
}

async fn run_terminal_socket(mut socket: WebSocket) {
    let history = json!({
        "type": "history",
        "history": [{ "id": "1", "command": "uptime", "output": "up 3 days\n", "status": 0, "time": 1700000000 }]
    });
    if socket
        .send(ServerWsMessage::Text(history.to_string().into()))
        .await
        .is_err()
    {
        return;
    }
    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            ServerWsMessage::Text(text) => text,
            ServerWsMessage::Close(_) => break,
            _ => continue,
        };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let mut command = frame["command"].clone();
        command["output"] = json!("4\n");
        for kind in ["partial", "result"] {
            let reply = json!({ "type": kind, "command": command.clone() });
            if socket
                .send(ServerWsMessage::Text(reply.to_string().into()))
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

async fn spawn_collaborator() -> SocketAddr {
    let app = Router::new()
        .route("/monitoring/{metric}", get(handle_metric))
        .route("/terminal", get(handle_terminal));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("resolve listener addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

#[tokio::test]
async fn integration_second_factor_login_feeds_streams_and_console() {
    let addr = spawn_collaborator().await;
    let endpoints = Endpoints::new(format!("http://{addr}"), format!("ws://{addr}"));
    let temp = tempdir().expect("tempdir");
    let session_path = temp.path().join("session.json");

    let backend = Arc::new(ScriptedAuth::new(vec![
        Err(AuthApiError::Rejected {
            status: 401,
            message: "Invalid TOTP code".to_string(),
        }),
        Ok(operator_grant()),
    ]));
    let mut store = SessionStore::open(
        backend.clone(),
        Box::new(FileSessionStorage::new(&session_path)),
    );
    assert_eq!(
        store.login("ops@monitoverse.dev", "pw").await,
        LoginOutcome::SecondFactorRequired
    );
    assert_eq!(store.verify_second_factor("000000").await, LoginOutcome::Failed);
    assert_eq!(store.last_error(), Some("Invalid TOTP code"));
    assert!(store.pending_challenge().is_some());
    assert!(matches!(
        store.verify_second_factor("123456").await,
        LoginOutcome::Authenticated(_)
    ));

    // A second view rehydrates the same session from disk.
    let view = SessionStore::open(backend, Box::new(FileSessionStorage::new(&session_path)));
    let token = view.token().expect("rehydrated token").to_string();
    assert_eq!(token, VALID_TOKEN);

    let streams = StreamingClient::new(endpoints.clone(), Some(token.clone()));
    let mut cpu = streams
        .subscribe(MetricKind::Cpu, Some(100))
        .expect("cpu subscription");
    let mut disk = streams
        .subscribe(MetricKind::Disk, None)
        .expect("disk subscription");
    let cpu_snapshot = tokio::time::timeout(
        WAIT,
        cpu.wait_for(|snapshot| {
            snapshot
                .latest()
                .is_some_and(|sample| sample.sequence_index == 59)
        }),
    )
    .await
    .expect("cpu frames before timeout")
    .expect("cpu stream snapshot");
    assert_eq!(cpu_snapshot.samples.len(), 50);
    assert_eq!(cpu_snapshot.samples[0].sequence_index, 10);
    assert_eq!(cpu_snapshot.samples[0].value.gauge(), Some(11.0));

    let disk_snapshot = tokio::time::timeout(
        WAIT,
        disk.wait_for(|snapshot| !snapshot.samples.is_empty()),
    )
    .await
    .expect("disk frame before timeout")
    .expect("disk stream snapshot");
    assert_eq!(disk_snapshot.samples[0].value.mount("/home"), Some(35.5));

    let console = CommandConsole::connect(&endpoints, Some(&token)).expect("console");
    console
        .wait_until(WAIT, |state| state.is_open() && state.history.len() == 1)
        .await
        .expect("console history");
    assert!(console.execute("echo 4", false));
    let finished = console
        .wait_until(WAIT, |state| {
            state.history.len() == 2 && state.in_flight.is_none()
        })
        .await
        .expect("command result");
    assert_eq!(finished.history[1].output, "4\n");

    let closed = console.close().await;
    assert_eq!(closed.connection, ConsoleConnectionState::Closed);
    assert!(closed.alert.is_none());
    assert_eq!(cpu.unsubscribe().await.connection, StreamConnectionState::Closed);
    disk.unsubscribe().await;

    store.logout();
    let signed_out = SessionStore::open(
        Arc::new(ScriptedAuth::new(Vec::new())),
        Box::new(FileSessionStorage::new(&session_path)),
    );
    assert!(!signed_out.is_authenticated());
}

#[tokio::test]
async fn integration_rejected_token_leaves_streams_and_console_disconnected() {
    let addr = spawn_collaborator().await;
    let endpoints = Endpoints::new(format!("http://{addr}"), format!("ws://{addr}"));

    let mut cpu = StreamingClient::new(endpoints.clone(), Some("stale".to_string()))
        .subscribe(MetricKind::Cpu, None)
        .expect("subscription");
    let snapshot = tokio::time::timeout(WAIT, cpu.wait_for(|snapshot| snapshot.connection.is_terminal()))
        .await
        .expect("terminal state before timeout")
        .expect("snapshot");
    assert!(matches!(snapshot.connection, StreamConnectionState::Errored(_)));

    let console = CommandConsole::connect(&endpoints, Some("stale")).expect("console");
    let state = console
        .wait_until(WAIT, |state| state.connection.is_terminal())
        .await
        .expect("console terminal state");
    assert_eq!(
        state.alert.as_deref(),
        Some("Failed to connect to terminal service.")
    );
    assert!(!console.execute("ls", false));
}

#[tokio::test]
async fn integration_http_auth_client_installs_session_for_streams() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(200).json_body(json!({
            "user": { "id": "u-ops", "email": "ops@monitoverse.dev", "totp": false },
            "message": "Login successful",
            "totp_required": false,
            "token": VALID_TOKEN
        }));
    });
    let addr = spawn_collaborator().await;
    let endpoints = Endpoints::new(server.base_url(), format!("ws://{addr}"));
    let temp = tempdir().expect("tempdir");

    let client = AuthApiClient::new(endpoints.clone(), 2_000).expect("auth client");
    let mut store = SessionStore::open(
        Arc::new(client),
        Box::new(FileSessionStorage::new(temp.path().join("session.json"))),
    );
    let LoginOutcome::Authenticated(session) = store.login("ops@monitoverse.dev", "pw").await
    else {
        panic!("expected a session, got error {:?}", store.last_error());
    };

    let mut memory = StreamingClient::new(endpoints, Some(session.token))
        .subscribe(MetricKind::Memory, None)
        .expect("memory subscription");
    let snapshot = tokio::time::timeout(WAIT, memory.wait_for(|snapshot| snapshot.samples.len() >= 3))
        .await
        .expect("memory frames before timeout")
        .expect("snapshot");
    assert_eq!(snapshot.connection, StreamConnectionState::Open);
    memory.unsubscribe().await;
}
