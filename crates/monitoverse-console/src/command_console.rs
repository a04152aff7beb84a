use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use monitoverse_core::{current_unix_timestamp, current_unix_timestamp_ms, Endpoints};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::console_protocol::{parse_console_frame, ConsoleClientFrame, TERMINAL_ENDPOINT};
use crate::console_state::{ConsoleState, ConsoleUpdate};

#[derive(Debug)]
enum ConsoleRequest {
    Execute { text: String, use_sudo: bool },
    SetInput(String),
    ClearHistory,
    DismissAlert,
    Close,
}

/// Client side of the remote command console.
///
/// A background task owns the socket and publishes [`ConsoleState`] after
/// every change. Requests are applied in the order they are made.
#[derive(Debug)]
pub struct CommandConsole {
    requests: mpsc::UnboundedSender<ConsoleRequest>,
    state: watch::Receiver<ConsoleState>,
    task: Option<JoinHandle<()>>,
}

impl CommandConsole {
    /// Opens the terminal socket. Must be called inside a tokio runtime.
    pub fn connect(endpoints: &Endpoints, token: Option<&str>) -> Result<Self> {
        let url = endpoints
            .websocket_url(TERMINAL_ENDPOINT, token, &[])
            .context("failed to build terminal url")?;
        let (state_tx, state_rx) = watch::channel(ConsoleState::new());
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        tracing::debug!(path = url.path(), "opening terminal console");
        let task = tokio::spawn(run_console(url.to_string(), state_tx, request_rx));
        Ok(Self {
            requests: request_tx,
            state: state_rx,
            task: Some(task),
        })
    }

    pub fn state(&self) -> ConsoleState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConsoleState> {
        self.state.clone()
    }

    /// Submits `text` for execution.
    ///
    /// Silently ignored unless the socket is open and the text is non-blank.
    /// Returns whether the request was handed to the console task.
    pub fn execute(&self, text: &str, use_sudo: bool) -> bool {
        if !self.state.borrow().is_open() || text.trim().is_empty() {
            return false;
        }
        self.send(ConsoleRequest::Execute {
            text: text.to_string(),
            use_sudo,
        })
    }

    pub fn set_input(&self, input: &str) -> bool {
        self.send(ConsoleRequest::SetInput(input.to_string()))
    }

    pub fn clear_history(&self) -> bool {
        self.send(ConsoleRequest::ClearHistory)
    }

    pub fn dismiss_alert(&self) -> bool {
        self.send(ConsoleRequest::DismissAlert)
    }

    /// Waits up to `timeout` for a state satisfying `predicate`.
    pub async fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> Option<ConsoleState>
    where
        F: FnMut(&ConsoleState) -> bool,
    {
        let mut state = self.state.clone();
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                {
                    let current = state.borrow_and_update();
                    if predicate(&current) {
                        return Some(current.clone());
                    }
                }
                if state.changed().await.is_err() {
                    let current = state.borrow().clone();
                    return predicate(&current).then_some(current);
                }
            }
        })
        .await;
        outcome.ok().flatten()
    }

    /// Waits for the next state change; `false` once the console task is gone.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Closes the socket from this side and waits for the task to stop.
    pub async fn close(mut self) -> ConsoleState {
        self.send(ConsoleRequest::Close);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(error = %error, "terminal console task failed");
            }
        }
        self.state()
    }

    fn send(&self, request: ConsoleRequest) -> bool {
        self.requests.send(request).is_ok()
    }
}

impl Drop for CommandConsole {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_console(
    url: String,
    publisher: watch::Sender<ConsoleState>,
    mut requests: mpsc::UnboundedReceiver<ConsoleRequest>,
) {
    let mut state = ConsoleState::new();

    let connect = connect_async(url.as_str());
    tokio::pin!(connect);
    let connected = loop {
        tokio::select! {
            connected = &mut connect => break connected,
            request = requests.recv() => {
                match request {
                    None | Some(ConsoleRequest::Close) => {
                        state.mark_local_close();
                        publisher.send_replace(state);
                        return;
                    }
                    // Nothing else is meaningful before the socket opens.
                    Some(other) => {
                        tracing::debug!(request = ?other, "dropping console request before connect");
                        continue;
                    }
                }
            }
        }
    };
    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(error) => {
            tracing::warn!(error = %error, "terminal connect failed");
            state.mark_errored(error.to_string());
            publisher.send_replace(state);
            return;
        }
    };
    state.mark_open();
    publisher.send_replace(state.clone());
    tracing::debug!("terminal console open");

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            request = requests.recv() => {
                let request = request.unwrap_or(ConsoleRequest::Close);
                match request {
                    ConsoleRequest::Close => {
                        if let Err(error) = sink.send(WsMessage::Close(None)).await {
                            tracing::debug!(error = %error, "terminal close frame not sent");
                        }
                        state.mark_local_close();
                        publisher.send_replace(state);
                        return;
                    }
                    ConsoleRequest::Execute { text, use_sudo } => {
                        let Some(command) = state.prepare_execute(
                            &text,
                            use_sudo,
                            current_unix_timestamp_ms(),
                            current_unix_timestamp(),
                        ) else {
                            continue;
                        };
                        let payload = match (ConsoleClientFrame::Execute { command: command.clone() }).to_text() {
                            Ok(payload) => payload,
                            Err(error) => {
                                tracing::warn!(error = %error, "failed to encode execute frame");
                                continue;
                            }
                        };
                        tracing::info!(id = %command.id, use_sudo, "submitting terminal command");
                        if let Err(error) = sink.send(WsMessage::Text(payload.into())).await {
                            tracing::warn!(error = %error, "terminal send failed");
                            state.mark_errored(error.to_string());
                            publisher.send_replace(state);
                            return;
                        }
                    }
                    ConsoleRequest::SetInput(input) => state.set_input(input),
                    ConsoleRequest::ClearHistory => state.clear_history(),
                    ConsoleRequest::DismissAlert => state.dismiss_alert(),
                }
                publisher.send_replace(state.clone());
            }
            message = source.next() => {
                let message = match message {
                    None => {
                        state.mark_closed();
                        publisher.send_replace(state);
                        return;
                    }
                    Some(Err(error)) => {
                        tracing::warn!(error = %error, "terminal read failed");
                        state.mark_errored(error.to_string());
                        publisher.send_replace(state);
                        return;
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        state.mark_closed();
                        publisher.send_replace(state);
                        return;
                    }
                    Some(Ok(message)) => message,
                };
                let frame = match parse_console_frame(message) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(error) => {
                        tracing::warn!(error = %error, "ignoring malformed terminal frame");
                        continue;
                    }
                };
                match state.apply_frame(frame) {
                    ConsoleUpdate::Ignored => continue,
                    ConsoleUpdate::Failed(command) => {
                        tracing::info!(id = %command.id, status = command.status, "terminal command failed");
                    }
                    ConsoleUpdate::Finished(command) => {
                        tracing::debug!(id = %command.id, status = command.status, "terminal command finished");
                    }
                    ConsoleUpdate::HistoryReplaced { entries } => {
                        tracing::debug!(entries, "terminal history received");
                    }
                    ConsoleUpdate::Progress(_) => {}
                }
                publisher.send_replace(state.clone());
            }
        }
    }
}
