use monitoverse_core::next_strictly_increasing_ms;
use serde::Serialize;

use crate::console_protocol::{ConsoleServerFrame, TerminalCommand};

pub const CONNECTION_LOST_ALERT: &str = "Connection lost. Restart the terminal session.";
pub const CONNECT_FAILED_ALERT: &str = "Failed to connect to terminal service.";
const COMMAND_FAILED_ALERT: &str = "Command failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConsoleConnectionState {
    Connecting,
    Open,
    Closed,
    Errored(String),
}

impl ConsoleConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored(_))
    }
}

/// What applying one inbound frame did to the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleUpdate {
    HistoryReplaced { entries: usize },
    Progress(TerminalCommand),
    Finished(TerminalCommand),
    Failed(TerminalCommand),
    Ignored,
}

/// Console view model: connection, finished history and the single in-flight slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleState {
    pub connection: ConsoleConnectionState,
    pub history: Vec<TerminalCommand>,
    pub in_flight: Option<TerminalCommand>,
    pub input: String,
    pub alert: Option<String>,
    #[serde(skip)]
    last_id_ms: Option<u64>,
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self {
            connection: ConsoleConnectionState::Connecting,
            history: Vec::new(),
            in_flight: None,
            input: String::new(),
            alert: None,
            last_id_ms: None,
        }
    }
}

impl ConsoleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.connection == ConsoleConnectionState::Open
    }

    pub fn mark_open(&mut self) {
        self.connection = ConsoleConnectionState::Open;
        self.alert = None;
    }

    /// Remote close. Ignored once the connection already ended.
    pub fn mark_closed(&mut self) {
        if self.connection.is_terminal() {
            return;
        }
        self.connection = ConsoleConnectionState::Closed;
        self.alert = Some(CONNECTION_LOST_ALERT.to_string());
    }

    pub fn mark_errored(&mut self, reason: impl Into<String>) {
        if self.connection.is_terminal() {
            return;
        }
        self.connection = ConsoleConnectionState::Errored(reason.into());
        self.alert = Some(CONNECT_FAILED_ALERT.to_string());
    }

    /// Close requested by this side; no alert is raised.
    pub fn mark_local_close(&mut self) {
        if self.connection.is_terminal() {
            return;
        }
        self.connection = ConsoleConnectionState::Closed;
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Builds the command to submit and installs it as in-flight.
    ///
    /// Returns `None`, leaving the state untouched, when the socket is not open
    /// or the text is blank.
    pub fn prepare_execute(
        &mut self,
        text: &str,
        use_sudo: bool,
        now_ms: u64,
        now_unix_seconds: u64,
    ) -> Option<TerminalCommand> {
        let text = text.trim();
        if !self.is_open() || text.is_empty() {
            return None;
        }
        let id_ms = next_strictly_increasing_ms(self.last_id_ms, now_ms);
        self.last_id_ms = Some(id_ms);
        let command = TerminalCommand {
            id: id_ms.to_string(),
            command: text.to_string(),
            time: i64::try_from(now_unix_seconds).unwrap_or(i64::MAX),
            use_sudo,
            ..TerminalCommand::default()
        };
        self.in_flight = Some(command.clone());
        Some(command)
    }

    pub fn apply_frame(&mut self, frame: ConsoleServerFrame) -> ConsoleUpdate {
        match frame {
            ConsoleServerFrame::History {
                history: Some(history),
            } => {
                let entries = history.len();
                self.history = history;
                ConsoleUpdate::HistoryReplaced { entries }
            }
            ConsoleServerFrame::Partial {
                command: Some(command),
            } => self.apply_partial(command),
            ConsoleServerFrame::Result {
                command: Some(command),
            } => {
                self.finish(command.clone());
                ConsoleUpdate::Finished(command)
            }
            ConsoleServerFrame::Error {
                command: Some(command),
            } => {
                let alert = if command.error.trim().is_empty() {
                    COMMAND_FAILED_ALERT.to_string()
                } else {
                    command.error.clone()
                };
                self.finish(command.clone());
                self.alert = Some(alert);
                ConsoleUpdate::Failed(command)
            }
            ConsoleServerFrame::History { history: None }
            | ConsoleServerFrame::Partial { command: None }
            | ConsoleServerFrame::Result { command: None }
            | ConsoleServerFrame::Error { command: None }
            | ConsoleServerFrame::Unknown => ConsoleUpdate::Ignored,
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    fn apply_partial(&mut self, command: TerminalCommand) -> ConsoleUpdate {
        match self.in_flight.as_mut() {
            Some(current) if current.id == command.id => {
                current.output = command.output;
                if !command.error.is_empty() {
                    current.error = command.error;
                }
                ConsoleUpdate::Progress(current.clone())
            }
            Some(current) => {
                tracing::debug!(
                    in_flight = %current.id,
                    partial = %command.id,
                    "ignoring partial output for another command"
                );
                ConsoleUpdate::Ignored
            }
            None => {
                self.in_flight = Some(command.clone());
                ConsoleUpdate::Progress(command)
            }
        }
    }

    fn finish(&mut self, command: TerminalCommand) {
        self.in_flight = None;
        self.history.push(command);
        self.input.clear();
    }
}
