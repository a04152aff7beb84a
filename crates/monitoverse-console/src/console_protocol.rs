//! Wire envelopes exchanged with the terminal endpoint.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message as WsMessage;

pub const TERMINAL_ENDPOINT: &str = "/terminal";

/// One command as seen on the wire, whether submitted, running or finished.
///
/// `status` is the exit status (0 for success) and `time` is unix seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TerminalCommand {
    pub id: String,
    pub command: String,
    pub output: String,
    pub error: String,
    pub status: i32,
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub use_sudo: bool,
}

impl TerminalCommand {
    pub fn succeeded(&self) -> bool {
        self.status == 0 && self.error.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleServerFrame {
    History {
        #[serde(default)]
        history: Option<Vec<TerminalCommand>>,
    },
    Partial {
        #[serde(default)]
        command: Option<TerminalCommand>,
    },
    Result {
        #[serde(default)]
        command: Option<TerminalCommand>,
    },
    Error {
        #[serde(default)]
        command: Option<TerminalCommand>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleClientFrame {
    Execute { command: TerminalCommand },
}

impl ConsoleClientFrame {
    pub fn to_text(&self) -> Result<String, ConsoleFrameError> {
        serde_json::to_string(self).map_err(|error| ConsoleFrameError::Encode(error.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleFrameError {
    #[error("terminal frame is not valid utf-8")]
    InvalidUtf8,
    #[error("terminal frame is malformed: {0}")]
    Malformed(String),
    #[error("failed to encode terminal frame: {0}")]
    Encode(String),
}

pub fn decode_console_frame(raw: &str) -> Result<ConsoleServerFrame, ConsoleFrameError> {
    serde_json::from_str::<ConsoleServerFrame>(raw)
        .map_err(|error| ConsoleFrameError::Malformed(error.to_string()))
}

/// Decodes a data frame; control frames yield `None`.
pub fn parse_console_frame(
    message: WsMessage,
) -> Result<Option<ConsoleServerFrame>, ConsoleFrameError> {
    match message {
        WsMessage::Text(text) => decode_console_frame(text.as_str()).map(Some),
        WsMessage::Binary(bytes) => {
            let text = std::str::from_utf8(&bytes).map_err(|_| ConsoleFrameError::InvalidUtf8)?;
            decode_console_frame(text).map(Some)
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) => Ok(None),
        WsMessage::Close(_) => Ok(None),
        WsMessage::Frame(_) => Ok(None),
    }
}
