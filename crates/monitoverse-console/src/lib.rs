//! Remote command console for Monitoverse.
//!
//! Commands are submitted over the terminal socket and tracked through a
//! single in-flight slot until a terminal `result` or `error` frame moves them
//! into history.

mod command_console;
mod console_protocol;
mod console_state;

pub use command_console::CommandConsole;
pub use console_protocol::{
    decode_console_frame, parse_console_frame, ConsoleClientFrame, ConsoleFrameError,
    ConsoleServerFrame, TerminalCommand, TERMINAL_ENDPOINT,
};
pub use console_state::{
    ConsoleConnectionState, ConsoleState, ConsoleUpdate, CONNECTION_LOST_ALERT,
    CONNECT_FAILED_ALERT,
};
