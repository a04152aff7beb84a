use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use monitoverse_core::{DEFAULT_API_BASE, DEFAULT_WS_BASE};

pub(crate) const SESSION_FILE_NAME: &str = "session.json";

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "monitoverse",
    about = "Terminal dashboard for Monitoverse host monitoring",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "MONITOVERSE_API_BASE",
        default_value = DEFAULT_API_BASE,
        global = true,
        help = "Base URL of the HTTP collaborator serving auth, TOTP and monitoring history."
    )]
    pub(crate) api_base: String,

    #[arg(
        long,
        env = "MONITOVERSE_WS_BASE",
        default_value = DEFAULT_WS_BASE,
        global = true,
        help = "Base URL of the websocket collaborator serving metric streams and the terminal."
    )]
    pub(crate) ws_base: String,

    #[arg(
        long,
        env = "MONITOVERSE_STATE_DIR",
        default_value = ".monitoverse",
        global = true,
        help = "Directory holding the persisted session (session.json)."
    )]
    pub(crate) state_dir: PathBuf,

    #[arg(
        long,
        env = "MONITOVERSE_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        global = true,
        help = "Timeout in milliseconds for each HTTP request."
    )]
    pub(crate) request_timeout_ms: u64,

    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    pub(crate) fn session_path(&self) -> PathBuf {
        self.state_dir.join(SESSION_FILE_NAME)
    }
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Sign in, completing a TOTP challenge when the account requires one
    Login(LoginArgs),
    /// Create an account and enroll an authenticator when required
    Register(RegisterArgs),
    /// Enroll an authenticator app for an account
    TotpSetup(TotpSetupArgs),
    /// Discard the persisted session
    Logout,
    /// Show who is signed in
    Status(StatusArgs),
    /// Render live CPU, memory and disk sparklines
    Monitor(MonitorArgs),
    /// Print recorded monitoring snapshots
    History(HistoryArgs),
    /// Open the remote command console
    Terminal(TerminalArgs),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct LoginArgs {
    #[arg(long, help = "Account email address.")]
    pub(crate) email: String,

    #[arg(
        long,
        env = "MONITOVERSE_PASSWORD",
        hide_env_values = true,
        help = "Account password. Prompted on stdin when omitted."
    )]
    pub(crate) password: Option<String>,

    #[arg(
        long,
        help = "Six-digit TOTP code. Prompted on stdin when the account requires one and this is omitted."
    )]
    pub(crate) totp: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct RegisterArgs {
    #[arg(long, help = "Display name for the new account.")]
    pub(crate) name: String,

    #[arg(long, help = "Account email address.")]
    pub(crate) email: String,

    #[arg(
        long,
        env = "MONITOVERSE_PASSWORD",
        hide_env_values = true,
        help = "Account password."
    )]
    pub(crate) password: String,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct TotpSetupArgs {
    #[arg(
        long,
        help = "Account to enroll. Defaults to the signed-in user."
    )]
    pub(crate) email: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct StatusArgs {
    #[arg(long, help = "Print the status as JSON.")]
    pub(crate) json: bool,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct MonitorArgs {
    #[arg(
        long,
        value_parser = parse_positive_u64,
        help = "Sampling interval in milliseconds requested from the streaming collaborator."
    )]
    pub(crate) interval_ms: Option<u64>,

    #[arg(
        long,
        value_parser = parse_positive_usize,
        help = "Stop after rendering this many frames. Runs until interrupted when omitted."
    )]
    pub(crate) frames: Option<usize>,

    #[arg(
        long,
        default_value_t = 1_000,
        value_parser = parse_positive_u64,
        help = "Milliseconds between rendered frames."
    )]
    pub(crate) refresh_ms: u64,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct HistoryArgs {
    #[arg(
        long,
        default_value_t = 20,
        value_parser = parse_positive_usize,
        help = "Number of most recent snapshots to print."
    )]
    pub(crate) limit: usize,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct TerminalArgs {
    #[arg(long, help = "Start with sudo enabled. Toggle with ':sudo'.")]
    pub(crate) sudo: bool,
}
