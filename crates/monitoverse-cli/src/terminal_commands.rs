use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Result};
use monitoverse_console::{CommandConsole, ConsoleConnectionState, ConsoleState};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::bootstrap_helpers::ShellContext;
use crate::cli_args::TerminalArgs;
use crate::dashboard_render::{
    console_state_label, render_command_header, render_command_tail, render_finished_command,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HELP_TEXT: &str = "type a command to run it; ':sudo' toggles sudo, ':clear' clears history, ':quit' exits";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleInput<'a> {
    Quit,
    ToggleSudo,
    ClearHistory,
    Blank,
    Command(&'a str),
}

fn classify_input(line: &str) -> ConsoleInput<'_> {
    match line.trim() {
        ":quit" | ":q" | ":exit" => ConsoleInput::Quit,
        ":sudo" => ConsoleInput::ToggleSudo,
        ":clear" => ConsoleInput::ClearHistory,
        "" => ConsoleInput::Blank,
        command => ConsoleInput::Command(command),
    }
}

/// History entries already written to the terminal.
#[derive(Debug, Default)]
struct HistoryCursor {
    shown: usize,
}

impl HistoryCursor {
    fn print_new<W: Write>(&mut self, state: &ConsoleState, out: &mut W) -> Result<()> {
        if state.history.len() < self.shown {
            self.shown = 0;
        }
        for command in &state.history[self.shown..] {
            writeln!(out, "{}", render_finished_command(command))?;
        }
        self.shown = state.history.len();
        Ok(())
    }
}

fn prompt<W: Write>(out: &mut W, use_sudo: bool) -> Result<()> {
    let marker = if use_sudo { "sudo " } else { "" };
    write!(out, "{marker}monitoverse$ ")?;
    out.flush()?;
    Ok(())
}

fn print_alert<W: Write>(console: &CommandConsole, state: &ConsoleState, out: &mut W) -> Result<()> {
    if let Some(alert) = state.alert.as_deref() {
        writeln!(out, "alert: {alert}")?;
        console.dismiss_alert();
    }
    Ok(())
}

pub(crate) async fn run_terminal<R, W>(
    context: &ShellContext,
    args: &TerminalArgs,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let session = context.require_session()?;
    let console = CommandConsole::connect(&context.endpoints, Some(&session.token))?;
    let opened = console
        .wait_until(CONNECT_TIMEOUT, |state| {
            state.connection != ConsoleConnectionState::Connecting
        })
        .await;
    let Some(opened) = opened.filter(ConsoleState::is_open) else {
        let state = console.close().await;
        bail!(state
            .alert
            .unwrap_or_else(|| "Failed to connect to terminal service.".to_string()));
    };
    writeln!(out, "{} ({HELP_TEXT})", console_state_label(&opened.connection))?;

    let outcome = drive_console(&console, args.sudo, input, out).await;
    let final_state = console.close().await;
    tracing::debug!(history = final_state.history.len(), "terminal session ended");
    outcome
}

async fn drive_console<R, W>(
    console: &CommandConsole,
    mut use_sudo: bool,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut updates = console.watch();
    let mut cursor = HistoryCursor::default();
    cursor.print_new(&console.state(), out)?;
    prompt(out, use_sudo)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            changed = updates.changed() => {
                let state = updates.borrow_and_update().clone();
                if changed.is_err() || state.connection.is_terminal() {
                    writeln!(out)?;
                    print_alert(console, &state, out)?;
                    return Ok(());
                }
                let before = cursor.shown;
                cursor.print_new(&state, out)?;
                if cursor.shown != before {
                    prompt(out, use_sudo)?;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                match classify_input(&line) {
                    ConsoleInput::Quit => return Ok(()),
                    ConsoleInput::ToggleSudo => {
                        use_sudo = !use_sudo;
                        writeln!(out, "sudo {}", if use_sudo { "on" } else { "off" })?;
                    }
                    ConsoleInput::ClearHistory => {
                        console.clear_history();
                        cursor.shown = 0;
                        writeln!(out, "history cleared")?;
                    }
                    ConsoleInput::Blank => {}
                    ConsoleInput::Command(command) => {
                        if !console.execute(command, use_sudo) {
                            writeln!(out, "not connected; command ignored")?;
                        } else if !await_command(console, &mut cursor, out).await? {
                            let state = console.state();
                            print_alert(console, &state, out)?;
                            return Ok(());
                        }
                    }
                }
                updates.borrow_and_update();
                prompt(out, use_sudo)?;
            }
        }
    }
}

/// Streams partial output of the submitted command until it finishes.
///
/// Returns `false` when the connection ended first.
async fn await_command<W: Write>(
    console: &CommandConsole,
    cursor: &mut HistoryCursor,
    out: &mut W,
) -> Result<bool> {
    let baseline = cursor.shown;
    let mut updates = console.watch();
    let mut header_printed = false;
    let mut streamed = 0usize;
    loop {
        let state = updates.borrow_and_update().clone();
        if let Some(in_flight) = state.in_flight.as_ref() {
            if !header_printed {
                writeln!(out, "{}", render_command_header(in_flight))?;
                header_printed = true;
            }
            if let Some(fresh) = in_flight.output.get(streamed..) {
                write!(out, "{fresh}")?;
                out.flush()?;
                streamed = in_flight.output.len();
            }
        } else if state.history.len() > baseline {
            for (offset, command) in state.history[baseline..].iter().enumerate() {
                let last = baseline + offset + 1 == state.history.len();
                if last && header_printed {
                    writeln!(out, "{}", render_command_tail(command, streamed))?;
                } else {
                    writeln!(out, "{}", render_finished_command(command))?;
                }
            }
            cursor.shown = state.history.len();
            print_alert(console, &state, out)?;
            return Ok(true);
        }
        if state.connection.is_terminal() {
            return Ok(false);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(false),
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(false);
                }
            }
        }
    }
}
