mod auth_commands;
mod bootstrap_helpers;
mod cli_args;
mod dashboard_render;
mod monitor_commands;
mod terminal_commands;

use anyhow::Result;
use clap::Parser;

use crate::auth_commands::{run_login, run_logout, run_register, run_status, run_totp_setup};
use crate::bootstrap_helpers::{init_tracing, ShellContext};
use crate::cli_args::{Cli, Command};
use crate::monitor_commands::{run_history, run_monitor};
use crate::terminal_commands::run_terminal;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}

async fn run_cli(cli: Cli) -> Result<()> {
    let mut context = ShellContext::from_cli(&cli)?;
    let mut out = std::io::stdout();
    let mut input = tokio::io::BufReader::new(tokio::io::stdin());
    match &cli.command {
        Command::Login(args) => run_login(&mut context.store, args, &mut input, &mut out).await,
        Command::Register(args) => {
            run_register(&mut context.store, args, &mut input, &mut out).await
        }
        Command::TotpSetup(args) => {
            run_totp_setup(&mut context.store, args, &mut input, &mut out).await
        }
        Command::Logout => run_logout(&mut context.store, &mut out),
        Command::Status(args) => run_status(&context.store, args, &mut out),
        Command::Monitor(args) => run_monitor(&context, args, &mut out).await,
        Command::History(args) => run_history(&context, args, &mut out).await,
        Command::Terminal(args) => run_terminal(&context, args, &mut input, &mut out).await,
    }
}
