use std::io::Write;

use anyhow::{anyhow, bail, Context, Result};
use monitoverse_session::{EnrollmentOutcome, LoginOutcome, RegisterOutcome, SessionStore};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::cli_args::{LoginArgs, RegisterArgs, StatusArgs, TotpSetupArgs};

const MAX_CODE_ATTEMPTS: usize = 3;

fn store_error(store: &SessionStore, fallback: &str) -> anyhow::Error {
    anyhow!(store.last_error().unwrap_or(fallback).to_string())
}

/// Prints `label` and reads one trimmed line. `None` on end of input.
async fn prompt_line<R, W>(input: &mut R, out: &mut W, label: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{label}")?;
    out.flush()?;
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .await
        .context("failed to read stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

pub(crate) async fn run_login<R, W>(
    store: &mut SessionStore,
    args: &LoginArgs,
    input: &mut R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let password = match args.password.clone() {
        Some(password) => password,
        None => prompt_line(input, out, "Password: ").await?
            .filter(|password| !password.is_empty())
            .ok_or_else(|| anyhow!("password is required"))?,
    };

    match store.login(&args.email, &password).await {
        LoginOutcome::Authenticated(session) => {
            writeln!(out, "signed in as {}", session.user.email)?;
            return Ok(());
        }
        LoginOutcome::Failed => return Err(store_error(store, "Login failed")),
        LoginOutcome::SecondFactorRequired => {}
    }

    if let Some(code) = args.totp.as_deref() {
        return match store.verify_second_factor(code).await {
            LoginOutcome::Authenticated(session) => {
                writeln!(out, "signed in as {}", session.user.email)?;
                Ok(())
            }
            _ => Err(store_error(store, "TOTP login failed")),
        };
    }

    writeln!(out, "two-factor authentication required")?;
    for _ in 0..MAX_CODE_ATTEMPTS {
        let Some(code) = prompt_line(input, out, "Verification code: ").await? else {
            break;
        };
        match store.verify_second_factor(&code).await {
            LoginOutcome::Authenticated(session) => {
                writeln!(out, "signed in as {}", session.user.email)?;
                return Ok(());
            }
            _ => {
                let message = store.last_error().unwrap_or("TOTP login failed");
                writeln!(out, "{message}")?;
            }
        }
    }
    bail!("two-factor verification was not completed")
}

pub(crate) async fn run_register<R, W>(
    store: &mut SessionStore,
    args: &RegisterArgs,
    input: &mut R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    match store.register(&args.name, &args.email, &args.password).await {
        RegisterOutcome::Registered => {
            writeln!(out, "account created; sign in with 'monitoverse login'")?;
            Ok(())
        }
        RegisterOutcome::EnrollmentRequired { email } => {
            writeln!(out, "account created for {email}; set up two-factor authentication")?;
            run_enrollment(store, input, out).await?;
            writeln!(out, "sign in with 'monitoverse login'")?;
            Ok(())
        }
        RegisterOutcome::Failed => Err(store_error(store, "Registration failed")),
    }
}

pub(crate) async fn run_totp_setup<R, W>(
    store: &mut SessionStore,
    args: &TotpSetupArgs,
    input: &mut R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    match args.email.as_deref() {
        Some(email) => store.request_enrollment(email),
        None if !store.is_authenticated() => {
            bail!("pass --email or sign in first to choose the account to enroll")
        }
        None => {}
    }
    run_enrollment(store, input, out).await
}

/// Shows the secret, then verifies codes until one is accepted.
async fn run_enrollment<R, W>(store: &mut SessionStore, input: &mut R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let enrollment = store
        .begin_enrollment()
        .await
        .ok_or_else(|| store_error(store, "Failed to generate TOTP"))?;
    writeln!(out, "add this account to your authenticator app:")?;
    writeln!(out, "  secret: {}", enrollment.secret)?;
    writeln!(out, "  uri:    {}", enrollment.qr_code)?;

    for _ in 0..MAX_CODE_ATTEMPTS {
        let Some(code) = prompt_line(input, out, "Verification code: ").await? else {
            break;
        };
        match store.confirm_enrollment(&code).await {
            EnrollmentOutcome::Enabled => {
                writeln!(out, "two-factor authentication enabled")?;
                return Ok(());
            }
            EnrollmentOutcome::InvalidCode => {
                let message = store.last_error().unwrap_or("Invalid verification code");
                writeln!(out, "{message}")?;
            }
            EnrollmentOutcome::Failed => {
                return Err(store_error(store, "Failed to enable TOTP"));
            }
        }
    }
    store.cancel_enrollment();
    bail!("two-factor setup was not completed")
}

pub(crate) fn run_logout<W: Write>(store: &mut SessionStore, out: &mut W) -> Result<()> {
    store.logout();
    writeln!(out, "signed out")?;
    Ok(())
}

pub(crate) fn run_status<W: Write>(store: &SessionStore, args: &StatusArgs, out: &mut W) -> Result<()> {
    if args.json {
        let payload = match store.user() {
            Some(user) => json!({
                "authenticated": true,
                "user": {
                    "id": user.id,
                    "email": user.email,
                    "name": user.display_name,
                    "totp_enabled": user.totp_enabled,
                },
            }),
            None => json!({ "authenticated": false }),
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&payload)?)?;
        return Ok(());
    }

    match store.user() {
        Some(user) => {
            let factor = if user.totp_enabled {
                "enabled"
            } else {
                "disabled"
            };
            writeln!(
                out,
                "signed in as {} (id {}, two-factor {factor})",
                user.email, user.id
            )?;
        }
        None => writeln!(out, "not signed in")?,
    }
    Ok(())
}
