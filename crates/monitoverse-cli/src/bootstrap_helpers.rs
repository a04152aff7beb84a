use std::sync::Arc;

use anyhow::{Context, Result};
use monitoverse_core::Endpoints;
use monitoverse_session::{AuthApiClient, FileSessionStorage, Session, SessionStore};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;

pub(crate) const NOT_SIGNED_IN: &str = "not signed in; run 'monitoverse login'";

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Collaborator configuration and the rehydrated session shared by every subcommand.
pub(crate) struct ShellContext {
    pub(crate) endpoints: Endpoints,
    pub(crate) request_timeout_ms: u64,
    pub(crate) store: SessionStore,
}

impl ShellContext {
    pub(crate) fn from_cli(cli: &Cli) -> Result<Self> {
        let endpoints = Endpoints::new(&cli.api_base, &cli.ws_base);
        let auth_client = AuthApiClient::new(endpoints.clone(), cli.request_timeout_ms)
            .context("failed to initialize auth client")?;
        let storage = FileSessionStorage::new(cli.session_path());
        tracing::debug!(
            api_base = endpoints.api_base(),
            ws_base = endpoints.ws_base(),
            session_path = %storage.path().display(),
            "shell context ready"
        );
        let store = SessionStore::open(Arc::new(auth_client), Box::new(storage));
        Ok(Self {
            endpoints,
            request_timeout_ms: cli.request_timeout_ms,
            store,
        })
    }

    /// Route guard for views that need an authenticated session.
    pub(crate) fn require_session(&self) -> Result<Session> {
        self.store
            .session()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!(NOT_SIGNED_IN))
    }
}
