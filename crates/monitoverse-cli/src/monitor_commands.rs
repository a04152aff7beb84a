use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use monitoverse_stream::{
    MetricKind, MetricSubscription, MonitoringHistoryClient, StreamingClient,
};

use crate::bootstrap_helpers::ShellContext;
use crate::cli_args::{HistoryArgs, MonitorArgs};
use crate::dashboard_render::{render_history_table, render_monitor_frame};

pub(crate) async fn run_monitor<W: Write>(
    context: &ShellContext,
    args: &MonitorArgs,
    out: &mut W,
) -> Result<()> {
    let session = context.require_session()?;
    let client = StreamingClient::new(context.endpoints.clone(), Some(session.token));
    let mut subscriptions = Vec::with_capacity(MetricKind::ALL.len());
    for kind in MetricKind::ALL {
        let subscription = client
            .subscribe(kind, args.interval_ms)
            .with_context(|| format!("failed to subscribe to {} stream", kind.as_str()))?;
        subscriptions.push(subscription);
    }

    let outcome = render_until_done(&subscriptions, args, out).await;
    for subscription in subscriptions {
        subscription.unsubscribe().await;
    }
    outcome
}

async fn render_until_done<W: Write>(
    subscriptions: &[MetricSubscription],
    args: &MonitorArgs,
    out: &mut W,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(args.refresh_ms));
    let mut rendered = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = ticker.tick() => {}
        }
        let snapshots = subscriptions
            .iter()
            .map(MetricSubscription::snapshot)
            .collect::<Vec<_>>();
        writeln!(out, "{}\n", render_monitor_frame(&snapshots))?;
        out.flush()?;
        rendered = rendered.saturating_add(1);

        if args.frames.is_some_and(|limit| rendered >= limit) {
            return Ok(());
        }
        // Streams never reconnect, so there is nothing left to show.
        if snapshots
            .iter()
            .all(|snapshot| snapshot.connection.is_terminal())
        {
            writeln!(out, "all metric streams disconnected")?;
            return Ok(());
        }
    }
}

pub(crate) async fn run_history<W: Write>(
    context: &ShellContext,
    args: &HistoryArgs,
    out: &mut W,
) -> Result<()> {
    context.require_session()?;
    let client =
        MonitoringHistoryClient::new(context.endpoints.clone(), context.request_timeout_ms)?;
    let snapshots = client.fetch_history().await?;
    writeln!(out, "{}", render_history_table(&snapshots, args.limit))?;
    Ok(())
}
