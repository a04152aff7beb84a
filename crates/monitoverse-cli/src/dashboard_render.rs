//! Plain-text rendering for the dashboard views.

use chrono::{DateTime, Utc};
use monitoverse_console::{ConsoleConnectionState, TerminalCommand};
use monitoverse_stream::{
    MetricKind, MetricSnapshot, MonitoringSnapshot, StreamConnectionState, DISK_MOUNT_KEYS,
};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const LABEL_WIDTH: usize = 12;

/// Maps percentages onto block characters; values are clamped to 0..=100.
pub(crate) fn render_sparkline(values: &[f64]) -> String {
    values
        .iter()
        .map(|value| {
            let clamped = if value.is_finite() {
                value.clamp(0.0, 100.0)
            } else {
                0.0
            };
            let level = ((clamped / 100.0) * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}

pub(crate) fn format_unix_seconds(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn stream_state_label(state: &StreamConnectionState) -> String {
    match state {
        StreamConnectionState::Connecting => "connecting".to_string(),
        StreamConnectionState::Open => "live".to_string(),
        StreamConnectionState::Closed => "disconnected".to_string(),
        StreamConnectionState::Errored(reason) => format!("error: {reason}"),
    }
}

pub(crate) fn console_state_label(state: &ConsoleConnectionState) -> String {
    match state {
        ConsoleConnectionState::Connecting => "connecting".to_string(),
        ConsoleConnectionState::Open => "connected".to_string(),
        ConsoleConnectionState::Closed => "disconnected".to_string(),
        ConsoleConnectionState::Errored(reason) => format!("error: {reason}"),
    }
}

fn metric_line(label: &str, values: &[f64], state: &StreamConnectionState) -> String {
    let latest = values
        .last()
        .map(|value| format!("{value:>6.1}%"))
        .unwrap_or_else(|| "     -".to_string());
    format!(
        "{label:<LABEL_WIDTH$} {latest}  {}  [{}]",
        render_sparkline(values),
        stream_state_label(state)
    )
}

/// Renders one metric subscription. Disk snapshots produce one line per mount.
pub(crate) fn render_metric_snapshot(snapshot: &MetricSnapshot) -> Vec<String> {
    match snapshot.kind {
        MetricKind::Cpu | MetricKind::Memory => {
            let values = snapshot
                .samples
                .iter()
                .filter_map(|sample| sample.value.gauge())
                .collect::<Vec<_>>();
            vec![metric_line(
                snapshot.kind.as_str(),
                &values,
                &snapshot.connection,
            )]
        }
        MetricKind::Disk => DISK_MOUNT_KEYS
            .iter()
            .map(|mount| {
                let values = snapshot
                    .samples
                    .iter()
                    .filter_map(|sample| sample.value.mount(mount))
                    .collect::<Vec<_>>();
                metric_line(&format!("disk {mount}"), &values, &snapshot.connection)
            })
            .collect(),
    }
}

pub(crate) fn render_monitor_frame(snapshots: &[MetricSnapshot]) -> String {
    let mut lines = Vec::new();
    for snapshot in snapshots {
        lines.extend(render_metric_snapshot(snapshot));
    }
    let dropped = snapshots
        .iter()
        .map(|snapshot| snapshot.dropped_frames)
        .sum::<u64>();
    if dropped > 0 {
        lines.push(format!("dropped frames: {dropped}"));
    }
    lines.join("\n")
}

/// Formats the newest `limit` snapshots, oldest first.
pub(crate) fn render_history_table(snapshots: &[MonitoringSnapshot], limit: usize) -> String {
    if snapshots.is_empty() {
        return "no monitoring history recorded yet".to_string();
    }
    let start = snapshots.len().saturating_sub(limit);
    let mut lines = vec![format!(
        "{:>6}  {:<19}  {:>6}  {:>6}  {:>6}  {:>6}",
        "id", "time (utc)", "cpu", "memory", "/", "/home"
    )];
    for snapshot in &snapshots[start..] {
        lines.push(format!(
            "{:>6}  {:<19}  {:>6.1}  {:>6.1}  {:>6.1}  {:>6.1}",
            snapshot.id,
            format_unix_seconds(snapshot.timestamp),
            snapshot.cpu,
            snapshot.memory,
            snapshot.disk_root,
            snapshot.disk_home
        ));
    }
    lines.join("\n")
}

pub(crate) fn render_command_header(command: &TerminalCommand) -> String {
    let sudo = if command.use_sudo { "sudo " } else { "" };
    format!(
        "[{}] $ {sudo}{}",
        format_unix_seconds(command.time),
        command.command
    )
}

/// Renders whatever of a finished command has not been shown yet: output past
/// `streamed` bytes, the error text and the outcome line.
pub(crate) fn render_command_tail(command: &TerminalCommand, streamed: usize) -> String {
    let mut rendered = String::new();
    let remaining = command.output.get(streamed..).unwrap_or(command.output.as_str());
    if !remaining.is_empty() {
        rendered.push_str(remaining);
    }
    if !command.output.is_empty() && !command.output.ends_with('\n') {
        rendered.push('\n');
    }
    if !command.error.is_empty() {
        rendered.push_str(&format!("error: {}\n", command.error.trim_end()));
    }
    if command.succeeded() {
        rendered.push_str("SUCCESS");
    } else {
        rendered.push_str(&format!("ERROR (status {})", command.status));
    }
    rendered
}

pub(crate) fn render_finished_command(command: &TerminalCommand) -> String {
    format!(
        "{}\n{}",
        render_command_header(command),
        render_command_tail(command, 0)
    )
}
