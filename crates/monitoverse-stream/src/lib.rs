//! Live metric streaming for Monitoverse dashboards.
//!
//! Each subscription owns one socket to a monitoring endpoint and keeps the
//! most recent samples in a fixed-capacity rolling buffer. Dropped connections
//! are terminal; a new subscription is required to resume.

mod metric_sample;
mod metric_subscription;
mod monitoring_history;
mod rolling_buffer;

pub use metric_sample::{
    decode_metric_frame, MetricKind, MetricSample, MetricStream, MetricValue, StreamFrameError,
    DISK_MOUNT_KEYS, METRIC_WINDOW_CAPACITY,
};
pub use metric_subscription::{
    MetricSnapshot, MetricSubscription, StreamConnectionState, StreamingClient,
};
pub use monitoring_history::{MonitoringHistoryClient, MonitoringSnapshot};
pub use rolling_buffer::RollingBuffer;

#[cfg(test)]
mod tests;
