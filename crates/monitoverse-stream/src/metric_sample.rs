//! Metric sample decoding and the per-subscription rolling window.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::rolling_buffer::RollingBuffer;

pub const METRIC_WINDOW_CAPACITY: usize = 50;
pub const DISK_MOUNT_KEYS: [&str; 2] = ["/", "/home"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Memory, MetricKind::Disk];

    pub fn endpoint_path(self) -> &'static str {
        match self {
            Self::Cpu => "/monitoring/cpu",
            Self::Memory => "/monitoring/memory",
            Self::Disk => "/monitoring/disk",
        }
    }

    pub fn from_endpoint_path(path: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.endpoint_path() == path.trim_end_matches('/'))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Gauge(f64),
    PerMount(BTreeMap<String, f64>),
}

impl MetricValue {
    pub fn gauge(&self) -> Option<f64> {
        match self {
            Self::Gauge(value) => Some(*value),
            Self::PerMount(_) => None,
        }
    }

    pub fn mount(&self, mount: &str) -> Option<f64> {
        match self {
            Self::Gauge(_) => None,
            Self::PerMount(values) => values.get(mount).copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub sequence_index: u64,
    pub value: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamFrameError {
    #[error("metric frame is not valid json: {0}")]
    NotJson(String),
    #[error("metric frame is not valid utf-8")]
    InvalidUtf8,
}

/// Decodes one inbound frame for `kind`.
///
/// Gauges that are valid JSON but not numbers read as 0. Disk frames are
/// projected onto [`DISK_MOUNT_KEYS`], each defaulting to 0.
pub fn decode_metric_frame(kind: MetricKind, raw: &str) -> Result<MetricValue, StreamFrameError> {
    let value = serde_json::from_str::<Value>(raw)
        .map_err(|error| StreamFrameError::NotJson(error.to_string()))?;
    Ok(match kind {
        MetricKind::Cpu | MetricKind::Memory => MetricValue::Gauge(value.as_f64().unwrap_or(0.0)),
        MetricKind::Disk => MetricValue::PerMount(
            DISK_MOUNT_KEYS
                .iter()
                .map(|mount| {
                    let usage = value.get(*mount).and_then(Value::as_f64).unwrap_or(0.0);
                    (mount.to_string(), usage)
                })
                .collect(),
        ),
    })
}

/// Ordered samples of one metric, bounded to the most recent window.
#[derive(Debug, Clone)]
pub struct MetricStream {
    kind: MetricKind,
    buffer: RollingBuffer<MetricSample>,
    dropped_frames: u64,
}

impl MetricStream {
    pub fn new(kind: MetricKind) -> Self {
        Self::with_capacity(kind, METRIC_WINDOW_CAPACITY)
    }

    pub fn with_capacity(kind: MetricKind, capacity: usize) -> Self {
        Self {
            kind,
            buffer: RollingBuffer::new(capacity),
            dropped_frames: 0,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn samples(&self) -> &RollingBuffer<MetricSample> {
        &self.buffer
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Appends a decoded value; its index is the previous sample's index + 1.
    pub fn push_value(&mut self, value: MetricValue) -> MetricSample {
        let sequence_index = self
            .buffer
            .latest()
            .map(|sample| sample.sequence_index.saturating_add(1))
            .unwrap_or(0);
        let sample = MetricSample {
            sequence_index,
            value,
        };
        self.buffer.push(sample.clone());
        sample
    }

    /// Decodes and appends a text frame; undecodable frames are counted and skipped.
    pub fn apply_frame(&mut self, raw: &str) -> Result<MetricSample, StreamFrameError> {
        match decode_metric_frame(self.kind, raw) {
            Ok(value) => Ok(self.push_value(value)),
            Err(error) => {
                self.dropped_frames = self.dropped_frames.saturating_add(1);
                Err(error)
            }
        }
    }

    pub fn apply_bytes(&mut self, raw: &[u8]) -> Result<MetricSample, StreamFrameError> {
        match std::str::from_utf8(raw) {
            Ok(text) => self.apply_frame(text),
            Err(_) => {
                self.dropped_frames = self.dropped_frames.saturating_add(1);
                Err(StreamFrameError::InvalidUtf8)
            }
        }
    }
}
