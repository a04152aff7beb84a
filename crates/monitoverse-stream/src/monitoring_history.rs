use std::time::Duration;

use anyhow::{bail, Context, Result};
use monitoverse_core::{truncate_for_error, Endpoints};
use serde::{Deserialize, Serialize};

const HISTORY_PATH: &str = "/monitoring/history";

/// One combined reading recorded by the monitoring collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshot {
    pub id: i64,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub disk_root: f64,
    #[serde(default)]
    pub disk_home: f64,
}

#[derive(Debug, Clone)]
pub struct MonitoringHistoryClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl MonitoringHistoryClient {
    pub fn new(endpoints: Endpoints, request_timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("monitoverse-client")
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create monitoring history client")?;
        Ok(Self { http, endpoints })
    }

    /// Fetches recorded snapshots, oldest first. An empty history may be
    /// reported as `null`.
    pub async fn fetch_history(&self) -> Result<Vec<MonitoringSnapshot>> {
        let url = self.endpoints.http_url(HISTORY_PATH, &[])?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to request monitoring history")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read monitoring history response")?;
        if !status.is_success() {
            bail!(
                "monitoring history request failed with status {}: {}",
                status.as_u16(),
                truncate_for_error(body.trim(), 240)
            );
        }
        let snapshots = serde_json::from_str::<Option<Vec<MonitoringSnapshot>>>(&body)
            .context("failed to decode monitoring history")?
            .unwrap_or_default();
        tracing::debug!(snapshots = snapshots.len(), "fetched monitoring history");
        Ok(snapshots)
    }
}
