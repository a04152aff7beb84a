//! Collaborator endpoint configuration and URL construction.

use anyhow::{Context, Result};
use reqwest::Url;

pub const DEFAULT_API_BASE: &str = "http://localhost:8081";
pub const DEFAULT_WS_BASE: &str = "ws://localhost:8081";

/// Base URLs of the HTTP and WebSocket collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    api_base: String,
    ws_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, DEFAULT_WS_BASE)
    }
}

impl Endpoints {
    pub fn new(api_base: impl AsRef<str>, ws_base: impl AsRef<str>) -> Self {
        Self {
            api_base: api_base.as_ref().trim().trim_end_matches('/').to_string(),
            ws_base: ws_base.as_ref().trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn ws_base(&self) -> &str {
        &self.ws_base
    }

    /// Builds an HTTP URL for `path` with the given query pairs appended.
    pub fn http_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        build_url(&self.api_base, path, query)
    }

    /// Builds a socket URL for `path`.
    ///
    /// The session token travels as the `token` query parameter and is omitted
    /// when absent.
    pub fn websocket_url(
        &self,
        path: &str,
        token: Option<&str>,
        extra: &[(&str, &str)],
    ) -> Result<Url> {
        let mut query = Vec::with_capacity(extra.len() + 1);
        if let Some(token) = token.map(str::trim).filter(|value| !value.is_empty()) {
            query.push(("token", token));
        }
        query.extend_from_slice(extra);
        build_url(&self.ws_base, path, &query)
    }
}

fn build_url(base: &str, path: &str, query: &[(&str, &str)]) -> Result<Url> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let raw = format!("{base}{path}");
    let mut url = Url::parse(&raw).with_context(|| format!("invalid collaborator url '{raw}'"))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Caps collaborator-provided text embedded in error messages.
pub fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
