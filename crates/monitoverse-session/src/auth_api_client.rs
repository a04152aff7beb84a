//! HTTP client for the authentication and TOTP collaborator.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use monitoverse_core::{truncate_for_error, Endpoints};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::session_types::{LoginResponse, RegisterResponse, SessionGrant, TotpEnrollment};

const ERROR_BODY_MAX_CHARS: usize = 320;

/// Failure reported by the auth collaborator or the transport underneath it.
///
/// `Display` yields the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthApiError {
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("{operation}: {reason}")]
    Transport { operation: String, reason: String },
    #[error("{operation}: unexpected response ({reason})")]
    Decode { operation: String, reason: String },
}

/// Operations the session store needs from the auth collaborator.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthApiError>;

    async fn login_with_totp(
        &self,
        email: &str,
        password: &str,
        code: &str,
    ) -> Result<SessionGrant, AuthApiError>;

    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse, AuthApiError>;

    async fn generate_totp(&self, email: &str) -> Result<TotpEnrollment, AuthApiError>;

    /// Returns whether `code` is currently valid for `email`.
    async fn verify_totp(&self, email: &str, code: &str) -> Result<bool, AuthApiError>;

    async fn enable_totp(&self, email: &str) -> Result<(), AuthApiError>;
}

#[derive(Clone)]
pub struct AuthApiClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl AuthApiClient {
    pub fn new(endpoints: Endpoints, request_timeout_ms: u64) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("monitoverse-client"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create auth api client")?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn url(
        &self,
        path: &str,
        query: &[(&str, &str)],
        fallback: &str,
    ) -> Result<reqwest::Url, AuthApiError> {
        self.endpoints
            .http_url(path, query)
            .map_err(|error| AuthApiError::Transport {
                operation: fallback.to_string(),
                reason: error.to_string(),
            })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> Result<(reqwest::StatusCode, String), AuthApiError> {
        let response = request
            .send()
            .await
            .map_err(|error| AuthApiError::Transport {
                operation: fallback.to_string(),
                reason: error.to_string(),
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| AuthApiError::Transport {
                operation: fallback.to_string(),
                reason: error.to_string(),
            })?;
        tracing::debug!(
            operation = fallback,
            status = status.as_u16(),
            body_bytes = body.len(),
            "auth collaborator responded"
        );
        Ok((status, body))
    }

    async fn post_json<T>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        payload: Option<Value>,
        fallback: &str,
    ) -> Result<T, AuthApiError>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path, query, fallback)?;
        let mut request = self.http.post(url);
        if let Some(payload) = payload {
            request = request.json(&payload);
        }
        let (status, body) = self.send(request, fallback).await?;
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body, fallback));
        }
        decode_body(&body, fallback)
    }
}

#[async_trait]
impl AuthBackend for AuthApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthApiError> {
        self.post_json(
            "/auth/login",
            &[],
            Some(json!({ "email": email, "password": password })),
            "Login failed",
        )
        .await
    }

    async fn login_with_totp(
        &self,
        email: &str,
        password: &str,
        code: &str,
    ) -> Result<SessionGrant, AuthApiError> {
        self.post_json(
            "/auth/login/totp",
            &[],
            Some(json!({ "email": email, "password": password, "totp": code })),
            "TOTP login failed",
        )
        .await
    }

    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse, AuthApiError> {
        self.post_json(
            "/auth/register",
            &[],
            Some(json!({ "name": name, "email": email, "password": password })),
            "Registration failed",
        )
        .await
    }

    async fn generate_totp(&self, email: &str) -> Result<TotpEnrollment, AuthApiError> {
        self.post_json(
            "/totp/generate",
            &[],
            Some(json!({ "email": email })),
            "Failed to generate TOTP",
        )
        .await
    }

    async fn verify_totp(&self, email: &str, code: &str) -> Result<bool, AuthApiError> {
        const FALLBACK: &str = "Verification failed";
        let url = self.url("/totp/verify", &[("email", email)], FALLBACK)?;
        let request = self.http.post(url).json(&json!({ "key": code }));
        let (status, body) = self.send(request, FALLBACK).await?;

        // An invalid code is answered with 401 and `{"valid": false}`.
        let parsed = serde_json::from_str::<Value>(&body).ok();
        if let Some(valid) = parsed
            .as_ref()
            .and_then(|value| value.get("valid"))
            .and_then(Value::as_bool)
        {
            return Ok(valid);
        }
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body, FALLBACK));
        }
        Err(AuthApiError::Decode {
            operation: FALLBACK.to_string(),
            reason: "missing 'valid' field".to_string(),
        })
    }

    async fn enable_totp(&self, email: &str) -> Result<(), AuthApiError> {
        const FALLBACK: &str = "Failed to enable TOTP";
        let url = self.url("/totp/enable", &[("email", email)], FALLBACK)?;
        let (status, body) = self.send(self.http.post(url), FALLBACK).await?;
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body, FALLBACK));
        }
        Ok(())
    }
}

fn rejection(status: u16, body: &str, fallback: &str) -> AuthApiError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|message| !message.is_empty())
                .map(|message| truncate_for_error(message, ERROR_BODY_MAX_CHARS))
        })
        .unwrap_or_else(|| fallback.to_string());
    AuthApiError::Rejected { status, message }
}

fn decode_body<T: DeserializeOwned>(body: &str, fallback: &str) -> Result<T, AuthApiError> {
    serde_json::from_str::<T>(body).map_err(|error| AuthApiError::Decode {
        operation: fallback.to_string(),
        reason: error.to_string(),
    })
}
