//! Session store for Monitoverse dashboards.
//!
//! Owns the authenticated user and bearer token, the pending second-factor
//! challenge, and TOTP enrollment prompts. State is rehydrated from and
//! persisted to durable key/value storage; collaborator failures are reduced to
//! a single human-readable error string instead of being propagated.

mod auth_api_client;
mod session_storage;
mod session_store;
mod session_types;

pub use auth_api_client::{AuthApiClient, AuthApiError, AuthBackend};
pub use session_storage::{
    FileSessionStorage, MemorySessionStorage, SessionStorage, SESSION_STORAGE_SCHEMA_VERSION,
    SESSION_TOKEN_KEY, SESSION_USER_KEY,
};
pub use session_store::SessionStore;
pub use session_types::{
    EnrollmentOutcome, LoginOutcome, LoginResponse, PendingChallenge, RegisterOutcome,
    RegisterResponse, Session, SessionGrant, SessionUser, TotpEnrollment,
};
