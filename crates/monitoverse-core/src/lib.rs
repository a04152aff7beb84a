//! Foundational utilities shared across Monitoverse crates.
//!
//! Provides atomic file writes for durable client state, clock helpers used for
//! command identifiers and timestamps, and the collaborator endpoint
//! configuration used to build HTTP and WebSocket URLs.

pub mod atomic_io;
pub mod endpoints;
pub mod time_utils;

pub use atomic_io::{write_private_text_atomic, write_text_atomic};
pub use endpoints::{truncate_for_error, Endpoints, DEFAULT_API_BASE, DEFAULT_WS_BASE};
pub use time_utils::{
    current_unix_timestamp, current_unix_timestamp_ms, next_strictly_increasing_ms,
};
