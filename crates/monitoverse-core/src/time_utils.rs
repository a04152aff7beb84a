/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns the current Unix timestamp in seconds.
pub fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Returns `now_ms`, or `previous + 1` when the clock has not advanced past `previous`.
///
/// Millisecond stamps double as client-generated identifiers, so two stamps taken
/// within the same millisecond must still differ.
pub fn next_strictly_increasing_ms(previous: Option<u64>, now_ms: u64) -> u64 {
    match previous {
        Some(previous) if now_ms <= previous => previous.saturating_add(1),
        _ => now_ms,
    }
}
