//! Conventional rate-limit response headers
//!
//! The HTTP layer forwards these verbatim on 429/403 responses. Header names
//! follow the de facto `X-RateLimit-*` convention plus standard `Retry-After`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Window limit the caller was measured against.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Weighted budget still available in the current window.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// ISO-8601 instant at which the window (or ban) resets.
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
/// Standard retry delay in whole seconds, rounded up.
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Headers for a rejected request: full limit set plus retry guidance.
pub fn rejection_headers(
    limit: u32,
    reset_at_ms: u64,
    retry_after_ms: u64,
) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(HEADER_LIMIT.to_string(), limit.to_string());
    headers.insert(HEADER_REMAINING.to_string(), "0".to_string());
    headers.insert(HEADER_RESET.to_string(), iso8601(reset_at_ms));
    headers.insert(
        HEADER_RETRY_AFTER.to_string(),
        ceil_seconds(retry_after_ms).to_string(),
    );
    headers
}

/// Headers for an admitted request: limit/remaining pair for transparency.
pub fn acceptance_headers(limit: u32, remaining: u32) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(HEADER_LIMIT.to_string(), limit.to_string());
    headers.insert(HEADER_REMAINING.to_string(), remaining.to_string());
    headers
}

/// Formats an epoch-milliseconds instant as RFC 3339 / ISO-8601 UTC.
fn iso8601(epoch_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap_or_default())
        .to_rfc3339()
}

/// Milliseconds to whole seconds, rounding up so callers never retry early.
fn ceil_seconds(ms: u64) -> u64 {
    ms.div_ceil(1_000)
}
