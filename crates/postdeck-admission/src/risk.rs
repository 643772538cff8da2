//! Heuristic request risk scoring
//!
//! Produces a 0-100 score from network origin, user-agent shape, recent
//! request density, and violation history. Deliberately a pure function:
//! no state is read or written here, which keeps scoring deterministic and
//! trivially testable. Higher scores shrink the caller's effective window
//! budget via [`EndpointPolicy::effective_max`](crate::policy::EndpointPolicy::effective_max).

use crate::identity::is_private_origin;

/// Window over which the burst heuristic counts cross-endpoint attempts.
pub const BURST_WINDOW_MS: u64 = 60_000;
/// Attempts within [`BURST_WINDOW_MS`] above which the burst penalty applies.
pub const BURST_ATTEMPT_THRESHOLD: usize = 10;

/// Added for requests from public or unclassified network origins.
const PUBLIC_ORIGIN_RISK: u32 = 10;
/// Added when the user-agent looks like automation tooling.
const AUTOMATION_PENALTY: u32 = 30;
/// Added when the caller exceeded the burst threshold in the last minute.
const BURST_PENALTY: u32 = 20;
/// Per-violation history penalty, capped at [`HISTORY_CAP`].
const HISTORY_STEP: u32 = 5;
const HISTORY_CAP: u32 = 50;

/// Substrings (matched case-insensitively) that mark generic HTTP tooling,
/// bots, scripts, and crawlers.
const AUTOMATION_SIGNATURES: [&str; 14] = [
    "curl",
    "wget",
    "python",
    "java/",
    "go-http",
    "bot",
    "crawl",
    "spider",
    "scrapy",
    "httpclient",
    "libwww",
    "okhttp",
    "headless",
    "phantom",
];

/// Inputs to one risk evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RiskInput<'a> {
    /// Client identifier (address part decides the origin heuristic).
    pub identifier: &'a str,
    /// Raw user-agent header value; empty when absent.
    pub user_agent: &'a str,
    /// Attempts by this identifier across all endpoints in the last minute.
    pub recent_attempts_last_minute: usize,
    /// Monotonic violation count from the ban ledger.
    pub suspicion_count: u32,
}

/// Computes the composite risk score, clamped to [0, 100].
pub fn score(input: &RiskInput<'_>) -> u8 {
    let mut total = 0u32;
    if !is_private_origin(input.identifier) {
        total += PUBLIC_ORIGIN_RISK;
    }
    if is_automation_agent(input.user_agent) {
        total += AUTOMATION_PENALTY;
    }
    if input.recent_attempts_last_minute > BURST_ATTEMPT_THRESHOLD {
        total += BURST_PENALTY;
    }
    total += (input.suspicion_count.saturating_mul(HISTORY_STEP)).min(HISTORY_CAP);
    total.min(100) as u8
}

/// Whether a user-agent string matches known automation signatures.
/// An empty user-agent counts as automation.
pub fn is_automation_agent(user_agent: &str) -> bool {
    if user_agent.trim().is_empty() {
        return true;
    }
    let lowered = user_agent.to_ascii_lowercase();
    AUTOMATION_SIGNATURES.iter().any(|sig| lowered.contains(sig))
}
