//! Endpoint policy resolution: longest-prefix matching and risk scaling
//!
//! Policies are resolved from a static ordered table keyed by path prefix,
//! then tightened as the caller's risk score rises. Resolution is a pure
//! function and total over all inputs: unmatched paths fall back to the
//! default policy.

use serde::{Deserialize, Serialize};

/// Endpoint class label for authentication endpoints (strictest policy).
pub const CLASS_AUTH: &str = "auth";
/// Endpoint class label for AI-generation endpoints.
pub const CLASS_AI: &str = "ai";
/// Endpoint class label for bulk-operation endpoints.
pub const CLASS_BULK: &str = "bulk";
/// Endpoint class label for everything else.
pub const CLASS_DEFAULT: &str = "default";

/// A rate-limit policy for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPolicy {
    /// Maximum weighted requests per window before risk scaling.
    pub max_requests: u32,
    /// Window duration in milliseconds.
    pub window_ms: u64,
}

impl EndpointPolicy {
    /// Creates a policy with the given limit and window.
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// Effective request limit after risk scaling.
    ///
    /// `effective_max = max(1, floor(max_requests * (1 - risk/200)))`, so a
    /// risk score of 100 halves the budget. Never returns zero: risk scaling
    /// alone must not fully lock out a legitimate-looking caller.
    pub fn effective_max(&self, risk_score: u8) -> u32 {
        let risk = u32::from(risk_score.min(100));
        let scaled = (u64::from(self.max_requests) * u64::from(200 - risk) / 200) as u32;
        scaled.max(1)
    }
}

/// One entry in the ordered policy table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Path prefix this entry matches, e.g. `/api/auth`.
    pub prefix: String,
    /// Endpoint class label, the second half of the attempt-store key.
    pub class: String,
    /// Policy applied to matching requests.
    pub policy: EndpointPolicy,
}

/// Per-class policy override supplied through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyOverride {
    /// Class label to override (`auth`, `ai`, `bulk`, or `default`).
    pub class: String,
    /// Replacement limit.
    pub max_requests: u32,
    /// Replacement window in milliseconds.
    pub window_ms: u64,
}

/// Ordered policy table with a default fallback.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    entries: Vec<PolicyEntry>,
    default_policy: EndpointPolicy,
}

impl PolicyTable {
    /// Builds the built-in table: authentication endpoints strictest, AI and
    /// bulk endpoints stricter than default.
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                PolicyEntry {
                    prefix: "/api/auth".to_string(),
                    class: CLASS_AUTH.to_string(),
                    policy: EndpointPolicy::new(5, 60_000),
                },
                PolicyEntry {
                    prefix: "/api/ai".to_string(),
                    class: CLASS_AI.to_string(),
                    policy: EndpointPolicy::new(10, 60_000),
                },
                PolicyEntry {
                    prefix: "/api/bulk".to_string(),
                    class: CLASS_BULK.to_string(),
                    policy: EndpointPolicy::new(10, 60_000),
                },
            ],
            default_policy: EndpointPolicy::new(100, 60_000),
        }
    }

    /// Builds the built-in table with per-class overrides applied.
    ///
    /// Overrides for unknown class labels are ignored; the engine validates
    /// override values before construction.
    pub fn with_overrides(overrides: &[PolicyOverride]) -> Self {
        let mut table = Self::builtin();
        for ov in overrides {
            let policy = EndpointPolicy::new(ov.max_requests, ov.window_ms);
            if ov.class == CLASS_DEFAULT {
                table.default_policy = policy;
                continue;
            }
            for entry in &mut table.entries {
                if entry.class == ov.class {
                    entry.policy = policy;
                }
            }
        }
        table
    }

    /// Resolves an endpoint path to its class label and base policy via
    /// longest-prefix match. Unmatched paths get the default policy.
    pub fn resolve(&self, endpoint_path: &str) -> (&str, EndpointPolicy) {
        let mut best: Option<&PolicyEntry> = None;
        for entry in &self.entries {
            if endpoint_path.starts_with(entry.prefix.as_str()) {
                match best {
                    Some(b) if b.prefix.len() >= entry.prefix.len() => {}
                    _ => best = Some(entry),
                }
            }
        }
        match best {
            Some(entry) => (entry.class.as_str(), entry.policy),
            None => (CLASS_DEFAULT, self.default_policy),
        }
    }

    /// Base window duration for a class label, used by the cleanup sweeper
    /// to decide attempt-record retention per key.
    pub fn base_window_for_class(&self, class: &str) -> u64 {
        self.entries
            .iter()
            .find(|e| e.class == class)
            .map(|e| e.policy.window_ms)
            .unwrap_or(self.default_policy.window_ms)
    }

    /// Longest window across all classes, a safe retention bound.
    pub fn max_window_ms(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.policy.window_ms)
            .chain(std::iter::once(self.default_policy.window_ms))
            .max()
            .unwrap_or(60_000)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}
