//! Ban ledger with escalating punishments
//!
//! Tracks a per-identifier suspicion counter and temporary bans. The counter
//! is monotonic for the process lifetime: it resets only on restart or via
//! the explicit administrative [`BanLedger::reset_suspicion`]. Automatic
//! decay would let a patient abuser launder history between bursts.
//!
//! Escalation is monotonic as well: crossing the first threshold installs a
//! one-hour ban, crossing the second a 24-hour ban, and once the second tier
//! is reached every further violation re-extends the long ban from "now".
//! A ban's `until` never moves backwards.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::EscalationConfig;

/// Ban reason applied at the first escalation tier.
pub const REASON_REPEATED: &str = "repeated violations";
/// Ban reason applied at the second escalation tier.
pub const REASON_EXCESSIVE: &str = "excessive violations";

/// A temporary ban for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    /// Instant (epoch milliseconds) the ban lapses.
    pub until_ms: u64,
    /// Human-readable reason, surfaced in the decision as `banned:<reason>`.
    pub reason: String,
}

#[derive(Debug, Default)]
struct CallerHistory {
    violations: u32,
    ban: Option<BanRecord>,
}

/// Concurrent ledger of suspicion counters and active bans.
pub struct BanLedger {
    callers: DashMap<String, CallerHistory>,
    escalation: EscalationConfig,
}

impl BanLedger {
    /// Creates an empty ledger with the given escalation parameters.
    pub fn new(escalation: EscalationConfig) -> Self {
        Self {
            callers: DashMap::new(),
            escalation,
        }
    }

    /// Returns the active ban for an identifier, evicting it lazily when
    /// expired. The suspicion counter survives eviction.
    pub fn is_banned(&self, identifier: &str, now_ms: u64) -> Option<BanRecord> {
        let mut entry = self.callers.get_mut(identifier)?;
        match &entry.ban {
            Some(ban) if now_ms < ban.until_ms => Some(ban.clone()),
            Some(_) => {
                entry.ban = None;
                None
            }
            None => None,
        }
    }

    /// Records one window-limit violation and applies escalation. Returns
    /// the updated suspicion count.
    pub fn record_violation(&self, identifier: &str, now_ms: u64) -> u32 {
        let mut entry = self.callers.entry(identifier.to_string()).or_default();
        entry.violations += 1;
        let violations = entry.violations;

        let (duration_ms, reason) = if violations >= self.escalation.second_threshold {
            (self.escalation.second_ban_ms, REASON_EXCESSIVE)
        } else if violations >= self.escalation.first_threshold {
            (self.escalation.first_ban_ms, REASON_REPEATED)
        } else {
            return violations;
        };

        let proposed = now_ms.saturating_add(duration_ms);
        let until_ms = match &entry.ban {
            // never shorten an existing ban
            Some(existing) => existing.until_ms.max(proposed),
            None => proposed,
        };
        entry.ban = Some(BanRecord {
            until_ms,
            reason: reason.to_string(),
        });
        violations
    }

    /// Current suspicion count for an identifier.
    pub fn suspicion_count(&self, identifier: &str) -> u32 {
        self.callers
            .get(identifier)
            .map(|e| e.violations)
            .unwrap_or(0)
    }

    /// Administrative pardon: clears the suspicion counter and any active
    /// ban for the identifier. The only reset path besides process restart.
    pub fn reset_suspicion(&self, identifier: &str) {
        self.callers.remove(identifier);
    }

    /// Evicts expired bans across the ledger. Counters are retained.
    /// Returns the number of bans evicted.
    pub fn evict_expired(&self, now_ms: u64) -> usize {
        let identifiers: Vec<String> = self.callers.iter().map(|e| e.key().clone()).collect();
        let mut evicted = 0;
        for id in identifiers {
            if let Some(mut entry) = self.callers.get_mut(&id) {
                if matches!(&entry.ban, Some(ban) if now_ms >= ban.until_ms) {
                    entry.ban = None;
                    evicted += 1;
                }
            }
        }
        evicted
    }

    /// Number of identifiers with any recorded history.
    pub fn tracked_count(&self) -> usize {
        self.callers.len()
    }
}
