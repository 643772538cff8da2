//! Admission-control configuration

use serde::{Deserialize, Serialize};

use crate::error::{AdmissionError, Result};
use crate::policy::PolicyOverride;

/// Escalation thresholds and ban durations for repeat violators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Violation count at which the first ban tier applies.
    pub first_threshold: u32,
    /// Ban duration for the first tier, in milliseconds.
    pub first_ban_ms: u64,
    /// Violation count at which the second (long) ban tier applies.
    pub second_threshold: u32,
    /// Ban duration for the second tier, in milliseconds.
    pub second_ban_ms: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            first_threshold: 5,
            first_ban_ms: 3_600_000,
            second_threshold: 10,
            second_ban_ms: 86_400_000,
        }
    }
}

/// Top-level configuration for the admission engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Per-endpoint-class policy overrides applied over the built-in table.
    pub policy_overrides: Vec<PolicyOverride>,
    /// Escalating-ban parameters.
    pub escalation: EscalationConfig,
    /// Cleanup sweeper interval in milliseconds.
    pub sweep_interval_ms: u64,
    /// Maximum retained audit events before the oldest are dropped.
    pub audit_capacity: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            policy_overrides: Vec::new(),
            escalation: EscalationConfig::default(),
            sweep_interval_ms: 60_000,
            audit_capacity: 10_000,
        }
    }
}

impl AdmissionConfig {
    /// Validates the configuration, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        for ov in &self.policy_overrides {
            if ov.max_requests == 0 {
                return Err(AdmissionError::ZeroPolicyLimit(ov.class.clone()));
            }
            if ov.window_ms == 0 {
                return Err(AdmissionError::ZeroPolicyWindow(ov.class.clone()));
            }
        }
        let esc = &self.escalation;
        if esc.first_threshold >= esc.second_threshold {
            return Err(AdmissionError::ThresholdOrder {
                t1: esc.first_threshold,
                t2: esc.second_threshold,
            });
        }
        if esc.first_ban_ms == 0 {
            return Err(AdmissionError::ZeroBanDuration(1));
        }
        if esc.second_ban_ms == 0 {
            return Err(AdmissionError::ZeroBanDuration(2));
        }
        if self.sweep_interval_ms == 0 {
            return Err(AdmissionError::ZeroSweepInterval);
        }
        if self.audit_capacity == 0 {
            return Err(AdmissionError::ZeroAuditCapacity);
        }
        Ok(())
    }
}
