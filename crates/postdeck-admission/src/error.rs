//! Error types for the admission-control subsystem
//!
//! Admission decisions are never errors: a rejection is an ordinary
//! [`Decision`](crate::engine::Decision) with `allowed = false`. Errors only
//! arise from invalid configuration at construction time.

use thiserror::Error;

/// Errors produced while validating admission-control configuration.
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// A policy entry has a zero request limit.
    #[error("policy for class '{0}' has max_requests = 0")]
    ZeroPolicyLimit(String),
    /// A policy entry has a zero-length window.
    #[error("policy for class '{0}' has an empty window")]
    ZeroPolicyWindow(String),
    /// Escalation thresholds are not strictly increasing.
    #[error("escalation thresholds must satisfy t1 < t2 (got t1={t1}, t2={t2})")]
    ThresholdOrder {
        /// First escalation threshold.
        t1: u32,
        /// Second escalation threshold.
        t2: u32,
    },
    /// An escalation ban duration is zero.
    #[error("escalation ban duration for tier {0} is zero")]
    ZeroBanDuration(u8),
    /// The cleanup sweep interval is zero.
    #[error("sweep interval must be non-zero")]
    ZeroSweepInterval,
    /// The audit log capacity is zero.
    #[error("audit log capacity must be non-zero")]
    ZeroAuditCapacity,
}

/// Result alias for admission configuration operations.
pub type Result<T> = std::result::Result<T, AdmissionError>;
