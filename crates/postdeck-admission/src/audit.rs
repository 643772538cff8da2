//! Admission audit events and the in-memory sink boundary
//!
//! Every rejection and every evaluation scoring at or above the high-risk
//! bar becomes an [`AdmissionEvent`]. Events are logged structurally via
//! `tracing` and retained in a bounded drop-oldest buffer that the host
//! application drains into its own audit pipeline. The serialized event
//! shape is the external contract.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Risk score at or above which an admitted request still emits an event.
pub const HIGH_RISK_THRESHOLD: u8 = 80;

/// What triggered the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionEventKind {
    /// Request rejected by a window limit.
    RateLimited,
    /// Request rejected by an active ban.
    Banned,
    /// Request admitted but scored at or above the high-risk bar.
    HighRisk,
}

/// Event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Routine observation.
    Info,
    /// Abuse signal worth correlating.
    Warning,
    /// Active punishment in effect.
    Critical,
}

/// One admission observability event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionEvent {
    /// Trigger.
    pub kind: AdmissionEventKind,
    /// Severity.
    pub severity: Severity,
    /// Client identifier the decision applied to.
    pub identifier: String,
    /// Endpoint path evaluated.
    pub endpoint_path: String,
    /// Risk score computed for the request.
    pub risk_score: u8,
    /// Decision reason code, or a risk note for admitted high-risk calls.
    pub reason: String,
    /// When the decision was made, epoch milliseconds.
    pub timestamp_ms: u64,
}

/// Bounded drop-oldest buffer of admission events.
pub struct AuditLog {
    events: Mutex<VecDeque<AdmissionEvent>>,
    capacity: usize,
}

impl AuditLog {
    /// Creates a log retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Appends an event, logging it via `tracing` and dropping the oldest
    /// retained event when at capacity.
    pub fn push(&self, event: AdmissionEvent) {
        match event.severity {
            Severity::Critical => tracing::error!(
                target: "admission",
                kind = ?event.kind,
                identifier = %event.identifier,
                endpoint = %event.endpoint_path,
                risk = event.risk_score,
                reason = %event.reason,
                "admission event"
            ),
            Severity::Warning => tracing::warn!(
                target: "admission",
                kind = ?event.kind,
                identifier = %event.identifier,
                endpoint = %event.endpoint_path,
                risk = event.risk_score,
                reason = %event.reason,
                "admission event"
            ),
            Severity::Info => tracing::info!(
                target: "admission",
                kind = ?event.kind,
                identifier = %event.identifier,
                endpoint = %event.endpoint_path,
                risk = event.risk_score,
                reason = %event.reason,
                "admission event"
            ),
        }
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Returns up to the `n` most recent events, newest last.
    pub fn recent(&self, n: usize) -> Vec<AdmissionEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().rev().take(n).rev().cloned().collect()
    }

    /// Removes and returns all retained events, oldest first.
    pub fn drain(&self) -> Vec<AdmissionEvent> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.drain(..).collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True when no events are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, ts: u64) -> AdmissionEvent {
        AdmissionEvent {
            kind: AdmissionEventKind::RateLimited,
            severity: Severity::Warning,
            identifier: id.to_string(),
            endpoint_path: "/api/auth/login".to_string(),
            risk_score: 40,
            reason: "rate_limit_exceeded".to_string(),
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_push_and_recent_preserve_order() {
        let log = AuditLog::new(10);
        log.push(event("a", 1));
        log.push(event("b", 2));
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].identifier, "a");
        assert_eq!(recent[1].identifier, "b");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let log = AuditLog::new(3);
        for i in 0..5 {
            log.push(event(&format!("id{i}"), i));
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].identifier, "id2");
        assert_eq!(recent[2].identifier, "id4");
    }

    #[test]
    fn test_drain_empties_the_log() {
        let log = AuditLog::new(10);
        log.push(event("a", 1));
        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn test_event_serialized_shape_is_stable() {
        let json = serde_json::to_value(event("1.2.3.4", 99)).unwrap();
        assert_eq!(json["kind"], "rate_limited");
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["identifier"], "1.2.3.4");
        assert_eq!(json["endpoint_path"], "/api/auth/login");
        assert_eq!(json["risk_score"], 40);
        assert_eq!(json["reason"], "rate_limit_exceeded");
        assert_eq!(json["timestamp_ms"], 99);
    }
}
