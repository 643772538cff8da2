//! Admission engine: the single public decision API
//!
//! Orchestrates the ban ledger, risk scorer, policy resolver, and attempt
//! store into one synchronous `check_request` call. The engine is pure
//! in-memory bookkeeping with no I/O on the hot path; the only lock traffic
//! is the per-key critical section inside the attempt store. State objects
//! are constructed explicitly and shared by `Arc`, never module globals, so
//! tests build isolated instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::attempt::{AttemptKey, AttemptStore};
use crate::audit::{AdmissionEvent, AdmissionEventKind, AuditLog, Severity, HIGH_RISK_THRESHOLD};
use crate::ban::BanLedger;
use crate::config::AdmissionConfig;
use crate::error::Result;
use crate::headers::{acceptance_headers, rejection_headers};
use crate::identity::FALLBACK_IDENTIFIER;
use crate::policy::PolicyTable;
use crate::risk::{self, RiskInput, BURST_WINDOW_MS};

/// Reason code for window-limit rejections.
pub const REASON_RATE_LIMITED: &str = "rate_limit_exceeded";

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Shape of the request being evaluated, populated by the HTTP-layer
/// adapter before calling the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMeta {
    /// HTTP method, e.g. `GET` or `POST`.
    pub method: String,
    /// Raw user-agent header value; empty when absent.
    pub user_agent: String,
    /// Whether the endpoint performs AI generation.
    pub is_ai_endpoint: bool,
    /// Whether the endpoint publishes to an external platform.
    pub is_publish_endpoint: bool,
}

impl RequestMeta {
    /// Creates metadata for a plain endpoint.
    pub fn new(method: &str, user_agent: &str) -> Self {
        Self {
            method: method.to_string(),
            user_agent: user_agent.to_string(),
            is_ai_endpoint: false,
            is_publish_endpoint: false,
        }
    }
}

/// Weighted cost of a request: base 1, +1 mutating method, +3 AI
/// generation, +5 external publish. Lets one expensive call consume a
/// disproportionate share of the window without a per-operation policy table.
pub fn request_weight(meta: &RequestMeta) -> u32 {
    let mut weight = 1;
    if matches!(
        meta.method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH" | "DELETE"
    ) {
        weight += 1;
    }
    if meta.is_ai_endpoint {
        weight += 3;
    }
    if meta.is_publish_endpoint {
        weight += 5;
    }
    weight
}

/// The outcome of one admission check.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Rejection reason code: `banned:<reason>` or `rate_limit_exceeded`.
    pub reason: Option<String>,
    /// How long the caller should wait before retrying, milliseconds.
    pub retry_after_ms: Option<u64>,
    /// Composite risk score computed for this request, 0-100.
    pub risk_score: u8,
    /// Response headers for the HTTP layer to forward.
    pub headers: HashMap<String, String>,
}

/// Counters across the engine's lifetime.
#[derive(Debug, Default)]
struct Counters {
    total_checks: AtomicU64,
    allowed: AtomicU64,
    rate_limited: AtomicU64,
    ban_rejected: AtomicU64,
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdmissionStats {
    /// Requests evaluated.
    pub total_checks: u64,
    /// Requests admitted.
    pub allowed: u64,
    /// Requests rejected by a window limit.
    pub rate_limited: u64,
    /// Requests rejected by an active ban.
    pub ban_rejected: u64,
}

/// The adaptive admission-control engine.
pub struct AdmissionEngine {
    policies: PolicyTable,
    attempts: Arc<AttemptStore>,
    bans: Arc<BanLedger>,
    audit: Arc<AuditLog>,
    counters: Counters,
    sweep_interval_ms: u64,
}

impl AdmissionEngine {
    /// Builds an engine from validated configuration.
    pub fn new(config: AdmissionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            policies: PolicyTable::with_overrides(&config.policy_overrides),
            attempts: Arc::new(AttemptStore::new()),
            bans: Arc::new(BanLedger::new(config.escalation)),
            audit: Arc::new(AuditLog::new(config.audit_capacity)),
            counters: Counters::default(),
            sweep_interval_ms: config.sweep_interval_ms,
        })
    }

    /// Evaluates one request at the given instant.
    ///
    /// An empty identifier falls back to [`FALLBACK_IDENTIFIER`] with a
    /// warning rather than failing the request: admission-control
    /// unavailability must never become its own denial of service.
    pub fn check_request(
        &self,
        identifier: &str,
        endpoint_path: &str,
        meta: &RequestMeta,
        now_ms: u64,
    ) -> Decision {
        let identifier = if identifier.trim().is_empty() {
            tracing::warn!(
                target: "admission",
                endpoint = %endpoint_path,
                "no usable client identifier, using fallback"
            );
            FALLBACK_IDENTIFIER
        } else {
            identifier
        };
        self.counters.total_checks.fetch_add(1, Ordering::Relaxed);

        // Ban fast path. Risk is still computed so banned traffic stays
        // visible to observability.
        if let Some(ban) = self.bans.is_banned(identifier, now_ms) {
            let risk_score = self.score_request(identifier, meta, now_ms);
            let reason = format!("banned:{}", ban.reason);
            let retry_after_ms = ban.until_ms.saturating_sub(now_ms);
            let (_, policy) = self.policies.resolve(endpoint_path);
            self.audit.push(AdmissionEvent {
                kind: AdmissionEventKind::Banned,
                severity: Severity::Critical,
                identifier: identifier.to_string(),
                endpoint_path: endpoint_path.to_string(),
                risk_score,
                reason: reason.clone(),
                timestamp_ms: now_ms,
            });
            self.counters.ban_rejected.fetch_add(1, Ordering::Relaxed);
            return Decision {
                allowed: false,
                reason: Some(reason),
                retry_after_ms: Some(retry_after_ms),
                risk_score,
                headers: rejection_headers(
                    policy.effective_max(risk_score),
                    ban.until_ms,
                    retry_after_ms,
                ),
            };
        }

        let risk_score = self.score_request(identifier, meta, now_ms);
        // This evaluation now counts toward future burst heuristics,
        // whether or not it is admitted.
        self.attempts.note_identifier(identifier, now_ms);

        let (class, policy) = self.policies.resolve(endpoint_path);
        let effective_max = policy.effective_max(risk_score);
        let key = AttemptKey::new(identifier, class);
        let weight = request_weight(meta);
        let outcome = self
            .attempts
            .try_admit(&key, policy.window_ms, effective_max, weight, now_ms);

        if !outcome.admitted {
            self.bans.record_violation(identifier, now_ms);
            self.audit.push(AdmissionEvent {
                kind: AdmissionEventKind::RateLimited,
                severity: Severity::Warning,
                identifier: identifier.to_string(),
                endpoint_path: endpoint_path.to_string(),
                risk_score,
                reason: REASON_RATE_LIMITED.to_string(),
                timestamp_ms: now_ms,
            });
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Decision {
                allowed: false,
                reason: Some(REASON_RATE_LIMITED.to_string()),
                retry_after_ms: Some(policy.window_ms),
                risk_score,
                headers: rejection_headers(
                    effective_max,
                    now_ms.saturating_add(policy.window_ms),
                    policy.window_ms,
                ),
            };
        }

        if risk_score >= HIGH_RISK_THRESHOLD {
            self.audit.push(AdmissionEvent {
                kind: AdmissionEventKind::HighRisk,
                severity: Severity::Warning,
                identifier: identifier.to_string(),
                endpoint_path: endpoint_path.to_string(),
                risk_score,
                reason: "risk_score_elevated".to_string(),
                timestamp_ms: now_ms,
            });
        }
        self.counters.allowed.fetch_add(1, Ordering::Relaxed);
        let remaining = effective_max.saturating_sub(outcome.weighted_count + weight.max(1));
        Decision {
            allowed: true,
            reason: None,
            retry_after_ms: None,
            risk_score,
            headers: acceptance_headers(effective_max, remaining),
        }
    }

    /// Evaluates one request at the current wall-clock time.
    pub fn check_request_now(
        &self,
        identifier: &str,
        endpoint_path: &str,
        meta: &RequestMeta,
    ) -> Decision {
        self.check_request(identifier, endpoint_path, meta, now_ms())
    }

    fn score_request(&self, identifier: &str, meta: &RequestMeta, now_ms: u64) -> u8 {
        let cutoff = now_ms.saturating_sub(BURST_WINDOW_MS);
        risk::score(&RiskInput {
            identifier,
            user_agent: &meta.user_agent,
            recent_attempts_last_minute: self.attempts.identifier_attempts_since(identifier, cutoff),
            suspicion_count: self.bans.suspicion_count(identifier),
        })
    }

    /// Snapshot of lifetime counters.
    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            total_checks: self.counters.total_checks.load(Ordering::Relaxed),
            allowed: self.counters.allowed.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            ban_rejected: self.counters.ban_rejected.load(Ordering::Relaxed),
        }
    }

    /// Shared handle to the attempt store (used by the cleanup sweeper).
    pub fn attempt_store(&self) -> Arc<AttemptStore> {
        Arc::clone(&self.attempts)
    }

    /// Shared handle to the ban ledger.
    pub fn ban_ledger(&self) -> Arc<BanLedger> {
        Arc::clone(&self.bans)
    }

    /// Shared handle to the audit log.
    pub fn audit_log(&self) -> Arc<AuditLog> {
        Arc::clone(&self.audit)
    }

    /// The resolved policy table.
    pub fn policy_table(&self) -> &PolicyTable {
        &self.policies
    }

    /// Builds a cleanup sweeper over this engine's state, using the
    /// configured sweep interval.
    pub fn sweeper(&self) -> crate::sweeper::CleanupSweeper {
        crate::sweeper::CleanupSweeper::new(
            Arc::clone(&self.attempts),
            Arc::clone(&self.bans),
            self.policies.clone(),
            self.sweep_interval_ms,
        )
    }
}
