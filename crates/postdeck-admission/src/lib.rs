#![warn(missing_docs)]

//! Postdeck admission-control subsystem: adaptive per-caller request
//! admission with weighted sliding windows, heuristic risk scoring, and
//! escalating temporary bans.
//!
//! The engine is an in-process library invoked synchronously by the HTTP
//! layer before a request is handled. All state is process-local and
//! intentionally volatile: a restart clears every window, counter, and ban.

pub mod attempt;
pub mod audit;
pub mod ban;
pub mod config;
pub mod engine;
pub mod error;
pub mod headers;
pub mod identity;
pub mod policy;
pub mod risk;
pub mod sweeper;

pub use attempt::{AttemptKey, AttemptRecord, AttemptStore};
pub use audit::{AdmissionEvent, AdmissionEventKind, AuditLog, Severity};
pub use ban::{BanLedger, BanRecord};
pub use config::{AdmissionConfig, EscalationConfig};
pub use engine::{now_ms, AdmissionEngine, AdmissionStats, Decision, RequestMeta};
pub use error::AdmissionError;
pub use policy::{EndpointPolicy, PolicyOverride, PolicyTable};
pub use sweeper::{CleanupSweeper, SweepStats, SweeperHandle};
