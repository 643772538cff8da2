//! Periodic cleanup of expired admission state
//!
//! Lazy expiry-on-read only cleans keys that keep getting touched; a caller
//! that goes quiet would otherwise pin its window and burst-tracker entries
//! forever. The sweeper bounds that memory. Each pass works one key at a
//! time through the sharded maps, so concurrent admission checks never wait
//! on a whole-map lock.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::attempt::AttemptStore;
use crate::ban::BanLedger;
use crate::engine::now_ms;
use crate::policy::PolicyTable;
use crate::risk::BURST_WINDOW_MS;

/// What one sweep pass removed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepStats {
    /// Expired attempt records pruned.
    pub attempts_removed: usize,
    /// Window keys left empty and dropped.
    pub keys_removed: usize,
    /// Expired bans evicted.
    pub bans_evicted: usize,
    /// Idle per-identifier burst trackers dropped.
    pub trackers_removed: usize,
}

/// Background maintenance routine for the attempt store and ban ledger.
pub struct CleanupSweeper {
    attempts: Arc<AttemptStore>,
    bans: Arc<BanLedger>,
    policies: PolicyTable,
    interval: Duration,
}

impl CleanupSweeper {
    /// Creates a sweeper over the given shared state.
    pub fn new(
        attempts: Arc<AttemptStore>,
        bans: Arc<BanLedger>,
        policies: PolicyTable,
        interval_ms: u64,
    ) -> Self {
        Self {
            attempts,
            bans,
            policies,
            interval: Duration::from_millis(interval_ms),
        }
    }

    /// Runs one maintenance pass at the given instant.
    ///
    /// Attempt retention per key follows the base window of the key's
    /// endpoint class; burst trackers are retained for the burst heuristic
    /// window.
    pub fn sweep_once(&self, now_ms: u64) -> SweepStats {
        let (attempts_removed, keys_removed) = self
            .attempts
            .prune(now_ms, |key| self.policies.base_window_for_class(&key.class));
        let bans_evicted = self.bans.evict_expired(now_ms);
        let trackers_removed = self.attempts.prune_identifiers(now_ms, BURST_WINDOW_MS);
        SweepStats {
            attempts_removed,
            keys_removed,
            bans_evicted,
            trackers_removed,
        }
    }

    /// Spawns the sweeper on its configured interval. The returned handle
    /// stops it cleanly.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // consume the immediate first tick
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = self.sweep_once(now_ms());
                        debug!(
                            target: "admission",
                            attempts = stats.attempts_removed,
                            keys = stats.keys_removed,
                            bans = stats.bans_evicted,
                            trackers = stats.trackers_removed,
                            "cleanup sweep complete"
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals shutdown and waits for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    /// Aborts the task without waiting.
    pub fn abort(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::AttemptKey;
    use crate::config::EscalationConfig;

    fn sweeper() -> CleanupSweeper {
        CleanupSweeper::new(
            Arc::new(AttemptStore::new()),
            Arc::new(BanLedger::new(EscalationConfig::default())),
            PolicyTable::builtin(),
            60_000,
        )
    }

    #[test]
    fn test_sweep_removes_expired_attempts_and_empty_keys() {
        let sweeper = sweeper();
        let key = AttemptKey::new("1.2.3.4", "auth");
        sweeper.attempts.record(&key, 1_000, 1);
        sweeper.attempts.record(&key, 1_001, 1);
        let stats = sweeper.sweep_once(120_000);
        assert_eq!(stats.attempts_removed, 2);
        assert_eq!(stats.keys_removed, 1);
        assert_eq!(sweeper.attempts.tracked_keys(), 0);
    }

    #[test]
    fn test_sweep_respects_per_class_windows() {
        let attempts = Arc::new(AttemptStore::new());
        let policies = PolicyTable::with_overrides(&[crate::policy::PolicyOverride {
            class: "bulk".to_string(),
            max_requests: 10,
            window_ms: 600_000,
        }]);
        let sweeper = CleanupSweeper::new(
            Arc::clone(&attempts),
            Arc::new(BanLedger::new(EscalationConfig::default())),
            policies,
            60_000,
        );
        attempts.record(&AttemptKey::new("a", "auth"), 1_000, 1);
        attempts.record(&AttemptKey::new("a", "bulk"), 1_000, 1);
        let stats = sweeper.sweep_once(120_000);
        // auth window (60s) expired, bulk window (600s) still live
        assert_eq!(stats.attempts_removed, 1);
        assert_eq!(attempts.tracked_keys(), 1);
    }

    #[test]
    fn test_sweep_evicts_expired_bans() {
        let sweeper = sweeper();
        for _ in 0..5 {
            sweeper.bans.record_violation("1.2.3.4", 0);
        }
        let stats = sweeper.sweep_once(3_600_001);
        assert_eq!(stats.bans_evicted, 1);
        assert!(sweeper.bans.is_banned("1.2.3.4", 3_600_001).is_none());
    }

    #[test]
    fn test_sweep_drops_idle_burst_trackers() {
        let sweeper = sweeper();
        sweeper.attempts.note_identifier("quiet", 1_000);
        let stats = sweeper.sweep_once(120_000);
        assert_eq!(stats.trackers_removed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_prunes_on_interval() {
        let attempts = Arc::new(AttemptStore::new());
        attempts.record(&AttemptKey::new("a", "auth"), 0, 1);
        let sweeper = CleanupSweeper::new(
            Arc::clone(&attempts),
            Arc::new(BanLedger::new(EscalationConfig::default())),
            PolicyTable::builtin(),
            50,
        );
        let handle = sweeper.spawn();
        // give the task a few intervals; wall-clock now_ms() is far past the
        // record's 60s window, so the first real tick prunes it
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;
        assert_eq!(attempts.tracked_keys(), 0);
    }
}
