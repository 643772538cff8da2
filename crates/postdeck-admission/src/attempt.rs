//! Weighted sliding-window attempt store
//!
//! Tracks recent request attempts per (client identifier, endpoint class)
//! key. Records are pruned lazily whenever a key is read, so repeated access
//! amortizes cleanup; the sweeper handles keys that go quiet. Backed by
//! sharded concurrent maps so admission checks from different callers never
//! contend on one lock, while operations on a single key serialize through
//! its shard entry.

use dashmap::DashMap;

/// One request's contribution to a sliding window. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    /// When the attempt happened, epoch milliseconds.
    pub timestamp_ms: u64,
    /// Weighted cost of the attempt, at least 1.
    pub weight: u32,
}

/// Window key: one client identifier within one endpoint class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    /// Client identifier.
    pub identifier: String,
    /// Endpoint class label from the policy table.
    pub class: String,
}

impl AttemptKey {
    /// Creates a key from an identifier and endpoint class.
    pub fn new(identifier: &str, class: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            class: class.to_string(),
        }
    }
}

/// Outcome of an atomic admit check against one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitOutcome {
    /// Whether the attempt was admitted and recorded.
    pub admitted: bool,
    /// Weighted load already in the window, excluding this attempt.
    pub weighted_count: u32,
    /// The limit the load was compared against.
    pub effective_max: u32,
}

/// Concurrent store of sliding-window attempts and per-identifier activity.
pub struct AttemptStore {
    windows: DashMap<AttemptKey, Vec<AttemptRecord>>,
    by_identifier: DashMap<String, Vec<u64>>,
}

impl AttemptStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            by_identifier: DashMap::new(),
        }
    }

    /// Appends an attempt record under the given key.
    pub fn record(&self, key: &AttemptKey, now_ms: u64, weight: u32) {
        self.windows
            .entry(key.clone())
            .or_default()
            .push(AttemptRecord {
                timestamp_ms: now_ms,
                weight: weight.max(1),
            });
    }

    /// Returns the records still inside the window, pruning expired ones in
    /// place. An unknown key yields an empty sequence.
    pub fn recent_attempts(
        &self,
        key: &AttemptKey,
        window_ms: u64,
        now_ms: u64,
    ) -> Vec<AttemptRecord> {
        match self.windows.get_mut(key) {
            Some(mut entry) => {
                entry.retain(|r| now_ms.saturating_sub(r.timestamp_ms) < window_ms);
                entry.clone()
            }
            None => Vec::new(),
        }
    }

    /// Prune + weighted sum + compare + conditional append, all under the
    /// key's shard entry. Two concurrent calls for the same key serialize
    /// here, so the window limit cannot be breached by a race between the
    /// check and the increment.
    pub fn try_admit(
        &self,
        key: &AttemptKey,
        window_ms: u64,
        effective_max: u32,
        weight: u32,
        now_ms: u64,
    ) -> AdmitOutcome {
        let mut entry = self.windows.entry(key.clone()).or_default();
        entry.retain(|r| now_ms.saturating_sub(r.timestamp_ms) < window_ms);
        let weighted_count: u32 = entry.iter().map(|r| r.weight).sum();
        if weighted_count >= effective_max {
            return AdmitOutcome {
                admitted: false,
                weighted_count,
                effective_max,
            };
        }
        entry.push(AttemptRecord {
            timestamp_ms: now_ms,
            weight: weight.max(1),
        });
        AdmitOutcome {
            admitted: true,
            weighted_count,
            effective_max,
        }
    }

    /// Notes that this identifier was evaluated at `now_ms`, regardless of
    /// endpoint class or outcome. Feeds the burst heuristic.
    pub fn note_identifier(&self, identifier: &str, now_ms: u64) {
        self.by_identifier
            .entry(identifier.to_string())
            .or_default()
            .push(now_ms);
    }

    /// Counts attempts for this identifier across all endpoint classes at or
    /// after `cutoff_ms`, pruning older entries in place.
    pub fn identifier_attempts_since(&self, identifier: &str, cutoff_ms: u64) -> usize {
        match self.by_identifier.get_mut(identifier) {
            Some(mut entry) => {
                entry.retain(|&t| t >= cutoff_ms);
                entry.len()
            }
            None => 0,
        }
    }

    /// Prunes expired records from every key, removing keys left empty.
    /// Works one key at a time so no whole-map lock is held for the sweep.
    /// Returns (records removed, keys removed).
    pub fn prune<F>(&self, now_ms: u64, window_for_key: F) -> (usize, usize)
    where
        F: Fn(&AttemptKey) -> u64,
    {
        let keys: Vec<AttemptKey> = self.windows.iter().map(|e| e.key().clone()).collect();
        let mut records_removed = 0;
        let mut keys_removed = 0;
        for key in keys {
            let window_ms = window_for_key(&key);
            if let Some(mut entry) = self.windows.get_mut(&key) {
                let before = entry.len();
                entry.retain(|r| now_ms.saturating_sub(r.timestamp_ms) < window_ms);
                records_removed += before - entry.len();
            }
            if self.windows.remove_if(&key, |_, v| v.is_empty()).is_some() {
                keys_removed += 1;
            }
        }
        (records_removed, keys_removed)
    }

    /// Drops identifier activity older than `horizon_ms`, removing trackers
    /// left empty. Returns the number of trackers removed.
    pub fn prune_identifiers(&self, now_ms: u64, horizon_ms: u64) -> usize {
        let identifiers: Vec<String> = self.by_identifier.iter().map(|e| e.key().clone()).collect();
        let cutoff = now_ms.saturating_sub(horizon_ms);
        let mut removed = 0;
        for id in identifiers {
            if let Some(mut entry) = self.by_identifier.get_mut(&id) {
                entry.retain(|&t| t >= cutoff);
            }
            if self
                .by_identifier
                .remove_if(&id, |_, v| v.is_empty())
                .is_some()
            {
                removed += 1;
            }
        }
        removed
    }

    /// Number of currently tracked window keys.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Number of identifiers with burst-tracker activity.
    pub fn tracked_identifiers(&self) -> usize {
        self.by_identifier.len()
    }
}

impl Default for AttemptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> AttemptKey {
        AttemptKey::new(id, "default")
    }

    #[test]
    fn test_unknown_key_yields_empty_sequence() {
        let store = AttemptStore::new();
        assert!(store.recent_attempts(&key("a"), 60_000, 1_000).is_empty());
    }

    #[test]
    fn test_record_then_recent_returns_the_record() {
        let store = AttemptStore::new();
        store.record(&key("a"), 1_000, 2);
        let recent = store.recent_attempts(&key("a"), 60_000, 1_500);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].weight, 2);
        assert_eq!(recent[0].timestamp_ms, 1_000);
    }

    #[test]
    fn test_recent_prunes_expired_records_in_place() {
        let store = AttemptStore::new();
        store.record(&key("a"), 1_000, 1);
        store.record(&key("a"), 50_000, 1);
        // 1_000 is exactly window_ms old at 61_000 and must be gone
        let recent = store.recent_attempts(&key("a"), 60_000, 61_000);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].timestamp_ms, 50_000);
        // prune persisted: a wider re-read still sees one record
        let again = store.recent_attempts(&key("a"), u64::MAX, 61_000);
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_zero_weight_records_stored_as_one() {
        let store = AttemptStore::new();
        store.record(&key("a"), 1_000, 0);
        let recent = store.recent_attempts(&key("a"), 60_000, 1_000);
        assert_eq!(recent[0].weight, 1);
    }

    #[test]
    fn test_try_admit_admits_until_weighted_limit() {
        let store = AttemptStore::new();
        for i in 0..5 {
            let outcome = store.try_admit(&key("a"), 60_000, 5, 1, 1_000 + i);
            assert!(outcome.admitted, "attempt {i} should be admitted");
        }
        let outcome = store.try_admit(&key("a"), 60_000, 5, 1, 1_010);
        assert!(!outcome.admitted);
        assert_eq!(outcome.weighted_count, 5);
    }

    #[test]
    fn test_try_admit_rejection_records_nothing() {
        let store = AttemptStore::new();
        for i in 0..3 {
            store.try_admit(&key("a"), 60_000, 3, 1, 1_000 + i);
        }
        store.try_admit(&key("a"), 60_000, 3, 1, 1_010);
        let recent = store.recent_attempts(&key("a"), 60_000, 1_020);
        assert_eq!(recent.len(), 3);
    }

    #[test]
    fn test_try_admit_counts_weights_not_requests() {
        let store = AttemptStore::new();
        assert!(store.try_admit(&key("a"), 60_000, 10, 6, 1_000).admitted);
        assert!(store.try_admit(&key("a"), 60_000, 10, 3, 1_001).admitted);
        // 9 of 10 consumed; one more weighted request still fits
        assert!(store.try_admit(&key("a"), 60_000, 10, 5, 1_002).admitted);
        // 14 >= 10: window saturated
        assert!(!store.try_admit(&key("a"), 60_000, 10, 1, 1_003).admitted);
    }

    #[test]
    fn test_try_admit_readmits_after_window_expiry() {
        let store = AttemptStore::new();
        for _ in 0..5 {
            store.try_admit(&key("a"), 60_000, 5, 1, 1_000);
        }
        assert!(!store.try_admit(&key("a"), 60_000, 5, 1, 2_000).admitted);
        assert!(store.try_admit(&key("a"), 60_000, 5, 1, 61_001).admitted);
    }

    #[test]
    fn test_classes_are_isolated() {
        let store = AttemptStore::new();
        let auth = AttemptKey::new("a", "auth");
        let posts = AttemptKey::new("a", "default");
        for _ in 0..5 {
            store.try_admit(&auth, 60_000, 5, 1, 1_000);
        }
        assert!(!store.try_admit(&auth, 60_000, 5, 1, 1_001).admitted);
        assert!(store.try_admit(&posts, 60_000, 100, 1, 1_001).admitted);
    }

    #[test]
    fn test_identifier_attempts_span_endpoint_classes() {
        let store = AttemptStore::new();
        for i in 0..7 {
            store.note_identifier("a", 1_000 + i);
        }
        assert_eq!(store.identifier_attempts_since("a", 0), 7);
        assert_eq!(store.identifier_attempts_since("b", 0), 0);
    }

    #[test]
    fn test_identifier_attempts_prunes_before_cutoff() {
        let store = AttemptStore::new();
        store.note_identifier("a", 1_000);
        store.note_identifier("a", 70_000);
        assert_eq!(store.identifier_attempts_since("a", 10_000), 1);
        // pruned in place: widening the cutoff does not resurrect old entries
        assert_eq!(store.identifier_attempts_since("a", 0), 1);
    }

    #[test]
    fn test_prune_removes_expired_and_empty_keys() {
        let store = AttemptStore::new();
        store.record(&key("old"), 1_000, 1);
        store.record(&key("live"), 100_000, 1);
        let (records, keys) = store.prune(120_000, |_| 60_000);
        assert_eq!(records, 1);
        assert_eq!(keys, 1);
        assert_eq!(store.tracked_keys(), 1);
    }

    #[test]
    fn test_prune_identifiers_drops_idle_trackers() {
        let store = AttemptStore::new();
        store.note_identifier("idle", 1_000);
        store.note_identifier("busy", 119_000);
        let removed = store.prune_identifiers(120_000, 60_000);
        assert_eq!(removed, 1);
        assert_eq!(store.tracked_identifiers(), 1);
    }

    #[test]
    fn test_concurrent_try_admit_never_exceeds_limit() {
        use std::sync::Arc;
        let store = Arc::new(AttemptStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0u32;
                for _ in 0..25 {
                    if store.try_admit(&AttemptKey::new("c", "auth"), 60_000, 10, 1, 1_000).admitted {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }
        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 10);
    }
}
