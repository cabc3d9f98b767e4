//! Bounded per-key history
//!
//! Keeps the most recent updates for every routing key seen on the upstream
//! bus. The relay is the only writer; reads may come from any task.
//!
//! Mutation rule per key:
//! - last entry has the same `time` as the incoming update → replace it
//!   (an aggregation window re-flushed a partial bucket)
//! - otherwise append, then evict from the front down to capacity
//!
//! Histories are created lazily on first update and live for the process
//! lifetime. Nothing is persisted.

use std::collections::VecDeque;

use dashmap::DashMap;
use tracing::debug;
use types::update::KeyedUpdate;

/// Default number of updates retained per key.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// What an upsert did to the key's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First update for this key.
    Created,
    /// Appended; `evicted` is true when the oldest entry was dropped.
    Appended { evicted: bool },
    /// Replaced the last entry (same `time`).
    Coalesced,
}

/// Capped, ordered history for one key (oldest first).
#[derive(Debug, Clone)]
struct KeyHistory {
    entries: VecDeque<KeyedUpdate>,
    capacity: usize,
}

impl KeyHistory {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn apply(&mut self, update: KeyedUpdate) -> UpsertOutcome {
        if let Some(last) = self.entries.back_mut() {
            if last.same_time(&update) {
                *last = update;
                return UpsertOutcome::Coalesced;
            }
        }

        let was_empty = self.entries.is_empty();
        self.entries.push_back(update);

        let mut evicted = false;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted = true;
        }

        if was_empty {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Appended { evicted }
        }
    }
}

/// Key → bounded history map.
///
/// Per-key mutual exclusion comes from the map's shard locks, so `upsert`
/// and `get` on one key never interleave.
pub struct HistoryStore {
    histories: DashMap<String, KeyHistory>,
    capacity: usize,
}

impl HistoryStore {
    /// Create a store retaining `capacity` entries per key (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            histories: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Apply the coalesce-or-append rule for `key`.
    pub fn upsert(&self, key: &str, update: KeyedUpdate) -> UpsertOutcome {
        let time = update.time.clone();
        let outcome = self
            .histories
            .entry(key.to_string())
            .or_insert_with(|| KeyHistory::new(self.capacity))
            .apply(update);

        debug!(key, %time, ?outcome, "History updated");
        outcome
    }

    /// Current history for `key`, oldest first. Empty if the key is unknown.
    pub fn get(&self, key: &str) -> Vec<KeyedUpdate> {
        self.histories
            .get(key)
            .map(|h| h.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current history for `key`, serialized as a JSON array.
    pub fn get_json(&self, key: &str) -> Result<String, serde_json::Error> {
        match self.histories.get(key) {
            Some(h) => serde_json::to_string(&h.entries),
            None => Ok("[]".to_string()),
        }
    }

    /// Number of keys with at least one update.
    pub fn key_count(&self) -> usize {
        self.histories.len()
    }

    /// Known keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.histories.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(time: i64, value: i64) -> KeyedUpdate {
        KeyedUpdate::new(time).with_field("value", value)
    }

    #[test]
    fn test_lazy_creation() {
        let store = HistoryStore::default();
        assert!(store.get("AAPL").is_empty());
        assert_eq!(store.key_count(), 0);

        assert_eq!(store.upsert("AAPL", update(1, 1)), UpsertOutcome::Created);
        assert_eq!(store.key_count(), 1);
        assert_eq!(store.get("AAPL").len(), 1);
    }

    #[test]
    fn test_same_time_coalesces() {
        let store = HistoryStore::default();
        store.upsert("AAPL", update(100, 5));
        let outcome = store.upsert("AAPL", update(100, 9));

        assert_eq!(outcome, UpsertOutcome::Coalesced);
        let history = store.get("AAPL");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], update(100, 9));
    }

    #[test]
    fn test_only_last_entry_coalesces() {
        let store = HistoryStore::default();
        store.upsert("AAPL", update(1, 1));
        store.upsert("AAPL", update(2, 2));
        // Same time as an older, non-last entry: appended, not merged.
        store.upsert("AAPL", update(1, 3));

        let times: Vec<i64> = store.get("AAPL").iter().filter_map(|u| u.time.as_i64()).collect();
        assert_eq!(times, vec![1, 2, 1]);
    }

    #[test]
    fn test_capacity_keeps_most_recent_oldest_first() {
        let store = HistoryStore::default();
        for t in 1..=15 {
            store.upsert("AAPL", update(t, t));
        }

        let times: Vec<i64> = store.get("AAPL").iter().filter_map(|u| u.time.as_i64()).collect();
        assert_eq!(times, (6..=15).collect::<Vec<_>>());
    }

    #[test]
    fn test_eviction_reported() {
        let store = HistoryStore::new(2);
        store.upsert("K", update(1, 1));
        assert_eq!(
            store.upsert("K", update(2, 2)),
            UpsertOutcome::Appended { evicted: false }
        );
        assert_eq!(
            store.upsert("K", update(3, 3)),
            UpsertOutcome::Appended { evicted: true }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let store = HistoryStore::default();
        store.upsert("AAPL", update(1, 1));
        store.upsert("MSFT", update(1, 2));
        store.upsert("MSFT", update(2, 3));

        assert_eq!(store.get("AAPL").len(), 1);
        assert_eq!(store.get("MSFT").len(), 2);
        assert_eq!(store.keys(), vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn test_get_json() {
        let store = HistoryStore::default();
        assert_eq!(store.get_json("AAPL").unwrap(), "[]");

        store.upsert("AAPL", update(100, 5));
        let parsed: serde_json::Value =
            serde_json::from_str(&store.get_json("AAPL").unwrap()).unwrap();
        assert_eq!(parsed, serde_json::json!([{"time": 100, "value": 5}]));
    }

    #[test]
    fn test_float_time_coalesces_and_appends() {
        let store = HistoryStore::default();
        let at = |time: f64, price: i64| KeyedUpdate::new(time).with_field("price", price);

        store.upsert("AAPL", at(1700000000000.0, 1));
        assert_eq!(store.upsert("AAPL", at(1700000000000.0, 2)), UpsertOutcome::Coalesced);
        assert_eq!(
            store.upsert("AAPL", at(1700000060000.0, 3)),
            UpsertOutcome::Appended { evicted: false }
        );

        assert_eq!(
            store.get("AAPL"),
            vec![at(1700000000000.0, 2), at(1700000060000.0, 3)]
        );
    }

    #[test]
    fn test_string_time_coalesces_and_appends() {
        let store = HistoryStore::default();
        let at = |time: &str, price: i64| KeyedUpdate::new(time).with_field("price", price);

        store.upsert("MSFT", at("2024-01-01T00:00:00Z", 1));
        assert_eq!(
            store.upsert("MSFT", at("2024-01-01T00:00:00Z", 2)),
            UpsertOutcome::Coalesced
        );
        store.upsert("MSFT", at("2024-01-01T00:01:00Z", 3));

        let parsed: serde_json::Value =
            serde_json::from_str(&store.get_json("MSFT").unwrap()).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([
                {"time": "2024-01-01T00:00:00Z", "price": 2},
                {"time": "2024-01-01T00:01:00Z", "price": 3}
            ])
        );
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let store = HistoryStore::new(0);
        assert_eq!(store.capacity(), 1);
        store.upsert("K", update(1, 1));
        store.upsert("K", update(2, 2));
        assert_eq!(store.get("K"), vec![update(2, 2)]);
    }
}
