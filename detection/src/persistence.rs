//! Tracks how long each alert condition has been continuously true.
//! A single non-met observation resets the clock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Default)]
pub struct PersistenceTracker {
    start_times: HashMap<String, DateTime<Utc>>,
}

impl PersistenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the state of one condition. Met and not yet tracked starts
    /// the clock; not met drops the key. Re-entrant met observations keep
    /// the original start time.
    pub fn track(
        &mut self,
        condition_key: &str,
        is_met: bool,
        timestamp: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if is_met {
            let start = *self
                .start_times
                .entry(condition_key.to_string())
                .or_insert_with(|| {
                    debug!(condition_key, start = %timestamp, "persistence tracking started");
                    timestamp
                });
            Some(start)
        } else {
            if let Some(start) = self.start_times.remove(condition_key) {
                debug!(condition_key, was_tracking_since = %start, "persistence tracking cleared");
            }
            None
        }
    }

    /// Elapsed seconds since the condition first became true, or absent
    /// when not tracking.
    pub fn get_duration(&self, condition_key: &str, now: DateTime<Utc>) -> Option<f64> {
        self.start_times
            .get(condition_key)
            .map(|start| (now - *start).num_milliseconds() as f64 / 1000.0)
    }

    pub fn is_persistence_met(
        &self,
        condition_key: &str,
        required_seconds: u64,
        now: DateTime<Utc>,
    ) -> bool {
        match self.get_duration(condition_key, now) {
            Some(duration) => duration >= required_seconds as f64,
            None => false,
        }
    }

    pub fn clear(&mut self, condition_key: &str) {
        self.start_times.remove(condition_key);
    }

    pub fn clear_all(&mut self) {
        self.start_times.clear();
    }

    pub fn len(&self) -> usize {
        self.start_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start_times.is_empty()
    }

    pub fn contains(&self, condition_key: &str) -> bool {
        self.start_times.contains_key(condition_key)
    }

    pub fn get_start_time(&self, condition_key: &str) -> Option<DateTime<Utc>> {
        self.start_times.get(condition_key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const KEY: &str = "basis_warning:BTC-USDT-PERP:binance";

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_tracking_starts_and_clears() {
        let mut tracker = PersistenceTracker::new();
        assert_eq!(tracker.get_duration(KEY, ts(0)), None);

        let start = tracker.track(KEY, true, ts(0));
        assert_eq!(start, Some(ts(0)));
        assert_eq!(tracker.get_duration(KEY, ts(60)), Some(60.0));

        assert_eq!(tracker.track(KEY, false, ts(90)), None);
        assert_eq!(tracker.get_duration(KEY, ts(90)), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_reentrant_track_keeps_first_met_time() {
        let mut tracker = PersistenceTracker::new();
        tracker.track(KEY, true, ts(0));
        // later met observations must not move the clock
        assert_eq!(tracker.track(KEY, true, ts(30)), Some(ts(0)));
        assert_eq!(tracker.get_start_time(KEY), Some(ts(0)));
        assert_eq!(tracker.get_duration(KEY, ts(65)), Some(65.0));
    }

    #[test]
    fn test_duration_monotone_while_met() {
        let mut tracker = PersistenceTracker::new();
        tracker.track(KEY, true, ts(0));
        let mut last = 0.0;
        for t in [10, 30, 60, 90, 125] {
            tracker.track(KEY, true, ts(t));
            let duration = tracker.get_duration(KEY, ts(t)).unwrap();
            assert!(duration >= last);
            last = duration;
        }
    }

    #[test]
    fn test_is_persistence_met() {
        let mut tracker = PersistenceTracker::new();
        tracker.track(KEY, true, ts(0));
        assert!(!tracker.is_persistence_met(KEY, 120, ts(100)));
        assert!(tracker.is_persistence_met(KEY, 120, ts(120)));
        assert!(tracker.is_persistence_met(KEY, 120, ts(125)));
    }

    #[test]
    fn test_single_false_resets_the_clock() {
        let mut tracker = PersistenceTracker::new();
        tracker.track(KEY, true, ts(0));
        tracker.track(KEY, false, ts(60));
        tracker.track(KEY, true, ts(61));
        // the clock restarted at 61
        assert!(!tracker.is_persistence_met(KEY, 120, ts(130)));
        assert!(tracker.is_persistence_met(KEY, 120, ts(181)));
    }

    #[test]
    fn test_clear_operations() {
        let mut tracker = PersistenceTracker::new();
        tracker.track("a", true, ts(0));
        tracker.track("b", true, ts(0));
        assert_eq!(tracker.len(), 2);

        tracker.clear("a");
        assert!(!tracker.contains("a"));
        assert!(tracker.contains("b"));

        tracker.clear_all();
        assert!(tracker.is_empty());
    }
}
