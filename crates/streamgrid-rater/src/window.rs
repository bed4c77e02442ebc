//! Bounded, time-ordered history of per-tick counts for one stage.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::counts::TimestampedCounts;

/// Ordered snapshot history with strictly increasing timestamps.
///
/// Appends and evictions come only from the owning stage's control loop;
/// rate queries read concurrently. The deque itself is lock-guarded and
/// readers receive cloned `Arc`s, so a query observes either the pre- or
/// post-append state, never a partially mutated sequence.
#[derive(Debug, Default)]
pub struct CountsWindow {
    entries: RwLock<VecDeque<Arc<TimestampedCounts>>>,
}

impl CountsWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tick's counts.
    ///
    /// Two ticks landing in the same epoch second collapse into one entry
    /// (the newer one replaces the older, having carried its values
    /// forward). An entry older than the current tail is a clock anomaly
    /// and is dropped.
    pub fn append(&self, counts: Arc<TimestampedCounts>) {
        let mut entries = self.entries.write().expect("window lock");
        if let Some(tail) = entries.back().map(|e| e.timestamp()) {
            if counts.timestamp() < tail {
                warn!(
                    timestamp = counts.timestamp(),
                    tail,
                    "dropping out-of-order counts entry"
                );
                return;
            }
            if counts.timestamp() == tail {
                entries.pop_back();
            }
        }
        entries.push_back(counts);
    }

    /// Drop entries from the front whose timestamp is before `cutoff`.
    pub fn evict_older_than(&self, cutoff: i64) {
        let mut entries = self.entries.write().expect("window lock");
        while let Some(front) = entries.front() {
            if front.timestamp() >= cutoff {
                break;
            }
            entries.pop_front();
        }
    }

    /// The most recent entry, if any.
    pub fn latest(&self) -> Option<Arc<TimestampedCounts>> {
        self.entries.read().expect("window lock").back().cloned()
    }

    /// A point-in-time copy of the full history, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<TimestampedCounts>> {
        self.entries
            .read()
            .expect("window lock")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("window lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: i64) -> Arc<TimestampedCounts> {
        Arc::new(TimestampedCounts::new(ts))
    }

    #[test]
    fn appends_in_order() {
        let window = CountsWindow::new();
        window.append(entry(100));
        window.append(entry(105));
        window.append(entry(110));

        let snap = window.snapshot();
        let timestamps: Vec<i64> = snap.iter().map(|e| e.timestamp()).collect();
        assert_eq!(timestamps, vec![100, 105, 110]);
    }

    #[test]
    fn same_timestamp_replaces_tail() {
        let window = CountsWindow::new();
        window.append(entry(100));

        let replacement = TimestampedCounts::new(100);
        replacement.update(Some(&crate::counts::ReplicaCount::new("p1", 5.0)));
        window.append(Arc::new(replacement));

        assert_eq!(window.len(), 1);
        let latest = window.latest().unwrap();
        assert_eq!(latest.snapshot().get("p1"), Some(&5.0));
    }

    #[test]
    fn out_of_order_entry_is_dropped() {
        let window = CountsWindow::new();
        window.append(entry(100));
        window.append(entry(90));

        assert_eq!(window.len(), 1);
        assert_eq!(window.latest().unwrap().timestamp(), 100);
    }

    #[test]
    fn eviction_drops_only_old_entries() {
        let window = CountsWindow::new();
        for ts in [100, 105, 110, 115] {
            window.append(entry(ts));
        }

        window.evict_older_than(106);

        let snap = window.snapshot();
        let timestamps: Vec<i64> = snap.iter().map(|e| e.timestamp()).collect();
        assert_eq!(timestamps, vec![110, 115]);
    }

    #[test]
    fn eviction_on_empty_window_is_fine() {
        let window = CountsWindow::new();
        window.evict_older_than(1000);
        assert!(window.is_empty());
    }

    #[test]
    fn snapshot_is_stable_across_later_appends() {
        let window = CountsWindow::new();
        window.append(entry(100));

        let snap = window.snapshot();
        window.append(entry(105));

        assert_eq!(snap.len(), 1);
        assert_eq!(window.len(), 2);
    }
}
