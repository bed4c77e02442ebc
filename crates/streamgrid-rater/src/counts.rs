//! Timestamped per-replica counter state for a single tick.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// One cumulative counter reading for a single replica.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaCount {
    replica: String,
    count: f64,
}

impl ReplicaCount {
    pub fn new(replica: impl Into<String>, count: f64) -> Self {
        Self {
            replica: replica.into(),
            count,
        }
    }

    pub fn replica(&self) -> &str {
        &self.replica
    }

    pub fn count(&self) -> f64 {
        self.count
    }
}

/// Tracks the cumulative processed-message count for each replica of a
/// stage at a given timestamp.
///
/// Mutable while it is the current tick's entry; once a newer tick starts
/// recording, it is only ever read.
#[derive(Debug)]
pub struct TimestampedCounts {
    /// Time the counts were recorded, in epoch seconds.
    timestamp: i64,
    /// Replica name → cumulative count of messages processed by it.
    counts: RwLock<HashMap<String, f64>>,
}

impl TimestampedCounts {
    /// Create an empty entry for the given tick timestamp.
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Create the next tick's entry, carrying forward the previous tick's
    /// last known value for every replica still in the active set.
    ///
    /// Replicas that left the active set drop out here; their historical
    /// entries in older ticks stay untouched.
    pub fn carry_forward(timestamp: i64, previous: &TimestampedCounts, active: &[String]) -> Self {
        let prior = previous.snapshot();
        let counts = active
            .iter()
            .filter_map(|r| prior.get(r).map(|&c| (r.clone(), c)))
            .collect();
        Self {
            timestamp,
            counts: RwLock::new(counts),
        }
    }

    /// Record one replica's reading for this tick.
    ///
    /// An absent sample (failed or timed-out scrape) is deliberately a
    /// no-op rather than a removal. If the entry were dropped and a later
    /// scrape succeeded, the rate calculation would see the full counter
    /// value as a fresh delta and report an enormous spike; keeping the
    /// last known value is the safe default.
    pub fn update(&self, sample: Option<&ReplicaCount>) {
        let Some(sample) = sample else {
            return;
        };
        let mut counts = self.counts.write().expect("counts lock");
        counts.insert(sample.replica().to_string(), sample.count());
    }

    /// Return an independent copy of the per-replica counts, so callers
    /// can neither observe nor cause mutation races.
    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.counts.read().expect("counts lock").clone()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl fmt::Display for TimestampedCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self.counts.read().expect("counts lock");
        let mut entries: Vec<_> = counts.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        write!(f, "{{timestamp: {}, counts: {{", self.timestamp)?;
        for (i, (replica, count)) in entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{replica}: {count}")?;
        }
        write!(f, "}}}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_records_count() {
        let tc = TimestampedCounts::new(1000);
        tc.update(Some(&ReplicaCount::new("p1", 100.0)));

        let snap = tc.snapshot();
        assert_eq!(snap.get("p1"), Some(&100.0));
    }

    #[test]
    fn update_overwrites_within_tick() {
        let tc = TimestampedCounts::new(1000);
        tc.update(Some(&ReplicaCount::new("p1", 100.0)));
        tc.update(Some(&ReplicaCount::new("p1", 105.0)));

        assert_eq!(tc.snapshot().get("p1"), Some(&105.0));
    }

    #[test]
    fn absent_sample_is_a_no_op() {
        let tc = TimestampedCounts::new(1000);
        tc.update(Some(&ReplicaCount::new("p1", 100.0)));

        tc.update(None);
        tc.update(None);

        let snap = tc.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("p1"), Some(&100.0));
    }

    #[test]
    fn snapshot_is_an_independent_copy() {
        let tc = TimestampedCounts::new(1000);
        tc.update(Some(&ReplicaCount::new("p1", 100.0)));

        let mut snap = tc.snapshot();
        snap.insert("p1".to_string(), 0.0);
        snap.insert("p2".to_string(), 7.0);

        let fresh = tc.snapshot();
        assert_eq!(fresh.get("p1"), Some(&100.0));
        assert!(!fresh.contains_key("p2"));
    }

    #[test]
    fn carry_forward_keeps_active_replicas_only() {
        let prev = TimestampedCounts::new(1000);
        prev.update(Some(&ReplicaCount::new("p1", 100.0)));
        prev.update(Some(&ReplicaCount::new("p2", 50.0)));

        let active = vec!["p1".to_string(), "p3".to_string()];
        let next = TimestampedCounts::carry_forward(1060, &prev, &active);

        let snap = next.snapshot();
        assert_eq!(snap.get("p1"), Some(&100.0));
        // p2 left the active set; p3 has no prior value yet.
        assert!(!snap.contains_key("p2"));
        assert!(!snap.contains_key("p3"));
        assert_eq!(next.timestamp(), 1060);
    }

    #[test]
    fn display_is_deterministic() {
        let tc = TimestampedCounts::new(1000);
        tc.update(Some(&ReplicaCount::new("p2", 50.0)));
        tc.update(Some(&ReplicaCount::new("p1", 100.0)));

        assert_eq!(
            tc.to_string(),
            "{timestamp: 1000, counts: {p1: 100, p2: 50}}"
        );
    }
}
