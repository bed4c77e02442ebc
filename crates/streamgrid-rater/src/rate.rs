//! Throughput calculation over a window of timestamped counts.
//!
//! Pure functions: nothing here scrapes, locks across calls, or mutates
//! the window. Each lookback is computed independently from the same
//! history.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::counts::TimestampedCounts;

/// A computed throughput rate for one lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Rate {
    /// Messages per second over the window.
    PerSecond(f64),
    /// Not enough retained history (or a clock anomaly) to compute this
    /// window. Distinct from a genuine rate of zero.
    Unavailable,
}

impl Rate {
    pub fn value(self) -> Option<f64> {
        match self {
            Rate::PerSecond(v) => Some(v),
            Rate::Unavailable => None,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, Rate::PerSecond(_))
    }
}

/// Compute the throughput rate over the trailing `lookback_secs` of the
/// window. `entries` must be ordered oldest first.
///
/// The start entry is the one with the greatest timestamp at or before
/// `latest.timestamp - lookback_secs`. If no entry is that old, the
/// history is too shallow for the requested window and the result is
/// [`Rate::Unavailable`] rather than an under-reported estimate.
pub fn calculate_rate(entries: &[Arc<TimestampedCounts>], lookback_secs: i64) -> Rate {
    let Some(latest) = entries.last() else {
        return Rate::Unavailable;
    };
    let target = latest.timestamp() - lookback_secs;
    let Some(start) = entries.iter().rev().find(|e| e.timestamp() <= target) else {
        return Rate::Unavailable;
    };

    let elapsed = latest.timestamp() - start.timestamp();
    if elapsed <= 0 {
        return Rate::Unavailable;
    }

    let start_counts = start.snapshot();
    let latest_counts = latest.snapshot();

    let replicas: BTreeSet<&String> = start_counts.keys().chain(latest_counts.keys()).collect();

    let mut total_delta = 0.0;
    for replica in replicas {
        total_delta += replica_delta(
            replica,
            start_counts.get(replica).copied(),
            latest_counts.get(replica).copied(),
        );
    }

    Rate::PerSecond(total_delta / elapsed as f64)
}

/// Messages processed by one replica between the start and latest entries.
///
/// A counter that decreased means the replica process restarted and its
/// counter reset; the current reading is then the full contribution since
/// the unobserved reset point. The delta is never negative.
fn replica_delta(replica: &str, start: Option<f64>, latest: Option<f64>) -> f64 {
    match (start, latest) {
        (Some(s), Some(l)) if l >= s => l - s,
        (Some(s), Some(l)) => {
            debug!(%replica, start = s, latest = l, "counter reset detected");
            l
        }
        // Started after the window opened: it began at zero.
        (None, Some(l)) => l,
        // No longer reporting: its future contribution is unknowable.
        (_, None) => 0.0,
    }
}
