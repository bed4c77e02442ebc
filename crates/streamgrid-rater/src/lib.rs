//! streamgrid-rater — per-stage throughput estimation for autoscaling.
//!
//! Periodically samples the cumulative processed-message counter of every
//! replica of a tracked pipeline stage, keeps a bounded time-windowed
//! history of those samples, and computes throughput rates over multiple
//! lookback windows. The external autoscaling policy consumes the rates;
//! deciding how many replicas to add or remove is its job, not ours.
//!
//! # Architecture
//!
//! ```text
//! Rater
//!   ├── Per-stage background loop (tick → refresh → scrape → record → evict)
//!   │   ├── ReplicaTracker ← ReplicaDiscovery (capability trait)
//!   │   ├── CounterFetcher fan-out, per-replica timeout (bounded join)
//!   │   ├── TimestampedCounts (one tick's per-replica counts)
//!   │   └── CountsWindow (bounded ordered history)
//!   └── get_rates(stage) → window name → Rate, from recorded state only
//! ```
//!
//! # Failure Posture
//!
//! A failed or timed-out scrape is an absent sample: the replica's last
//! known value is carried forward rather than dropped, so one bad scrape
//! can never manufacture a full-counter delta. A counter that decreased
//! means the replica restarted; only its post-reset reading counts.
//! History too shallow for a lookback reports [`Rate::Unavailable`],
//! never an approximation. No scrape outcome terminates a stage's loop.

pub mod counts;
pub mod rate;
pub mod rater;
pub mod tracker;
pub mod window;

pub use counts::{ReplicaCount, TimestampedCounts};
pub use rate::{calculate_rate, Rate};
pub use rater::{Lookback, Rater, RaterConfig};
pub use tracker::{ReplicaDiscovery, ReplicaTracker, StaticDiscovery};
pub use window::CountsWindow;
