//! Per-stage control loops and the rate query service.
//!
//! The `Rater` runs one background task per tracked stage. Each tick the
//! task scrapes every active replica concurrently (each scrape bounded by
//! its own timeout), records the results into the stage's window, and
//! evicts entries older than the deepest lookback. Stages are fully
//! independent; rate queries answer purely from the recorded window and
//! never trigger or wait on a scrape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

use streamgrid_metrics::CounterFetcher;

use crate::counts::{ReplicaCount, TimestampedCounts};
use crate::rate::{calculate_rate, Rate};
use crate::tracker::{ReplicaDiscovery, ReplicaTracker};
use crate::window::CountsWindow;

/// A named lookback window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lookback {
    pub name: String,
    pub secs: i64,
}

impl Lookback {
    pub fn new(name: impl Into<String>, secs: i64) -> Self {
        Self {
            name: name.into(),
            secs,
        }
    }
}

/// Rater tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaterConfig {
    /// Scrape-and-record cadence.
    pub tick_interval: Duration,
    /// Replica discovery cadence, independent of the scrape ticks.
    pub refresh_interval: Duration,
    /// Budget for a single replica's scrape within a tick.
    pub scrape_timeout: Duration,
    /// Lookback windows reported by `get_rates`, each computed
    /// independently.
    pub lookbacks: Vec<Lookback>,
}

impl Default for RaterConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(30),
            scrape_timeout: Duration::from_secs(1),
            lookbacks: vec![
                Lookback::new("default", 120),
                Lookback::new("1m", 60),
                Lookback::new("5m", 300),
                Lookback::new("15m", 900),
            ],
        }
    }
}

impl RaterConfig {
    /// Adjust the depth of the `default` window (per-stage override).
    pub fn with_default_lookback(mut self, secs: i64) -> Self {
        for lookback in &mut self.lookbacks {
            if lookback.name == "default" {
                lookback.secs = secs;
            }
        }
        self
    }

    fn max_lookback_secs(&self) -> i64 {
        self.lookbacks.iter().map(|l| l.secs).max().unwrap_or(0)
    }

    /// How much history to retain. The slack past the deepest lookback
    /// guarantees a start entry exists at or before the lookback target.
    fn retention_secs(&self) -> i64 {
        self.max_lookback_secs() + 2 * self.tick_interval.as_secs() as i64
    }
}

/// Per-stage mutable state: the snapshot window and the active replica set.
struct StageState {
    window: CountsWindow,
    tracker: ReplicaTracker,
}

/// A tracked stage's background loop.
struct StageSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    state: Arc<StageState>,
}

/// Tracks stages and serves their throughput rates.
pub struct Rater {
    config: RaterConfig,
    discovery: Arc<dyn ReplicaDiscovery>,
    fetcher: Arc<dyn CounterFetcher>,
    /// Active loops: stage name → slot.
    stages: Arc<RwLock<HashMap<String, StageSlot>>>,
}

impl Rater {
    pub fn new(
        config: RaterConfig,
        discovery: Arc<dyn ReplicaDiscovery>,
        fetcher: Arc<dyn CounterFetcher>,
    ) -> Self {
        Self {
            config,
            discovery,
            fetcher,
            stages: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start the control loop for a stage. Idempotent: tracking an
    /// already-tracked stage leaves its loop and history untouched.
    pub async fn track(&self, stage: &str) {
        let mut stages = self.stages.write().await;
        if stages.contains_key(stage) {
            debug!(%stage, "already tracked");
            return;
        }

        let state = Arc::new(StageState {
            window: CountsWindow::new(),
            tracker: ReplicaTracker::new(stage, self.discovery.clone()),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_stage_loop(
            stage.to_string(),
            self.config.clone(),
            state.clone(),
            self.fetcher.clone(),
            shutdown_rx,
        ));

        stages.insert(
            stage.to_string(),
            StageSlot {
                handle,
                shutdown_tx,
                state,
            },
        );
        info!(%stage, "stage tracked");
    }

    /// Stop a stage's loop and drop its history. In-flight scrapes are
    /// abandoned, not awaited.
    pub async fn untrack(&self, stage: &str) {
        let mut stages = self.stages.write().await;
        if let Some(slot) = stages.remove(stage) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(%stage, "stage untracked");
        }
    }

    /// Stop all stage loops (for graceful shutdown).
    pub async fn shutdown(&self) {
        let mut stages = self.stages.write().await;
        for (stage, slot) in stages.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(%stage, "stage loop stopped");
        }
        info!("rater shut down");
    }

    /// Current throughput rates for a stage, one entry per configured
    /// lookback window. Answers from recorded history only; `None` means
    /// the stage is not tracked.
    pub async fn get_rates(&self, stage: &str) -> Option<HashMap<String, Rate>> {
        let stages = self.stages.read().await;
        let slot = stages.get(stage)?;
        let entries = slot.state.window.snapshot();

        let rates = self
            .config
            .lookbacks
            .iter()
            .map(|l| (l.name.clone(), calculate_rate(&entries, l.secs)))
            .collect();
        Some(rates)
    }

    pub async fn tracked_stages(&self) -> Vec<String> {
        self.stages.read().await.keys().cloned().collect()
    }
}

/// One stage's tick loop: refresh → scrape → record → evict, until
/// shutdown or abort.
async fn run_stage_loop(
    stage: String,
    config: RaterConfig,
    state: Arc<StageState>,
    fetcher: Arc<dyn CounterFetcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        %stage,
        tick_secs = config.tick_interval.as_secs_f64(),
        "rater loop started"
    );

    let mut tick = tokio::time::interval(config.tick_interval);
    let mut refresh = tokio::time::interval(config.refresh_interval);

    // The first refresh runs before the first scrape so the initial tick
    // has targets.
    refresh.tick().await;
    state.tracker.refresh().await;

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                state.tracker.refresh().await;
            }
            _ = tick.tick() => {
                scrape_tick(&stage, epoch_secs(), &config, &state, &fetcher).await;
            }
            _ = shutdown.changed() => {
                info!(%stage, "rater loop shutting down");
                break;
            }
        }
    }
}

/// Execute one tick: fan out a scrape per active replica with a bounded
/// per-replica timeout, fold results into a new counts entry seeded from
/// the previous tick, append it, and evict expired history.
///
/// Nothing here fails the loop: unreachable replicas become absent
/// samples and an empty active set still records a tick.
async fn scrape_tick(
    stage: &str,
    now: i64,
    config: &RaterConfig,
    state: &StageState,
    fetcher: &Arc<dyn CounterFetcher>,
) {
    let active = state.tracker.active();

    let mut scrapes = JoinSet::new();
    for replica in active.iter().cloned() {
        let fetcher = fetcher.clone();
        let timeout = config.scrape_timeout;
        scrapes.spawn(async move {
            match tokio::time::timeout(timeout, fetcher.fetch_counter(&replica)).await {
                Ok(Ok(count)) => (replica, Some(count)),
                Ok(Err(e)) => {
                    debug!(%replica, error = %e, "scrape failed");
                    (replica, None)
                }
                Err(_) => {
                    debug!(%replica, "scrape timed out");
                    (replica, None)
                }
            }
        });
    }

    let counts = match state.window.latest() {
        Some(previous) => TimestampedCounts::carry_forward(now, &previous, &active),
        None => TimestampedCounts::new(now),
    };

    while let Some(result) = scrapes.join_next().await {
        let Ok((replica, sample)) = result else {
            continue;
        };
        match sample {
            Some(count) => counts.update(Some(&ReplicaCount::new(replica, count))),
            None => counts.update(None),
        }
    }

    state.window.append(Arc::new(counts));
    state.window.evict_older_than(now - config.retention_secs());

    debug!(
        %stage,
        replicas = active.len(),
        window = state.window.len(),
        "tick recorded"
    );
}

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
