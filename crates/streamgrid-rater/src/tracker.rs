//! Replica discovery and the per-stage active-set tracker.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Boxed future alias for discovery results.
pub type DiscoveryFuture<'a> = Pin<Box<dyn Future<Output = Vec<String>> + Send + 'a>>;

/// Supplies the current set of live replica identities for a stage —
/// injected for testability.
///
/// The mechanism behind it (cluster API query, DNS lookup against a
/// headless service) is interchangeable; the rater only needs a
/// snapshot-of-names call.
pub trait ReplicaDiscovery: Send + Sync {
    fn list_replicas<'a>(&'a self, stage: &'a str) -> DiscoveryFuture<'a>;
}

/// Discovery over an externally managed replica list.
///
/// Hold the `Arc` and call [`StaticDiscovery::set_replicas`] as replicas
/// come and go. Serves every stage the same list, which suits single-stage
/// deployments and tests.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    replicas: RwLock<Vec<String>>,
}

impl StaticDiscovery {
    pub fn new(replicas: Vec<String>) -> Self {
        Self {
            replicas: RwLock::new(replicas),
        }
    }

    pub fn set_replicas(&self, replicas: Vec<String>) {
        *self.replicas.write().expect("replicas lock") = replicas;
    }
}

impl ReplicaDiscovery for StaticDiscovery {
    fn list_replicas<'a>(&'a self, _stage: &'a str) -> DiscoveryFuture<'a> {
        let replicas = self.replicas.read().expect("replicas lock").clone();
        Box::pin(async move { replicas })
    }
}

/// Maintains the active scrape targets for one stage.
///
/// Refreshed on its own cadence, independent of the scrape ticks. A
/// replica that disappears from discovery is dropped from the active set
/// only; history already recorded for it is never rewritten.
pub struct ReplicaTracker {
    stage: String,
    discovery: Arc<dyn ReplicaDiscovery>,
    active: RwLock<Vec<String>>,
}

impl ReplicaTracker {
    pub fn new(stage: impl Into<String>, discovery: Arc<dyn ReplicaDiscovery>) -> Self {
        Self {
            stage: stage.into(),
            discovery,
            active: RwLock::new(Vec::new()),
        }
    }

    /// Re-query discovery and swap in the new active set.
    pub async fn refresh(&self) {
        let replicas = self.discovery.list_replicas(&self.stage).await;

        let mut active = self.active.write().expect("active lock");
        if *active != replicas {
            let before: BTreeSet<&String> = active.iter().collect();
            let after: BTreeSet<&String> = replicas.iter().collect();
            debug!(
                stage = %self.stage,
                added = after.difference(&before).count(),
                removed = before.difference(&after).count(),
                total = replicas.len(),
                "active replica set changed"
            );
        }
        *active = replicas;
    }

    /// The current scrape targets.
    pub fn active(&self) -> Vec<String> {
        self.active.read().expect("active lock").clone()
    }
}
