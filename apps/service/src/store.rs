//! Last known result of every check, keyed by check name.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::healthcheck::CheckResult;
use crate::healthcheck::types::unix_now;

/// Concurrent map holding the latest result per check.
///
/// Locks are never held across an await point, writers and readers only
/// contend for the duration of a map operation. Last write wins per key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    results: RwLock<HashMap<String, Arc<CheckResult>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, result: Arc<CheckResult>) {
        let mut results = self.results.write().unwrap_or_else(PoisonError::into_inner);
        results.insert(result.name.clone(), result);
    }

    pub fn get(&self, name: &str) -> Option<Arc<CheckResult>> {
        self.results.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Every stored result, sorted by check name
    pub fn list(&self) -> Vec<Arc<CheckResult>> {
        let mut results: Vec<_> =
            self.results.read().unwrap_or_else(PoisonError::into_inner).values().cloned().collect();
        results.sort_by(|a, b| a.name.cmp(&b.name));
        results
    }

    /// Drop results older than `ttl`, returns how many were removed
    pub fn purge(&self, ttl: Duration) -> usize {
        let oldest = unix_now().saturating_sub(ttl.as_secs());
        let mut results = self.results.write().unwrap_or_else(PoisonError::into_inner);
        let before = results.len();
        results.retain(|_, result| result.timestamp >= oldest);
        before - results.len()
    }

    /// Purge every `ttl` until `token` is cancelled
    pub fn spawn_purge(self: Arc<Self>, ttl: Duration, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(ttl);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {
                        let purged = self.purge(ttl);
                        if purged > 0 {
                            debug!(purged, "Purged expired results");
                        }
                    }
                }
            }
        })
    }
}
