//! Shared health state for the /health endpoint.
//! Updated by the snapshot provider, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared health counters.
#[derive(Default)]
pub struct HealthState {
    /// Unix seconds of the last snapshot fetch that reached the upstream (0 = none).
    last_snapshot_at: AtomicU64,
    /// Game count of that snapshot.
    last_snapshot_games: AtomicU64,
    /// Snapshot fetches that failed and were served as empty.
    upstream_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_snapshot(&self, games: usize) {
        self.last_snapshot_at.store(now_secs(), Ordering::Relaxed);
        self.last_snapshot_games.store(games as u64, Ordering::Relaxed);
    }

    pub fn inc_upstream_failures(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_snapshot_at(&self) -> u64 {
        self.last_snapshot_at.load(Ordering::Relaxed)
    }

    pub fn last_snapshot_games(&self) -> u64 {
        self.last_snapshot_games.load(Ordering::Relaxed)
    }

    pub fn upstream_failures(&self) -> u64 {
        self.upstream_failures.load(Ordering::Relaxed)
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
