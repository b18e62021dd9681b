use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::api::health::HealthState;
use crate::dates::eastern_today;
use crate::normalize::normalize_score;
use crate::types::Game;
use crate::upstream::ScoreSource;

struct CachedSnapshot {
    fetched_at: Instant,
    games: Arc<Vec<Game>>,
}

/// Produces today's normalized games. Failures never escape: callers see an
/// empty snapshot, indistinguishable from a day without games.
pub struct SnapshotProvider<S> {
    source: S,
    revalidate: Duration,
    /// Only ever locked to read or swap the value, never across a fetch.
    cache: RwLock<Option<CachedSnapshot>>,
    /// Held by the one request revalidating the cache.
    refresh: Mutex<()>,
    health: Arc<HealthState>,
}

impl<S: ScoreSource> SnapshotProvider<S> {
    pub fn new(source: S, revalidate: Duration, health: Arc<HealthState>) -> Self {
        Self {
            source,
            revalidate,
            cache: RwLock::new(None),
            refresh: Mutex::new(()),
            health,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch and normalize today's (Eastern) games, bypassing the cache.
    pub async fn todays_games(&self) -> Vec<Game> {
        let date = eastern_today();
        match self.source.score(&date).await {
            Ok(payload) => {
                let (games, stats) = normalize_score(&payload);
                info!(
                    date = %date,
                    games = games.len(),
                    defaulted = stats.defaulted,
                    rejected = stats.rejected_not_object,
                    "Fetched today's games"
                );
                self.health.record_snapshot(games.len());
                games
            }
            Err(e) => {
                error!(date = %date, "Error fetching today's games: {e}");
                self.health.inc_upstream_failures();
                Vec::new()
            }
        }
    }

    /// Today's games, re-fetched at most once per revalidation window.
    ///
    /// While one request revalidates, others get the stale snapshot if there
    /// is one; only a cold cache makes them wait for the fetch.
    pub async fn cached_todays_games(&self) -> Arc<Vec<Game>> {
        let stale = match self.cached().await {
            Some((games, true)) => return games,
            Some((games, false)) => Some(games),
            None => None,
        };

        let _refreshing = match (self.refresh.try_lock(), stale) {
            (Ok(guard), _) => guard,
            (Err(_), Some(games)) => {
                debug!("Snapshot revalidation in progress, serving stale games");
                return games;
            }
            (Err(_), None) => self.refresh.lock().await,
        };
        // Another request may have refreshed while we waited for the guard.
        if let Some((games, true)) = self.cached().await {
            return games;
        }

        let games = Arc::new(self.todays_games().await);
        *self.cache.write().await = Some(CachedSnapshot {
            fetched_at: Instant::now(),
            games: Arc::clone(&games),
        });
        games
    }

    /// Cached games and whether they are still inside the window.
    async fn cached(&self) -> Option<(Arc<Vec<Game>>, bool)> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .map(|c| (Arc::clone(&c.games), c.fetched_at.elapsed() < self.revalidate))
    }

    /// Seconds since the cached snapshot was fetched, if there is one.
    pub async fn cache_age_secs(&self) -> Option<u64> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|c| c.fetched_at.elapsed().as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio::time::timeout;

    /// Score source returning a fixed payload, or failing when `payload` is None.
    struct FakeScores {
        payload: Option<Value>,
        calls: AtomicUsize,
        dates: std::sync::Mutex<Vec<String>>,
    }

    impl FakeScores {
        fn new(payload: Option<Value>) -> Self {
            Self {
                payload,
                calls: AtomicUsize::new(0),
                dates: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn ok(payload: Value) -> Self {
            Self::new(Some(payload))
        }

        fn failing() -> Self {
            Self::new(None)
        }
    }

    #[async_trait]
    impl ScoreSource for FakeScores {
        async fn score(&self, date: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.dates.lock().unwrap().push(date.to_string());
            self.payload.clone().ok_or(AppError::Upstream {
                status: 503,
                url: "fake://score".to_string(),
            })
        }
    }

    /// Answers the first `answered` calls, then never returns. Signals
    /// `stalled` when a call starts hanging.
    struct StallingScores {
        answered: usize,
        calls: AtomicUsize,
        stalled: Notify,
    }

    impl StallingScores {
        fn after(answered: usize) -> Self {
            Self {
                answered,
                calls: AtomicUsize::new(0),
                stalled: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl ScoreSource for StallingScores {
        async fn score(&self, _date: &str) -> Result<Value> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.answered {
                return Ok(json!({"games": [{"id": 2025020001}]}));
            }
            self.stalled.notify_one();
            std::future::pending().await
        }
    }

    fn provider(source: FakeScores) -> SnapshotProvider<FakeScores> {
        SnapshotProvider::new(source, Duration::from_secs(60), Arc::new(HealthState::new()))
    }

    #[tokio::test]
    async fn upstream_failure_yields_empty() {
        let p = provider(FakeScores::failing());
        assert!(p.todays_games().await.is_empty());
        assert_eq!(p.health.upstream_failures(), 1);
    }

    #[tokio::test]
    async fn normalizes_upstream_payload() {
        let p = provider(FakeScores::ok(json!({
            "games": [{"id": 2025020001, "gameState": "LIVE"}]
        })));
        let games = p.todays_games().await;
        assert_eq!(games.len(), 1);
        assert!(games[0].is_live());
        assert_eq!(p.health.last_snapshot_games(), 1);
    }

    #[tokio::test]
    async fn asks_upstream_for_the_eastern_date() {
        let p = provider(FakeScores::ok(json!({"games": []})));
        let before = eastern_today();
        p.todays_games().await;
        let after = eastern_today();

        let dates = p.source().dates.lock().unwrap().clone();
        assert_eq!(dates.len(), 1);
        // Tolerates the call straddling Eastern midnight.
        assert!(dates[0] == before || dates[0] == after, "asked for {}", dates[0]);
    }

    #[tokio::test]
    async fn cache_serves_within_window_and_refresh_bypasses_it() {
        let p = provider(FakeScores::ok(json!({"games": [{"id": 2025020001}]})));
        let first = p.cached_todays_games().await;
        let second = p.cached_todays_games().await;
        assert_eq!(first.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(p.source().calls.load(Ordering::SeqCst), 1);

        p.todays_games().await;
        assert_eq!(p.source().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_cache_is_refetched() {
        let p = SnapshotProvider::new(
            FakeScores::ok(json!({"games": []})),
            Duration::ZERO,
            Arc::new(HealthState::new()),
        );
        p.cached_todays_games().await;
        p.cached_todays_games().await;
        assert_eq!(p.source().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_age_answers_while_a_fetch_hangs() {
        let p = Arc::new(SnapshotProvider::new(
            StallingScores::after(0),
            Duration::from_secs(60),
            Arc::new(HealthState::new()),
        ));
        let pending = tokio::spawn({
            let p = Arc::clone(&p);
            async move { p.cached_todays_games().await }
        });
        p.source().stalled.notified().await;

        let age = timeout(Duration::from_secs(2), p.cache_age_secs()).await;
        assert_eq!(age.ok(), Some(None));
        pending.abort();
    }

    #[tokio::test]
    async fn stale_snapshot_is_served_during_revalidation() {
        let p = Arc::new(SnapshotProvider::new(
            StallingScores::after(1),
            Duration::ZERO,
            Arc::new(HealthState::new()),
        ));
        let first = p.cached_todays_games().await;
        assert_eq!(first.len(), 1);

        let revalidating = tokio::spawn({
            let p = Arc::clone(&p);
            async move { p.cached_todays_games().await }
        });
        p.source().stalled.notified().await;

        let served = timeout(Duration::from_secs(2), p.cached_todays_games())
            .await
            .expect("stale snapshot was not served");
        assert!(Arc::ptr_eq(&first, &served));
        assert!(timeout(Duration::from_secs(2), p.cache_age_secs()).await.is_ok());
        revalidating.abort();
    }
}
