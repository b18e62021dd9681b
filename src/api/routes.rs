use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::dates::eastern_today;
use crate::detail::{fetch_boxscore, fetch_game_detail, GameDetail};
use crate::error::{ErrorBody, Result};
use crate::snapshot::SnapshotProvider;
use crate::types::GamesResponse;
use crate::upstream::{GameCenterSource, NhlClient};

/// Body of a failed refresh.
pub const REFRESH_FAILED: &str = "Failed to load today's games";

pub struct ApiState<C> {
    pub provider: Arc<SnapshotProvider<C>>,
    /// Forwarded league reads (teams, standings, leaders, schedule).
    pub nhl: NhlClient,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub season: String,
    pub started_at: Instant,
}

impl<C> Clone for ApiState<C> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            nhl: self.nhl.clone(),
            health: Arc::clone(&self.health),
            latency: Arc::clone(&self.latency),
            season: self.season.clone(),
            started_at: self.started_at,
        }
    }
}

pub fn router<C: GameCenterSource + 'static>(state: ApiState<C>) -> Router {
    Router::new()
        .route("/api/nhl/todays-games", get(get_todays_games::<C>))
        .route("/api/nhl/snapshot", get(get_snapshot::<C>))
        .route("/api/nhl/games/:id", get(get_game_detail::<C>))
        .route("/api/nhl/games/:id/boxscore", get(get_boxscore::<C>))
        .route("/api/nhl/games/:id/play-by-play", get(get_play_by_play::<C>))
        .route("/api/nhl/teams", get(get_teams::<C>))
        .route("/api/nhl/teams/:id/stats", get(get_team_stats::<C>))
        .route("/api/nhl/standings", get(get_standings::<C>))
        .route("/api/nhl/leaders/:stat", get(get_leaders::<C>))
        .route("/api/nhl/schedule", get(get_schedule::<C>))
        .route("/health", get(get_health::<C>))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ScheduleQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    /// Unix seconds of the last upstream snapshot fetch.
    pub last_snapshot_at: Option<u64>,
    pub last_snapshot_games: u64,
    pub snapshot_cache_age_secs: Option<u64>,
    pub upstream_failures: u64,
    pub upstream_p50_ms: Option<f64>,
    pub upstream_p95_ms: Option<f64>,
    pub upstream_p99_ms: Option<f64>,
    pub upstream_samples: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Always-fresh snapshot. Upstream failures already degrade to an empty
/// list; only producing the body itself can fail here.
async fn get_todays_games<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
) -> Response {
    let body = GamesResponse {
        games: state.provider.todays_games().await,
    };
    match serde_json::to_vec(&body) {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!("Error encoding today's games: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CACHE_CONTROL, "no-store")],
                Json(ErrorBody {
                    error: REFRESH_FAILED.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn get_snapshot<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
) -> Json<GamesResponse> {
    let games = state.provider.cached_todays_games().await;
    Json(GamesResponse {
        games: games.as_ref().clone(),
    })
}

async fn get_game_detail<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
    Path(game_id): Path<i64>,
) -> Json<GameDetail> {
    Json(fetch_game_detail(state.provider.source(), game_id).await)
}

async fn get_boxscore<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
    Path(game_id): Path<i64>,
) -> Response {
    match fetch_boxscore(state.provider.source(), game_id).await {
        Some(boxscore) => Json(boxscore).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("Boxscore not found for game {game_id}"),
            }),
        )
            .into_response(),
    }
}

async fn get_play_by_play<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
    Path(game_id): Path<i64>,
) -> Json<Value> {
    forwarded("play-by-play", state.nhl.play_by_play(game_id).await, Value::Null)
}

async fn get_teams<C: GameCenterSource + 'static>(State(state): State<ApiState<C>>) -> Json<Value> {
    forwarded("teams", state.nhl.teams().await, empty_array())
}

async fn get_team_stats<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
    Path(team_id): Path<i64>,
) -> Json<Value> {
    forwarded(
        "team stats",
        state.nhl.team_summary(team_id, &state.season).await,
        Value::Null,
    )
}

async fn get_standings<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
) -> Json<Value> {
    forwarded("standings", state.nhl.standings_now().await, empty_array())
}

async fn get_leaders<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
    Path(stat): Path<String>,
) -> Json<Value> {
    // Interpolated into the upstream path.
    if stat.is_empty() || !stat.chars().all(|c| c.is_ascii_alphanumeric()) {
        warn!(stat = %stat, "Rejected leader category");
        return Json(empty_array());
    }
    forwarded(
        "skater leaders",
        state.nhl.skater_leaders(&stat, &state.season).await,
        empty_array(),
    )
}

/// `start` defaults to today (Eastern), `end` to `start`.
async fn get_schedule<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
    Query(params): Query<ScheduleQuery>,
) -> Json<Value> {
    let start = params.start.unwrap_or_else(eastern_today);
    let end = params.end.unwrap_or_else(|| start.clone());
    if !is_calendar_date(&start) || !is_calendar_date(&end) {
        warn!(start = %start, end = %end, "Rejected schedule range");
        return Json(empty_array());
    }
    forwarded("schedule", state.nhl.schedule(&start, &end).await, empty_array())
}

async fn get_health<C: GameCenterSource + 'static>(
    State(state): State<ApiState<C>>,
) -> Json<HealthResponse> {
    let (p50, p95, p99) = state.latency.percentiles_ms();
    let last_snapshot_at = state.health.last_snapshot_at();
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        last_snapshot_at: (last_snapshot_at > 0).then_some(last_snapshot_at),
        last_snapshot_games: state.health.last_snapshot_games(),
        snapshot_cache_age_secs: state.provider.cache_age_secs().await,
        upstream_failures: state.health.upstream_failures(),
        upstream_p50_ms: p50,
        upstream_p95_ms: p95,
        upstream_p99_ms: p99,
        upstream_samples: state.latency.len(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn forwarded(what: &str, result: Result<Value>, fallback: Value) -> Json<Value> {
    match result {
        Ok(v) => Json(v),
        Err(e) => {
            error!("Error fetching {what}: {e}");
            Json(fallback)
        }
    }
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn is_calendar_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::upstream::ScoreSource;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    /// Score payload per call; game-center reads answer from fixed values.
    struct FakeLeague {
        score: Option<Value>,
        boxscore: Option<Value>,
    }

    fn unavailable() -> AppError {
        AppError::Upstream {
            status: 503,
            url: "fake://nhl".to_string(),
        }
    }

    #[async_trait]
    impl ScoreSource for FakeLeague {
        async fn score(&self, _date: &str) -> Result<Value> {
            self.score.clone().ok_or_else(unavailable)
        }
    }

    #[async_trait]
    impl GameCenterSource for FakeLeague {
        async fn boxscore(&self, _game_id: i64) -> Result<Value> {
            self.boxscore.clone().ok_or_else(unavailable)
        }

        async fn landing(&self, _game_id: i64) -> Result<Value> {
            Err(unavailable())
        }
    }

    /// Every upstream read hangs; `stalled` fires when one starts.
    struct StalledLeague {
        stalled: Arc<Notify>,
    }

    #[async_trait]
    impl ScoreSource for StalledLeague {
        async fn score(&self, _date: &str) -> Result<Value> {
            self.stalled.notify_one();
            std::future::pending().await
        }
    }

    #[async_trait]
    impl GameCenterSource for StalledLeague {
        async fn boxscore(&self, _game_id: i64) -> Result<Value> {
            std::future::pending().await
        }

        async fn landing(&self, _game_id: i64) -> Result<Value> {
            std::future::pending().await
        }
    }

    fn app<C: GameCenterSource + 'static>(source: C) -> Router {
        let health = Arc::new(HealthState::new());
        let latency = Arc::new(LatencyStats::new());
        // Nothing listens on the discard port, so forwarded reads fail fast.
        let nhl = NhlClient::new("http://127.0.0.1:9", Arc::clone(&latency)).unwrap();
        router(ApiState {
            provider: Arc::new(SnapshotProvider::new(
                source,
                Duration::from_secs(60),
                Arc::clone(&health),
            )),
            nhl,
            health,
            latency,
            season: "20252026".to_string(),
            started_at: Instant::now(),
        })
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, header::HeaderMap, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn todays_games_is_uncached_json() {
        let source = FakeLeague {
            score: Some(json!({"games": [{"id": 2025020001, "gameState": "FUT"}]})),
            boxscore: None,
        };
        let (status, headers, body) = get(app(source), "/api/nhl/todays-games").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(body["games"][0]["id"], 2025020001);
        assert_eq!(body["games"][0]["status"], "Scheduled");
    }

    #[tokio::test]
    async fn todays_games_is_empty_when_upstream_is_down() {
        let source = FakeLeague {
            score: None,
            boxscore: None,
        };
        let (status, headers, body) = get(app(source), "/api/nhl/todays-games").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(body, json!({"games": []}));
    }

    #[tokio::test]
    async fn snapshot_wraps_games() {
        let source = FakeLeague {
            score: Some(json!({"games": [{"id": 2025020002}]})),
            boxscore: None,
        };
        let (status, _, body) = get(app(source), "/api/nhl/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["games"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn missing_boxscore_is_not_found() {
        let source = FakeLeague {
            score: None,
            boxscore: None,
        };
        let (status, _, body) = get(app(source), "/api/nhl/games/2025020001/boxscore").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("2025020001"));
    }

    #[tokio::test]
    async fn detail_sections_degrade_to_null() {
        let source = FakeLeague {
            score: None,
            boxscore: Some(json!({
                "id": 2025020001,
                "gameDate": "2025-10-16",
                "gameState": "FINAL",
                "awayTeam": {"abbrev": "TOR", "score": 3},
                "homeTeam": {"abbrev": "BOS", "score": 2}
            })),
        };
        let (status, _, body) = get(app(source), "/api/nhl/games/2025020001").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["boxscore"]["awayTeam"]["score"], 3);
        assert_eq!(body["landing"], Value::Null);
        assert_eq!(body["odds"], Value::Null);
    }

    #[tokio::test]
    async fn forwarded_reads_fall_back_when_upstream_fails() {
        let fake = || FakeLeague {
            score: None,
            boxscore: None,
        };
        assert_eq!(get(app(fake()), "/api/nhl/teams").await.2, json!([]));
        assert_eq!(get(app(fake()), "/api/nhl/standings").await.2, json!([]));
        assert_eq!(get(app(fake()), "/api/nhl/leaders/goals").await.2, json!([]));
        assert_eq!(get(app(fake()), "/api/nhl/teams/6/stats").await.2, Value::Null);
        assert_eq!(
            get(app(fake()), "/api/nhl/games/2025020001/play-by-play").await.2,
            Value::Null
        );
        assert_eq!(
            get(app(fake()), "/api/nhl/schedule?start=2025-10-13&end=2025-10-19").await.2,
            json!([])
        );
    }

    #[tokio::test]
    async fn malformed_schedule_range_is_rejected() {
        let source = FakeLeague {
            score: None,
            boxscore: None,
        };
        let (status, _, body) = get(app(source), "/api/nhl/schedule?start=next-week").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn health_reports_snapshot_state() {
        let source = FakeLeague {
            score: Some(json!({"games": [{"id": 1}, {"id": 2}]})),
            boxscore: None,
        };
        let app = app(source);
        get(app.clone(), "/api/nhl/snapshot").await;
        let (status, _, body) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = serde_json::from_value(body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.last_snapshot_games, 2);
        assert!(health.last_snapshot_at.is_some());
        assert_eq!(health.snapshot_cache_age_secs, Some(0));
        assert_eq!(health.upstream_failures, 0);
    }

    #[tokio::test]
    async fn health_answers_while_snapshot_waits_on_upstream() {
        let stalled = Arc::new(Notify::new());
        let app = app(StalledLeague {
            stalled: Arc::clone(&stalled),
        });
        let snapshot = tokio::spawn(get(app.clone(), "/api/nhl/snapshot"));
        stalled.notified().await;

        let (status, _, body) = tokio::time::timeout(Duration::from_secs(2), get(app, "/health"))
            .await
            .expect("/health blocked behind the snapshot fetch");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["snapshot_cache_age_secs"], Value::Null);
        snapshot.abort();
    }
}
