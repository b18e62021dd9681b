use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::api::latency::LatencyStats;
use crate::error::{AppError, Result};

/// Source of raw `/score/{date}` payloads. The snapshot provider depends on
/// this rather than on [`NhlClient`] directly.
#[async_trait]
pub trait ScoreSource: Send + Sync {
    /// Raw score payload for one `YYYY-MM-DD` date.
    async fn score(&self, date: &str) -> Result<Value>;
}

/// Per-game reads used by the game detail view.
#[async_trait]
pub trait GameCenterSource: ScoreSource {
    async fn boxscore(&self, game_id: i64) -> Result<Value>;
    async fn landing(&self, game_id: i64) -> Result<Value>;
}

/// Thin client for the NHL web API. Every call is a single GET: no retries,
/// no timeout beyond the transport default.
#[derive(Clone)]
pub struct NhlClient {
    base_url: String,
    client: reqwest::Client,
    latency: Arc<LatencyStats>,
}

impl NhlClient {
    pub fn new(base_url: impl Into<String>, latency: Arc<LatencyStats>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            latency,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `{base}{path}` and decode the JSON body. Non-2xx is an error.
    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let started = Instant::now();
        let resp = self.client.get(&url).send().await;
        self.latency.record(started.elapsed());

        let resp = resp?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                status: status.as_u16(),
                url,
            });
        }
        let body: Value = resp.json().await?;
        debug!(url = %url, elapsed_ms = started.elapsed().as_millis() as u64, "NHL API GET ok");
        Ok(body)
    }

    /// Team list (`/team`), unwrapped from `data`.
    pub async fn teams(&self) -> Result<Value> {
        let body = self.get_json("/team").await?;
        Ok(unwrap_array(body, "data"))
    }

    /// Current standings (`/standings/now`), unwrapped from `standings`.
    pub async fn standings_now(&self) -> Result<Value> {
        let body = self.get_json("/standings/now").await?;
        Ok(unwrap_array(body, "standings"))
    }

    /// Regular-season summary row for one team, or `null` when the team is absent.
    pub async fn team_summary(&self, team_id: i64, season: &str) -> Result<Value> {
        let path = format!(
            "/team/summary?cayenneExp=seasonId={season}%20and%20gameTypeId=2&sort=points&dir=DESC"
        );
        let body = self.get_json(&path).await?;
        Ok(find_team_row(&body, team_id))
    }

    /// Top ten regular-season skaters for a stat category.
    pub async fn skater_leaders(&self, stat: &str, season: &str) -> Result<Value> {
        let path = format!(
            "/leaders/skaters/{stat}?cayenneExp=seasonId={season}%20and%20gameTypeId=2&limit=10"
        );
        let body = self.get_json(&path).await?;
        Ok(unwrap_array(body, "data"))
    }

    pub async fn play_by_play(&self, game_id: i64) -> Result<Value> {
        self.get_json(&format!("/gamecenter/{game_id}/play-by-play")).await
    }

    /// Schedule between two `YYYY-MM-DD` dates, unwrapped from `gameWeek`.
    pub async fn schedule(&self, start: &str, end: &str) -> Result<Value> {
        let path = format!("/schedule?startDate={start}&endDate={end}");
        let body = self.get_json(&path).await?;
        Ok(unwrap_array(body, "gameWeek"))
    }
}

#[async_trait]
impl ScoreSource for NhlClient {
    async fn score(&self, date: &str) -> Result<Value> {
        self.get_json(&format!("/score/{date}")).await
    }
}

#[async_trait]
impl GameCenterSource for NhlClient {
    async fn boxscore(&self, game_id: i64) -> Result<Value> {
        self.get_json(&format!("/gamecenter/{game_id}/boxscore")).await
    }

    async fn landing(&self, game_id: i64) -> Result<Value> {
        self.get_json(&format!("/gamecenter/{game_id}/landing")).await
    }
}

/// `body[field]` when it is an array, else `[]`.
fn unwrap_array(mut body: Value, field: &str) -> Value {
    match body.get_mut(field).map(Value::take) {
        Some(v @ Value::Array(_)) => v,
        _ => Value::Array(Vec::new()),
    }
}

fn find_team_row(body: &Value, team_id: i64) -> Value {
    body.get("data")
        .and_then(Value::as_array)
        .and_then(|rows| {
            rows.iter()
                .find(|row| row.get("teamId").and_then(Value::as_i64) == Some(team_id))
        })
        .cloned()
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwrap_array_defaults_to_empty() {
        assert_eq!(unwrap_array(json!({"data": [1, 2]}), "data"), json!([1, 2]));
        assert_eq!(unwrap_array(json!({"data": {"x": 1}}), "data"), json!([]));
        assert_eq!(unwrap_array(json!({}), "data"), json!([]));
    }

    #[test]
    fn find_team_row_matches_team_id() {
        let body = json!({"data": [{"teamId": 6, "points": 50}, {"teamId": 10, "points": 44}]});
        assert_eq!(find_team_row(&body, 10)["points"], 44);
        assert_eq!(find_team_row(&body, 99), Value::Null);
        assert_eq!(find_team_row(&json!({}), 6), Value::Null);
    }

    #[tokio::test]
    async fn unreachable_host_is_an_http_error() {
        let client = NhlClient::new("http://127.0.0.1:9", Arc::new(LatencyStats::new())).unwrap();
        let err = client.score("2025-10-16").await.unwrap_err();
        assert!(matches!(err, AppError::Http(_)), "got {err}");
    }
}
