//! Single-game detail: boxscore, landing and head-to-head odds. Each section
//! is fetched and parsed independently; a failure leaves only that section
//! empty.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::dates::utc_date_of;
use crate::normalize::{select_game_odds, HeadToHeadOdds};
use crate::upstream::GameCenterSource;

/// Forwards shown per team in the boxscore summary.
const TOP_FORWARDS: usize = 6;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDetail {
    pub boxscore: Option<BoxscoreSummary>,
    pub landing: Option<LandingSummary>,
    pub odds: Option<HeadToHeadOdds>,
}

// ---------------------------------------------------------------------------
// Upstream shapes (only the fields we display)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Localized {
    #[serde(default)]
    pub default: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clock {
    #[serde(default)]
    pub time_remaining: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub in_intermission: bool,
}

#[derive(Debug, Deserialize)]
struct PeriodDescriptor {
    number: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBoxscoreTeam {
    #[serde(default)]
    abbrev: String,
    common_name: Option<Localized>,
    place_name: Option<Localized>,
    score: Option<u32>,
    sog: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTeamPlayers {
    #[serde(default)]
    forwards: Vec<SkaterLine>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlayerByGameStats {
    #[serde(default)]
    away_team: RawTeamPlayers,
    #[serde(default)]
    home_team: RawTeamPlayers,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBoxscore {
    id: i64,
    #[serde(default)]
    game_date: String,
    #[serde(default)]
    game_state: String,
    venue: Option<Localized>,
    period_descriptor: Option<PeriodDescriptor>,
    clock: Option<Clock>,
    #[serde(default)]
    away_team: RawBoxscoreTeam,
    #[serde(default)]
    home_team: RawBoxscoreTeam,
    #[serde(default)]
    player_by_game_stats: RawPlayerByGameStats,
}

// ---------------------------------------------------------------------------
// Boxscore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkaterLine {
    #[serde(default)]
    pub sweater_number: Option<u32>,
    #[serde(default)]
    pub name: Localized,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub toi: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxscoreTeam {
    pub abbrev: String,
    pub name: String,
    pub score: Option<u32>,
    pub shots_on_goal: Option<u32>,
    pub top_forwards: Vec<SkaterLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxscoreSummary {
    pub id: i64,
    pub game_date: String,
    pub game_state: String,
    pub venue: Option<String>,
    pub period: Option<u32>,
    pub clock: Option<Clock>,
    pub away_team: BoxscoreTeam,
    pub home_team: BoxscoreTeam,
}

impl BoxscoreSummary {
    pub fn from_value(v: Value) -> Option<Self> {
        let raw: RawBoxscore = match serde_json::from_value(v) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Unexpected boxscore shape: {e}");
                return None;
            }
        };
        let team = |t: RawBoxscoreTeam, players: RawTeamPlayers| {
            let name = [t.place_name, t.common_name]
                .into_iter()
                .flatten()
                .map(|n| n.default)
                .collect::<Vec<_>>()
                .join(" ");
            BoxscoreTeam {
                abbrev: t.abbrev,
                name: name.trim().to_string(),
                score: t.score,
                shots_on_goal: t.sog,
                top_forwards: players.forwards.into_iter().take(TOP_FORWARDS).collect(),
            }
        };
        Some(Self {
            id: raw.id,
            game_date: raw.game_date,
            game_state: raw.game_state,
            venue: raw.venue.map(|v| v.default),
            period: raw.period_descriptor.and_then(|p| p.number),
            clock: raw.clock,
            away_team: team(raw.away_team, raw.player_by_game_stats.away_team),
            home_team: team(raw.home_team, raw.player_by_game_stats.home_team),
        })
    }
}

// ---------------------------------------------------------------------------
// Landing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawBroadcast {
    network: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLandingTeam {
    #[serde(default)]
    abbrev: String,
    logo: Option<String>,
    record: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLeader {
    name: Option<Localized>,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLeaderRow {
    #[serde(default)]
    category: String,
    away_leader: Option<RawLeader>,
    home_leader: Option<RawLeader>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSkaterComparison {
    #[serde(default)]
    leaders: Vec<RawLeaderRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGoalieSide {
    team_totals: Option<GoalieTotals>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGoalieComparison {
    home_team: Option<RawGoalieSide>,
    away_team: Option<RawGoalieSide>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMatchup {
    #[serde(default)]
    skater_comparison: RawSkaterComparison,
    #[serde(default)]
    goalie_comparison: RawGoalieComparison,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLanding {
    #[serde(default)]
    game_state: String,
    #[serde(rename = "startTimeUTC")]
    start_time_utc: Option<String>,
    venue: Option<Localized>,
    #[serde(default)]
    tv_broadcasts: Vec<RawBroadcast>,
    #[serde(default)]
    away_team: RawLandingTeam,
    #[serde(default)]
    home_team: RawLandingTeam,
    #[serde(default)]
    matchup: RawMatchup,
    tickets_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalieTotals {
    pub record: Option<String>,
    pub gaa: Option<f64>,
    pub save_pctg: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingTeam {
    pub abbrev: String,
    pub logo: Option<String>,
    pub record: Option<String>,
    pub goalie_totals: Option<GoalieTotals>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderLine {
    pub category: String,
    pub away_name: Option<String>,
    pub away_value: Option<f64>,
    pub home_name: Option<String>,
    pub home_value: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingSummary {
    pub game_state: String,
    pub start_time_utc: Option<String>,
    pub venue: Option<String>,
    /// Network names; empty means TBD.
    pub broadcasts: Vec<String>,
    pub away_team: LandingTeam,
    pub home_team: LandingTeam,
    pub leaders: Vec<LeaderLine>,
    pub tickets_link: Option<String>,
}

impl LandingSummary {
    pub fn from_value(v: Value) -> Option<Self> {
        let raw: RawLanding = match serde_json::from_value(v) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Unexpected landing shape: {e}");
                return None;
            }
        };
        let totals = |side: Option<RawGoalieSide>| side.and_then(|s| s.team_totals);
        let goalies = raw.matchup.goalie_comparison;
        let leader = |l: Option<RawLeader>| match l {
            Some(l) => (l.name.map(|n| n.default), l.value),
            None => (None, None),
        };

        Some(Self {
            game_state: raw.game_state,
            start_time_utc: raw.start_time_utc,
            venue: raw.venue.map(|v| v.default),
            broadcasts: raw
                .tv_broadcasts
                .into_iter()
                .filter_map(|b| b.network)
                .filter(|n| !n.is_empty())
                .collect(),
            away_team: LandingTeam {
                abbrev: raw.away_team.abbrev,
                logo: raw.away_team.logo,
                record: raw.away_team.record,
                goalie_totals: totals(goalies.away_team),
            },
            home_team: LandingTeam {
                abbrev: raw.home_team.abbrev,
                logo: raw.home_team.logo,
                record: raw.home_team.record,
                goalie_totals: totals(goalies.home_team),
            },
            leaders: raw
                .matchup
                .skater_comparison
                .leaders
                .into_iter()
                .map(|row| {
                    let (away_name, away_value) = leader(row.away_leader);
                    let (home_name, home_value) = leader(row.home_leader);
                    LeaderLine {
                        category: row.category,
                        away_name,
                        away_value,
                        home_name,
                        home_value,
                    }
                })
                .collect(),
            tickets_link: raw.tickets_link,
        })
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

pub async fn fetch_boxscore<C: GameCenterSource>(source: &C, game_id: i64) -> Option<BoxscoreSummary> {
    match source.boxscore(game_id).await {
        Ok(v) => BoxscoreSummary::from_value(v),
        Err(e) => {
            warn!(game_id, "Boxscore unavailable: {e}");
            None
        }
    }
}

async fn fetch_landing<C: GameCenterSource>(source: &C, game_id: i64) -> Option<LandingSummary> {
    match source.landing(game_id).await {
        Ok(v) => LandingSummary::from_value(v),
        Err(e) => {
            warn!(game_id, "Landing unavailable: {e}");
            None
        }
    }
}

/// Head-to-head odds from the score feed of the game's UTC start day.
async fn fetch_odds<C: GameCenterSource>(
    source: &C,
    game_id: i64,
    start_time_utc: &str,
) -> Option<HeadToHeadOdds> {
    let date = utc_date_of(start_time_utc)?;
    match source.score(&date).await {
        Ok(payload) => select_game_odds(&payload, &game_id.to_string()),
        Err(e) => {
            warn!(game_id, date = %date, "Odds unavailable: {e}");
            None
        }
    }
}

/// All detail sections for one game. Never fails; missing sections are `None`.
pub async fn fetch_game_detail<C: GameCenterSource>(source: &C, game_id: i64) -> GameDetail {
    let (boxscore, landing) = tokio::join!(
        fetch_boxscore(source, game_id),
        fetch_landing(source, game_id)
    );
    let start = landing
        .as_ref()
        .and_then(|l| l.start_time_utc.clone())
        .or_else(|| boxscore.as_ref().map(|b| b.game_date.clone()));
    let odds = match start {
        Some(start) => fetch_odds(source, game_id, &start).await,
        None => None,
    };
    GameDetail {
        boxscore,
        landing,
        odds,
    }
}
