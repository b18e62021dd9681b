//! Maps raw `/score/{date}` payloads into [`Game`] values.
//!
//! The upstream schema drifts between seasons (renamed ids, optional team
//! blocks, string-typed numbers), so every field is read defensively and
//! falls back to a default instead of failing the whole snapshot.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dates::parse_timestamp;
use crate::types::{Game, GameStatus, OddsLine, OddsPartner, Team};

/// Counters from one normalization pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizeStats {
    pub api_total: usize,
    pub parsed: usize,
    /// Parsed games where at least one field fell back to a default.
    pub defaulted: usize,
    pub rejected_not_object: usize,
}

/// A game record that parsed, with the fields that had to be defaulted.
#[derive(Debug, Clone)]
pub struct ParsedGame {
    pub game: Game,
    pub defaulted: Vec<&'static str>,
}

/// Why a raw record could not be turned into a game at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotAnObject,
}

/// Normalize a full score payload. Never fails: a malformed payload
/// degrades to fewer (or zero) games.
pub fn normalize_score(payload: &Value) -> (Vec<Game>, NormalizeStats) {
    let partners = parse_partners(payload);
    let raw_games = payload
        .get("games")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut stats = NormalizeStats {
        api_total: raw_games.len(),
        ..Default::default()
    };
    let mut games = Vec::with_capacity(raw_games.len());

    for raw in raw_games {
        match parse_game_checked(raw, &partners) {
            Ok(parsed) => {
                if !parsed.defaulted.is_empty() {
                    stats.defaulted += 1;
                    debug!(game_id = parsed.game.id, fields = ?parsed.defaulted, "game fields defaulted");
                }
                stats.parsed += 1;
                games.push(parsed.game);
            }
            Err(Rejection::NotAnObject) => {
                stats.rejected_not_object += 1;
            }
        }
    }

    if stats.rejected_not_object > 0 {
        warn!(
            rejected = stats.rejected_not_object,
            total = stats.api_total,
            "Skipped game records that were not JSON objects"
        );
    }

    (games, stats)
}

/// `oddsPartners` of a score payload; entries without a numeric id are skipped.
pub fn parse_partners(payload: &Value) -> Vec<OddsPartner> {
    payload
        .get("oddsPartners")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|p| {
                    Some(OddsPartner {
                        partner_id: p.get("partnerId").and_then(coerce_i64)?,
                        name: str_field(p, "name").unwrap_or_default().to_string(),
                        image_url: str_field(p, "imageUrl").map(str::to_string),
                        site_url: str_field(p, "siteUrl").map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse one raw game record.
pub fn parse_game_checked(
    v: &Value,
    partners: &[OddsPartner],
) -> Result<ParsedGame, Rejection> {
    if !v.is_object() {
        return Err(Rejection::NotAnObject);
    }
    let mut defaulted = Vec::new();

    let id = match pick_game_center_id(v) {
        Some(id) => id,
        None => {
            defaulted.push("id");
            fallback_timestamp_id(v)
        }
    };

    let game_date = match str_field(v, "startTimeUTC").or_else(|| str_field(v, "gameDate")) {
        Some(d) => d.to_string(),
        None => {
            defaulted.push("gameDate");
            Utc::now().to_rfc3339()
        }
    };

    let empty = Value::Null;
    let home = v.get("homeTeam").unwrap_or(&empty);
    let away = v.get("awayTeam").unwrap_or(&empty);
    if !home.is_object() {
        defaulted.push("homeTeam");
    }
    if !away.is_object() {
        defaulted.push("awayTeam");
    }

    let state = str_field(v, "gameState")
        .or_else(|| v.get("status").and_then(|s| str_field(s, "state")))
        .unwrap_or("Scheduled");

    let home_odds = parse_odds(home);
    let away_odds = parse_odds(away);
    let home_best_line = home_odds.as_deref().and_then(|l| pick_best_line(l, partners));
    let away_best_line = away_odds.as_deref().and_then(|l| pick_best_line(l, partners));

    let game = Game {
        id,
        game_date,
        home_team: parse_team(home, "Home"),
        away_team: parse_team(away, "Away"),
        status: GameStatus::from_state(state),
        home_score: parse_score(home),
        away_score: parse_score(away),
        home_odds,
        away_odds,
        odds_partners: partners.to_vec(),
        home_best_line,
        away_best_line,
    };

    Ok(ParsedGame { game, defaulted })
}

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Id candidates in precedence order, null/absent skipped.
fn id_candidates<'a>(v: &'a Value) -> impl Iterator<Item = &'a Value> + 'a {
    ["gameId", "id", "gamePk"]
        .into_iter()
        .filter_map(move |k| v.get(k))
        .filter(|c| !c.is_null())
}

/// First candidate that is a 10-digit game-center id, else the first
/// candidate if it is numeric.
pub fn pick_game_center_id(v: &Value) -> Option<i64> {
    for candidate in id_candidates(v) {
        let s = scalar_string(candidate);
        if s.len() == 10 && s.bytes().all(|b| b.is_ascii_digit()) {
            return s.parse().ok();
        }
    }
    id_candidates(v).next().and_then(coerce_i64)
}

/// Milliseconds since the epoch of the game's start. Not unique across
/// games sharing a start time; only used when upstream gives no usable id.
fn fallback_timestamp_id(v: &Value) -> i64 {
    match str_field(v, "startTimeUTC").or_else(|| str_field(v, "gameDate")) {
        Some(s) => parse_timestamp(s).map(|dt| dt.timestamp_millis()).unwrap_or(0),
        None => Utc::now().timestamp_millis(),
    }
}

// ---------------------------------------------------------------------------
// Teams and scores
// ---------------------------------------------------------------------------

fn parse_team(t: &Value, fallback_name: &str) -> Team {
    let name = t
        .get("commonName")
        .and_then(|n| str_field(n, "default"))
        .or_else(|| str_field(t, "teamName"))
        .or_else(|| str_field(t, "abbrev"))
        .unwrap_or(fallback_name);
    Team {
        id: t.get("id").and_then(coerce_i64).unwrap_or(0),
        name: name.to_string(),
        abbreviation: str_field(t, "abbrev")
            .or_else(|| str_field(t, "abbreviation"))
            .unwrap_or_default()
            .to_string(),
        city: t
            .get("placeName")
            .and_then(|p| str_field(p, "default"))
            .map(str::to_string),
    }
}

/// Only a JSON number that is a non-negative integer counts as a score.
fn parse_score(t: &Value) -> Option<u32> {
    let n = t.get("score")?;
    if let Some(u) = n.as_u64() {
        return u32::try_from(u).ok();
    }
    let f = n.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX)).then_some(f as u32)
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// `team.odds` when it is an array. Lines without a numeric provider id are dropped.
fn parse_odds(t: &Value) -> Option<Vec<OddsLine>> {
    let raw = t.get("odds")?.as_array()?;
    Some(
        raw.iter()
            .filter_map(|o| {
                Some(OddsLine {
                    provider_id: o.get("providerId").and_then(coerce_i64)?,
                    value: o.get("value").map(scalar_string).unwrap_or_default(),
                })
            })
            .collect(),
    )
}

/// Best display line for one side: DraftKings, then FanDuel, then the first
/// provider in upstream order. Empty values never count as a line.
pub fn pick_best_line(lines: &[OddsLine], partners: &[OddsPartner]) -> Option<String> {
    // provider id -> value; a later line from the same provider replaces the
    // value but keeps the provider's original position.
    let mut by_provider: Vec<(i64, &str)> = Vec::new();
    for line in lines.iter().filter(|l| !l.value.is_empty()) {
        match by_provider.iter_mut().find(|(id, _)| *id == line.provider_id) {
            Some(slot) => slot.1 = line.value.as_str(),
            None => by_provider.push((line.provider_id, line.value.as_str())),
        }
    }
    let (_, first) = by_provider.first()?;

    let preferred = ["draftkings", "fanduel"].into_iter().find_map(|wanted| {
        let partner = partners
            .iter()
            .find(|p| p.name.trim().to_lowercase() == wanted)?;
        by_provider
            .iter()
            .find(|(id, _)| *id == partner.partner_id)
            .map(|(_, v)| *v)
    });

    Some(preferred.unwrap_or(*first).to_string())
}

/// Head-to-head best lines for a single game.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadToHeadOdds {
    pub home_line: Option<String>,
    pub away_line: Option<String>,
    pub partners: Vec<OddsPartner>,
}

/// Best lines for the game in `payload` whose raw `id`, as a string, equals
/// `game_id`. First match wins; `None` when no game matches.
pub fn select_game_odds(payload: &Value, game_id: &str) -> Option<HeadToHeadOdds> {
    let partners = parse_partners(payload);
    let game = payload
        .get("games")
        .and_then(Value::as_array)?
        .iter()
        .find(|g| g.get("id").map(scalar_string).as_deref() == Some(game_id))?;

    let empty = Value::Null;
    let side = |key: &str| {
        parse_odds(game.get(key).unwrap_or(&empty))
            .and_then(|lines| pick_best_line(&lines, &partners))
    };
    Some(HeadToHeadOdds {
        home_line: side("homeTeam"),
        away_line: side("awayTeam"),
        partners,
    })
}

// ---------------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------------

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

/// Integer from a JSON number or a numeric string (`"2025020001"`, `" 7 "`).
fn coerce_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String form of a scalar: strings as-is, numbers and booleans printed,
/// anything else empty.
fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
