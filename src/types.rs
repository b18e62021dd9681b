use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// One normalized game as of a single snapshot. Rebuilt on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    /// Game-center id (10 digits when upstream provides one).
    pub id: i64,
    /// ISO-8601 start time.
    pub game_date: String,
    pub home_team: Team,
    pub away_team: Team,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_odds: Option<Vec<OddsLine>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_odds: Option<Vec<OddsLine>>,
    #[serde(default)]
    pub odds_partners: Vec<OddsPartner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_best_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_best_line: Option<String>,
}

impl Game {
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    /// Partner whose logo is shown next to the best lines.
    pub fn best_line_partner(&self) -> Option<&OddsPartner> {
        self.odds_partners
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case("draftkings"))
            .or_else(|| {
                self.odds_partners
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case("fanduel"))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub abbreviation: String,
    pub city: Option<String>,
}

impl Team {
    /// `"{city} {name}"`, falling back to the abbreviation and finally `"N/A"`.
    pub fn display_name(&self) -> String {
        let city = self.city.as_deref().unwrap_or("");
        let full = format!("{} {}", city, self.name);
        let full = full.trim();
        if !full.is_empty() {
            full.to_string()
        } else if !self.abbreviation.is_empty() {
            self.abbreviation.clone()
        } else {
            "N/A".to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    Live,
    Final,
}

impl GameStatus {
    /// Maps an upstream `gameState` code. Unknown codes are `Scheduled`.
    pub fn from_state(state: &str) -> Self {
        match state {
            "LIVE" | "CRIT" => GameStatus::Live,
            "FINAL" | "OFF" => GameStatus::Final,
            _ => GameStatus::Scheduled,
        }
    }

    pub fn is_live(self) -> bool {
        self == GameStatus::Live
    }

    pub fn is_final(self) -> bool {
        self == GameStatus::Final
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GameStatus::Scheduled => "Scheduled",
            GameStatus::Live => "Live",
            GameStatus::Final => "Final",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsLine {
    pub provider_id: i64,
    pub value: String,
}

/// Betting provider metadata, identical for every game in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsPartner {
    pub partner_id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Body of `GET /api/nhl/todays-games` and `GET /api/nhl/snapshot`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GamesResponse {
    pub games: Vec<Game>,
}
