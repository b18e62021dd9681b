use std::time::Instant;

use ratatui::style::Color;

use nhl_today::dates::format_eastern_time;
use nhl_today::detail::GameDetail;
use nhl_today::error::Result;
use nhl_today::poller::PollerView;
use nhl_today::types::{Game, GameStatus};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

/// Detail pane for one game (from GET /api/nhl/games/:id).
#[derive(Debug, Clone)]
pub struct DetailState {
    pub game_id: i64,
    pub detail: Option<GameDetail>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub view: PollerView,
    pub detail: Option<DetailState>,
    pub last_refresh: Option<Instant>,
    pub api_url: String,
}

impl AppState {
    pub fn new(api_url: String, view: PollerView, status: ConnectionStatus) -> Self {
        Self {
            status,
            view,
            detail: None,
            last_refresh: None,
            api_url,
        }
    }

    /// Take a newly published poller view. A higher generation means a
    /// refresh landed.
    pub fn apply_view(&mut self, view: PollerView) {
        if view.generation > self.view.generation {
            self.status = ConnectionStatus::Connected;
            self.last_refresh = Some(Instant::now());
        }
        self.view = view;
    }

    pub fn games(&self) -> &[Game] {
        &self.view.games
    }

    pub fn game_at(&self, index: Option<usize>) -> Option<&Game> {
        index.and_then(|i| self.games().get(i))
    }

    /// Show the detail pane as loading. The fetch itself runs elsewhere and
    /// reports back through [`AppState::finish_detail`].
    pub fn begin_detail(&mut self, game_id: i64) {
        self.detail = Some(DetailState {
            game_id,
            detail: None,
            error: None,
        });
    }

    /// Fill the pane with a fetched detail. Results for a game that is no
    /// longer open are dropped.
    pub fn finish_detail(&mut self, game_id: i64, result: Result<GameDetail>) {
        let Some(state) = self.detail.as_mut().filter(|d| d.game_id == game_id) else {
            return;
        };
        match result {
            Ok(detail) => state.detail = Some(detail),
            Err(e) => state.error = Some(e.to_string()),
        }
    }

    pub fn close_detail(&mut self) {
        self.detail = None;
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Score, or `-` before the upstream reports one.
pub fn format_score(score: Option<u32>) -> String {
    score.map_or_else(|| "-".to_string(), |s| s.to_string())
}

/// Start time while scheduled, otherwise the status label.
pub fn format_status(game: &Game) -> String {
    match game.status {
        GameStatus::Scheduled => format_eastern_time(&game.game_date),
        GameStatus::Live => "LIVE".to_string(),
        GameStatus::Final => "FINAL".to_string(),
    }
}

pub fn status_color(status: GameStatus) -> Color {
    if status.is_live() {
        Color::Red
    } else if status.is_final() {
        Color::DarkGray
    } else {
        Color::Cyan
    }
}

pub fn format_lines(game: &Game) -> String {
    let line = |l: &Option<String>| l.clone().unwrap_or_else(|| "—".to_string());
    let text = format!("{} / {}", line(&game.away_best_line), line(&game.home_best_line));
    match game.best_line_partner() {
        Some(p) => format!("{text} ({})", p.name),
        None => text,
    }
}

pub fn format_decimal(v: Option<f64>, places: usize) -> String {
    v.map_or_else(|| "—".to_string(), |v| format!("{v:.places$}"))
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
