mod tui_app;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};

use nhl_today::config::{ClientConfig, CHANNEL_CAPACITY};
use nhl_today::detail::GameDetail;
use nhl_today::error::Result;
use nhl_today::poller::{PollerHandle, PollerView, RefreshClient};
use tui_app::{
    format_decimal, format_lines, format_score, format_status, status_color, truncate, AppState,
    ConnectionStatus, DetailState,
};

/// How long to wait for a key before re-checking the poller.
const INPUT_POLL: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    let cfg = ClientConfig::from_env().map_err(io::Error::other)?;
    let client = RefreshClient::new(cfg.api_url.clone()).map_err(io::Error::other)?;

    // Cached snapshot for the first render; the poller refreshes right after.
    let (initial, status) = match client.snapshot().await {
        Ok(games) => (games, ConnectionStatus::Connecting),
        Err(e) => (Vec::new(), ConnectionStatus::Error(e.to_string())),
    };
    let poller = PollerHandle::spawn(Arc::new(client.clone()), cfg.poll_interval, initial);
    let mut app = AppState::new(cfg.api_url.clone(), poller.view(), status);

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut game_table_state = TableState::default();
    game_table_state.select(None);

    let result = run_loop(&mut terminal, &mut app, &poller, &client, &mut game_table_state).await;
    poller.shutdown().await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    poller: &PollerHandle,
    client: &RefreshClient,
    game_state: &mut TableState,
) -> io::Result<()> {
    let mut views: watch::Receiver<PollerView> = poller.subscribe();
    let (detail_tx, mut detail_rx) = mpsc::channel::<(i64, Result<GameDetail>)>(CHANNEL_CAPACITY);

    loop {
        if views.has_changed().unwrap_or(false) {
            let view = views.borrow_and_update().clone();
            app.apply_view(view);
            let len = app.games().len();
            if game_state.selected().is_some_and(|i| i >= len) {
                game_state.select(len.checked_sub(1));
            }
        }
        while let Ok((game_id, result)) = detail_rx.try_recv() {
            app.finish_detail(game_id, result);
        }

        terminal.draw(|f| render(f, app, game_state))?;

        if !event::poll(INPUT_POLL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
            KeyCode::Char('r') | KeyCode::Char('R') => {
                poller.refresh_now();
            }
            KeyCode::Char('l') | KeyCode::Char('L') => {
                poller.toggle_live();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let max = app.games().len().saturating_sub(1);
                let next = game_state.selected().map_or(0, |i| (i + 1).min(max));
                game_state.select(Some(next));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                let prev = game_state.selected().map_or(0, |i| i.saturating_sub(1));
                game_state.select(Some(prev));
            }
            KeyCode::Enter => {
                if let Some(id) = app.game_at(game_state.selected()).map(|g| g.id) {
                    app.begin_detail(id);
                    let client = client.clone();
                    let tx = detail_tx.clone();
                    tokio::spawn(async move {
                        let _ = tx.send((id, client.game_detail(id).await)).await;
                    });
                }
            }
            KeyCode::Esc => app.close_detail(),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, game_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, game_state, chunks[1]);
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let live_count = app.games().iter().filter(|g| g.is_live()).count();
    let updated = app
        .last_refresh
        .map_or("never".to_string(), |t| format!("{}s ago", t.elapsed().as_secs()));

    let mut spans = vec![
        Span::styled(
            " NHL Today  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("{} games, {} live", app.games().len(), live_count),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(format!("updated {updated}"), Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(truncate(&app.api_url, 30), Style::default().fg(Color::DarkGray)),
    ];
    if app.view.loading {
        spans.push(Span::styled("  ↻ updating", Style::default().fg(Color::Yellow)));
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, game_state: &mut TableState, area: Rect) {
    match &app.detail {
        Some(detail) => {
            let halves = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(area);
            render_games_table(f, app, game_state, halves[0]);
            render_detail(f, detail, halves[1]);
        }
        None => render_games_table(f, app, game_state, area),
    }
}

fn render_games_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["Status", "Away", "", "Home", "Score", "Best lines (A / H)"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .games()
        .iter()
        .map(|g| {
            Row::new(vec![
                Cell::from(format_status(g)).style(Style::default().fg(status_color(g.status))),
                Cell::from(truncate(&g.away_team.display_name(), 24)),
                Cell::from("@").style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&g.home_team.display_name(), 24)),
                Cell::from(format!(
                    "{} - {}",
                    format_score(g.away_score),
                    format_score(g.home_score)
                )),
                Cell::from(format_lines(g)).style(Style::default().fg(Color::Green)),
            ])
        })
        .collect();

    let title = if app.games().is_empty() {
        " NO GAMES TODAY "
    } else {
        " TODAY'S GAMES "
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(11),
            Constraint::Min(10),
            Constraint::Length(1),
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(26),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_detail(f: &mut Frame, state: &DetailState, area: Rect) {
    let lines = match (&state.detail, &state.error) {
        (Some(detail), _) => detail_lines(detail),
        (None, Some(e)) => vec![Line::from(Span::styled(
            format!("Detail unavailable: {e}"),
            Style::default().fg(Color::Red),
        ))],
        (None, None) => vec![Line::from("Loading…")],
    };

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                format!(" GAME {} ", state.game_id),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(paragraph, area);
}

fn detail_lines(detail: &GameDetail) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::Yellow);
    let mut lines = Vec::new();

    match &detail.boxscore {
        Some(b) => {
            lines.push(Line::from(vec![
                Span::styled(
                    format!(
                        "{} {}  @  {} {}",
                        b.away_team.abbrev,
                        format_score(b.away_team.score),
                        b.home_team.abbrev,
                        format_score(b.home_team.score)
                    ),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!("   {}", b.game_state)),
            ]));
            lines.push(Line::from(format!(
                "Shots: {} - {}",
                format_score(b.away_team.shots_on_goal),
                format_score(b.home_team.shots_on_goal)
            )));
            if let (Some(period), Some(clock)) = (b.period, &b.clock) {
                let clock_text = if clock.in_intermission {
                    "intermission".to_string()
                } else {
                    clock.time_remaining.clone()
                };
                lines.push(Line::from(format!("Period {period}  {clock_text}")));
            }
            if let Some(venue) = &b.venue {
                lines.push(Line::from(format!("Venue: {venue}")));
            }
            for team in [&b.away_team, &b.home_team] {
                if team.top_forwards.is_empty() {
                    continue;
                }
                lines.push(Line::from(Span::styled(format!("{} forwards", team.abbrev), label)));
                for p in &team.top_forwards {
                    lines.push(Line::from(format!(
                        "  {:<22} {}G {}A {}P  {}",
                        truncate(&p.name.default, 22),
                        p.goals,
                        p.assists,
                        p.points,
                        p.toi
                    )));
                }
            }
        }
        None => lines.push(Line::from("Boxscore unavailable")),
    }

    lines.push(Line::from(""));
    match &detail.landing {
        Some(l) => {
            let broadcasts = if l.broadcasts.is_empty() {
                "TBD".to_string()
            } else {
                l.broadcasts.join(", ")
            };
            lines.push(Line::from(vec![Span::styled("TV: ", label), Span::raw(broadcasts)]));
            for team in [&l.away_team, &l.home_team] {
                let record = team.record.clone().unwrap_or_else(|| "—".to_string());
                let goalies = team
                    .goalie_totals
                    .as_ref()
                    .map(|t| {
                        format!(
                            "  GAA {}  SV% {}",
                            format_decimal(t.gaa, 2),
                            format_decimal(t.save_pctg, 3)
                        )
                    })
                    .unwrap_or_default();
                lines.push(Line::from(format!("{} ({record}){goalies}", team.abbrev)));
            }
            for leader in &l.leaders {
                lines.push(Line::from(format!(
                    "{:<8} {} {}  |  {} {}",
                    leader.category,
                    leader.away_name.as_deref().unwrap_or("—"),
                    format_decimal(leader.away_value, 0),
                    leader.home_name.as_deref().unwrap_or("—"),
                    format_decimal(leader.home_value, 0)
                )));
            }
            if let Some(link) = &l.tickets_link {
                lines.push(Line::from(vec![Span::styled("Tickets: ", label), Span::raw(link.clone())]));
            }
        }
        None => lines.push(Line::from("Preview unavailable")),
    }

    lines.push(Line::from(""));
    match &detail.odds {
        Some(o) => lines.push(Line::from(vec![
            Span::styled("Odds: ", label),
            Span::raw(format!(
                "away {}  home {}",
                o.away_line.as_deref().unwrap_or("—"),
                o.home_line.as_deref().unwrap_or("—")
            )),
        ])),
        None => lines.push(Line::from("Odds unavailable")),
    }

    lines
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let (live_text, live_color) = if app.view.live {
        if app.view.has_live_game {
            ("live: on", Color::Green)
        } else {
            ("live: on (idle)", Color::Yellow)
        }
    } else {
        ("live: off", Color::DarkGray)
    };
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[l] ", Style::default().fg(Color::Yellow)),
        Span::raw("live  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("select  "),
        Span::styled("[enter/esc] ", Style::default().fg(Color::Yellow)),
        Span::raw("detail  "),
        Span::styled(live_text, Style::default().fg(live_color)),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
