//! Client-side live poller.
//!
//! One actor task owns the displayed games, the `live` flag and the poll
//! timer. The UI talks to it through [`PollerHandle`]: commands go in over
//! an mpsc channel, state comes out over a watch channel as [`PollerView`].
//! Each refresh runs in its own task and reports back tagged with a
//! generation number; only the newest generation is ever applied.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CHANNEL_CAPACITY;
use crate::detail::GameDetail;
use crate::error::{AppError, Result};
use crate::types::{Game, GamesResponse};

/// Where the poller gets a fresh game list from.
#[async_trait]
pub trait GamesSource: Send + Sync {
    async fn fetch_games(&self) -> Result<Vec<Game>>;
}

/// HTTP client for the server's JSON API.
#[derive(Clone)]
pub struct RefreshClient {
    api_url: String,
    client: reqwest::Client,
}

impl RefreshClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().build()?,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_url, path);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                status: status.as_u16(),
                url,
            });
        }
        Ok(resp.json().await?)
    }

    /// Cached snapshot used for the first render.
    pub async fn snapshot(&self) -> Result<Vec<Game>> {
        let body: GamesResponse = self.get("/api/nhl/snapshot").await?;
        Ok(body.games)
    }

    pub async fn game_detail(&self, game_id: i64) -> Result<GameDetail> {
        self.get(&format!("/api/nhl/games/{game_id}")).await
    }
}

#[async_trait]
impl GamesSource for RefreshClient {
    async fn fetch_games(&self) -> Result<Vec<Game>> {
        let body: GamesResponse = self.get("/api/nhl/todays-games").await?;
        Ok(body.games)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerCommand {
    ToggleLive,
    RefreshNow,
    Shutdown,
}

/// Immutable picture of the poller's state, published after every change.
#[derive(Debug, Clone)]
pub struct PollerView {
    pub games: Arc<Vec<Game>>,
    pub live: bool,
    /// At least one refresh is in flight.
    pub loading: bool,
    pub has_live_game: bool,
    /// Generation of the response currently shown (0 = initial games).
    pub generation: u64,
}

type Tagged = (u64, Result<Vec<Game>>);

struct LivePoller<S> {
    source: Arc<S>,
    period: Duration,
    cancel: CancellationToken,
    state_tx: watch::Sender<PollerView>,
    result_tx: mpsc::Sender<Tagged>,
    games: Arc<Vec<Game>>,
    live: bool,
    /// Newest generation handed to a fetch task.
    dispatched: u64,
    applied: u64,
    in_flight: usize,
    ticker: Option<Interval>,
}

impl<S: GamesSource + 'static> LivePoller<S> {
    fn has_live_game(&self) -> bool {
        self.games.iter().any(Game::is_live)
    }

    fn view(&self) -> PollerView {
        PollerView {
            games: Arc::clone(&self.games),
            live: self.live,
            loading: self.in_flight > 0,
            has_live_game: self.has_live_game(),
            generation: self.applied,
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.view());
    }

    /// Start one refresh. The task is abandoned as soon as the poller is
    /// cancelled, so its result can never reach the actor afterwards.
    fn dispatch(&mut self) {
        self.dispatched += 1;
        self.in_flight += 1;
        let generation = self.dispatched;
        let source = Arc::clone(&self.source);
        let tx = self.result_tx.clone();
        let cancel = self.cancel.clone();
        debug!(generation, "Dispatching games refresh");
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = source.fetch_games() => {
                    let _ = tx.send((generation, result)).await;
                }
            }
        });
    }

    fn apply(&mut self, generation: u64, result: Result<Vec<Game>>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if generation < self.dispatched {
            debug!(generation, latest = self.dispatched, "Discarding stale games response");
            return;
        }
        match result {
            Ok(games) => {
                self.games = Arc::new(games);
                self.applied = generation;
            }
            Err(e) => warn!(generation, "Games refresh failed: {e}"),
        }
        self.sync_ticker();
    }

    /// Periodic polling runs only while live and a game is in progress.
    fn sync_ticker(&mut self) {
        let wanted = self.live && self.has_live_game();
        match (wanted, self.ticker.is_some()) {
            (true, false) => {
                let mut ticker = interval_at(Instant::now() + self.period, self.period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ticker = Some(ticker);
            }
            (false, true) => self.ticker = None,
            _ => {}
        }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<PollerCommand>,
        mut result_rx: mpsc::Receiver<Tagged>,
    ) {
        self.dispatch();
        self.sync_ticker();
        self.publish();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(PollerCommand::ToggleLive) => {
                        self.live = !self.live;
                        if self.live {
                            self.dispatch();
                        }
                        self.sync_ticker();
                    }
                    Some(PollerCommand::RefreshNow) => self.dispatch(),
                    Some(PollerCommand::Shutdown) | None => {
                        self.cancel.cancel();
                        break;
                    }
                },
                Some((generation, result)) = result_rx.recv() => self.apply(generation, result),
                _ = next_tick(&mut self.ticker) => self.dispatch(),
            }
            self.publish();
        }
        debug!("Live poller stopped");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Owner-side handle of a running poller.
pub struct PollerHandle {
    cmd_tx: mpsc::Sender<PollerCommand>,
    state_rx: watch::Receiver<PollerView>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl PollerHandle {
    /// Spawn the poller seeded with `initial` games, live mode on. The first
    /// refresh is dispatched immediately.
    pub fn spawn<S: GamesSource + 'static>(source: Arc<S>, period: Duration, initial: Vec<Game>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (result_tx, result_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let games = Arc::new(initial);
        let (state_tx, state_rx) = watch::channel(PollerView {
            has_live_game: games.iter().any(Game::is_live),
            games: Arc::clone(&games),
            live: true,
            loading: false,
            generation: 0,
        });
        let cancel = CancellationToken::new();

        let poller = LivePoller {
            source,
            period,
            cancel: cancel.clone(),
            state_tx,
            result_tx,
            games,
            live: true,
            dispatched: 0,
            applied: 0,
            in_flight: 0,
            ticker: None,
        };
        let join = tokio::spawn(poller.run(cmd_rx, result_rx));

        Self {
            cmd_tx,
            state_rx,
            cancel,
            join,
        }
    }

    /// Queue a command without waiting. Returns false if the poller is gone
    /// or its queue is full.
    pub fn send(&self, cmd: PollerCommand) -> bool {
        self.cmd_tx.try_send(cmd).is_ok()
    }

    pub fn toggle_live(&self) -> bool {
        self.send(PollerCommand::ToggleLive)
    }

    pub fn refresh_now(&self) -> bool {
        self.send(PollerCommand::RefreshNow)
    }

    /// Latest published view.
    pub fn view(&self) -> PollerView {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerView> {
        self.state_rx.clone()
    }

    /// Stop the actor and abandon in-flight requests.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!("Live poller task ended abnormally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameStatus, Team};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::{sleep, timeout};

    const PERIOD: Duration = Duration::from_secs(30);

    fn game(id: i64, status: GameStatus) -> Game {
        let team = |abbrev: &str| Team {
            id: 1,
            name: abbrev.to_string(),
            abbreviation: abbrev.to_string(),
            city: None,
        };
        Game {
            id,
            game_date: "2025-10-16T23:00:00Z".to_string(),
            home_team: team("BOS"),
            away_team: team("TOR"),
            status,
            home_score: None,
            away_score: None,
            home_odds: None,
            away_odds: None,
            odds_partners: Vec::new(),
            home_best_line: None,
            away_best_line: None,
        }
    }

    /// Answers each call from a script of `(delay, response)`, then falls
    /// back to `default` with no delay.
    struct ScriptedSource {
        calls: AtomicUsize,
        script: Mutex<VecDeque<(Duration, Option<Vec<Game>>)>>,
        default: Vec<Game>,
    }

    impl ScriptedSource {
        fn always(games: Vec<Game>) -> Arc<Self> {
            Self::scripted(Vec::new(), games)
        }

        fn scripted(script: Vec<(Duration, Option<Vec<Game>>)>, default: Vec<Game>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                default,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GamesSource for ScriptedSource {
        async fn fetch_games(&self) -> Result<Vec<Game>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let (delay, response) = next.unwrap_or((Duration::ZERO, Some(self.default.clone())));
            sleep(delay).await;
            response.ok_or(AppError::Upstream {
                status: 500,
                url: "fake://todays-games".to_string(),
            })
        }
    }

    async fn wait_for(rx: &mut watch::Receiver<PollerView>, pred: impl FnMut(&PollerView) -> bool) {
        timeout(Duration::from_secs(600), rx.wait_for(pred))
            .await
            .expect("poller view never matched")
            .expect("poller stopped");
    }

    fn ids(view: &PollerView) -> Vec<i64> {
        view.games.iter().map(|g| g.id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_once_on_start_without_live_games() {
        let source = ScriptedSource::always(vec![game(1, GameStatus::Scheduled)]);
        let handle = PollerHandle::spawn(Arc::clone(&source), PERIOD, Vec::new());
        let mut rx = handle.subscribe();
        wait_for(&mut rx, |v| v.generation == 1 && !v.loading).await;

        sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls(), 1);
        let view = handle.view();
        assert!(view.live);
        assert!(!view.has_live_game);
        assert_eq!(ids(&view), vec![1]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_interval_while_a_game_is_live() {
        let source = ScriptedSource::always(vec![game(1, GameStatus::Live)]);
        let handle = PollerHandle::spawn(Arc::clone(&source), PERIOD, Vec::new());
        let mut rx = handle.subscribe();
        wait_for(&mut rx, |v| v.generation == 1).await;
        assert!(handle.view().has_live_game);

        sleep(Duration::from_secs(95)).await;
        assert_eq!(source.calls(), 4);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn toggling_live_off_stops_polling() {
        let source = ScriptedSource::always(vec![game(1, GameStatus::Live)]);
        let handle = PollerHandle::spawn(Arc::clone(&source), PERIOD, Vec::new());
        let mut rx = handle.subscribe();
        wait_for(&mut rx, |v| v.generation == 1).await;

        assert!(handle.toggle_live());
        wait_for(&mut rx, |v| !v.live).await;
        sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn toggling_live_back_on_refreshes_exactly_once() {
        let source = ScriptedSource::always(vec![game(1, GameStatus::Final)]);
        let handle = PollerHandle::spawn(Arc::clone(&source), PERIOD, Vec::new());
        let mut rx = handle.subscribe();
        wait_for(&mut rx, |v| v.generation == 1 && !v.loading).await;

        handle.toggle_live();
        wait_for(&mut rx, |v| !v.live).await;
        assert_eq!(source.calls(), 1);

        handle.toggle_live();
        wait_for(&mut rx, |v| v.live && v.generation == 2 && !v.loading).await;
        sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_now_ignores_live_flag() {
        let source = ScriptedSource::always(Vec::new());
        let handle = PollerHandle::spawn(Arc::clone(&source), PERIOD, Vec::new());
        let mut rx = handle.subscribe();
        wait_for(&mut rx, |v| v.generation == 1).await;

        handle.toggle_live();
        wait_for(&mut rx, |v| !v.live).await;
        handle.refresh_now();
        wait_for(&mut rx, |v| v.generation == 2).await;
        assert_eq!(source.calls(), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_previous_games() {
        let source = ScriptedSource::scripted(vec![(Duration::from_millis(10), None)], Vec::new());
        let handle = PollerHandle::spawn(
            Arc::clone(&source),
            PERIOD,
            vec![game(7, GameStatus::Scheduled)],
        );
        let mut rx = handle.subscribe();
        wait_for(&mut rx, |v| v.loading).await;
        wait_for(&mut rx, |v| !v.loading).await;

        let view = handle.view();
        assert_eq!(ids(&view), vec![7]);
        assert_eq!(view.generation, 0);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_never_overwrites_newer_one() {
        let source = ScriptedSource::scripted(
            vec![
                (Duration::from_secs(10), Some(vec![game(1, GameStatus::Scheduled)])),
                (Duration::from_secs(1), Some(vec![game(2, GameStatus::Scheduled)])),
            ],
            Vec::new(),
        );
        let handle = PollerHandle::spawn(Arc::clone(&source), PERIOD, Vec::new());
        handle.refresh_now();
        let mut rx = handle.subscribe();
        wait_for(&mut rx, |v| v.generation == 2).await;

        sleep(Duration::from_secs(20)).await;
        let view = handle.view();
        assert_eq!(ids(&view), vec![2]);
        assert_eq!(view.generation, 2);
        assert!(!view.loading);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_update_after_shutdown() {
        let source = ScriptedSource::scripted(
            vec![(Duration::from_secs(5), Some(vec![game(3, GameStatus::Live)]))],
            Vec::new(),
        );
        let handle = PollerHandle::spawn(Arc::clone(&source), PERIOD, Vec::new());
        let rx = handle.subscribe();
        wait_for(&mut rx.clone(), |v| v.loading).await;

        handle.shutdown().await;
        sleep(Duration::from_secs(30)).await;
        let view = rx.borrow().clone();
        assert!(view.games.is_empty());
        assert_eq!(view.generation, 0);
        assert_eq!(source.calls(), 1);
    }
}
