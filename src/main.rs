use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nhl_today::api::health::HealthState;
use nhl_today::api::latency::LatencyStats;
use nhl_today::api::routes::{router, ApiState};
use nhl_today::config::Config;
use nhl_today::error::Result;
use nhl_today::snapshot::SnapshotProvider;
use nhl_today::upstream::NhlClient;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    let nhl = NhlClient::new(&cfg.nhl_api_url, Arc::clone(&latency))?;
    info!(
        "NHL API at {} (season {}, snapshot window {}s)",
        nhl.base_url(),
        cfg.season,
        cfg.snapshot_revalidate.as_secs()
    );

    let provider = Arc::new(SnapshotProvider::new(
        nhl.clone(),
        cfg.snapshot_revalidate,
        Arc::clone(&health),
    ));

    // Warm the snapshot cache so the first page load does not wait on upstream.
    let warm = Arc::clone(&provider);
    tokio::spawn(async move {
        let games = warm.cached_todays_games().await;
        info!("Snapshot warmed with {} games", games.len());
    });

    let api_state = ApiState {
        provider,
        nhl,
        health,
        latency,
        season: cfg.season.clone(),
        started_at: Instant::now(),
    };
    let app = router(api_state);
    let bind_addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("HTTP API stopped");
    Ok(())
}
