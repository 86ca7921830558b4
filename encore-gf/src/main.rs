//! encore-gf - Concert group formation job
//!
//! Runs one formation pass over the Encore database and exits. Intended to be
//! invoked daily by the host scheduler; Ctrl-C or SIGTERM lets the current
//! artist finish and then stops.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use encore_common::config::TomlConfig;
use encore_gf::config::resolve_ticketmaster_api_key;
use encore_gf::services::TicketmasterClient;
use encore_gf::{FormationOrchestrator, OrchestratorSettings, RunState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for encore-gf
#[derive(Parser, Debug)]
#[command(name = "encore-gf")]
#[command(about = "Concert group formation job for Encore")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ENCORE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(short, long, env = "ENCORE_DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Search radius around each venue, in miles
    #[arg(long, env = "ENCORE_RADIUS_MILES")]
    radius_miles: Option<f64>,

    /// Pause between artists, in milliseconds
    #[arg(long, env = "ENCORE_ARTIST_DELAY_MS")]
    artist_delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // CLI flags override TOML and environment
    if let Some(path) = args.database {
        config.database_path = Some(path);
    }
    if let Some(radius) = args.radius_miles {
        config.formation.radius_miles = radius;
    }
    if let Some(delay) = args.artist_delay_ms {
        config.formation.artist_delay_ms = delay;
    }
    config.formation.validate().context("Invalid formation settings")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting encore-gf (group formation) v{}", env!("CARGO_PKG_VERSION"));

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());

    let pool = encore_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let api_key = resolve_ticketmaster_api_key(&pool, &config).await?;
    let timeout = Duration::from_secs(config.formation.request_timeout_secs);
    let catalog = TicketmasterClient::new(api_key, &config.ticketmaster, timeout)
        .context("Failed to build Ticketmaster client")?;

    let settings = OrchestratorSettings::from(&config.formation);
    let orchestrator = FormationOrchestrator::from_pool(pool.clone(), Arc::new(catalog), settings);

    let stop = CancellationToken::new();
    let signal_token = stop.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, finishing current artist");
        signal_token.cancel();
    });

    let report = orchestrator.run(&stop).await;

    pool.close().await;

    if report.state == RunState::Failed {
        bail!("Formation run {} failed", report.run_id);
    }

    info!(run_id = %report.run_id, state = report.state.as_str(), "encore-gf finished");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
