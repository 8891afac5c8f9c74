mod alerts;
mod app;
mod config;
mod db;
mod http;
mod metrics;
mod roster;
mod scheduler;
mod state;
mod store;
mod vitals;

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::Error as DotenvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::AppContext;
use crate::roster::{PgRoster, RosterProvider, StaticRoster};
use crate::store::{AlertStore, MemoryStore, PgStore, SampleStore};

#[derive(Debug, Parser)]
#[command(author, version, about = "vitalsim — synthetic patient telemetry agent")]
struct Cli {
    /// Path to YAML configuration file. Defaults to env VITALSIM_CONFIG or built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured historical backfill window (0 disables backfill).
    #[arg(long)]
    backfill_days: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(days) = cli.backfill_days {
        config.backfill.days = days;
    }

    let bind_addr: SocketAddr = config
        .http
        .bind
        .parse()
        .context("invalid http.bind address")?;

    let metrics = metrics::AppMetrics::new()?;
    let state = state::SharedState::new();

    let (roster, samples, alert_store) = wire_stores(&config).await?;
    let ctx = AppContext::new(config, roster, samples, alert_store, metrics, state);

    ctx.state
        .update_overview_with(|overview| {
            overview.fleet = ctx.fleet_name().to_string();
        })
        .await;

    // Backfill runs once, detached, so the live tick starts immediately; the
    // skip threshold makes a concurrent first tick harmless.
    let _backfill_handle = scheduler::spawn_backfill(ctx.clone());

    let scheduler_handles = scheduler::spawn_all(ctx.clone());
    let router = http::create_router(ctx.clone());

    info!("vitalsim listening on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context("failed to bind HTTP listener")?;

    if let Err(err) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = ?err, "server terminated with error");
    }

    shutdown_scheduler(scheduler_handles).await;

    Ok(())
}

/// Pick the storage backend: Postgres when a DSN is configured, otherwise an
/// in-memory store with a synthetic roster for local demos.
async fn wire_stores(
    config: &config::AppConfig,
) -> anyhow::Result<(
    Arc<dyn RosterProvider>,
    Arc<dyn SampleStore>,
    Arc<dyn AlertStore>,
)> {
    if config.dsn.trim().is_empty() {
        warn!(
            patients = config.population.demo_patients,
            "VITALSIM_DSN not set; running with in-memory stores and a synthetic roster"
        );
        let roster = StaticRoster::synthetic(
            config.population.demo_patients,
            config.population.demo_supervisors,
        );
        let store = MemoryStore::new();
        return Ok((
            Arc::new(roster),
            Arc::new(store.clone()),
            Arc::new(store),
        ));
    }

    let pool = db::create_pool(config).await?;
    let store = PgStore::new(pool.clone());
    store.ensure_schema().await?;
    Ok((
        Arc::new(PgRoster::new(pool)),
        Arc::new(store.clone()),
        Arc::new(store),
    ))
}

fn load_env() {
    if let Err(err) = dotenvy::dotenv() {
        match err {
            DotenvError::Io(io_err) if io_err.kind() == ErrorKind::NotFound => {}
            other => eprintln!("warning: failed to load .env file: {other}"),
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vitalsim=info,axum::rejection=trace"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

async fn shutdown_scheduler(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        handle.abort();
    }
}
