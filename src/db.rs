use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

use crate::config::AppConfig;

pub type DbPool = PgPool;

/// Build a connection pool for the agent's append/query workload.
pub async fn create_pool(config: &AppConfig) -> Result<DbPool> {
    let connect_options = PgConnectOptions::from_str(&config.dsn)
        .context("invalid Postgres DSN supplied")?
        .application_name("vitalsim")
        .options([
            (
                "statement_timeout",
                config.timeouts.statement_timeout_ms.to_string(),
            ),
            ("lock_timeout", config.timeouts.lock_timeout_ms.to_string()),
        ]);

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(connect_options)
        .await
        .context("failed to connect to postgres")?;

    info!("connected to fleet store {}", config.fleet);
    Ok(pool)
}
