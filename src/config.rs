use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::vitals::PopulationSplit;

const DEFAULT_CONFIG_PATH: &str = "/config/vitalsim.yaml";

/// Top-level configuration for the vitalsim agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub fleet: String,
    #[serde(default)]
    pub dsn: String,
    #[serde(default)]
    pub sample_intervals: SampleIntervals,
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub timeouts: StatementTimeouts,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fleet: "local".into(),
            dsn: String::new(),
            sample_intervals: SampleIntervals::default(),
            population: PopulationConfig::default(),
            backfill: BackfillConfig::default(),
            alerts: AlertConfig::default(),
            http: HttpConfig::default(),
            timeouts: StatementTimeouts::default(),
        }
    }
}

/// Loop schedule configuration (with friendly duration parsing).
#[derive(Debug, Clone, Deserialize)]
pub struct SampleIntervals {
    /// Live telemetry tick: one value per entity per metric per period.
    #[serde(
        default = "SampleIntervals::default_live_tick",
        with = "humantime_serde"
    )]
    pub live_tick: Duration,
}

impl SampleIntervals {
    const fn default_live_tick() -> Duration {
        Duration::from_secs(60)
    }
}

impl Default for SampleIntervals {
    fn default() -> Self {
        Self {
            live_tick: Self::default_live_tick(),
        }
    }
}

/// Health-tier split ratios and the synthetic roster used without a DSN.
#[derive(Debug, Clone, Deserialize)]
pub struct PopulationConfig {
    #[serde(default = "PopulationConfig::default_healthy_ratio")]
    pub healthy_ratio: f64,
    #[serde(default = "PopulationConfig::default_warning_ratio")]
    pub warning_ratio: f64,
    #[serde(default = "PopulationConfig::default_demo_patients")]
    pub demo_patients: usize,
    #[serde(default = "PopulationConfig::default_demo_supervisors")]
    pub demo_supervisors: usize,
}

impl PopulationConfig {
    const fn default_healthy_ratio() -> f64 {
        0.46
    }

    const fn default_warning_ratio() -> f64 {
        0.31
    }

    const fn default_demo_patients() -> usize {
        26
    }

    const fn default_demo_supervisors() -> usize {
        2
    }

    pub fn split(&self) -> PopulationSplit {
        PopulationSplit {
            healthy: self.healthy_ratio,
            warning: self.warning_ratio,
        }
    }
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            healthy_ratio: Self::default_healthy_ratio(),
            warning_ratio: Self::default_warning_ratio(),
            demo_patients: Self::default_demo_patients(),
            demo_supervisors: Self::default_demo_supervisors(),
        }
    }
}

/// One-shot historical backfill run at startup. `days = 0` disables it.
#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "BackfillConfig::default_days")]
    pub days: u32,
    #[serde(default = "BackfillConfig::default_batch_size")]
    pub batch_size: usize,
}

impl BackfillConfig {
    const fn default_days() -> u32 {
        30
    }

    const fn default_batch_size() -> usize {
        500
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            days: Self::default_days(),
            batch_size: Self::default_batch_size(),
        }
    }
}

/// Emitter throttling and deduplication windows.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Rolling window allowing at most one full alert across the population.
    #[serde(default = "AlertConfig::default_alert_window", with = "humantime_serde")]
    pub alert_window: Duration,
    #[serde(
        default = "AlertConfig::default_warning_interval_min",
        with = "humantime_serde"
    )]
    pub warning_interval_min: Duration,
    #[serde(
        default = "AlertConfig::default_warning_interval_max",
        with = "humantime_serde"
    )]
    pub warning_interval_max: Duration,
    #[serde(default = "AlertConfig::default_warning_dedup", with = "humantime_serde")]
    pub warning_dedup: Duration,
    #[serde(default = "AlertConfig::default_alert_dedup", with = "humantime_serde")]
    pub alert_dedup: Duration,
    #[serde(default = "AlertConfig::default_supervisor_active_cap")]
    pub supervisor_active_cap: u64,
}

impl AlertConfig {
    const fn default_alert_window() -> Duration {
        Duration::from_secs(3_600)
    }

    const fn default_warning_interval_min() -> Duration {
        Duration::from_secs(5 * 60)
    }

    const fn default_warning_interval_max() -> Duration {
        Duration::from_secs(8 * 60)
    }

    const fn default_warning_dedup() -> Duration {
        Duration::from_secs(5 * 60)
    }

    const fn default_alert_dedup() -> Duration {
        Duration::from_secs(3_600)
    }

    const fn default_supervisor_active_cap() -> u64 {
        50
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alert_window: Self::default_alert_window(),
            warning_interval_min: Self::default_warning_interval_min(),
            warning_interval_max: Self::default_warning_interval_max(),
            warning_dedup: Self::default_warning_dedup(),
            alert_dedup: Self::default_alert_dedup(),
            supervisor_active_cap: Self::default_supervisor_active_cap(),
        }
    }
}

/// HTTP listener configuration (bind address).
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_bind")]
    pub bind: String,
}

impl HttpConfig {
    fn default_bind() -> String {
        "0.0.0.0:8282".to_string()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
        }
    }
}

/// Postgres session timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct StatementTimeouts {
    #[serde(default = "StatementTimeouts::default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
    #[serde(default = "StatementTimeouts::default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl StatementTimeouts {
    const fn default_statement_timeout_ms() -> u64 {
        3_000
    }

    const fn default_lock_timeout_ms() -> u64 {
        1_000
    }
}

impl Default for StatementTimeouts {
    fn default() -> Self {
        Self {
            statement_timeout_ms: Self::default_statement_timeout_ms(),
            lock_timeout_ms: Self::default_lock_timeout_ms(),
        }
    }
}

/// Load configuration from YAML disk file, falling back to defaults + env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let target_path = if let Some(path) = path {
        path.to_path_buf()
    } else if let Ok(env_path) = env::var("VITALSIM_CONFIG") {
        PathBuf::from(env_path)
    } else {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    };

    let mut config = match try_parse_file(&target_path)? {
        Some(cfg) => {
            info!(path = %target_path.display(), "loaded configuration");
            cfg
        }
        None => {
            warn!(path = %target_path.display(), "config file not found; using built-in defaults");
            AppConfig::default()
        }
    };

    enforce_yaml_policy(&config)?;
    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

fn try_parse_file(path: &Path) -> Result<Option<AppConfig>> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let cfg = serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse YAML config at {}", path.display()))?;
            Ok(Some(cfg))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read config file at {}", path.display()))
        }
    }
}

fn enforce_yaml_policy(config: &AppConfig) -> Result<()> {
    if !config.dsn.trim().is_empty() {
        bail!(
            "Remove `dsn` from vitalsim YAML config; set the Postgres connection string via the VITALSIM_DSN environment variable (see .env.sample)."
        );
    }
    Ok(())
}

fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    if let Ok(fleet) = env::var("VITALSIM_FLEET") {
        if !fleet.is_empty() {
            config.fleet = fleet;
        }
    }

    match env::var("VITALSIM_DSN") {
        Ok(dsn) => {
            if dsn.trim().is_empty() {
                bail!(
                    "Environment variable VITALSIM_DSN is set but empty; populate it in your .env file or unset it to run in-memory."
                );
            }
            config.dsn = dsn;
        }
        Err(env::VarError::NotPresent) => {}
        Err(err) => return Err(err.into()),
    };

    Ok(())
}

fn validate(config: &AppConfig) -> Result<()> {
    let population = &config.population;
    if population.healthy_ratio < 0.0
        || population.warning_ratio < 0.0
        || population.healthy_ratio + population.warning_ratio > 1.0
    {
        bail!(
            "population.healthy_ratio ({}) + population.warning_ratio ({}) must be non-negative and sum to at most 1.0",
            population.healthy_ratio,
            population.warning_ratio
        );
    }
    if config.alerts.warning_interval_min > config.alerts.warning_interval_max {
        bail!("alerts.warning_interval_min must not exceed alerts.warning_interval_max");
    }
    if config.backfill.batch_size == 0 {
        bail!("backfill.batch_size must be at least 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.sample_intervals.live_tick, Duration::from_secs(60));
        assert_eq!(config.alerts.supervisor_active_cap, 50);
    }

    #[test]
    fn yaml_dsn_is_rejected() {
        let config = AppConfig {
            dsn: "postgres://secret".into(),
            ..AppConfig::default()
        };
        assert!(enforce_yaml_policy(&config).is_err());
    }

    #[test]
    fn inverted_warning_interval_is_rejected() {
        let mut config = AppConfig::default();
        config.alerts.warning_interval_min = Duration::from_secs(600);
        config.alerts.warning_interval_max = Duration::from_secs(300);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn oversubscribed_split_is_rejected() {
        let mut config = AppConfig::default();
        config.population.healthy_ratio = 0.8;
        config.population.warning_ratio = 0.4;
        assert!(validate(&config).is_err());
    }
}
