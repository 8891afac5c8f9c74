use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::alerts::AlertRecord;
use crate::vitals::HealthGroup;

const RECENT_ALERT_CAPACITY: usize = 200;

/// Headline snapshot that backs the REST API.
#[derive(Debug, Clone, Serialize)]
pub struct OverviewSnapshot {
    pub fleet: String,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub generated_at: Option<DateTime<Utc>>,
    pub population: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub samples_last_tick: usize,
    pub samples_total: u64,
    pub backfill_samples_total: u64,
    pub warnings_emitted: u64,
    pub alerts_emitted: u64,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_warning_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_alert_at: Option<DateTime<Utc>>,
}

impl Default for OverviewSnapshot {
    fn default() -> Self {
        Self {
            fleet: "unknown".into(),
            generated_at: None,
            population: 0,
            healthy: 0,
            warning: 0,
            critical: 0,
            samples_last_tick: 0,
            samples_total: 0,
            backfill_samples_total: 0,
            warnings_emitted: 0,
            alerts_emitted: 0,
            last_warning_at: None,
            last_alert_at: None,
        }
    }
}

/// One roster row with its resolved tier, for the read API.
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub id: Uuid,
    pub index: usize,
    pub group: HealthGroup,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopHealth {
    pub name: String,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl LoopHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_success_at: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

#[derive(Default)]
struct SharedStateInner {
    overview: RwLock<OverviewSnapshot>,
    roster: RwLock<Vec<RosterEntry>>,
    recent_alerts: RwLock<VecDeque<AlertRecord>>,
    loop_health: RwLock<HashMap<String, LoopHealth>>,
}

/// Shared state container for the HTTP layer and scheduler loops.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<SharedStateInner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SharedStateInner::default()),
        }
    }

    pub async fn get_overview(&self) -> OverviewSnapshot {
        self.inner.overview.read().await.clone()
    }

    pub async fn update_overview_with<F>(&self, apply: F)
    where
        F: FnOnce(&mut OverviewSnapshot),
    {
        let mut guard = self.inner.overview.write().await;
        apply(&mut guard);
    }

    pub async fn update_roster(&self, entries: Vec<RosterEntry>) {
        let mut guard = self.inner.roster.write().await;
        *guard = entries;
    }

    pub async fn get_roster(&self) -> Vec<RosterEntry> {
        self.inner.roster.read().await.clone()
    }

    /// Track an emitted record in the ring buffer and the overview counters.
    pub async fn record_alert_emitted(&self, record: &AlertRecord) {
        {
            let mut ring = self.inner.recent_alerts.write().await;
            if ring.len() == RECENT_ALERT_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(record.clone());
        }

        let mut overview = self.inner.overview.write().await;
        if record.metadata.is_warning {
            overview.warnings_emitted += 1;
            overview.last_warning_at = Some(record.triggered_at);
        } else {
            overview.alerts_emitted += 1;
            overview.last_alert_at = Some(record.triggered_at);
        }
    }

    pub async fn recent_alerts(&self, limit: usize) -> Vec<AlertRecord> {
        let ring = self.inner.recent_alerts.read().await;
        ring.iter().rev().take(limit).cloned().collect()
    }

    pub async fn record_loop_success(&self, loop_name: &str) {
        let mut guard = self.inner.loop_health.write().await;
        let entry = guard
            .entry(loop_name.to_string())
            .or_insert_with(|| LoopHealth::new(loop_name));
        entry.last_success_at = Some(Utc::now());
        entry.consecutive_failures = 0;
        entry.last_error = None;
    }

    pub async fn record_loop_failure(&self, loop_name: &str, error: String) {
        let mut guard = self.inner.loop_health.write().await;
        let entry = guard
            .entry(loop_name.to_string())
            .or_insert_with(|| LoopHealth::new(loop_name));
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(error);
    }

    pub async fn loop_health(&self) -> Vec<LoopHealth> {
        self.inner
            .loop_health
            .read()
            .await
            .values()
            .cloned()
            .collect()
    }

    pub async fn is_ready(&self, loop_names: &[&str], max_staleness: Duration) -> bool {
        let health = self.inner.loop_health.read().await;
        let now = Utc::now();
        let staleness = chrono::Duration::from_std(max_staleness)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

        loop_names.iter().all(|name| {
            if let Some(entry) = health.get(*name) {
                if entry.consecutive_failures > 0 {
                    return false;
                }
                if let Some(last) = entry.last_success_at {
                    return now.signed_duration_since(last) <= staleness;
                }
                false
            } else {
                false
            }
        })
    }
}
