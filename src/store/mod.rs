use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::warn;
use uuid::Uuid;

use crate::alerts::AlertRecord;
use crate::vitals::{MetricKind, MetricSample};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Bounded retry policy for store writes: retried with backoff, then dropped
/// and logged, never fatal to the scheduler.
const MAX_WRITE_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: std::time::Duration = std::time::Duration::from_millis(200);

/// Append/query service for generated samples. Implementations must tolerate
/// duplicate (entity, metric, timestamp) keys by treating them as applied.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Insert a batch, skipping duplicates. Returns the number actually written.
    async fn insert_samples(&self, batch: &[MetricSample]) -> Result<u64>;

    /// Most recent sample for one (entity, metric), if any.
    async fn latest_sample(
        &self,
        entity_id: Uuid,
        metric: MetricKind,
    ) -> Result<Option<MetricSample>>;

    /// Total stored samples for an entity, used for the backfill skip check.
    async fn sample_count(&self, entity_id: Uuid) -> Result<u64>;
}

/// Append/query service for alert records.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_alert(&self, record: &AlertRecord) -> Result<()>;

    /// Number of active alerts held by a subject (patient or supervisor).
    async fn count_active_alerts(&self, subject_id: Uuid) -> Result<u64>;

    /// An active alert for the same (entity, sample) no older than `since`.
    async fn find_active(
        &self,
        entity_id: Uuid,
        sample_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<AlertRecord>>;
}

/// Insert a sample batch with bounded exponential backoff. Returns the count
/// written, or `None` once retries are exhausted (the batch is dropped).
pub async fn insert_samples_with_retry(
    store: &dyn SampleStore,
    batch: &[MetricSample],
) -> Option<u64> {
    let mut delay = RETRY_BASE_DELAY;
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        match store.insert_samples(batch).await {
            Ok(written) => return Some(written),
            Err(err) if attempt < MAX_WRITE_ATTEMPTS => {
                warn!(attempt, error = ?err, "sample batch insert failed; backing off");
                sleep(delay).await;
                delay *= 2;
            }
            Err(err) => {
                warn!(
                    attempts = MAX_WRITE_ATTEMPTS,
                    batch = batch.len(),
                    error = ?err,
                    "sample batch dropped after retries"
                );
            }
        }
    }
    None
}

/// Insert one alert record with bounded backoff. Returns whether it landed.
pub async fn insert_alert_with_retry(store: &dyn AlertStore, record: &AlertRecord) -> bool {
    let mut delay = RETRY_BASE_DELAY;
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        match store.insert_alert(record).await {
            Ok(()) => return true,
            Err(err) if attempt < MAX_WRITE_ATTEMPTS => {
                warn!(attempt, error = ?err, "alert insert failed; backing off");
                sleep(delay).await;
                delay *= 2;
            }
            Err(err) => {
                warn!(
                    subject = %record.subject_id,
                    error = ?err,
                    "alert dropped after retries"
                );
            }
        }
    }
    false
}
