use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::alerts::{AlertRecord, AlertStatus};
use crate::vitals::{MetricKind, MetricSample};

use super::{AlertStore, SampleStore};

/// In-memory sample and alert store.
///
/// Backs the DSN-less demo mode and the test suite. Mirrors the Postgres
/// adapter's semantics: duplicate (entity, metric, timestamp) inserts are
/// skipped and counted as already applied.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    samples: HashMap<(Uuid, MetricKind), Vec<MetricSample>>,
    sample_counts: HashMap<Uuid, u64>,
    alerts: Vec<AlertRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All alert records, oldest first. Test-facing accessor.
    pub async fn alerts(&self) -> Vec<AlertRecord> {
        self.inner.read().await.alerts.clone()
    }

    /// All samples for one entity across metrics. Test-facing accessor.
    pub async fn samples_for(&self, entity_id: Uuid) -> Vec<MetricSample> {
        let inner = self.inner.read().await;
        inner
            .samples
            .iter()
            .filter(|((entity, _), _)| *entity == entity_id)
            .flat_map(|(_, series)| series.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn insert_samples(&self, batch: &[MetricSample]) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut written = 0;
        for sample in batch {
            let series = inner
                .samples
                .entry((sample.entity_id, sample.metric))
                .or_default();
            if series
                .iter()
                .any(|existing| existing.recorded_at == sample.recorded_at)
            {
                continue;
            }
            series.push(sample.clone());
            written += 1;
            *inner.sample_counts.entry(sample.entity_id).or_default() += 1;
        }
        Ok(written)
    }

    async fn latest_sample(
        &self,
        entity_id: Uuid,
        metric: MetricKind,
    ) -> Result<Option<MetricSample>> {
        let inner = self.inner.read().await;
        Ok(inner
            .samples
            .get(&(entity_id, metric))
            .and_then(|series| series.iter().max_by_key(|s| s.recorded_at))
            .cloned())
    }

    async fn sample_count(&self, entity_id: Uuid) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner.sample_counts.get(&entity_id).copied().unwrap_or(0))
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_alert(&self, record: &AlertRecord) -> Result<()> {
        self.inner.write().await.alerts.push(record.clone());
        Ok(())
    }

    async fn count_active_alerts(&self, subject_id: Uuid) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .iter()
            .filter(|a| a.subject_id == subject_id && a.status == AlertStatus::Active)
            .count() as u64)
    }

    async fn find_active(
        &self,
        entity_id: Uuid,
        sample_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<AlertRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .iter()
            .find(|a| {
                a.subject_id == entity_id
                    && a.related_sample_id == sample_id
                    && a.status == AlertStatus::Active
                    && a.triggered_at >= since
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vitals::MetricKind;
    use chrono::TimeZone;

    #[tokio::test]
    async fn duplicate_timestamps_are_skipped_not_fatal() {
        let store = MemoryStore::new();
        let entity = Uuid::from_u128(1);
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();

        let first = MetricSample::device(entity, MetricKind::HeartRate, 72.0, at);
        let duplicate = MetricSample::device(entity, MetricKind::HeartRate, 75.0, at);

        assert_eq!(store.insert_samples(&[first]).await.unwrap(), 1);
        assert_eq!(store.insert_samples(&[duplicate]).await.unwrap(), 0);
        assert_eq!(store.sample_count(entity).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn latest_sample_orders_by_timestamp() {
        let store = MemoryStore::new();
        let entity = Uuid::from_u128(2);
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();

        let batch = vec![
            MetricSample::device(entity, MetricKind::HeartRate, 70.0, late),
            MetricSample::device(entity, MetricKind::HeartRate, 68.0, early),
        ];
        store.insert_samples(&batch).await.unwrap();

        let latest = store
            .latest_sample(entity, MetricKind::HeartRate)
            .await
            .unwrap()
            .expect("sample");
        assert_eq!(latest.recorded_at, late);
        assert_eq!(latest.value, 70.0);
    }
}
