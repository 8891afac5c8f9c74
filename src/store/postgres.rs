use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::alerts::{AlertKind, AlertMetadata, AlertRecord, AlertSeverity, AlertStatus};
use crate::db::DbPool;
use crate::vitals::{MetricKind, MetricSample};

use super::{AlertStore, SampleStore};

/// Postgres-backed sample and alert store.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the tables this agent appends to, if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metric_samples (
                id UUID PRIMARY KEY,
                entity_id UUID NOT NULL,
                metric TEXT NOT NULL,
                value DOUBLE PRECISION NOT NULL,
                unit TEXT NOT NULL,
                source TEXT NOT NULL,
                active BOOLEAN NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL,
                UNIQUE (entity_id, metric, recorded_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create metric_samples table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS metric_samples_latest_idx
            ON metric_samples (entity_id, metric, recorded_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id UUID PRIMARY KEY,
                subject_id UUID NOT NULL,
                patient_id UUID,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                is_warning BOOLEAN NOT NULL,
                threshold DOUBLE PRECISION NOT NULL,
                actual_value DOUBLE PRECISION NOT NULL,
                unit TEXT NOT NULL,
                related_sample_id UUID NOT NULL,
                triggered_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create alerts table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS alerts_subject_status_idx
            ON alerts (subject_id, status, triggered_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SampleStore for PgStore {
    async fn insert_samples(&self, batch: &[MetricSample]) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO metric_samples (id, entity_id, metric, value, unit, source, active, recorded_at) ",
        );
        builder.push_values(batch, |mut row, sample| {
            row.push_bind(sample.id)
                .push_bind(sample.entity_id)
                .push_bind(sample.metric.as_str())
                .push_bind(sample.value)
                .push_bind(&sample.unit)
                .push_bind(&sample.source)
                .push_bind(sample.active)
                .push_bind(sample.recorded_at);
        });
        // Duplicate (entity, metric, timestamp) rows are already applied.
        builder.push(" ON CONFLICT (entity_id, metric, recorded_at) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn latest_sample(
        &self,
        entity_id: Uuid,
        metric: MetricKind,
    ) -> Result<Option<MetricSample>> {
        let row = sqlx::query(
            r#"
            SELECT id, entity_id, metric, value, unit, source, active, recorded_at
            FROM metric_samples
            WHERE entity_id = $1 AND metric = $2
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .bind(metric.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(sample_from_row).transpose()
    }

    async fn sample_count(&self, entity_id: Uuid) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*)::bigint AS samples FROM metric_samples WHERE entity_id = $1",
        )
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("samples")?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn insert_alert(&self, record: &AlertRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, subject_id, patient_id, kind, title, message,
                severity, status, is_warning, threshold, actual_value, unit,
                related_sample_id, triggered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.subject_id)
        .bind(record.metadata.patient_id)
        .bind(record.kind.as_str())
        .bind(&record.title)
        .bind(&record.message)
        .bind(record.severity.as_str())
        .bind(record.status.as_str())
        .bind(record.metadata.is_warning)
        .bind(record.metadata.threshold)
        .bind(record.metadata.actual_value)
        .bind(&record.metadata.unit)
        .bind(record.related_sample_id)
        .bind(record.triggered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_active_alerts(&self, subject_id: Uuid) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*)::bigint AS active FROM alerts WHERE subject_id = $1 AND status = 'active'",
        )
        .bind(subject_id)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("active")?;
        Ok(count.max(0) as u64)
    }

    async fn find_active(
        &self,
        entity_id: Uuid,
        sample_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<AlertRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, subject_id, patient_id, kind, title, message,
                   severity, status, is_warning, threshold, actual_value, unit,
                   related_sample_id, triggered_at
            FROM alerts
            WHERE subject_id = $1
              AND related_sample_id = $2
              AND status = 'active'
              AND triggered_at >= $3
            ORDER BY triggered_at DESC
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .bind(sample_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        row.map(alert_from_row).transpose()
    }
}

fn sample_from_row(row: sqlx::postgres::PgRow) -> Result<MetricSample> {
    let metric_raw: String = row.try_get("metric")?;
    let metric = MetricKind::parse(&metric_raw)
        .with_context(|| format!("unknown metric kind in store: {metric_raw}"))?;
    Ok(MetricSample {
        id: row.try_get("id")?,
        entity_id: row.try_get("entity_id")?,
        metric,
        value: row.try_get("value")?,
        unit: row.try_get("unit")?,
        source: row.try_get("source")?,
        active: row.try_get("active")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn alert_from_row(row: sqlx::postgres::PgRow) -> Result<AlertRecord> {
    let kind_raw: String = row.try_get("kind")?;
    let severity_raw: String = row.try_get("severity")?;
    let status_raw: String = row.try_get("status")?;
    Ok(AlertRecord {
        id: row.try_get("id")?,
        subject_id: row.try_get("subject_id")?,
        kind: AlertKind::parse(&kind_raw)
            .with_context(|| format!("unknown alert kind in store: {kind_raw}"))?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        severity: AlertSeverity::parse(&severity_raw)
            .with_context(|| format!("unknown severity in store: {severity_raw}"))?,
        status: AlertStatus::parse(&status_raw)
            .with_context(|| format!("unknown status in store: {status_raw}"))?,
        triggered_at: row.try_get("triggered_at")?,
        related_sample_id: row.try_get("related_sample_id")?,
        metadata: AlertMetadata {
            threshold: row.try_get("threshold")?,
            actual_value: row.try_get("actual_value")?,
            unit: row.try_get("unit")?,
            is_warning: row.try_get("is_warning")?,
            patient_id: row.try_get("patient_id")?,
        },
    })
}
