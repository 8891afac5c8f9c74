use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;
use vitalsim::alerts::{
    emit_for_tick, AlertKind, AlertMetadata, AlertRecord, AlertSeverity, AlertStatus,
};
use vitalsim::app::AppContext;
use vitalsim::config::AppConfig;
use vitalsim::metrics::AppMetrics;
use vitalsim::roster::{assign_indices, Entity, StaticRoster};
use vitalsim::state::SharedState;
use vitalsim::store::{AlertStore, MemoryStore};
use vitalsim::vitals::{MetricKind, MetricSample};

fn context(patients: Vec<Uuid>, supervisors: Vec<Uuid>, store: MemoryStore) -> AppContext {
    AppContext::new(
        AppConfig::default(),
        Arc::new(StaticRoster::new(patients, supervisors)),
        Arc::new(store.clone()),
        Arc::new(store),
        AppMetrics::new().expect("metrics registry"),
        SharedState::new(),
    )
}

fn entities_for(patients: &[Uuid]) -> Vec<Entity> {
    assign_indices(patients.to_vec())
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 20, 14, 0, 0).unwrap()
}

/// Heart rate 110 bpm: outside the normal 60–100 but inside the critical
/// 50–120, so it belongs to the warning channel.
fn warning_sample(entity: Uuid, at: DateTime<Utc>) -> MetricSample {
    MetricSample::device(entity, MetricKind::HeartRate, 110.0, at)
}

/// Heart rate 130 bpm breaches the critical bound of 120.
fn critical_sample(entity: Uuid, at: DateTime<Utc>) -> MetricSample {
    MetricSample::device(entity, MetricKind::HeartRate, 130.0, at)
}

fn manual_active_alert(subject: Uuid, sample_id: Uuid, at: DateTime<Utc>) -> AlertRecord {
    AlertRecord {
        id: Uuid::new_v4(),
        subject_id: subject,
        kind: AlertKind::VitalWarning,
        title: "seeded".into(),
        message: "seeded".into(),
        severity: AlertSeverity::Medium,
        status: AlertStatus::Active,
        triggered_at: at,
        related_sample_id: sample_id,
        metadata: AlertMetadata {
            threshold: 100.0,
            actual_value: 110.0,
            unit: "bpm".into(),
            is_warning: true,
            patient_id: None,
        },
    }
}

#[tokio::test]
async fn warning_channel_respects_the_randomized_window() {
    let patient = Uuid::from_u128(1);
    let store = MemoryStore::new();
    let ctx = context(vec![patient], vec![], store.clone());
    let entities = entities_for(&[patient]);

    // First eligible tick fires a warning. The alert channel dedups against
    // the same sample, so exactly one record lands.
    let first = warning_sample(patient, t0());
    emit_for_tick(&ctx, &entities, &[first], t0()).await;
    let warnings = |records: &[AlertRecord]| {
        records.iter().filter(|r| r.metadata.is_warning).count()
    };
    assert_eq!(warnings(&store.alerts().await), 1);

    // 4m59s later: below the 5-minute floor, the warning channel stays quiet.
    let below_floor = t0() + Duration::seconds(299);
    emit_for_tick(&ctx, &entities, &[warning_sample(patient, below_floor)], below_floor).await;
    assert_eq!(warnings(&store.alerts().await), 1);

    // 8 minutes later: past the ceiling of the randomized interval, it fires.
    let past_ceiling = t0() + Duration::minutes(8);
    emit_for_tick(&ctx, &entities, &[warning_sample(patient, past_ceiling)], past_ceiling).await;
    let records = store.alerts().await;
    assert_eq!(warnings(&records), 2);

    let mut warning_times: Vec<DateTime<Utc>> = records
        .iter()
        .filter(|r| r.metadata.is_warning)
        .map(|r| r.triggered_at)
        .collect();
    warning_times.sort();
    let spacing = warning_times[1] - warning_times[0];
    assert!(spacing >= Duration::minutes(5));
    assert!(spacing <= Duration::minutes(8));
}

#[tokio::test]
async fn warning_channel_declines_critical_values() {
    let patient = Uuid::from_u128(2);
    let store = MemoryStore::new();
    let ctx = context(vec![patient], vec![], store.clone());
    let entities = entities_for(&[patient]);

    emit_for_tick(&ctx, &entities, &[critical_sample(patient, t0())], t0()).await;

    let records = store.alerts().await;
    // The alert channel picked it up instead: critical severity, no warning.
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].severity, AlertSeverity::Critical);
    assert!(!records[0].metadata.is_warning);
    assert_eq!(records[0].kind, AlertKind::VitalAlert);
}

#[tokio::test]
async fn alert_channel_allows_one_alert_per_hour_and_fans_out() {
    let patient = Uuid::from_u128(3);
    let supervisors = vec![Uuid::from_u128(100), Uuid::from_u128(101)];
    let store = MemoryStore::new();
    let ctx = context(vec![patient], supervisors.clone(), store.clone());
    let entities = entities_for(&[patient]);

    emit_for_tick(&ctx, &entities, &[critical_sample(patient, t0())], t0()).await;
    let records = store.alerts().await;
    // One patient record plus one mirror per supervisor.
    assert_eq!(records.len(), 3);
    for supervisor in &supervisors {
        let mirror = records
            .iter()
            .find(|r| r.subject_id == *supervisor)
            .expect("supervisor mirror record");
        assert_eq!(mirror.metadata.patient_id, Some(patient));
        assert_eq!(mirror.severity, AlertSeverity::Critical);
    }

    // 30 minutes in: still inside the rolling hour, nothing new fires.
    let mid_window = t0() + Duration::minutes(30);
    emit_for_tick(&ctx, &entities, &[critical_sample(patient, mid_window)], mid_window).await;
    assert_eq!(store.alerts().await.len(), 3);

    // 61 minutes in: the window rolled over, a fresh alert lands.
    let next_window = t0() + Duration::minutes(61);
    emit_for_tick(&ctx, &entities, &[critical_sample(patient, next_window)], next_window).await;
    let records = store.alerts().await;
    assert_eq!(records.len(), 6);

    // At most one non-warning patient alert in any 60-minute window.
    let mut patient_alerts: Vec<DateTime<Utc>> = records
        .iter()
        .filter(|r| !r.metadata.is_warning && r.subject_id == patient)
        .map(|r| r.triggered_at)
        .collect();
    patient_alerts.sort();
    assert_eq!(patient_alerts.len(), 2);
    assert!(patient_alerts[1] - patient_alerts[0] >= Duration::minutes(60));
}

#[tokio::test]
async fn duplicate_sample_alerts_are_suppressed() {
    let patient = Uuid::from_u128(4);
    let store = MemoryStore::new();
    let ctx = context(vec![patient], vec![], store.clone());
    let entities = entities_for(&[patient]);

    let sample = warning_sample(patient, t0());
    // Seed an active record for the same (entity, sample) one minute earlier.
    store
        .insert_alert(&manual_active_alert(
            patient,
            sample.id,
            t0() - Duration::minutes(1),
        ))
        .await
        .expect("seed alert");

    emit_for_tick(&ctx, &entities, &[sample], t0()).await;
    // Both channels found the active record inside their dedup windows.
    assert_eq!(store.alerts().await.len(), 1);
}

#[tokio::test]
async fn supervisors_at_the_active_cap_are_skipped() {
    let patient = Uuid::from_u128(5);
    let supervisor = Uuid::from_u128(200);
    let store = MemoryStore::new();
    let ctx = context(vec![patient], vec![supervisor], store.clone());
    let entities = entities_for(&[patient]);

    let cap = ctx.config.alerts.supervisor_active_cap;
    for i in 0..cap {
        store
            .insert_alert(&manual_active_alert(
                supervisor,
                Uuid::from_u128(u128::from(i) + 1_000),
                t0() - Duration::hours(2),
            ))
            .await
            .expect("seed backlog");
    }

    emit_for_tick(&ctx, &entities, &[critical_sample(patient, t0())], t0()).await;

    let records = store.alerts().await;
    let supervisor_records = records
        .iter()
        .filter(|r| r.subject_id == supervisor)
        .count() as u64;
    assert_eq!(supervisor_records, cap, "no mirror past the cap");
    // The patient record itself still landed.
    assert!(records
        .iter()
        .any(|r| r.subject_id == patient && !r.metadata.is_warning));
}

#[tokio::test]
async fn empty_sample_batches_are_a_no_op() {
    let patient = Uuid::from_u128(6);
    let store = MemoryStore::new();
    let ctx = context(vec![patient], vec![], store.clone());
    let entities = entities_for(&[patient]);

    emit_for_tick(&ctx, &entities, &[], t0()).await;
    assert!(store.alerts().await.is_empty());
}

#[tokio::test]
async fn in_range_samples_emit_nothing() {
    let patient = Uuid::from_u128(7);
    let store = MemoryStore::new();
    let ctx = context(vec![patient], vec![], store.clone());
    let entities = entities_for(&[patient]);

    let sample = MetricSample::device(patient, MetricKind::HeartRate, 72.0, t0());
    emit_for_tick(&ctx, &entities, &[sample], t0()).await;
    assert!(store.alerts().await.is_empty());
}
