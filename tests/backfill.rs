use std::sync::Arc;

use uuid::Uuid;
use vitalsim::app::AppContext;
use vitalsim::config::AppConfig;
use vitalsim::metrics::AppMetrics;
use vitalsim::roster::StaticRoster;
use vitalsim::scheduler::backfill;
use vitalsim::state::SharedState;
use vitalsim::store::{MemoryStore, SampleStore};
use vitalsim::vitals::MetricKind;

fn context(days: u32, patients: Vec<Uuid>, store: MemoryStore) -> AppContext {
    let mut config = AppConfig::default();
    config.backfill.days = days;
    AppContext::new(
        config,
        Arc::new(StaticRoster::new(patients, vec![])),
        Arc::new(store.clone()),
        Arc::new(store),
        AppMetrics::new().expect("metrics registry"),
        SharedState::new(),
    )
}

#[tokio::test]
async fn backfill_writes_bounded_counts_per_entity() {
    let days = 3u32;
    let patients: Vec<Uuid> = (0..4u128).map(Uuid::from_u128).collect();
    let store = MemoryStore::new();
    let ctx = context(days, patients.clone(), store.clone());

    let written = backfill::run(&ctx).await.expect("backfill run");
    assert!(written > 0);

    let metric_count = MetricKind::ALL.len() as u64;
    let min_expected = u64::from(days) * 6 * metric_count;
    let max_expected = u64::from(days) * 8 * metric_count;
    for patient in &patients {
        let count = store.sample_count(*patient).await.expect("count");
        assert!(
            (min_expected..=max_expected).contains(&count),
            "entity holds {count} samples, expected within [{min_expected}, {max_expected}]"
        );
    }
}

#[tokio::test]
async fn backfill_is_idempotent_per_entity() {
    let patients: Vec<Uuid> = (10..13u128).map(Uuid::from_u128).collect();
    let store = MemoryStore::new();
    let ctx = context(2, patients.clone(), store.clone());

    let first = backfill::run(&ctx).await.expect("first run");
    assert!(first > 0);

    let counts_after_first: Vec<u64> = {
        let mut counts = Vec::new();
        for patient in &patients {
            counts.push(store.sample_count(*patient).await.expect("count"));
        }
        counts
    };

    // Every entity now clears the skip threshold, so a re-run writes nothing.
    let second = backfill::run(&ctx).await.expect("second run");
    assert_eq!(second, 0);

    for (patient, expected) in patients.iter().zip(counts_after_first) {
        assert_eq!(store.sample_count(*patient).await.expect("count"), expected);
    }
}

#[tokio::test]
async fn backfill_zero_days_is_disabled() {
    let patients = vec![Uuid::from_u128(42)];
    let store = MemoryStore::new();
    let ctx = context(0, patients.clone(), store.clone());

    let written = backfill::run(&ctx).await.expect("run");
    assert_eq!(written, 0);
    assert_eq!(store.sample_count(patients[0]).await.expect("count"), 0);
}

#[tokio::test]
async fn backfill_with_empty_roster_is_a_no_op() {
    let store = MemoryStore::new();
    let ctx = context(5, vec![], store);
    let written = backfill::run(&ctx).await.expect("run");
    assert_eq!(written, 0);
}
