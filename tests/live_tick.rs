use std::sync::Arc;

use uuid::Uuid;
use vitalsim::app::AppContext;
use vitalsim::config::AppConfig;
use vitalsim::metrics::AppMetrics;
use vitalsim::roster::StaticRoster;
use vitalsim::scheduler::tick;
use vitalsim::state::SharedState;
use vitalsim::store::MemoryStore;
use vitalsim::vitals::{HealthGroup, MetricKind};

fn context(patients: Vec<Uuid>, store: MemoryStore) -> AppContext {
    AppContext::new(
        AppConfig::default(),
        Arc::new(StaticRoster::new(patients, vec![])),
        Arc::new(store.clone()),
        Arc::new(store),
        AppMetrics::new().expect("metrics registry"),
        SharedState::new(),
    )
}

#[tokio::test]
async fn tick_generates_one_sample_per_entity_per_metric() {
    let patients: Vec<Uuid> = (0..26u128).map(Uuid::from_u128).collect();
    let store = MemoryStore::new();
    let ctx = context(patients.clone(), store.clone());

    tick::run(&ctx).await.expect("tick");

    for patient in &patients {
        let samples = store.samples_for(*patient).await;
        assert_eq!(samples.len(), MetricKind::ALL.len());
        for sample in &samples {
            assert!(sample.active);
            assert_eq!(sample.source, "device");
            assert_eq!(sample.unit, sample.metric.unit());
        }
    }

    let overview = ctx.state.get_overview().await;
    assert_eq!(overview.population, 26);
    assert_eq!(overview.healthy, 12);
    assert_eq!(overview.warning, 8);
    assert_eq!(overview.critical, 6);
    assert_eq!(
        overview.samples_last_tick,
        26 * MetricKind::ALL.len()
    );
}

#[tokio::test]
async fn tick_output_honors_group_invariants() {
    let patients: Vec<Uuid> = (100..126u128).map(Uuid::from_u128).collect();
    let store = MemoryStore::new();
    let ctx = context(patients, store.clone());

    tick::run(&ctx).await.expect("tick");

    let roster = ctx.state.get_roster().await;
    assert_eq!(roster.len(), 26);
    for entry in &roster {
        let samples = store.samples_for(entry.id).await;
        match entry.group {
            HealthGroup::Healthy => {
                for sample in &samples {
                    let Some(spec) = sample.metric.range_spec() else {
                        continue;
                    };
                    let (lo, hi) = spec.safe_zone();
                    assert!(
                        sample.value >= lo - 1e-9 && sample.value <= hi + 1e-9,
                        "healthy {:?} = {} outside [{lo}, {hi}]",
                        sample.metric,
                        sample.value
                    );
                }
            }
            HealthGroup::Warning => {
                for sample in &samples {
                    let Some(spec) = sample.metric.range_spec() else {
                        continue;
                    };
                    assert!(
                        !spec.breaches_critical(sample.value),
                        "warning {:?} = {} is critical",
                        sample.metric,
                        sample.value
                    );
                }
            }
            HealthGroup::Critical => {
                // At least one sample sits in the critical zone every tick.
                let breached = samples.iter().any(|sample| {
                    sample
                        .metric
                        .range_spec()
                        .map(|spec| spec.breaches_critical(sample.value))
                        .unwrap_or(false)
                });
                assert!(breached, "critical entity {} has no critical sample", entry.id);
            }
        }
    }
}

#[tokio::test]
async fn second_tick_walks_from_stored_samples() {
    let patients: Vec<Uuid> = (200..204u128).map(Uuid::from_u128).collect();
    let store = MemoryStore::new();
    let ctx = context(patients.clone(), store.clone());

    tick::run(&ctx).await.expect("first tick");
    tick::run(&ctx).await.expect("second tick");

    for patient in &patients {
        let samples = store.samples_for(*patient).await;
        // Two readings per metric; the second tick did not cold-start over.
        assert_eq!(samples.len(), 2 * MetricKind::ALL.len());
    }

    let overview = ctx.state.get_overview().await;
    assert_eq!(
        overview.samples_total,
        2 * 4 * MetricKind::ALL.len() as u64
    );
}

#[tokio::test]
async fn empty_roster_tick_is_a_no_op() {
    let store = MemoryStore::new();
    let ctx = context(vec![], store.clone());
    tick::run(&ctx).await.expect("tick");
    assert_eq!(ctx.state.get_overview().await.population, 0);
}
