use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;
use vitalsim::vitals::{
    next_value, walk_rng, BaselineProfile, MetricKind, MetricSample, PopulationSplit,
};

const POPULATION: usize = 26;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 7, 9, 0, 0).unwrap()
}

/// Evolve one metric in one-minute steps, feeding each value back as the next
/// previous sample, and return every generated value.
fn evolve_chain(
    entity: Uuid,
    index: usize,
    metric: MetricKind,
    steps: usize,
) -> Vec<f64> {
    let profile = BaselineProfile::assign(index, POPULATION, PopulationSplit::default());
    let mut values = Vec::with_capacity(steps);
    let mut prev: Option<MetricSample> = None;
    let mut at = start();
    for _ in 0..steps {
        let mut rng = walk_rng(&entity, metric, at);
        let value = next_value(metric, &profile, prev.as_ref(), at, &mut rng);
        values.push(value);
        prev = Some(MetricSample::device(entity, metric, value, at));
        at += Duration::minutes(1);
    }
    values
}

#[test]
fn healthy_samples_stay_inside_the_safe_zone() {
    for (offset, &metric) in MetricKind::ALL.iter().enumerate() {
        let Some(spec) = metric.range_spec() else {
            continue;
        };
        let (lo, hi) = spec.safe_zone();
        let entity = Uuid::from_u128(1_000 + offset as u128);
        // Index 3 is deep inside the healthy band for a population of 26.
        for value in evolve_chain(entity, 3, metric, 300) {
            assert!(
                value >= lo - 1e-9 && value <= hi + 1e-9,
                "{metric:?} produced {value} outside safe zone [{lo}, {hi}]"
            );
        }
    }
}

#[test]
fn warning_samples_never_enter_the_critical_zone() {
    for (offset, &metric) in MetricKind::ALL.iter().enumerate() {
        let Some(spec) = metric.range_spec() else {
            continue;
        };
        let entity = Uuid::from_u128(2_000 + offset as u128);
        // Index 15 lands in the warning band for a population of 26.
        for value in evolve_chain(entity, 15, metric, 300) {
            assert!(
                !spec.breaches_critical(value),
                "{metric:?} produced critical value {value} for a warning entity"
            );
        }
    }
}

#[test]
fn critical_entities_breach_their_dominant_metric_every_tick() {
    // Indices 20..26 cover all four critical variants for a population of 26.
    for index in 20..POPULATION {
        let profile = BaselineProfile::assign(index, POPULATION, PopulationSplit::default());
        let variant = profile.variant.expect("critical entity has a variant");
        let entity = Uuid::from_u128(3_000 + index as u128);

        for &metric in variant.dominant_metrics() {
            let spec = metric.range_spec().expect("dominant metrics have specs");
            for value in evolve_chain(entity, index, metric, 100) {
                assert!(
                    spec.breaches_critical(value),
                    "index {index} {metric:?} produced non-critical value {value}"
                );
                if metric == MetricKind::OxygenSaturation {
                    let lo = spec.critical_min.expect("spo2 critical min");
                    assert!(value < lo, "adverse direction for spo2 is low, got {value}");
                } else {
                    let hi = spec.critical_max.expect("critical max");
                    assert!(value > hi, "adverse direction is high, got {value}");
                }
            }
        }
    }
}

#[test]
fn consecutive_ticks_drift_instead_of_redrawing() {
    let entity = Uuid::from_u128(4_000);
    let profile = BaselineProfile::assign(3, POPULATION, PopulationSplit::default());
    let metric = MetricKind::BodyTemperature;

    for trial in 0..100u128 {
        let first_at = start() + Duration::minutes(trial as i64 * 5);
        let second_at = first_at + Duration::seconds(60);
        let prev = MetricSample::device(entity, metric, 36.6, first_at);

        let mut rng = walk_rng(&entity, metric, second_at);
        let value = next_value(metric, &profile, Some(&prev), second_at, &mut rng);

        // One minute closes at most 1% of the gap to a target within ±0.3,
        // plus jitter within ±0.03 and the 0.1 rounding grid.
        assert!(
            (value - 36.6).abs() <= 0.2,
            "trial {trial}: drift {value} is too large for a 60s step"
        );
    }
}

#[test]
fn corrupted_history_resets_to_the_baseline_center() {
    let entity = Uuid::from_u128(5_000);
    let profile = BaselineProfile::assign(3, POPULATION, PopulationSplit::default());
    let metric = MetricKind::BloodGlucose;
    let at = start();
    let corrupt = MetricSample::device(entity, metric, -500.0, at - Duration::minutes(1));

    let mut rng = walk_rng(&entity, metric, at);
    let value = next_value(metric, &profile, Some(&corrupt), at, &mut rng);

    // The walk restarts from the center (95) rather than pulling up from -500.
    assert!(
        (90.0..=100.0).contains(&value),
        "expected a value near the baseline center, got {value}"
    );
}

#[test]
fn values_are_rounded_per_metric_policy() {
    let entity = Uuid::from_u128(6_000);
    for (offset, &metric) in MetricKind::ALL.iter().enumerate() {
        let value = evolve_chain(Uuid::from_u128(entity.as_u128() + offset as u128), 3, metric, 5)
            .pop()
            .expect("chain produces values");
        let step = metric.rounding().step();
        let scaled = value / step;
        assert!(
            (scaled - scaled.round()).abs() < 1e-6,
            "{metric:?} value {value} is not on the {step} grid"
        );
        assert!(value >= 0.0, "{metric:?} went negative: {value}");
    }
}

#[test]
fn evolution_is_deterministic_for_identical_inputs() {
    let entity = Uuid::from_u128(7_000);
    let a = evolve_chain(entity, 15, MetricKind::HeartRate, 50);
    let b = evolve_chain(entity, 15, MetricKind::HeartRate, 50);
    assert_eq!(a, b);
}
