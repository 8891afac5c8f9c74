use chrono::{DateTime, Timelike, Utc};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use uuid::Uuid;

use super::profile::{Baseline, BaselineProfile, HealthGroup};
use super::{MetricKind, MetricSample};

/// Fraction of the gap to a fresh target closed per elapsed minute.
const CHANGE_RATE_PER_MINUTE: f64 = 0.01;
/// Hard cap on the per-step change rate.
const MAX_CHANGE_RATE: f64 = 0.15;
/// Independent jitter, as a fraction of the baseline variance.
const JITTER_FRACTION: f64 = 0.1;

const WAKING_HEART_RATE_FACTOR: f64 = 1.04;
const NIGHT_HEART_RATE_FACTOR: f64 = 0.9;
/// Deviation from center retained for sleep metrics outside 06:00–10:00.
const SLEEP_DAMPING: f64 = 0.25;

const SECONDS_PER_DAY: f64 = 86_400.0;
/// Floor for the fraction-of-day divisor so midnight samples stay finite.
const MIN_DAY_FRACTION: f64 = 1e-3;

/// Deterministic walk generator for one (entity, metric, instant) triple.
///
/// Identical inputs yield an identical stream, so live ticks and backfill
/// produce the same value for the same slot.
pub fn walk_rng(entity_id: &Uuid, metric: MetricKind, at: DateTime<Utc>) -> Pcg64 {
    let mut seed = fnv1a(FNV_OFFSET, entity_id.as_bytes());
    seed = fnv1a(seed, metric.as_str().as_bytes());
    seed ^= at.timestamp() as u64;
    Pcg64::seed_from_u64(seed)
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Produce the next reading for one metric of one entity.
///
/// Pipeline order matters: walk, circadian shaping, health-group enforcement,
/// absolute constraint clamp, rounding. The constraint clamp is last so no
/// upstream step can emit a physically impossible value.
pub fn next_value(
    metric: MetricKind,
    profile: &BaselineProfile,
    prev: Option<&MetricSample>,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> f64 {
    let baseline = profile.baseline(metric);
    let constraints = metric.constraints();

    let walked = match prev {
        None => draw_target(&baseline, rng),
        Some(prev) => {
            let mut position = prev.value;
            if metric == MetricKind::Steps {
                // Stored step samples carry the fraction-of-day scaling; undo
                // it so the walk tracks the daily total, not the scaled value.
                position /= day_fraction(prev.recorded_at).max(MIN_DAY_FRACTION);
            }
            if !constraints.contains(position) {
                // Corrupt history: restart the walk at the baseline center
                // instead of propagating the bad value.
                position = baseline.center;
            }
            let elapsed_minutes =
                (now - prev.recorded_at).num_seconds().max(0) as f64 / 60.0;
            let rate = (elapsed_minutes * CHANGE_RATE_PER_MINUTE).min(MAX_CHANGE_RATE);
            let target = draw_target(&baseline, rng);
            let jitter_span = JITTER_FRACTION * baseline.variance;
            let jitter = rng.gen_range(-jitter_span..=jitter_span);
            position + (target - position) * rate + jitter
        }
    };

    let shaped = circadian(metric, walked, &baseline, now);
    let enforced = enforce_group(metric, profile, shaped, rng);
    let bounded = constraints.clamp(enforced);
    metric.rounding().apply(bounded).max(0.0)
}

fn draw_target(baseline: &Baseline, rng: &mut impl Rng) -> f64 {
    rng.gen_range(baseline.center - baseline.variance..=baseline.center + baseline.variance)
}

fn day_fraction(at: DateTime<Utc>) -> f64 {
    f64::from(at.num_seconds_from_midnight()) / SECONDS_PER_DAY
}

/// Time-of-day shaping. Only a few metrics react to the clock; the rest pass
/// through untouched.
fn circadian(metric: MetricKind, value: f64, baseline: &Baseline, now: DateTime<Utc>) -> f64 {
    match metric {
        MetricKind::HeartRate => {
            let factor = if (6..22).contains(&now.hour()) {
                WAKING_HEART_RATE_FACTOR
            } else {
                NIGHT_HEART_RATE_FACTOR
            };
            value * factor
        }
        // Monotonically non-decreasing proxy: the day's step count grows with
        // the fraction of the day elapsed.
        MetricKind::Steps => value * day_fraction(now),
        MetricKind::SleepDuration => {
            if (6..10).contains(&now.hour()) {
                value
            } else {
                baseline.center + (value - baseline.center) * SLEEP_DAMPING
            }
        }
        _ => value,
    }
}

/// Health-group enforcement against the range spec. Runs after circadian
/// shaping, since scaling can push a borderline value back into range and
/// clamping earlier would over-correct.
fn enforce_group(
    metric: MetricKind,
    profile: &BaselineProfile,
    value: f64,
    rng: &mut impl Rng,
) -> f64 {
    let Some(spec) = metric.range_spec() else {
        // No range configured: nothing to enforce, constraints still apply.
        return value;
    };
    let rounding = metric.rounding();

    match profile.group {
        HealthGroup::Healthy => {
            // Clamp bounds are aligned to the rounding grid so the final
            // rounding step cannot carry a value back out of the safe zone.
            let (lo, hi) = spec.safe_zone();
            value.clamp(rounding.ceil_to_grid(lo), rounding.floor_to_grid(hi))
        }
        HealthGroup::Warning => {
            let (lo, hi) = spec.warning_band();
            value.clamp(rounding.ceil_to_grid(lo), rounding.floor_to_grid(hi))
        }
        HealthGroup::Critical if profile.is_dominant(metric) => {
            force_critical(metric, profile, &spec, rng)
        }
        HealthGroup::Critical => value,
    }
}

/// Force a dominant metric into the critical zone, adverse direction. The
/// redraw from the variant baseline takes precedence over the walk result;
/// the bound-plus-one-step floor is the fallback for a stray draw.
fn force_critical(
    metric: MetricKind,
    profile: &BaselineProfile,
    spec: &super::RangeSpec,
    rng: &mut impl Rng,
) -> f64 {
    let baseline = profile.baseline(metric);
    let draw = draw_target(&baseline, rng);
    let step = metric.rounding().step();
    if adverse_is_low(metric) {
        let ceiling = spec.critical_min.unwrap_or(spec.min) - step;
        draw.min(ceiling)
    } else {
        let floor = spec.critical_max.unwrap_or(spec.max) + step;
        draw.max(floor)
    }
}

/// Oxygen saturation degrades downward; every other dominant metric escalates
/// upward.
const fn adverse_is_low(metric: MetricKind) -> bool {
    matches!(metric, MetricKind::OxygenSaturation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vitals::PopulationSplit;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn identical_inputs_produce_identical_values() {
        let entity = Uuid::from_u128(7);
        let profile = BaselineProfile::assign(0, 26, PopulationSplit::default());
        let mut first_rng = walk_rng(&entity, MetricKind::HeartRate, noon());
        let mut second_rng = walk_rng(&entity, MetricKind::HeartRate, noon());
        let first = next_value(
            MetricKind::HeartRate,
            &profile,
            None,
            noon(),
            &mut first_rng,
        );
        let second = next_value(
            MetricKind::HeartRate,
            &profile,
            None,
            noon(),
            &mut second_rng,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn seeds_differ_across_entities_and_metrics() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let mut rng_a = walk_rng(&a, MetricKind::HeartRate, noon());
        let mut rng_b = walk_rng(&b, MetricKind::HeartRate, noon());
        let mut rng_c = walk_rng(&a, MetricKind::BloodGlucose, noon());
        let (x, y, z): (u64, u64, u64) = (rng_a.gen(), rng_b.gen(), rng_c.gen());
        assert_ne!(x, y);
        assert_ne!(x, z);
    }

    #[test]
    fn steps_scale_with_fraction_of_day() {
        let profile = BaselineProfile::assign(0, 26, PopulationSplit::default());
        let early = Utc.with_ymd_and_hms(2025, 3, 10, 1, 0, 0).unwrap();
        let mut rng = walk_rng(&Uuid::from_u128(3), MetricKind::Steps, early);
        let value = next_value(MetricKind::Steps, &profile, None, early, &mut rng);
        // 1/24th of the day elapsed: even the widest draw stays under 500.
        assert!(value < 500.0, "got {value}");
    }

    #[test]
    fn sleep_is_damped_outside_morning_window() {
        let profile = BaselineProfile::assign(0, 26, PopulationSplit::default());
        let evening = Utc.with_ymd_and_hms(2025, 3, 10, 20, 0, 0).unwrap();
        for trial in 0..50u128 {
            let entity = Uuid::from_u128(100 + trial);
            let mut rng = walk_rng(&entity, MetricKind::SleepDuration, evening);
            let value = next_value(MetricKind::SleepDuration, &profile, None, evening, &mut rng);
            // Full variance is 7.5 ± 0.8; damping keeps deviations within ± 0.2
            // of center (plus the 0.1 rounding grid).
            assert!((value - 7.5).abs() <= 0.3 + 1e-9, "got {value}");
        }
    }
}
