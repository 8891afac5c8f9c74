use serde::Serialize;

use super::MetricKind;

/// Health tier of a monitored patient. Never stored; always recomputed from
/// (index, population size) so every component agrees on the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthGroup {
    Healthy,
    Warning,
    Critical,
}

impl HealthGroup {
    pub const fn as_str(self) -> &'static str {
        match self {
            HealthGroup::Healthy => "healthy",
            HealthGroup::Warning => "warning",
            HealthGroup::Critical => "critical",
        }
    }
}

/// Which metric a critical-group patient is pushed critical on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalVariant {
    BloodPressure,
    HeartRate,
    OxygenSaturation,
    Mixed,
}

impl CriticalVariant {
    pub const fn from_index(index: usize) -> Self {
        match index % 4 {
            0 => CriticalVariant::BloodPressure,
            1 => CriticalVariant::HeartRate,
            2 => CriticalVariant::OxygenSaturation,
            _ => CriticalVariant::Mixed,
        }
    }

    /// Metrics this variant forces into the critical zone on every tick.
    pub const fn dominant_metrics(self) -> &'static [MetricKind] {
        match self {
            CriticalVariant::BloodPressure => &[
                MetricKind::BloodPressureSystolic,
                MetricKind::BloodPressureDiastolic,
            ],
            CriticalVariant::HeartRate => &[MetricKind::HeartRate],
            CriticalVariant::OxygenSaturation => &[MetricKind::OxygenSaturation],
            CriticalVariant::Mixed => &[
                MetricKind::HeartRate,
                MetricKind::BloodPressureSystolic,
                MetricKind::OxygenSaturation,
            ],
        }
    }
}

/// Population split ratios. The healthy and warning bands are contiguous,
/// in index order; the remainder is critical.
#[derive(Debug, Clone, Copy)]
pub struct PopulationSplit {
    pub healthy: f64,
    pub warning: f64,
}

impl Default for PopulationSplit {
    fn default() -> Self {
        Self {
            healthy: 0.46,
            warning: 0.31,
        }
    }
}

/// Pure partition of [0, population) into the three health bands.
pub fn health_group(index: usize, population: usize, split: PopulationSplit) -> HealthGroup {
    if population == 0 {
        return HealthGroup::Healthy;
    }
    let healthy = (population as f64 * split.healthy).round() as usize;
    let warning = (population as f64 * split.warning).round() as usize;
    if index < healthy {
        HealthGroup::Healthy
    } else if index < healthy + warning {
        HealthGroup::Warning
    } else {
        HealthGroup::Critical
    }
}

/// Per-metric random-walk target: values drift toward `center` and cold-start
/// uniformly within `center ± variance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub center: f64,
    pub variance: f64,
}

const fn b(center: f64, variance: f64) -> Baseline {
    Baseline { center, variance }
}

/// A patient's resolved tier plus, for critical patients, the cached variant.
///
/// Deterministic for identical inputs: live ticks and backfill must agree on
/// an entity's tier, so there is no hidden randomness here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineProfile {
    pub group: HealthGroup,
    pub variant: Option<CriticalVariant>,
}

impl BaselineProfile {
    pub fn assign(index: usize, population: usize, split: PopulationSplit) -> Self {
        let group = health_group(index, population, split);
        let variant = match group {
            HealthGroup::Critical => Some(CriticalVariant::from_index(index)),
            _ => None,
        };
        Self { group, variant }
    }

    /// Whether this metric is forced into the critical zone each tick.
    pub fn is_dominant(&self, metric: MetricKind) -> bool {
        self.variant
            .is_some_and(|v| v.dominant_metrics().contains(&metric))
    }

    pub fn baseline(&self, metric: MetricKind) -> Baseline {
        match self.group {
            HealthGroup::Healthy => healthy_baseline(metric),
            HealthGroup::Warning => warning_baseline(metric),
            HealthGroup::Critical => {
                // Non-dominant metrics of a critical patient track the warning
                // table; dominant metrics get the variant override.
                let variant = self.variant.unwrap_or(CriticalVariant::Mixed);
                critical_baseline(variant, metric)
            }
        }
    }
}

// The tables below are pre-tuned against the range specs: healthy centers sit
// strictly inside the safe zone (variance included), warning centers inside
// the critical band but outside or near the normal bounds, and critical
// variant overrides land beyond the adverse critical bound even at the
// unfavorable edge of the draw.

fn healthy_baseline(metric: MetricKind) -> Baseline {
    match metric {
        MetricKind::HeartRate => b(70.0, 8.0),
        MetricKind::BloodPressureSystolic => b(112.0, 8.0),
        MetricKind::BloodPressureDiastolic => b(70.0, 6.0),
        MetricKind::OxygenSaturation => b(97.5, 1.5),
        MetricKind::BodyTemperature => b(36.6, 0.3),
        MetricKind::RespiratoryRate => b(16.0, 2.0),
        MetricKind::BloodGlucose => b(95.0, 15.0),
        MetricKind::Steps => b(8_000.0, 3_000.0),
        MetricKind::SleepDuration => b(7.5, 0.8),
        MetricKind::Hydration => b(2.4, 0.5),
        MetricKind::PainLevel => b(1.5, 0.5),
        MetricKind::StressLevel => b(3.0, 1.0),
        MetricKind::MoodScore => b(4.0, 0.5),
    }
}

fn warning_baseline(metric: MetricKind) -> Baseline {
    match metric {
        MetricKind::HeartRate => b(105.0, 10.0),
        MetricKind::BloodPressureSystolic => b(140.0, 12.0),
        MetricKind::BloodPressureDiastolic => b(90.0, 7.0),
        MetricKind::OxygenSaturation => b(92.5, 1.5),
        MetricKind::BodyTemperature => b(37.6, 0.5),
        MetricKind::RespiratoryRate => b(23.0, 3.0),
        MetricKind::BloodGlucose => b(165.0, 30.0),
        MetricKind::Steps => b(4_500.0, 2_000.0),
        MetricKind::SleepDuration => b(5.2, 0.8),
        MetricKind::Hydration => b(1.6, 0.4),
        MetricKind::PainLevel => b(5.0, 1.5),
        MetricKind::StressLevel => b(6.5, 1.5),
        MetricKind::MoodScore => b(2.5, 0.5),
    }
}

fn critical_baseline(variant: CriticalVariant, metric: MetricKind) -> Baseline {
    match (variant, metric) {
        (CriticalVariant::BloodPressure, MetricKind::BloodPressureSystolic) => b(182.0, 12.0),
        (CriticalVariant::BloodPressure, MetricKind::BloodPressureDiastolic) => b(112.0, 8.0),
        (CriticalVariant::HeartRate, MetricKind::HeartRate) => b(165.0, 12.0),
        (CriticalVariant::OxygenSaturation, MetricKind::OxygenSaturation) => b(84.0, 3.0),
        (CriticalVariant::Mixed, MetricKind::HeartRate) => b(150.0, 10.0),
        (CriticalVariant::Mixed, MetricKind::BloodPressureSystolic) => b(172.0, 10.0),
        (CriticalVariant::Mixed, MetricKind::OxygenSaturation) => b(86.0, 3.0),
        (_, other) => warning_baseline(other),
    }
}
