use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod evolve;
mod profile;

pub use evolve::{next_value, walk_rng};
pub use profile::{
    health_group, Baseline, BaselineProfile, CriticalVariant, HealthGroup, PopulationSplit,
};

/// Closed vocabulary of tracked vital-sign metrics.
///
/// Every kind carries an associated unit, rounding rule, optional normal/critical
/// range, and absolute physical constraints. Keeping this a closed enum makes
/// the range tables exhaustiveness-checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    HeartRate,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    OxygenSaturation,
    BodyTemperature,
    RespiratoryRate,
    BloodGlucose,
    Steps,
    SleepDuration,
    Hydration,
    PainLevel,
    StressLevel,
    MoodScore,
}

impl MetricKind {
    pub const ALL: &'static [MetricKind] = &[
        MetricKind::HeartRate,
        MetricKind::BloodPressureSystolic,
        MetricKind::BloodPressureDiastolic,
        MetricKind::OxygenSaturation,
        MetricKind::BodyTemperature,
        MetricKind::RespiratoryRate,
        MetricKind::BloodGlucose,
        MetricKind::Steps,
        MetricKind::SleepDuration,
        MetricKind::Hydration,
        MetricKind::PainLevel,
        MetricKind::StressLevel,
        MetricKind::MoodScore,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            MetricKind::HeartRate => "heart_rate",
            MetricKind::BloodPressureSystolic => "blood_pressure_systolic",
            MetricKind::BloodPressureDiastolic => "blood_pressure_diastolic",
            MetricKind::OxygenSaturation => "oxygen_saturation",
            MetricKind::BodyTemperature => "body_temperature",
            MetricKind::RespiratoryRate => "respiratory_rate",
            MetricKind::BloodGlucose => "blood_glucose",
            MetricKind::Steps => "steps",
            MetricKind::SleepDuration => "sleep_duration",
            MetricKind::Hydration => "hydration",
            MetricKind::PainLevel => "pain_level",
            MetricKind::StressLevel => "stress_level",
            MetricKind::MoodScore => "mood_score",
        }
    }

    pub fn parse(raw: &str) -> Option<MetricKind> {
        MetricKind::ALL.iter().copied().find(|k| k.as_str() == raw)
    }

    /// Human-readable label used in alert titles and messages.
    pub const fn label(self) -> &'static str {
        match self {
            MetricKind::HeartRate => "heart rate",
            MetricKind::BloodPressureSystolic => "systolic blood pressure",
            MetricKind::BloodPressureDiastolic => "diastolic blood pressure",
            MetricKind::OxygenSaturation => "oxygen saturation",
            MetricKind::BodyTemperature => "body temperature",
            MetricKind::RespiratoryRate => "respiratory rate",
            MetricKind::BloodGlucose => "blood glucose",
            MetricKind::Steps => "step count",
            MetricKind::SleepDuration => "sleep duration",
            MetricKind::Hydration => "hydration",
            MetricKind::PainLevel => "pain level",
            MetricKind::StressLevel => "stress level",
            MetricKind::MoodScore => "mood score",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            MetricKind::HeartRate => "bpm",
            MetricKind::BloodPressureSystolic | MetricKind::BloodPressureDiastolic => "mmHg",
            MetricKind::OxygenSaturation => "%",
            MetricKind::BodyTemperature => "°C",
            MetricKind::RespiratoryRate => "breaths/min",
            MetricKind::BloodGlucose => "mg/dL",
            MetricKind::Steps => "steps",
            MetricKind::SleepDuration => "hours",
            MetricKind::Hydration => "liters",
            MetricKind::PainLevel | MetricKind::StressLevel => "/10",
            MetricKind::MoodScore => "/5",
        }
    }

    pub const fn rounding(self) -> Rounding {
        match self {
            MetricKind::HeartRate
            | MetricKind::BloodPressureSystolic
            | MetricKind::BloodPressureDiastolic
            | MetricKind::OxygenSaturation
            | MetricKind::RespiratoryRate
            | MetricKind::BloodGlucose
            | MetricKind::Steps => Rounding::Whole,
            MetricKind::BodyTemperature | MetricKind::SleepDuration | MetricKind::Hydration => {
                Rounding::OneDecimal
            }
            MetricKind::PainLevel | MetricKind::StressLevel | MetricKind::MoodScore => {
                Rounding::HalfStep
            }
        }
    }

    /// Normal and critical bounds, where configured. `Steps` intentionally has
    /// no range spec and therefore skips health-group enforcement.
    pub const fn range_spec(self) -> Option<RangeSpec> {
        match self {
            MetricKind::HeartRate => Some(RangeSpec::new(60.0, 100.0, Some(50.0), Some(120.0))),
            MetricKind::BloodPressureSystolic => {
                Some(RangeSpec::new(90.0, 130.0, Some(80.0), Some(160.0)))
            }
            MetricKind::BloodPressureDiastolic => {
                Some(RangeSpec::new(60.0, 80.0, Some(50.0), Some(100.0)))
            }
            MetricKind::OxygenSaturation => {
                Some(RangeSpec::new(95.0, 100.0, Some(90.0), Some(100.0)))
            }
            MetricKind::BodyTemperature => {
                Some(RangeSpec::new(36.1, 37.2, Some(35.0), Some(39.5)))
            }
            MetricKind::RespiratoryRate => Some(RangeSpec::new(12.0, 20.0, Some(8.0), Some(30.0))),
            MetricKind::BloodGlucose => Some(RangeSpec::new(70.0, 140.0, Some(54.0), Some(250.0))),
            MetricKind::Steps => None,
            MetricKind::SleepDuration => Some(RangeSpec::new(6.0, 9.0, Some(4.0), Some(11.0))),
            MetricKind::Hydration => Some(RangeSpec::new(1.5, 3.5, None, None)),
            MetricKind::PainLevel => Some(RangeSpec::new(1.0, 4.0, None, Some(8.0))),
            MetricKind::StressLevel => Some(RangeSpec::new(1.0, 6.0, None, Some(9.0))),
            MetricKind::MoodScore => Some(RangeSpec::new(2.0, 5.0, Some(1.0), None)),
        }
    }

    /// Absolute physical bounds, wider than the range spec. Always the final
    /// clamp in the evolution pipeline.
    pub const fn constraints(self) -> Constraint {
        match self {
            MetricKind::HeartRate => Constraint::new(40.0, 200.0),
            MetricKind::BloodPressureSystolic => Constraint::new(70.0, 220.0),
            MetricKind::BloodPressureDiastolic => Constraint::new(40.0, 130.0),
            MetricKind::OxygenSaturation => Constraint::new(70.0, 100.0),
            MetricKind::BodyTemperature => Constraint::new(34.0, 42.0),
            MetricKind::RespiratoryRate => Constraint::new(6.0, 40.0),
            MetricKind::BloodGlucose => Constraint::new(40.0, 400.0),
            MetricKind::Steps => Constraint::new(0.0, 40_000.0),
            MetricKind::SleepDuration => Constraint::new(0.0, 14.0),
            MetricKind::Hydration => Constraint::new(0.0, 8.0),
            MetricKind::PainLevel | MetricKind::StressLevel => Constraint::new(1.0, 10.0),
            MetricKind::MoodScore => Constraint::new(1.0, 5.0),
        }
    }
}

/// Per-metric rounding policy applied as the last step of value evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Whole,
    OneDecimal,
    HalfStep,
}

impl Rounding {
    pub const fn step(self) -> f64 {
        match self {
            Rounding::Whole => 1.0,
            Rounding::OneDecimal => 0.1,
            Rounding::HalfStep => 0.5,
        }
    }

    pub fn apply(self, value: f64) -> f64 {
        let step = self.step();
        (value / step).round() * step
    }

    /// Smallest on-grid value >= `value`.
    pub fn ceil_to_grid(self, value: f64) -> f64 {
        let step = self.step();
        (value / step).ceil() * step
    }

    /// Largest on-grid value <= `value`.
    pub fn floor_to_grid(self, value: f64) -> f64 {
        let step = self.step();
        (value / step).floor() * step
    }
}

/// Normal [min, max] and optional critical bounds for a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSpec {
    pub min: f64,
    pub max: f64,
    pub critical_min: Option<f64>,
    pub critical_max: Option<f64>,
}

/// Fraction shaved off each edge of the normal range to form the safe zone.
pub const SAFE_ZONE_MARGIN: f64 = 0.05;

impl RangeSpec {
    pub const fn new(
        min: f64,
        max: f64,
        critical_min: Option<f64>,
        critical_max: Option<f64>,
    ) -> Self {
        Self {
            min,
            max,
            critical_min,
            critical_max,
        }
    }

    /// Normal range shrunk by [`SAFE_ZONE_MARGIN`] from each edge.
    pub fn safe_zone(&self) -> (f64, f64) {
        let margin = SAFE_ZONE_MARGIN * (self.max - self.min);
        (self.min + margin, self.max - margin)
    }

    /// Band a warning-group value is clamped into. Missing critical bounds
    /// fall back to the normal bounds.
    pub fn warning_band(&self) -> (f64, f64) {
        (
            self.critical_min.unwrap_or(self.min),
            self.critical_max.unwrap_or(self.max),
        )
    }

    pub fn breaches_normal(&self, value: f64) -> bool {
        value < self.min || value > self.max
    }

    pub fn breaches_critical(&self, value: f64) -> bool {
        self.critical_min.is_some_and(|lo| value < lo)
            || self.critical_max.is_some_and(|hi| value > hi)
    }

    /// The bound a value violated, for alert metadata. Prefers the critical
    /// bound when the value is past it.
    pub fn violated_threshold(&self, value: f64) -> Option<f64> {
        if let Some(lo) = self.critical_min {
            if value < lo {
                return Some(lo);
            }
        }
        if let Some(hi) = self.critical_max {
            if value > hi {
                return Some(hi);
            }
        }
        if value < self.min {
            Some(self.min)
        } else if value > self.max {
            Some(self.max)
        } else {
            None
        }
    }
}

/// Hard physical bounds for a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub lo: f64,
    pub hi: f64,
}

impl Constraint {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lo, self.hi)
    }
}

pub const SAMPLE_SOURCE_DEVICE: &str = "device";

/// A single generated reading. Immutable once written; ordered by
/// `recorded_at` per (entity, metric).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub metric: MetricKind,
    pub value: f64,
    pub unit: String,
    pub source: String,
    pub active: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub recorded_at: DateTime<Utc>,
}

impl MetricSample {
    pub fn device(entity_id: Uuid, metric: MetricKind, value: f64, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            metric,
            value,
            unit: metric.unit().to_string(),
            source: SAMPLE_SOURCE_DEVICE.to_string(),
            active: true,
            recorded_at: at,
        }
    }
}
