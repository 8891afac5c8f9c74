use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod emitter;
mod throttle;

pub use emitter::run as emit_for_tick;
pub use throttle::AlertThrottle;

/// Notification tier. `Medium` is the throttled-warning tier; `High` and
/// `Critical` come out of the alert channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub const fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "low" => Some(AlertSeverity::Low),
            "medium" => Some(AlertSeverity::Medium),
            "high" => Some(AlertSeverity::High),
            "critical" => Some(AlertSeverity::Critical),
            _ => None,
        }
    }
}

/// Lifecycle state. This subsystem only ever creates `Active` records; the
/// remaining transitions belong to the CRUD layer upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(AlertStatus::Active),
            "acknowledged" => Some(AlertStatus::Acknowledged),
            "resolved" => Some(AlertStatus::Resolved),
            "dismissed" => Some(AlertStatus::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    VitalAlert,
    VitalWarning,
}

impl AlertKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            AlertKind::VitalAlert => "vital_alert",
            AlertKind::VitalWarning => "vital_warning",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "vital_alert" => Some(AlertKind::VitalAlert),
            "vital_warning" => Some(AlertKind::VitalWarning),
            _ => None,
        }
    }
}

/// Context attached to every alert for the display layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMetadata {
    pub threshold: f64,
    pub actual_value: f64,
    pub unit: String,
    pub is_warning: bool,
    /// Set on records fanned out to supervisors, pointing back at the patient.
    pub patient_id: Option<Uuid>,
}

/// One emitted notification. Created once; never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub triggered_at: DateTime<Utc>,
    pub related_sample_id: Uuid,
    pub metadata: AlertMetadata,
}
