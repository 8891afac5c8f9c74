use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::AlertConfig;

/// Population-wide rate limiter shared by both emitter channels.
///
/// Owned by the app context and passed by reference, never global, so tests
/// can drive it with fixed clocks. All decisions happen under one lock and
/// none of the methods await, so two concurrent ticks cannot both claim the
/// same window.
pub struct AlertThrottle {
    inner: Mutex<Inner>,
}

struct Inner {
    alert_window: Duration,
    last_alert_at: Option<DateTime<Utc>>,
    last_warning_at: Option<DateTime<Utc>>,
    warning_interval: Duration,
    selected: Option<SelectedSubject>,
}

struct SelectedSubject {
    entity_id: Uuid,
    window_opened_at: DateTime<Utc>,
}

impl AlertThrottle {
    pub fn new(config: &AlertConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                alert_window: chrono_duration(config.alert_window),
                last_alert_at: None,
                last_warning_at: None,
                // First warning is gated only by `last_warning_at == None`;
                // the randomized interval is drawn when a warning fires.
                warning_interval: chrono_duration(config.warning_interval_min),
                selected: None,
            }),
        }
    }

    pub fn warning_due(&self, now: DateTime<Utc>) -> bool {
        let inner = self.lock();
        match inner.last_warning_at {
            None => true,
            Some(last) => now - last >= inner.warning_interval,
        }
    }

    /// Record a fired warning and draw the next randomized interval.
    pub fn record_warning(&self, now: DateTime<Utc>, next_interval: std::time::Duration) {
        let mut inner = self.lock();
        inner.last_warning_at = Some(now);
        inner.warning_interval = chrono_duration(next_interval);
    }

    pub fn alert_due(&self, now: DateTime<Utc>) -> bool {
        let inner = self.lock();
        match inner.last_alert_at {
            None => true,
            Some(last) => now - last >= inner.alert_window,
        }
    }

    pub fn record_alert(&self, now: DateTime<Utc>) {
        self.lock().last_alert_at = Some(now);
    }

    /// Subject allowed to trigger alerts in the current hour window. A new
    /// subject is picked via `pick` once the window rolls over.
    pub fn subject_for_window(
        &self,
        now: DateTime<Utc>,
        pick: impl FnOnce() -> Option<Uuid>,
    ) -> Option<Uuid> {
        let mut inner = self.lock();
        let expired = match &inner.selected {
            None => true,
            Some(selected) => now - selected.window_opened_at >= inner.alert_window,
        };
        if expired {
            inner.selected = pick().map(|entity_id| SelectedSubject {
                entity_id,
                window_opened_at: now,
            });
        }
        inner.selected.as_ref().map(|selected| selected.entity_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn chrono_duration(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::seconds(3_600))
}
