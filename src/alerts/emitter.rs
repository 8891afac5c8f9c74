use chrono::{DateTime, Duration, Utc};
use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::app::AppContext;
use crate::roster::Entity;
use crate::store::insert_alert_with_retry;
use crate::vitals::{MetricSample, RangeSpec};

use super::{AlertKind, AlertMetadata, AlertRecord, AlertSeverity, AlertStatus};

pub const WARNING_CHANNEL: &str = "warning";
pub const ALERT_CHANNEL: &str = "alert";

/// Inspect one tick's freshly generated samples and emit at most one warning
/// and one alert, subject to the population-wide throttle.
///
/// Nothing in here propagates an error: a persistence failure for one record
/// is logged and the rest of the tick continues.
#[instrument(skip_all)]
pub async fn run(ctx: &AppContext, entities: &[Entity], samples: &[MetricSample], now: DateTime<Utc>) {
    if samples.is_empty() {
        return;
    }
    check_warning(ctx, samples, now).await;
    check_alert(ctx, entities, samples, now).await;
}

async fn check_warning(ctx: &AppContext, samples: &[MetricSample], now: DateTime<Utc>) {
    if !ctx.throttle.warning_due(now) {
        ctx.metrics.inc_alert_suppressed(WARNING_CHANNEL, "throttled");
        return;
    }

    // One random entity, then one random sample of that entity. The rng scope
    // is synchronous so it never crosses an await point.
    let picked = {
        let mut rng = rand::thread_rng();
        let mut entity_ids: Vec<Uuid> = samples.iter().map(|s| s.entity_id).collect();
        entity_ids.sort_unstable();
        entity_ids.dedup();
        entity_ids.choose(&mut rng).copied().and_then(|entity_id| {
            samples
                .iter()
                .filter(|s| s.entity_id == entity_id)
                .choose(&mut rng)
                .cloned()
        })
    };
    let Some(sample) = picked else {
        return;
    };

    let Some(spec) = sample.metric.range_spec() else {
        debug!(metric = sample.metric.as_str(), "no range spec configured; warning check skipped");
        return;
    };
    if !spec.breaches_normal(sample.value) {
        return;
    }
    if spec.breaches_critical(sample.value) {
        // Critical readings belong to the alert channel.
        ctx.metrics
            .inc_alert_suppressed(WARNING_CHANNEL, "critical_declined");
        return;
    }

    let since = now - chrono_or_zero(ctx.config.alerts.warning_dedup);
    match ctx.alerts.find_active(sample.entity_id, sample.id, since).await {
        Ok(Some(_)) => {
            ctx.metrics.inc_alert_suppressed(WARNING_CHANNEL, "dedup");
            return;
        }
        Ok(None) => {}
        Err(err) => {
            warn!(error = ?err, "warning dedup lookup failed; skipping this window");
            return;
        }
    }

    let record = warning_record(&sample, &spec, now);
    if !insert_alert_with_retry(ctx.alerts.as_ref(), &record).await {
        return;
    }

    let next_interval = {
        let mut rng = rand::thread_rng();
        let min = ctx.config.alerts.warning_interval_min.as_secs();
        let max = ctx.config.alerts.warning_interval_max.as_secs().max(min);
        std::time::Duration::from_secs(rng.gen_range(min..=max))
    };
    ctx.throttle.record_warning(now, next_interval);
    ctx.metrics
        .inc_alert_emitted(WARNING_CHANNEL, record.severity.as_str());
    ctx.state.record_alert_emitted(&record).await;
    debug!(
        subject = %record.subject_id,
        metric = sample.metric.as_str(),
        value = sample.value,
        "warning emitted"
    );
}

async fn check_alert(
    ctx: &AppContext,
    entities: &[Entity],
    samples: &[MetricSample],
    now: DateTime<Utc>,
) {
    if !ctx.throttle.alert_due(now) {
        ctx.metrics.inc_alert_suppressed(ALERT_CHANNEL, "throttled");
        return;
    }

    let subject = ctx.throttle.subject_for_window(now, || {
        let mut rng = rand::thread_rng();
        entities.choose(&mut rng).map(|entity| entity.id)
    });
    let Some(subject) = subject else {
        return;
    };

    let picked = {
        let mut rng = rand::thread_rng();
        samples.choose(&mut rng).cloned()
    };
    let Some(sample) = picked else {
        return;
    };
    if sample.entity_id != subject {
        // Only the window's selected subject may trigger; everyone else waits
        // for the next rollover.
        ctx.metrics.inc_alert_suppressed(ALERT_CHANNEL, "out_of_band");
        return;
    }

    let Some(spec) = sample.metric.range_spec() else {
        debug!(metric = sample.metric.as_str(), "no range spec configured; alert check skipped");
        return;
    };
    let severity = if spec.breaches_critical(sample.value) {
        AlertSeverity::Critical
    } else if spec.breaches_normal(sample.value) {
        AlertSeverity::High
    } else {
        return;
    };

    let since = now - chrono_or_zero(ctx.config.alerts.alert_dedup);
    match ctx.alerts.find_active(sample.entity_id, sample.id, since).await {
        Ok(Some(_)) => {
            ctx.metrics.inc_alert_suppressed(ALERT_CHANNEL, "dedup");
            return;
        }
        Ok(None) => {}
        Err(err) => {
            warn!(error = ?err, "alert dedup lookup failed; skipping this window");
            return;
        }
    }

    let record = alert_record(&sample, &spec, severity, now);
    if !insert_alert_with_retry(ctx.alerts.as_ref(), &record).await {
        return;
    }
    ctx.throttle.record_alert(now);
    ctx.metrics
        .inc_alert_emitted(ALERT_CHANNEL, record.severity.as_str());
    ctx.state.record_alert_emitted(&record).await;

    fan_out_to_supervisors(ctx, &record, now).await;
}

/// Mirror an alert to every active supervisor, capped per supervisor so a
/// noisy patient cannot grow an unbounded backlog.
async fn fan_out_to_supervisors(ctx: &AppContext, patient_record: &AlertRecord, now: DateTime<Utc>) {
    let supervisors = match ctx.roster.active_supervisors().await {
        Ok(supervisors) => supervisors,
        Err(err) => {
            warn!(error = ?err, "supervisor roster unavailable; alert fan-out skipped");
            return;
        }
    };

    let cap = ctx.config.alerts.supervisor_active_cap;
    for supervisor in supervisors {
        match ctx.alerts.count_active_alerts(supervisor).await {
            Ok(active) if active >= cap => {
                debug!(supervisor = %supervisor, active, "supervisor at active-alert cap; skipping");
                ctx.metrics
                    .inc_alert_suppressed(ALERT_CHANNEL, "supervisor_cap");
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(supervisor = %supervisor, error = ?err, "active-alert count failed; skipping supervisor");
                continue;
            }
        }

        let mirrored = AlertRecord {
            id: Uuid::new_v4(),
            subject_id: supervisor,
            triggered_at: now,
            metadata: AlertMetadata {
                patient_id: Some(patient_record.subject_id),
                ..patient_record.metadata.clone()
            },
            ..patient_record.clone()
        };
        if insert_alert_with_retry(ctx.alerts.as_ref(), &mirrored).await {
            ctx.metrics
                .inc_alert_emitted(ALERT_CHANNEL, mirrored.severity.as_str());
        }
    }
}

fn warning_record(sample: &MetricSample, spec: &RangeSpec, now: DateTime<Utc>) -> AlertRecord {
    let threshold = spec.violated_threshold(sample.value).unwrap_or(spec.max);
    AlertRecord {
        id: Uuid::new_v4(),
        subject_id: sample.entity_id,
        kind: AlertKind::VitalWarning,
        title: format!("Abnormal {} reading", sample.metric.label()),
        message: format!(
            "{} of {} {} is outside the normal range {}–{} {}",
            capitalize(sample.metric.label()),
            sample.value,
            sample.unit,
            spec.min,
            spec.max,
            sample.unit,
        ),
        severity: AlertSeverity::Medium,
        status: AlertStatus::Active,
        triggered_at: now,
        related_sample_id: sample.id,
        metadata: AlertMetadata {
            threshold,
            actual_value: sample.value,
            unit: sample.unit.clone(),
            is_warning: true,
            patient_id: None,
        },
    }
}

fn alert_record(
    sample: &MetricSample,
    spec: &RangeSpec,
    severity: AlertSeverity,
    now: DateTime<Utc>,
) -> AlertRecord {
    let threshold = spec.violated_threshold(sample.value).unwrap_or(spec.max);
    let tier = match severity {
        AlertSeverity::Critical => "Critical",
        _ => "Elevated",
    };
    AlertRecord {
        id: Uuid::new_v4(),
        subject_id: sample.entity_id,
        kind: AlertKind::VitalAlert,
        title: format!("{tier} {} reading", sample.metric.label()),
        message: format!(
            "{} of {} {} breached the {} threshold of {} {}",
            capitalize(sample.metric.label()),
            sample.value,
            sample.unit,
            match severity {
                AlertSeverity::Critical => "critical",
                _ => "normal",
            },
            threshold,
            sample.unit,
        ),
        severity,
        status: AlertStatus::Active,
        triggered_at: now,
        related_sample_id: sample.id,
        metadata: AlertMetadata {
            threshold,
            actual_value: sample.value,
            unit: sample.unit.clone(),
            is_warning: false,
            patient_id: None,
        },
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn chrono_or_zero(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::zero())
}
