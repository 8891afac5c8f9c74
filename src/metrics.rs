use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Metrics registry for the agent, scraped by Prometheus.
#[derive(Clone)]
pub struct AppMetrics {
    registry: Arc<Registry>,
    loops: LoopMetrics,
    telemetry: TelemetryMetrics,
    alerts: AlertMetrics,
}

impl AppMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new_custom(Some("vitalsim".into()), None)?);

        let loops = LoopMetrics::register(&registry)?;
        let telemetry = TelemetryMetrics::register(&registry)?;
        let alerts = AlertMetrics::register(&registry)?;

        Ok(Self {
            registry,
            loops,
            telemetry,
            alerts,
        })
    }

    /// Observe the execution duration for a loop.
    pub fn observe_duration(&self, loop_name: &str, duration: Duration) {
        let seconds = duration.as_secs_f64();
        self.loops
            .scrape_duration
            .with_label_values(&[loop_name])
            .observe(seconds);
    }

    /// Record a success flag for a loop iteration (1=success, 0=failed).
    pub fn record_success(&self, loop_name: &str, success: bool) {
        self.loops
            .last_success
            .with_label_values(&[loop_name])
            .set(if success { 1 } else { 0 });
    }

    /// Increment the error counter for a loop.
    pub fn inc_error(&self, loop_name: &str) {
        self.loops
            .errors_total
            .with_label_values(&[loop_name])
            .inc();
    }

    pub fn add_samples_generated(&self, metric: &str, count: u64) {
        self.telemetry
            .samples_generated_total
            .with_label_values(&[metric])
            .inc_by(count);
    }

    pub fn add_backfill_samples(&self, count: u64) {
        self.telemetry.backfill_samples_total.inc_by(count);
    }

    pub fn inc_dropped_batches(&self) {
        self.telemetry.dropped_batches_total.inc();
    }

    pub fn set_population(&self, fleet: &str, group: &str, count: usize) {
        self.telemetry
            .population
            .with_label_values(&[fleet, group])
            .set(count as i64);
    }

    pub fn inc_alert_emitted(&self, channel: &str, severity: &str) {
        self.alerts
            .emitted_total
            .with_label_values(&[channel, severity])
            .inc();
    }

    pub fn inc_alert_suppressed(&self, channel: &str, reason: &str) {
        self.alerts
            .suppressed_total
            .with_label_values(&[channel, reason])
            .inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Clone)]
struct LoopMetrics {
    scrape_duration: HistogramVec,
    last_success: IntGaugeVec,
    errors_total: IntCounterVec,
}

impl LoopMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let scrape_duration = HistogramVec::new(
            HistogramOpts::new("loop_duration_seconds", "Scheduler loop execution time"),
            &["loop"],
        )?;
        let last_success = IntGaugeVec::new(
            Opts::new("loop_last_success", "Whether the last loop iteration succeeded"),
            &["loop"],
        )?;
        let errors_total = IntCounterVec::new(
            Opts::new("loop_errors_total", "Loop iteration failures"),
            &["loop"],
        )?;

        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(last_success.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            scrape_duration,
            last_success,
            errors_total,
        })
    }
}

#[derive(Clone)]
struct TelemetryMetrics {
    samples_generated_total: IntCounterVec,
    backfill_samples_total: IntCounter,
    dropped_batches_total: IntCounter,
    population: IntGaugeVec,
}

impl TelemetryMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let samples_generated_total = IntCounterVec::new(
            Opts::new("samples_generated_total", "Samples produced by the live tick"),
            &["metric"],
        )?;
        let backfill_samples_total = IntCounter::new(
            "backfill_samples_total",
            "Samples written by historical backfill",
        )?;
        let dropped_batches_total = IntCounter::new(
            "dropped_batches_total",
            "Per-entity sample batches dropped after store retries",
        )?;
        let population = IntGaugeVec::new(
            Opts::new("population", "Active entities per health group"),
            &["fleet", "group"],
        )?;

        registry.register(Box::new(samples_generated_total.clone()))?;
        registry.register(Box::new(backfill_samples_total.clone()))?;
        registry.register(Box::new(dropped_batches_total.clone()))?;
        registry.register(Box::new(population.clone()))?;

        Ok(Self {
            samples_generated_total,
            backfill_samples_total,
            dropped_batches_total,
            population,
        })
    }
}

#[derive(Clone)]
struct AlertMetrics {
    emitted_total: IntCounterVec,
    suppressed_total: IntCounterVec,
}

impl AlertMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let emitted_total = IntCounterVec::new(
            Opts::new("alerts_emitted_total", "Alert records written, by channel"),
            &["channel", "severity"],
        )?;
        let suppressed_total = IntCounterVec::new(
            Opts::new(
                "alerts_suppressed_total",
                "Emitter checks suppressed, by reason",
            ),
            &["channel", "reason"],
        )?;

        registry.register(Box::new(emitted_total.clone()))?;
        registry.register(Box::new(suppressed_total.clone()))?;

        Ok(Self {
            emitted_total,
            suppressed_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_renders_registered_counters() {
        let metrics = AppMetrics::new().expect("registry");
        metrics.add_samples_generated("heart_rate", 13);
        metrics.inc_alert_emitted("warning", "medium");
        metrics.set_population("demo", "healthy", 12);

        let body = metrics.encode().expect("encode");
        assert!(body.contains("vitalsim_samples_generated_total"));
        assert!(body.contains("vitalsim_alerts_emitted_total"));
        assert!(body.contains("vitalsim_population"));
    }
}
