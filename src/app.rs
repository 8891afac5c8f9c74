use std::sync::Arc;

use crate::alerts::AlertThrottle;
use crate::config::AppConfig;
use crate::metrics::AppMetrics;
use crate::roster::RosterProvider;
use crate::state::SharedState;
use crate::store::{AlertStore, SampleStore};

/// Shared application context passed to HTTP handlers and scheduler loops.
///
/// The throttle lives here rather than in any global so tests can construct
/// isolated contexts with fixed clocks and in-memory stores.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub roster: Arc<dyn RosterProvider>,
    pub samples: Arc<dyn SampleStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub metrics: AppMetrics,
    pub state: SharedState,
    pub throttle: Arc<AlertThrottle>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        roster: Arc<dyn RosterProvider>,
        samples: Arc<dyn SampleStore>,
        alerts: Arc<dyn AlertStore>,
        metrics: AppMetrics,
        state: SharedState,
    ) -> Self {
        let throttle = Arc::new(AlertThrottle::new(&config.alerts));
        Self {
            config: Arc::new(config),
            roster,
            samples,
            alerts,
            metrics,
            state,
            throttle,
        }
    }

    pub fn fleet_name(&self) -> &str {
        &self.config.fleet
    }
}
