//! Process-wide engine state shared by every session.
//!
//! The [`Guard`] owns the configuration, the event bus, the alert pipeline
//! and the validated check catalog. Sessions hold an `Arc<Guard>` instead of
//! reaching for a global.

use crate::alert::{AlertFormatter, AlertPipeline, PlainFormatter};
use crate::checks::{self, CheckFactory};
use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::error::Result;
use crate::event::EventBus;
use log::info;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Replaceable collaborators of the engine.
pub struct GuardOptions {
    pub catalog: Vec<CheckFactory>,
    /// Defaults to a [`PlainFormatter`] using the configured prefix.
    pub formatter: Option<Arc<dyn AlertFormatter>>,
    pub clock: Arc<dyn Clock>,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            catalog: checks::catalog(),
            formatter: None,
            clock: Arc::new(SystemClock::new()),
        }
    }
}

pub struct Guard {
    config: Arc<GuardConfig>,
    bus: Arc<EventBus>,
    alerts: Arc<AlertPipeline>,
    catalog: Vec<CheckFactory>,
    clock: Arc<dyn Clock>,
}

impl Guard {
    /// Builds the engine with the shipped checks and the system clock.
    ///
    /// `runtime` runs alert windows and alert formatting.
    pub fn new(config: GuardConfig, runtime: Handle) -> Result<Arc<Self>> {
        Self::with_options(config, runtime, GuardOptions::default())
    }

    /// Fails when the configuration or the check catalog is malformed, so a
    /// broken deployment is noticed at start rather than by missed detections.
    pub fn with_options(
        config: GuardConfig,
        runtime: Handle,
        options: GuardOptions,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        checks::validate_catalog(&options.catalog, &config)?;

        let bus = Arc::new(EventBus::new());
        let formatter: Arc<dyn AlertFormatter> = match options.formatter {
            Some(formatter) => formatter,
            None => Arc::new(PlainFormatter::new(config.alert_prefix.clone())),
        };
        let alerts = Arc::new(AlertPipeline::new(
            runtime,
            config.alert_window(),
            formatter,
            bus.clone(),
        ));

        info!(
            "Guard started with {} checks, alert window {}ms",
            options.catalog.len(),
            config.alert_window_ms
        );

        Ok(Arc::new(Self {
            config: Arc::new(config),
            bus,
            alerts,
            catalog: options.catalog,
            clock: options.clock,
        }))
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn alerts(&self) -> &Arc<AlertPipeline> {
        &self.alerts
    }

    pub fn catalog(&self) -> &[CheckFactory] {
        &self.catalog
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuardError;

    #[tokio::test]
    async fn test_default_engine_starts() {
        let guard = Guard::new(GuardConfig::default(), Handle::current()).unwrap();
        assert_eq!(guard.catalog().len(), 10);
        assert_eq!(guard.alerts().window().as_millis(), 1000);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_fast() {
        let config = GuardConfig {
            alert_window_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            Guard::new(config, Handle::current()),
            Err(GuardError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_broken_catalog_fails_fast() {
        let mut catalog = checks::catalog();
        let first = catalog[0];
        catalog.push(first);

        let options = GuardOptions {
            catalog,
            ..Default::default()
        };
        assert!(matches!(
            Guard::with_options(GuardConfig::default(), Handle::current(), options),
            Err(GuardError::DuplicateCheck(_))
        ));
    }
}
