//! Logging and metrics setup for coedit binaries.
//!
//! Provides:
//! - Compact console tracing, filtered by `RUST_LOG`
//! - Prometheus metrics for the engine counters (`telemetry` feature)
//!
//! # Usage
//!
//! ```ignore
//! use coedit_common::telemetry::{self, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env("coedit-cli");
//! telemetry::init(config);
//! tracing::info!("replay started");
//! ```

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for labeling (e.g., "coedit-cli")
    pub service_name: String,
    /// Console log level (default: INFO, DEBUG in debug builds)
    pub console_level: Level,
    /// Install the Prometheus recorder. Needs the `telemetry` feature.
    pub metrics: bool,
}

impl TelemetryConfig {
    /// Load config from environment variables.
    ///
    /// - `RUST_LOG`: Standard env filter (optional, overrides console_level)
    /// - `COEDIT_METRICS`: set to `1` to install the metrics recorder
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            console_level,
            metrics: std::env::var("COEDIT_METRICS").is_ok_and(|v| v == "1"),
        }
    }

    /// Raise the console level to at least `level`.
    pub fn with_level(mut self, level: Level) -> Self {
        self.console_level = self.console_level.max(level);
        self
    }
}

/// Initialize telemetry (metrics + tracing).
///
/// Call once at application startup. Later calls leave the first subscriber
/// in place.
pub fn init(config: TelemetryConfig) {
    init_tracing(&config);

    if config.metrics {
        install_recorder();
    }
}

#[cfg(feature = "telemetry")]
fn install_recorder() {
    if let Err(error) = prometheus::init_metrics() {
        tracing::warn!(%error, "failed to install prometheus recorder");
    }
}

#[cfg(not(feature = "telemetry"))]
fn install_recorder() {
    tracing::warn!("metrics requested but the telemetry feature is off");
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()))
}

/// Initialize tracing with a compact console layer on stderr.
fn init_tracing(config: &TelemetryConfig) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter(config.console_level));

    match tracing_subscriber::registry().with(console_layer).try_init() {
        Ok(()) => tracing::debug!(service = %config.service_name, "telemetry initialized"),
        Err(error) => tracing::debug!(%error, "tracing already initialized"),
    }
}

#[cfg(feature = "telemetry")]
mod prometheus {
    use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
    use std::sync::OnceLock;

    static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    /// Install the prometheus recorder, once.
    pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
        if let Some(handle) = PROMETHEUS_HANDLE.get() {
            return Ok(handle);
        }
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
    }

    /// Render metrics in prometheus text format, if the recorder is installed.
    pub fn render() -> Option<String> {
        PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
    }
}

#[cfg(feature = "telemetry")]
pub use self::prometheus::{init_metrics, render};

// Re-export the metrics crate for convenience
#[cfg(feature = "telemetry")]
pub use metrics::{counter, gauge, histogram};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_level_only_raises_verbosity() {
        let config = TelemetryConfig {
            service_name: "test".into(),
            console_level: Level::INFO,
            metrics: false,
        };
        assert_eq!(config.clone().with_level(Level::TRACE).console_level, Level::TRACE);
        assert_eq!(config.with_level(Level::WARN).console_level, Level::INFO);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = TelemetryConfig::from_env("test");
        init(config.clone());
        init(config);
    }
}
