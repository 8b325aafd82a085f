//! Process-wide log and metrics setup.
//!
//! `RUST_LOG` wins over the configured `log_filter`; a bad directive in either
//! is reported instead of silently falling back to the default level.

use tracing_subscriber::EnvFilter;

use crate::config::MetricsSettings;
use crate::error::{RelayError, RelayResult};

/// Resolve the effective filter: `RUST_LOG` if set, else `configured`.
pub fn log_filter(configured: &str) -> RelayResult<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => parse_filter(&directives),
        _ => parse_filter(configured),
    }
}

fn parse_filter(directives: &str) -> RelayResult<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| RelayError::Telemetry(format!("invalid log filter {directives:?}: {e}")))
}

pub fn init_tracing(configured: &str) -> RelayResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(configured)?)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| RelayError::Telemetry(e.to_string()))
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(settings: &MetricsSettings) -> RelayResult<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], settings.listen_port))
        .install()
        .map_err(|e| RelayError::Telemetry(e.to_string()))?;

    tracing::info!(port = settings.listen_port, "Prometheus exporter listening on /metrics");
    metrics::gauge!("relay_up").set(1.0);
    Ok(())
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics(_settings: &MetricsSettings) -> RelayResult<()> {
    Ok(())
}
