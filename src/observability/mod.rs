// src/observability/mod.rs
//! Logging and metrics setup
//!
//! - **Tracing**: `tracing-subscriber` fmt layer with `EnvFilter`
//!   (`RUST_LOG` wins over the configured level), plain or JSON lines
//! - **Metrics**: Prometheus recorder for the `metrics` macros used across
//!   the engine; without it every metric call is a no-op
//!
//! Both initialisers are safe to call more than once.

use crate::utils::config::ObservabilitySettings;
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global tracing subscriber
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(settings: &ObservabilitySettings) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if settings.json_logs {
        builder.json().with_current_span(true).try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

/// Install the Prometheus recorder once and return its handle
pub fn init_metrics() -> Result<&'static PrometheusHandle> {
    PROMETHEUS.get_or_try_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| EngineError::Observability(e.to_string()))
    })
}

/// Prometheus text exposition of all recorded metrics, if metrics are on
pub fn render_metrics() -> Option<String> {
    PROMETHEUS.get().map(PrometheusHandle::render)
}

/// Initialise everything the settings ask for
pub fn init(settings: &ObservabilitySettings) -> Result<()> {
    init_tracing(settings);
    if settings.metrics_enabled {
        init_metrics()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        let settings = ObservabilitySettings::default();
        init_tracing(&settings);
        // A second install never panics, it just reports that one exists
        assert!(!init_tracing(&settings));
    }

    #[test]
    fn test_metrics_render_after_init() {
        let handle = init_metrics().unwrap();
        metrics::counter!("agent_engine_executions_total", "agent" => "echo", "outcome" => "success")
            .increment(1);

        let text = handle.render();
        assert!(text.contains("agent_engine_executions_total"));
        assert!(render_metrics().is_some());
        // Second call returns the same recorder
        assert!(init_metrics().is_ok());
    }
}
