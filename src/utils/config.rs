// src/utils/config.rs
//! Engine configuration
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. Built-in defaults
//! 2. Optional file (`AGENT_ENGINE_CONFIG`, else `agent-engine.{toml,yaml,json}`)
//! 3. Environment overrides, e.g. `AGENT_ENGINE__EXECUTION__MAX_CONCURRENT_AGENTS=20`

use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "AGENT_ENGINE_CONFIG";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "AGENT_ENGINE";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub execution: ExecutionSettings,
    pub watchdog: WatchdogSettings,
    pub observability: ObservabilitySettings,
}

/// Admission, timeout, retry, and history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Maximum executions holding an admission slot at once
    pub max_concurrent_agents: usize,

    /// Wall-clock budget for a single agent invocation
    pub agent_execution_timeout_ms: u64,

    /// Results kept per tenant before the oldest are evicted
    pub max_history_size: usize,

    /// Interval between tracker heartbeats for a running execution
    pub heartbeat_interval_ms: u64,

    /// Base delay for exponential retry backoff
    pub retry_base_delay_ms: u64,

    /// Retries allowed when a context does not specify its own
    pub default_max_retries: u32,

    /// Queue-wait / execution-time samples kept per tenant
    pub stats_sample_capacity: usize,

    /// How long shutdown waits for in-flight executions
    pub shutdown_grace_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 10,
            agent_execution_timeout_ms: 30_000,
            max_history_size: 100,
            heartbeat_interval_ms: 5_000,
            retry_base_delay_ms: 1_000,
            default_max_retries: 3,
            stats_sample_capacity: 1_000,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl ExecutionSettings {
    pub fn agent_execution_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_execution_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Death/timeout watchdog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    pub enabled: bool,

    /// How often tracker records are scanned
    pub scan_interval_ms: u64,

    /// Time since last heartbeat after which a run is presumed dead
    pub death_threshold_ms: u64,

    /// Restarts allowed after the watchdog task panics
    pub max_restarts: u32,

    /// Base delay between watchdog restarts
    pub restart_backoff_ms: u64,

    /// How long finished runs keep their event ordering state
    pub event_retention_ms: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_ms: 10_000,
            death_threshold_ms: 60_000,
            max_restarts: 5,
            restart_backoff_ms: 500,
            event_retention_ms: 300_000,
        }
    }
}

impl WatchdogSettings {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn death_threshold(&self) -> Duration {
        Duration::from_millis(self.death_threshold_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn event_retention(&self) -> Duration {
        Duration::from_millis(self.event_retention_ms)
    }
}

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Fallback level when `RUST_LOG` is unset
    pub log_level: String,

    /// Emit logs as JSON lines
    pub json_logs: bool,

    /// Install the Prometheus recorder
    pub metrics_enabled: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, optional file, and environment
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(CONFIG_PATH_ENV).ok();
        Self::build(explicit.as_deref().map(Path::new), true)
    }

    /// Load configuration from defaults and the given file only
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(Some(path), false)
    }

    fn build(path: Option<&Path>, include_env: bool) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&EngineConfig::default())?);

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("agent-engine").required(false)),
        };

        if include_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(EngineError::Config)?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        let exec = &self.execution;

        if exec.max_concurrent_agents == 0 {
            return Err("max_concurrent_agents cannot be 0".to_string());
        }
        if exec.agent_execution_timeout_ms == 0 {
            return Err("agent_execution_timeout_ms cannot be 0".to_string());
        }
        if exec.max_history_size == 0 {
            return Err("max_history_size cannot be 0".to_string());
        }
        if exec.heartbeat_interval_ms == 0 {
            return Err("heartbeat_interval_ms cannot be 0".to_string());
        }

        if self.watchdog.enabled {
            if self.watchdog.scan_interval_ms == 0 {
                return Err("watchdog scan_interval_ms cannot be 0".to_string());
            }
            if self.watchdog.death_threshold_ms <= exec.heartbeat_interval_ms {
                return Err(format!(
                    "watchdog death_threshold_ms ({}) must exceed heartbeat_interval_ms ({})",
                    self.watchdog.death_threshold_ms, exec.heartbeat_interval_ms
                ));
            }
        }

        Ok(())
    }
}
