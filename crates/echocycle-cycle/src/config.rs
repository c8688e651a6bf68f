//! Scheduler configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists. `validate()` is the
//! only hard failure: a scheduler is never built from a bad config.

use echocycle_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level scheduler configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Stream state and salience tuning.
    pub streams: StreamConfig,
    /// Tick cadence and intra-tick parallelism.
    pub scheduler: SchedulerConfig,
    /// Cycle history.
    pub telemetry: TelemetryConfig,
    /// Agent dispatch.
    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// State-vector length per stream.
    pub dim: usize,
    /// Salience added to the primary stream each tick (clamped at 1.0).
    pub salience_increment: f64,
    /// Salience removed from non-primary streams each tick (floored at 0.0).
    pub salience_decay: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick interval in milliseconds.
    pub step_duration_ms: u64,
    /// Process the three streams of a tick as joined tasks instead of in id order.
    pub enable_parallel_streams: bool,
    /// Capacity of the observation broadcast channel. Slow subscribers lag past this.
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Record a cycle result at every boundary.
    pub enabled: bool,
    /// Retained cycle results; oldest dropped first.
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Advisory only. The scheduler does not enforce it.
    pub max_concurrent_agents: usize,
    /// When false, stage behaviors skip every agent invocation.
    pub enable_nested_agency: bool,
}

// ============================================================
// Defaults
// ============================================================

impl Default for StreamConfig {
    fn default() -> Self {
        Self { dim: 256, salience_increment: 0.10, salience_decay: 0.05 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { step_duration_ms: 100, enable_parallel_streams: true, event_buffer: 1024 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true, capacity: 100 }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self { max_concurrent_agents: 5, enable_nested_agency: true }
    }
}

// ============================================================
// Loading
// ============================================================

impl CycleConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Config {} unreadable ({}), using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.streams.dim == 0 {
            return Err(Error::config("streams.dim must be greater than 0"));
        }
        if self.scheduler.step_duration_ms == 0 {
            return Err(Error::config("scheduler.step_duration_ms must be greater than 0"));
        }
        if self.scheduler.event_buffer == 0 {
            return Err(Error::config("scheduler.event_buffer must be greater than 0"));
        }
        if self.telemetry.capacity == 0 {
            return Err(Error::config("telemetry.capacity must be greater than 0"));
        }
        for (name, value) in [
            ("streams.salience_increment", self.streams.salience_increment),
            ("streams.salience_decay", self.streams.salience_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::config(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.streams.dim
    }

    pub fn step_duration(&self) -> Duration {
        Duration::from_millis(self.scheduler.step_duration_ms)
    }

    pub fn enable_parallel_streams(&self) -> bool {
        self.scheduler.enable_parallel_streams
    }

    pub fn enable_telemetry(&self) -> bool {
        self.telemetry.enabled
    }

    pub fn enable_nested_agency(&self) -> bool {
        self.agents.enable_nested_agency
    }

    pub fn max_concurrent_agents(&self) -> usize {
        self.agents.max_concurrent_agents
    }
}
