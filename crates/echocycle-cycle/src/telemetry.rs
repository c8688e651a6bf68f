//! TelemetryLog — bounded history of completed cycles
//!
//! Metrics average over the retained window only. Evicted cycles stop
//! contributing to `average_cycle_time_ms` but still count in the lifetime
//! counters the scheduler passes in.

use echocycle_core::{CycleResult, STREAM_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use sysinfo::{Pid, System};
use tracing::warn;

pub const DEFAULT_CAPACITY: usize = 100;

/// Live counters owned by the scheduler, registry and stream set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveCounters {
    pub total_cycles: u64,
    pub total_steps: u64,
    pub active_agents: usize,
    pub stream_saliences: [f64; STREAM_COUNT],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_cycles: u64,
    pub total_steps: u64,
    pub average_cycle_time_ms: f64,
    pub active_agents: usize,
    pub stream_saliences: [f64; STREAM_COUNT],
}

pub struct TelemetryLog {
    capacity: usize,
    entries: VecDeque<CycleResult>,
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TelemetryLog {
    /// A zero capacity is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append, dropping from the front until back at capacity.
    pub fn record(&mut self, result: CycleResult) {
        self.entries.push_back(result);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Oldest → newest.
    pub fn history(&self) -> Vec<CycleResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&CycleResult> {
        self.entries.back()
    }

    pub fn average_cycle_time_ms(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let total: f64 = self.entries.iter().map(|r| r.telemetry.processing_time_ms).sum();
        total / self.entries.len() as f64
    }

    pub fn metrics(&self, live: LiveCounters) -> Metrics {
        Metrics {
            total_cycles: live.total_cycles,
            total_steps: live.total_steps,
            average_cycle_time_ms: self.average_cycle_time_ms(),
            active_agents: live.active_agents,
            stream_saliences: live.stream_saliences,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Samples this process's resident memory.
pub struct MemorySampler {
    system: System,
    pid: Option<Pid>,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Process memory sampling unavailable: {}", e);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Resident bytes right now, or 0 when the platform can't say.
    pub fn resident_bytes(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        if !self.system.refresh_process(pid) {
            return 0;
        }
        self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}
