//! Observation protocol — everything the scheduler publishes to subscribers
//!
//! Wire format (one JSON object per event, tagged by `type`):
//!
//!   { "type": "started", "timestamp": "2026-10-16T09:00:00Z" }
//!   { "type": "step_complete", "step": { "step": 7, "phase": "perception", ... }, "streams": [...], "timestamp": "..." }
//!   { "type": "cycle_complete", "cycle_number": 3, "steps": [...], "streams": [...], "telemetry": {...}, "completed_at": "..." }
//!   { "type": "agent_invoked", "agent_id": "memory-manager", "agent_name": "...", "context": {...}, "timestamp": "..." }
//!   { "type": "error", "stream": 2, "phase": "evaluation", "stage": 3, "message": "...", "timestamp": "..." }

use crate::error::Result;
use crate::types::{
    CognitiveAgent, CycleResult, InvocationContext, Phase, StepAddress, StreamId, StreamState,
    STREAM_COUNT,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    Started {
        timestamp: DateTime<Utc>,
    },
    Stopped {
        timestamp: DateTime<Utc>,
    },
    /// Emitted once per tick, after all three streams finished.
    StepComplete {
        step: StepAddress,
        streams: [StreamState; STREAM_COUNT],
        timestamp: DateTime<Utc>,
    },
    /// Emitted once per 30 ticks.
    CycleComplete(CycleResult),
    AgentInvoked {
        agent_id: String,
        agent_name: String,
        context: InvocationContext,
        timestamp: DateTime<Utc>,
    },
    AgentRegistered {
        agent: CognitiveAgent,
    },
    AgentDeactivated {
        agent_id: String,
    },
    /// A stage behavior failed for one stream; the tick carried on.
    Error {
        stream: StreamId,
        phase: Phase,
        stage: u8,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl SchedulerEvent {
    /// Event name as it appears in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerEvent::Started { .. } => "started",
            SchedulerEvent::Stopped { .. } => "stopped",
            SchedulerEvent::StepComplete { .. } => "step_complete",
            SchedulerEvent::CycleComplete(_) => "cycle_complete",
            SchedulerEvent::AgentInvoked { .. } => "agent_invoked",
            SchedulerEvent::AgentRegistered { .. } => "agent_registered",
            SchedulerEvent::AgentDeactivated { .. } => "agent_deactivated",
            SchedulerEvent::Error { .. } => "error",
        }
    }

    /// One JSON line, the form subscribers forward downstream.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a line produced by `to_json`.
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn started() -> Self {
        Self::Started {
            timestamp: Utc::now(),
        }
    }

    pub fn stopped() -> Self {
        Self::Stopped {
            timestamp: Utc::now(),
        }
    }

    pub fn stage_error(address: &StepAddress, stream: StreamId, message: impl Into<String>) -> Self {
        Self::Error {
            stream,
            phase: address.phase,
            stage: address.stage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
