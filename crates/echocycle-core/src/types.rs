//! Core types for Echocycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of concurrently advancing streams.
pub const STREAM_COUNT: usize = 3;

/// Macro-stage of the cycle. Each phase spans 10 steps (5 stages of 2 steps).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Perception,
    Evaluation,
    Action,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Perception, Phase::Evaluation, Phase::Action];

    /// 1-based phase number.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn index(self) -> usize {
        match self {
            Phase::Perception => 0,
            Phase::Evaluation => 1,
            Phase::Action => 2,
        }
    }

    pub fn from_index(i: usize) -> Self {
        match i {
            0 => Phase::Perception,
            1 => Phase::Evaluation,
            _ => Phase::Action,
        }
    }

    /// Short label used for stream display ("perception", "evaluation", "action").
    pub fn label(self) -> &'static str {
        match self {
            Phase::Perception => "perception",
            Phase::Evaluation => "evaluation",
            Phase::Action => "action",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Phase::Perception => "Perception-Orientation",
            Phase::Evaluation => "Evaluation-Generation",
            Phase::Action => "Action-Integration",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dyad {
    A,
    B,
}

/// Identity of one of the three streams. Serialized as its number (1, 2, 3).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum StreamId {
    One,
    Two,
    Three,
}

impl StreamId {
    pub const ALL: [StreamId; STREAM_COUNT] = [StreamId::One, StreamId::Two, StreamId::Three];

    pub fn index(self) -> usize {
        match self {
            StreamId::One => 0,
            StreamId::Two => 1,
            StreamId::Three => 2,
        }
    }

    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(StreamId::One),
            2 => Some(StreamId::Two),
            3 => Some(StreamId::Three),
            _ => None,
        }
    }

    /// The phase this stream is permanently associated with.
    pub fn phase(self) -> Phase {
        Phase::from_index(self.index())
    }

    /// Local step counter a stream starts from: 0, 10, 20 (0°, 120°, 240°).
    pub fn initial_offset(self) -> u8 {
        self.index() as u8 * 10
    }
}

impl From<StreamId> for u8 {
    fn from(id: StreamId) -> Self {
        id.number()
    }
}

impl TryFrom<u8> for StreamId {
    type Error = String;

    fn try_from(n: u8) -> std::result::Result<Self, Self::Error> {
        StreamId::from_number(n).ok_or_else(|| format!("stream id out of range: {}", n))
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Structured coordinate of a step within the 30-step cycle. Derived, never mutated.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAddress {
    /// Normalized position within the cycle, 1..=30.
    pub step: u8,
    pub phase: Phase,
    /// Stage within the phase, 1..=5.
    pub stage: u8,
    /// 1 or 2.
    pub step_in_stage: u8,
    pub dyad: Dyad,
    /// 1..=3.
    pub triad: u8,
}

impl StepAddress {
    /// The stream whose phase owns this step: steps 1-10 → 1, 11-20 → 2, 21-30 → 3.
    pub fn primary_stream(&self) -> StreamId {
        StreamId::ALL[self.phase.index()]
    }
}

/// Bookkeeping for one stream. Owned by the stream set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    pub stream_id: StreamId,
    pub phase_label: Phase,
    /// Local tick counter in 0..30.
    pub current_step: u8,
    /// Perceptual substrate; only written through the perception extension point.
    pub state_vector: Vec<f32>,
    pub salience: f64,
    pub affordances: BTreeSet<String>,
    /// Indexed by stream index. Never true at this stream's own index.
    pub perceives: [bool; STREAM_COUNT],
}

impl StreamState {
    pub fn new(stream_id: StreamId, dim: usize) -> Self {
        let mut state = Self {
            stream_id,
            phase_label: stream_id.phase(),
            current_step: stream_id.initial_offset(),
            state_vector: vec![0.0; dim],
            salience: 0.0,
            affordances: BTreeSet::new(),
            perceives: [false; STREAM_COUNT],
        };
        state.reset_perception();
        state
    }

    /// Perceive every other stream, never self.
    pub fn reset_perception(&mut self) {
        for other in StreamId::ALL {
            self.perceives[other.index()] = other != self.stream_id;
        }
    }

    pub fn perceives(&self, other: StreamId) -> bool {
        other != self.stream_id && self.perceives[other.index()]
    }

    pub fn perceived_streams(&self) -> Vec<StreamId> {
        StreamId::ALL
            .into_iter()
            .filter(|id| self.perceives(*id))
            .collect()
    }
}

/// Descriptor of a named processing agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CognitiveAgent {
    pub id: String,
    pub name: String,
    pub specialization: String,
    pub capabilities: BTreeSet<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_invocation: Option<DateTime<Utc>>,
}

impl CognitiveAgent {
    pub fn new<I, S>(
        id: impl Into<String>,
        name: impl Into<String>,
        specialization: impl Into<String>,
        capabilities: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            specialization: specialization.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            is_active: true,
            last_invocation: None,
        }
    }
}

/// What a stage asked an agent to do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvocationContext {
    pub task: String,
    pub stream: StreamId,
    pub step: StepAddress,
}

impl InvocationContext {
    pub fn new(task: impl Into<String>, stream: StreamId, step: StepAddress) -> Self {
        Self {
            task: task.into(),
            stream,
            step,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleTelemetry {
    /// Wall-clock time since the previous cycle boundary.
    pub processing_time_ms: f64,
    /// Process resident memory at the boundary (0 where unavailable).
    pub memory_usage_bytes: u64,
    pub active_agent_count: usize,
}

/// Snapshot taken at every 30-step boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle_number: u64,
    pub steps: Vec<StepAddress>,
    pub streams: [StreamState; STREAM_COUNT],
    pub telemetry: CycleTelemetry,
    pub completed_at: DateTime<Utc>,
}
