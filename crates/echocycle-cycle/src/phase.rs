//! PhaseProcessor — the 3 × 5 stage dispatch table
//!
//! Every (phase, stage) slot has a fixed default behavior, possibly none, and
//! accepts any number of hooks. Hooks run after the default behavior and are
//! isolated from each other: one failing hook is reported and the next still
//! runs.

use dashmap::DashMap;
use echocycle_agents::AgentRegistry;
use echocycle_core::{
    Error, InvocationContext, Phase, Result, StepAddress, StreamId, StreamState,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub const STAGES_PER_PHASE: u8 = 5;

pub const HIGH_PRIORITY_THRESHOLD: f64 = 0.7;
pub const ELABORATION_THRESHOLD: f64 = 0.5;
pub const RETRIEVAL_THRESHOLD: f64 = 0.3;

/// What a slot does before its hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBehavior {
    /// Perceive every other stream again.
    ResetPerception,
    Invoke {
        agent: &'static str,
        task: &'static str,
    },
    /// salience = clamp(stddev(state_vector), 0, 1)
    RecomputeSalience,
    RecomputeAffordances,
    /// No default; hooks only.
    Extension,
}

pub fn stage_behavior(phase: Phase, stage: u8) -> StageBehavior {
    use StageBehavior::*;
    match (phase, stage) {
        (Phase::Perception, 1) => ResetPerception,
        (Phase::Perception, 2) => Invoke { agent: "cognitive-processor", task: "pattern_recognition" },
        (Phase::Perception, 3) => RecomputeSalience,
        (Phase::Perception, 4) => Invoke { agent: "memory-manager", task: "context_binding" },
        (Phase::Perception, 5) => RecomputeAffordances,
        (Phase::Evaluation, 1) => Invoke { agent: "emotional-processor", task: "value_assessment" },
        (Phase::Action, 1) => Invoke { agent: "action-executor", task: "response_formulation" },
        (Phase::Action, 5) => Invoke { agent: "memory-manager", task: "consolidation" },
        _ => Extension,
    }
}

pub fn stage_name(phase: Phase, stage: u8) -> &'static str {
    match (phase, stage) {
        (Phase::Perception, 1) => "orientation",
        (Phase::Perception, 2) => "pattern_recognition",
        (Phase::Perception, 3) => "salience_estimation",
        (Phase::Perception, 4) => "context_binding",
        (Phase::Perception, 5) => "affordance_detection",
        (Phase::Evaluation, 1) => "value_assessment",
        (Phase::Evaluation, 2) => "option_generation",
        (Phase::Evaluation, 3) => "simulation_projection",
        (Phase::Evaluation, 4) => "consequence_modeling",
        (Phase::Evaluation, 5) => "selection_crystallization",
        (Phase::Action, 1) => "response_formulation",
        (Phase::Action, 2) => "execution_monitoring",
        (Phase::Action, 3) => "feedback_comparison",
        (Phase::Action, 4) => "model_updating",
        (Phase::Action, 5) => "consolidation",
        _ => "unknown",
    }
}

/// Standard deviation of the vector, clamped to [0, 1]. Non-finite input reads as 0.
pub fn vector_salience(vector: &[f32]) -> f64 {
    if vector.is_empty() {
        return 0.0;
    }
    let n = vector.len() as f64;
    let mean = vector.iter().map(|&x| x as f64).sum::<f64>() / n;
    let variance = vector
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let salience = variance.sqrt();
    if salience.is_finite() {
        salience.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Rebuild the affordance tags from salience. Thresholds are independent.
pub fn recompute_affordances(stream: &mut StreamState) {
    stream.affordances.clear();
    if stream.salience > HIGH_PRIORITY_THRESHOLD {
        stream.affordances.insert("high_priority_response".to_string());
    }
    if stream.salience > ELABORATION_THRESHOLD {
        stream.affordances.insert("contextual_elaboration".to_string());
    }
    if stream.salience > RETRIEVAL_THRESHOLD {
        stream.affordances.insert("memory_retrieval".to_string());
    }
}

/// What a hook sees while its slot runs for one stream.
pub struct StageContext<'a> {
    pub stream: &'a mut StreamState,
    pub address: &'a StepAddress,
    agents: &'a AgentRegistry,
    nested_agency: bool,
}

impl StageContext<'_> {
    /// Invoke an agent on behalf of this stream. Skipped when nested agency is off.
    pub fn invoke(&self, agent_id: &str, task: &str) -> bool {
        if !self.nested_agency {
            return false;
        }
        let context = InvocationContext::new(task, self.stream.stream_id, *self.address);
        self.agents.invoke(agent_id, context)
    }
}

/// Collaborator-supplied behavior attached to a (phase, stage) slot.
///
/// Hooks run on the tick path: they must not block on I/O. Anything slow
/// belongs in a subscriber reacting to the published observations.
pub trait StageHook: Send + Sync {
    /// Name used in failure reports.
    fn name(&self) -> &str {
        "hook"
    }

    fn on_stage(&self, ctx: &mut StageContext<'_>) -> Result<()>;
}

/// A contained failure from one stream's stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stream: StreamId,
    pub address: StepAddress,
    pub message: String,
}

pub struct PhaseProcessor {
    agents: Arc<AgentRegistry>,
    hooks: DashMap<(Phase, u8), Vec<Arc<dyn StageHook>>>,
    nested_agency: bool,
}

impl PhaseProcessor {
    pub fn new(agents: Arc<AgentRegistry>, nested_agency: bool) -> Self {
        Self {
            agents,
            hooks: DashMap::new(),
            nested_agency,
        }
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub fn nested_agency(&self) -> bool {
        self.nested_agency
    }

    /// Attach a hook to a slot. Hooks in a slot run in registration order.
    pub fn register_hook(&self, phase: Phase, stage: u8, hook: Arc<dyn StageHook>) -> Result<()> {
        if !(1..=STAGES_PER_PHASE).contains(&stage) {
            return Err(Error::config(format!(
                "stage must be within 1..={}, got {}",
                STAGES_PER_PHASE, stage
            )));
        }
        debug!("Hook {} attached to {}/{}", hook.name(), phase, stage_name(phase, stage));
        self.hooks.entry((phase, stage)).or_default().push(hook);
        Ok(())
    }

    pub fn hook_count(&self, phase: Phase, stage: u8) -> usize {
        self.hooks.get(&(phase, stage)).map(|h| h.len()).unwrap_or(0)
    }

    /// Run the slot addressed by `address` for one stream.
    pub fn process(&self, stream: &mut StreamState, address: &StepAddress) -> Vec<StageFailure> {
        match stage_behavior(address.phase, address.stage) {
            StageBehavior::ResetPerception => stream.reset_perception(),
            StageBehavior::Invoke { agent, task } => {
                if self.nested_agency {
                    let context = InvocationContext::new(task, stream.stream_id, *address);
                    self.agents.invoke(agent, context);
                }
            }
            StageBehavior::RecomputeSalience => {
                stream.salience = vector_salience(&stream.state_vector);
            }
            StageBehavior::RecomputeAffordances => recompute_affordances(stream),
            StageBehavior::Extension => {}
        }

        // Clone the list out so no shard lock is held while hooks run.
        let hooks = match self.hooks.get(&(address.phase, address.stage)) {
            Some(h) => h.clone(),
            None => return Vec::new(),
        };

        let mut failures = Vec::new();
        let mut ctx = StageContext {
            stream,
            address,
            agents: &self.agents,
            nested_agency: self.nested_agency,
        };
        for hook in hooks {
            if let Err(e) = hook.on_stage(&mut ctx) {
                warn!(
                    "Stream {} {}/{} hook {} failed: {}",
                    ctx.stream.stream_id,
                    address.phase,
                    stage_name(address.phase, address.stage),
                    hook.name(),
                    e
                );
                failures.push(StageFailure {
                    stream: ctx.stream.stream_id,
                    address: *address,
                    message: format!("{}: {}", hook.name(), e),
                });
            }
        }
        failures
    }
}
