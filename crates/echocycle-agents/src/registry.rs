//! Agent registry
//!
//! Upsert on register, never delete on deactivate: callers may still hold the
//! id of a deactivated agent and invoking it must stay a silent no-op.

use chrono::Utc;
use dashmap::DashMap;
use echocycle_core::{CognitiveAgent, InvocationContext, SchedulerEvent};
use tokio::sync::broadcast;
use tracing::{debug, info};

pub const DEFAULT_AGENT_IDS: [&str; 5] = [
    "coordinator",
    "cognitive-processor",
    "memory-manager",
    "emotional-processor",
    "action-executor",
];

/// The five agents every scheduler starts with.
pub fn default_agents() -> Vec<CognitiveAgent> {
    vec![
        CognitiveAgent::new(
            "coordinator",
            "Coordinator",
            "orchestration",
            ["stream_coordination", "priority_arbitration", "task_routing"],
        ),
        CognitiveAgent::new(
            "cognitive-processor",
            "Cognitive Processor",
            "reasoning",
            ["pattern_recognition", "abstraction", "inference"],
        ),
        CognitiveAgent::new(
            "memory-manager",
            "Memory Manager",
            "memory",
            ["context_binding", "consolidation", "retrieval"],
        ),
        CognitiveAgent::new(
            "emotional-processor",
            "Emotional Processor",
            "affect",
            ["value_assessment", "salience_tagging"],
        ),
        CognitiveAgent::new(
            "action-executor",
            "Action Executor",
            "execution",
            ["response_formulation", "execution_monitoring"],
        ),
    ]
}

pub struct AgentRegistry {
    agents: DashMap<String, CognitiveAgent>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl AgentRegistry {
    /// Empty registry publishing onto `events`.
    pub fn new(events: broadcast::Sender<SchedulerEvent>) -> Self {
        Self {
            agents: DashMap::new(),
            events,
        }
    }

    /// Registry pre-populated with [`default_agents`].
    pub fn with_defaults(events: broadcast::Sender<SchedulerEvent>) -> Self {
        let registry = Self::new(events);
        for agent in default_agents() {
            registry.register(agent);
        }
        registry
    }

    /// Register an agent. Replaces any existing agent with the same id.
    pub fn register(&self, agent: CognitiveAgent) {
        info!("Registered agent {} ({})", agent.id, agent.specialization);
        self.agents.insert(agent.id.clone(), agent.clone());
        let _ = self.events.send(SchedulerEvent::AgentRegistered { agent });
    }

    /// Mark an agent inactive. Returns whether the id was known.
    pub fn deactivate(&self, id: &str) -> bool {
        let found = match self.agents.get_mut(id) {
            Some(mut agent) => {
                agent.is_active = false;
                true
            }
            None => false,
        };
        if found {
            info!("Deactivated agent {}", id);
            let _ = self.events.send(SchedulerEvent::AgentDeactivated {
                agent_id: id.to_string(),
            });
        }
        found
    }

    /// Stamp the agent's invocation time and publish `agent_invoked`.
    ///
    /// Missing or inactive agents are skipped silently. Returns whether the
    /// agent was invoked.
    pub fn invoke(&self, id: &str, context: InvocationContext) -> bool {
        let now = Utc::now();
        // The shard lock is released before publishing.
        let name = match self.agents.get_mut(id) {
            Some(mut agent) if agent.is_active => {
                agent.last_invocation = Some(now);
                agent.name.clone()
            }
            Some(_) => {
                debug!("Agent {} is inactive, skipping {}", id, context.task);
                return false;
            }
            None => {
                debug!("Agent {} not registered, skipping {}", id, context.task);
                return false;
            }
        };

        let _ = self.events.send(SchedulerEvent::AgentInvoked {
            agent_id: id.to_string(),
            agent_name: name,
            context,
            timestamp: now,
        });
        true
    }

    pub fn get(&self, id: &str) -> Option<CognitiveAgent> {
        self.agents.get(id).map(|a| a.clone())
    }

    /// All agents, sorted by id.
    pub fn list(&self) -> Vec<CognitiveAgent> {
        let mut agents: Vec<CognitiveAgent> = self.agents.iter().map(|e| e.value().clone()).collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub fn active_count(&self) -> usize {
        self.agents.iter().filter(|e| e.is_active).count()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
