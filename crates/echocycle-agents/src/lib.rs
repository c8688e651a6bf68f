//! Echocycle Agents — named, independently activatable processing agents
//!
//! Stage behaviors address agents by id string. The registry only does
//! bookkeeping (activation flag, last invocation time) and publishes
//! observations; whatever the agent actually does happens in subscribers.

pub mod registry;

pub use registry::{default_agents, AgentRegistry, DEFAULT_AGENT_IDS};
