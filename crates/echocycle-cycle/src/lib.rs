//! Echocycle Cycle - the 30-step scheduler, its three streams, stage
//! behaviors and cycle telemetry
//!
//! ```text
//! timer ──► CycleScheduler::tick
//!             ├─ StreamSet        salience + local step, per stream
//!             ├─ PhaseProcessor   stage slot for the step address
//!             ├─ TelemetryLog     every 30th tick
//!             └─ broadcast        SchedulerEvent to subscribers
//! ```

pub mod config;
pub mod phase;
pub mod scheduler;
pub mod streams;
pub mod telemetry;

pub use config::CycleConfig;
pub use phase::{stage_behavior, stage_name, PhaseProcessor, StageBehavior, StageContext, StageFailure, StageHook};
pub use scheduler::{CycleScheduler, SchedulerState};
pub use streams::{advance_stream, SalienceTuning, StreamSet};
pub use telemetry::{MemorySampler, Metrics, TelemetryLog};
