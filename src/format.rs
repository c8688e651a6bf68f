use chrono::{DateTime, Utc};
use echocycle_core::{SchedulerEvent, StreamState};
use echocycle_cycle::Metrics;

/// One human-readable line per observation worth showing on a terminal.
/// Per-tick `step_complete` noise returns `None`.
pub fn format_event(event: &SchedulerEvent) -> Option<String> {
    match event {
        SchedulerEvent::Started { timestamp } => {
            Some(format!("═══ started {} ═══", format_timestamp(timestamp)))
        }
        SchedulerEvent::Stopped { timestamp } => {
            Some(format!("═══ stopped {} ═══", format_timestamp(timestamp)))
        }
        SchedulerEvent::StepComplete { .. } => None,
        SchedulerEvent::CycleComplete(result) => Some(format!(
            "─── cycle {} ─── {:.1}ms, {} agents, {} │ {}",
            result.cycle_number,
            result.telemetry.processing_time_ms,
            result.telemetry.active_agent_count,
            format_bytes(result.telemetry.memory_usage_bytes),
            format_streams(&result.streams)
        )),
        SchedulerEvent::AgentInvoked {
            agent_name,
            context,
            ..
        } => Some(format!(
            "  [agent: {} → {} (stream {}, step {})]",
            agent_name, context.task, context.stream, context.step.step
        )),
        SchedulerEvent::AgentRegistered { agent } => {
            Some(format!("  [registered: {} ({})]", agent.name, agent.id))
        }
        SchedulerEvent::AgentDeactivated { agent_id } => {
            Some(format!("  [deactivated: {}]", agent_id))
        }
        SchedulerEvent::Error {
            stream,
            phase,
            stage,
            message,
            ..
        } => Some(format!(
            "  [error: stream {} {}/{}: {}]",
            stream, phase, stage, message
        )),
    }
}

/// `perception 0.42 · evaluation 0.71 · action 0.10`
pub fn format_streams(streams: &[StreamState]) -> String {
    streams
        .iter()
        .map(|s| format!("{} {:.2}", s.phase_label, s.salience))
        .collect::<Vec<_>>()
        .join(" · ")
}

pub fn format_metrics(metrics: &Metrics) -> String {
    let saliences = metrics
        .stream_saliences
        .iter()
        .map(|s| format!("{:.2}", s))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "cycles: {}\nsteps: {}\naverage cycle: {:.1}ms\nactive agents: {}\nsaliences: [{}]",
        metrics.total_cycles,
        metrics.total_steps,
        metrics.average_cycle_time_ms,
        metrics.active_agents,
        saliences
    )
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1}MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}KiB", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
