use crate::format::{format_event, format_metrics, format_streams};
use chrono::Utc;
use echocycle_core::*;
use echocycle_cycle::Metrics;

fn streams() -> [StreamState; STREAM_COUNT] {
    let mut s = StreamId::ALL.map(|id| StreamState::new(id, 2));
    s[0].salience = 0.42;
    s[1].salience = 0.71;
    s[2].salience = 0.1;
    s
}

#[test]
fn step_complete_is_silent() {
    let event = SchedulerEvent::StepComplete {
        step: to_step_address(1).unwrap(),
        streams: streams(),
        timestamp: Utc::now(),
    };
    assert!(format_event(&event).is_none());
}

#[test]
fn cycle_complete_line() {
    let event = SchedulerEvent::CycleComplete(CycleResult {
        cycle_number: 3,
        steps: cycle_addresses(),
        streams: streams(),
        telemetry: CycleTelemetry {
            processing_time_ms: 3012.4,
            memory_usage_bytes: 8 * 1024 * 1024,
            active_agent_count: 5,
        },
        completed_at: Utc::now(),
    });
    let line = format_event(&event).unwrap();
    assert!(line.contains("cycle 3"), "{}", line);
    assert!(line.contains("3012.4ms"));
    assert!(line.contains("8.0MiB"));
    assert!(line.contains("perception 0.42 · evaluation 0.71 · action 0.10"));
}

#[test]
fn agent_invoked_line() {
    let event = SchedulerEvent::AgentInvoked {
        agent_id: "memory-manager".into(),
        agent_name: "Memory Manager".into(),
        context: InvocationContext::new("context_binding", StreamId::Two, to_step_address(7).unwrap()),
        timestamp: Utc::now(),
    };
    assert_eq!(
        format_event(&event).unwrap(),
        "  [agent: Memory Manager → context_binding (stream 2, step 7)]"
    );
}

#[test]
fn error_line() {
    let event = SchedulerEvent::stage_error(&to_step_address(13).unwrap(), StreamId::Three, "boom");
    assert_eq!(format_event(&event).unwrap(), "  [error: stream 3 evaluation/2: boom]");
}

#[test]
fn started_line_has_timestamp() {
    let line = format_event(&SchedulerEvent::started()).unwrap();
    assert!(line.starts_with("═══ started "));
    assert!(line.contains(" UTC"));
}

#[test]
fn streams_line() {
    assert_eq!(format_streams(&streams()), "perception 0.42 · evaluation 0.71 · action 0.10");
}

#[test]
fn metrics_block() {
    let out = format_metrics(&Metrics {
        total_cycles: 2,
        total_steps: 61,
        average_cycle_time_ms: 3001.24,
        active_agents: 4,
        stream_saliences: [0.1, 0.25, 1.0],
    });
    assert_eq!(
        out,
        "cycles: 2\nsteps: 61\naverage cycle: 3001.2ms\nactive agents: 4\nsaliences: [0.10, 0.25, 1.00]"
    );
}
