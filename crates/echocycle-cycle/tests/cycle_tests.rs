//! Tests for echocycle-cycle: scheduler lifecycle, tick pipeline, hooks, telemetry

use echocycle_core::*;
use echocycle_cycle::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

fn config(parallel: bool) -> CycleConfig {
    let mut c = CycleConfig::default();
    c.streams.dim = 4;
    c.scheduler.step_duration_ms = 10;
    c.scheduler.enable_parallel_streams = parallel;
    c
}

fn scheduler(parallel: bool) -> CycleScheduler {
    CycleScheduler::new(config(parallel)).unwrap()
}

fn drain(rx: &mut broadcast::Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(e) => out.push(e),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

fn count(events: &[SchedulerEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

/// Fails every stage it is attached to, for one stream only.
struct FailFor(StreamId);

impl StageHook for FailFor {
    fn name(&self) -> &str {
        "fail-for"
    }

    fn on_stage(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        if ctx.stream.stream_id == self.0 {
            return Err(Error::Internal("boom".into()));
        }
        Ok(())
    }
}

/// Panics for one stream only.
struct PanicFor(StreamId);

impl StageHook for PanicFor {
    fn on_stage(&self, ctx: &mut StageContext<'_>) -> Result<()> {
        if ctx.stream.stream_id == self.0 {
            panic!("hook exploded");
        }
        Ok(())
    }
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[tokio::test]
async fn timed_run_completes_a_cycle() {
    let sched = scheduler(true);
    let mut rx = sched.subscribe();

    sched.start().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    sched.stop().await;

    let events = drain(&mut rx);
    assert_eq!(count(&events, "started"), 1);
    assert_eq!(count(&events, "stopped"), 1);
    assert!(count(&events, "step_complete") >= 30);
    assert!(count(&events, "cycle_complete") >= 1);

    let state = sched.get_state().await;
    assert!(!state.running);
    assert!(state.current_step > 0);
    assert!(state.cycle_number >= 1);
}

#[tokio::test]
async fn start_twice_is_idempotent() {
    let sched = scheduler(true);
    let mut rx = sched.subscribe();

    sched.start().await;
    sched.start().await;
    assert!(sched.is_running());
    sched.stop().await;

    let events = drain(&mut rx);
    assert_eq!(count(&events, "started"), 1);
    assert_eq!(count(&events, "stopped"), 1);
}

#[tokio::test]
async fn start_twice_keeps_a_single_cadence() {
    let sched = scheduler(false);

    sched.start().await;
    sched.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    sched.stop().await;

    // One 10ms timer gives at most ~10 ticks here; two would give ~20.
    let steps = sched.get_state().await.current_step;
    assert!(steps > 0);
    assert!(steps <= 14, "{} ticks in 100ms", steps);
}

#[tokio::test]
async fn stop_while_stopped_is_a_noop() {
    let sched = scheduler(true);
    let mut rx = sched.subscribe();

    sched.stop().await;

    assert!(!sched.is_running());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn ticks_stop_after_stop_returns() {
    let sched = scheduler(true);
    sched.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    sched.stop().await;

    let before = sched.get_state().await.current_step;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sched.get_state().await.current_step, before);
}

#[tokio::test]
async fn restart_continues_counting() {
    let sched = scheduler(false);
    sched.advance(5).await.unwrap();
    sched.start().await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    sched.stop().await;
    assert!(sched.get_state().await.current_step > 5);
}

#[test]
fn invalid_config_is_rejected() {
    let mut c = CycleConfig::default();
    c.scheduler.step_duration_ms = 0;
    assert!(matches!(CycleScheduler::new(c), Err(Error::ConfigError(_))));
}

// ===========================================================================
// Manual stepping
// ===========================================================================

#[tokio::test]
async fn step_returns_consecutive_addresses() {
    let sched = scheduler(false);
    let first = sched.step().await.unwrap();
    let second = sched.step().await.unwrap();

    assert_eq!(first.step, 1);
    assert_eq!(first.phase, Phase::Perception);
    assert_eq!(second.step, 2);

    let state = sched.get_state().await;
    assert_eq!(state.current_step, 2);
    assert_eq!(state.step, Some(second));
}

#[tokio::test]
async fn every_stream_advances_every_tick() {
    let sched = scheduler(true);
    sched.advance(3).await.unwrap();

    let steps: Vec<u8> = sched.get_state().await.streams.iter().map(|s| s.current_step).collect();
    assert_eq!(steps, vec![3, 13, 23]);
}

#[tokio::test]
async fn cycle_complete_carries_all_thirty_addresses() {
    let sched = scheduler(true);
    let mut rx = sched.subscribe();
    sched.advance(30).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(count(&events, "step_complete"), 30);

    let cycles: Vec<&CycleResult> = events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::CycleComplete(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].cycle_number, 1);
    assert_eq!(cycles[0].steps.len(), 30);
    assert_eq!(cycles[0].telemetry.active_agent_count, 5);
    #[cfg(target_os = "linux")]
    assert!(cycles[0].telemetry.memory_usage_bytes > 0);
}

#[tokio::test]
async fn step_complete_follows_the_streams_it_reports() {
    let sched = scheduler(false);
    let mut rx = sched.subscribe();
    sched.step().await.unwrap();

    let events = drain(&mut rx);
    let last = events.last().unwrap();
    match last {
        SchedulerEvent::StepComplete { step, streams, .. } => {
            assert_eq!(step.step, 1);
            assert_eq!(streams[0].current_step, 1);
        }
        other => panic!("expected step_complete last, got {}", other.kind()),
    }
}

// ===========================================================================
// Telemetry
// ===========================================================================

#[tokio::test]
async fn history_keeps_last_hundred_cycles() {
    let sched = scheduler(true);
    sched.advance(150 * 30).await.unwrap();

    let history = sched.get_telemetry_history().await;
    assert_eq!(history.len(), 100);
    assert_eq!(history.first().unwrap().cycle_number, 51);
    assert_eq!(history.last().unwrap().cycle_number, 150);

    let metrics = sched.get_metrics().await;
    assert_eq!(metrics.total_cycles, 150);
    assert_eq!(metrics.total_steps, 4500);
    assert_eq!(metrics.active_agents, 5);
    assert!(metrics.average_cycle_time_ms >= 0.0);
}

#[tokio::test]
async fn disabled_telemetry_still_publishes_cycles() {
    let mut c = config(false);
    c.telemetry.enabled = false;
    let sched = CycleScheduler::new(c).unwrap();
    let mut rx = sched.subscribe();

    sched.advance(30).await.unwrap();

    assert!(sched.get_telemetry_history().await.is_empty());
    assert_eq!(count(&drain(&mut rx), "cycle_complete"), 1);
    let metrics = sched.get_metrics().await;
    assert_eq!(metrics.total_cycles, 1);
    assert_eq!(metrics.average_cycle_time_ms, 0.0);
}

#[tokio::test]
async fn metrics_report_stream_saliences() {
    let sched = scheduler(false);
    sched.advance(1).await.unwrap();
    let metrics = sched.get_metrics().await;
    let state = sched.get_state().await;
    for (i, s) in state.streams.iter().enumerate() {
        assert_eq!(metrics.stream_saliences[i], s.salience);
    }
}

// ===========================================================================
// Agents
// ===========================================================================

#[tokio::test]
async fn deactivate_unknown_agent_returns_false() {
    let sched = scheduler(false);
    assert!(!sched.deactivate_agent("nobody"));
}

#[tokio::test]
async fn deactivated_agent_is_never_invoked() {
    let sched = scheduler(false);
    let mut rx = sched.subscribe();

    assert!(sched.deactivate_agent("cognitive-processor"));
    sched.advance(30).await.unwrap();

    let invoked: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SchedulerEvent::AgentInvoked { agent_id, .. } => Some(agent_id),
            _ => None,
        })
        .collect();
    assert!(!invoked.is_empty());
    assert!(!invoked.iter().any(|id| id == "cognitive-processor"));
    assert!(invoked.iter().any(|id| id == "memory-manager"));

    let state = sched.get_state().await;
    let cp = state.agents.iter().find(|a| a.id == "cognitive-processor").unwrap();
    assert!(!cp.is_active);
    assert_eq!(state.cycle_number, 1);
}

#[tokio::test]
async fn registered_agent_appears_active() {
    let sched = scheduler(false);
    sched.register_agent(CognitiveAgent::new("test-agent", "Test Agent", "testing", ["probe"]));

    let state = sched.get_state().await;
    let agent = state.agents.iter().find(|a| a.id == "test-agent").unwrap();
    assert!(agent.is_active);
    assert_eq!(state.agents.len(), 6);
}

#[tokio::test]
async fn nested_agency_off_invokes_nothing() {
    let mut c = config(true);
    c.agents.enable_nested_agency = false;
    let sched = CycleScheduler::new(c).unwrap();
    let mut rx = sched.subscribe();

    sched.advance(30).await.unwrap();
    assert_eq!(count(&drain(&mut rx), "agent_invoked"), 0);
}

// ===========================================================================
// Hooks and failure containment
// ===========================================================================

#[tokio::test]
async fn failing_hook_is_isolated_to_its_stream() {
    let sched = scheduler(true);
    sched.register_hook(Phase::Perception, 1, Arc::new(FailFor(StreamId::Two))).unwrap();
    let mut rx = sched.subscribe();

    sched.advance(3).await.unwrap();

    let errors: Vec<StreamId> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SchedulerEvent::Error { stream, phase, stage, .. } => {
                assert_eq!(phase, Phase::Perception);
                assert_eq!(stage, 1);
                Some(stream)
            }
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![StreamId::Two, StreamId::Two]);

    let steps: Vec<u8> = sched.get_state().await.streams.iter().map(|s| s.current_step).collect();
    assert_eq!(steps, vec![3, 13, 23]);

    sched.start().await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(sched.is_running());
    sched.stop().await;
}

#[tokio::test]
async fn panicking_hook_is_contained_in_both_modes() {
    for parallel in [true, false] {
        let sched = scheduler(parallel);
        sched.register_hook(Phase::Perception, 1, Arc::new(PanicFor(StreamId::Three))).unwrap();
        let mut rx = sched.subscribe();

        sched.advance(2).await.unwrap();

        let messages: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SchedulerEvent::Error { stream, message, .. } => {
                    assert_eq!(stream, StreamId::Three);
                    Some(message)
                }
                _ => None,
            })
            .collect();
        assert_eq!(messages.len(), 2, "parallel={}", parallel);
        assert!(messages[0].contains("hook exploded"));

        let state = sched.get_state().await;
        assert_eq!(state.streams[2].current_step, 22);
        assert_eq!(state.streams[0].current_step, 2);

        sched.step().await.unwrap();
        assert_eq!(sched.get_state().await.current_step, 3);
    }
}

#[test]
fn hook_on_missing_stage_is_rejected() {
    let sched = scheduler(true);
    assert!(sched.register_hook(Phase::Action, 6, Arc::new(FailFor(StreamId::One))).is_err());
    assert!(sched.register_hook(Phase::Action, 0, Arc::new(FailFor(StreamId::One))).is_err());
}

#[tokio::test]
async fn parallel_and_sequential_agree() {
    let par = scheduler(true);
    let seq = scheduler(false);

    for sched in [&par, &seq] {
        sched.advance(32).await.unwrap();
        sched.set_stream_perception(1, vec![1.0, 0.0, 1.0, 0.0]).await.unwrap();
        sched.set_stream_perception(3, vec![0.9, 0.1, 0.4, 0.2]).await.unwrap();
        sched.advance(63).await.unwrap();
    }

    let a = par.get_state().await;
    let b = seq.get_state().await;
    assert_eq!(a.streams, b.streams);
    assert_eq!(a.current_step, b.current_step);
}

// ===========================================================================
// Perception
// ===========================================================================

#[tokio::test]
async fn perception_feeds_stage_three_salience() {
    let sched = scheduler(false);
    sched.advance(2).await.unwrap();
    sched.set_stream_perception(1, vec![1.0, 0.0, 1.0, 0.0]).await.unwrap();
    sched.advance(3).await.unwrap(); // step 5: salience evaluation

    let state = sched.get_state().await;
    assert!((state.streams[0].salience - 0.5).abs() < 1e-9);
    assert_eq!(state.streams[1].salience, 0.0);
}

#[tokio::test]
async fn perception_survives_phase_start() {
    let sched = scheduler(false);
    sched.set_stream_perception(2, vec![0.3; 4]).await.unwrap();
    sched.step().await.unwrap(); // step 1: perception reset

    let state = sched.get_state().await;
    let two = &state.streams[1];
    assert_eq!(two.state_vector, vec![0.3; 4]);
    assert_eq!(two.perceived_streams(), vec![StreamId::One, StreamId::Three]);
    assert!(!two.perceives(StreamId::Two));
}

#[tokio::test]
async fn perception_rejects_bad_input() {
    let sched = scheduler(false);
    assert!(matches!(
        sched.set_stream_perception(4, vec![0.0; 4]).await,
        Err(Error::UnknownStream(4))
    ));
    assert!(matches!(
        sched.set_stream_perception(1, vec![0.0; 3]).await,
        Err(Error::DimensionMismatch { expected: 4, actual: 3 })
    ));
}

// ===========================================================================
// State and reset
// ===========================================================================

#[tokio::test]
async fn initial_state() {
    let sched = scheduler(true);
    let state = sched.get_state().await;

    assert!(!state.running);
    assert_eq!(state.cycle_number, 0);
    assert_eq!(state.current_step, 0);
    assert!(state.step.is_none());
    assert_eq!(state.agents.len(), 5);
    assert_eq!(
        state.context_summary(),
        "active streams: perception(0.00), evaluation(0.00), action(0.00)"
    );
}

#[tokio::test]
async fn state_serializes_for_collaborators() {
    let sched = scheduler(true);
    sched.advance(1).await.unwrap();
    let json = serde_json::to_value(sched.get_state().await).unwrap();
    assert_eq!(json["current_step"], 1);
    assert_eq!(json["streams"][0]["stream_id"], 1);
    assert_eq!(json["step"]["phase"], "perception");
}

#[tokio::test]
async fn reset_requires_stopped_scheduler() {
    let sched = scheduler(true);
    sched.start().await;
    assert!(sched.reset().await.is_err());
    sched.stop().await;

    sched.advance(45).await.unwrap();
    sched.reset().await.unwrap();

    let state = sched.get_state().await;
    assert_eq!(state.current_step, 0);
    assert_eq!(state.cycle_number, 0);
    let steps: Vec<u8> = state.streams.iter().map(|s| s.current_step).collect();
    assert_eq!(steps, vec![0, 10, 20]);
    assert!(sched.get_telemetry_history().await.is_empty());
    assert_eq!(state.agents.len(), 5);
}
