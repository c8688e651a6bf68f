//! CycleScheduler — owns the tick cadence and drives the per-tick pipeline
//!
//! One tick: bump the global counter → translate it to a step address → for
//! each stream run bookkeeping then its stage → publish `step_complete` →
//! every 30th tick publish `cycle_complete` and record telemetry.
//!
//! The engine lives behind a single async mutex. The timer loop and manual
//! `step()` calls both take it, so ticks never overlap no matter who drives
//! them. Within a tick the three streams may run as joined tasks; they only
//! ever touch their own `StreamState`, so either mode gives the same result.

use crate::config::CycleConfig;
use crate::phase::{stage_name, PhaseProcessor, StageFailure, StageHook};
use crate::streams::{advance_stream, SalienceTuning, StreamSet};
use crate::telemetry::{LiveCounters, MemorySampler, Metrics, TelemetryLog};
use chrono::Utc;
use echocycle_agents::AgentRegistry;
use echocycle_core::{
    cycle_addresses, to_step_address, CognitiveAgent, CycleResult, CycleTelemetry, Error, Phase,
    Result, SchedulerEvent, StepAddress, StreamId, StreamState, CYCLE_LENGTH, STREAM_COUNT,
};
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Read-only view for collaborators building prompts or dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerState {
    pub running: bool,
    pub cycle_number: u64,
    /// Global steps processed since construction (or the last reset).
    pub current_step: u64,
    /// Address of the most recent tick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepAddress>,
    pub streams: [StreamState; STREAM_COUNT],
    pub agents: Vec<CognitiveAgent>,
}

impl SchedulerState {
    /// `"active streams: perception(0.42), evaluation(0.71), action(0.10)"`
    pub fn context_summary(&self) -> String {
        let parts: Vec<String> = self
            .streams
            .iter()
            .map(|s| format!("{}({:.2})", s.phase_label, s.salience))
            .collect();
        format!("active streams: {}", parts.join(", "))
    }
}

struct Engine {
    streams: StreamSet,
    telemetry: TelemetryLog,
    global_step: u64,
    cycle_number: u64,
    last_address: Option<StepAddress>,
    cycle_started: Instant,
    memory: MemorySampler,
}

struct StreamOutcome {
    stream: StreamState,
    failures: Vec<StageFailure>,
}

struct Ticker {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

struct Shared {
    config: CycleConfig,
    engine: Mutex<Engine>,
    processor: Arc<PhaseProcessor>,
    agents: Arc<AgentRegistry>,
    events: broadcast::Sender<SchedulerEvent>,
    running: AtomicBool,
}

pub struct CycleScheduler {
    shared: Arc<Shared>,
    ticker: Mutex<Option<Ticker>>,
}

impl CycleScheduler {
    /// Build a stopped scheduler with the five default agents registered.
    pub fn new(config: CycleConfig) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(config.scheduler.event_buffer);
        let agents = Arc::new(AgentRegistry::with_defaults(events.clone()));
        let processor = Arc::new(PhaseProcessor::new(agents.clone(), config.enable_nested_agency()));
        let tuning = SalienceTuning {
            increment: config.streams.salience_increment,
            decay: config.streams.salience_decay,
        };
        let engine = Engine {
            streams: StreamSet::new(config.dim(), tuning)?,
            telemetry: TelemetryLog::new(config.telemetry.capacity),
            global_step: 0,
            cycle_number: 0,
            last_address: None,
            cycle_started: Instant::now(),
            memory: MemorySampler::new(),
        };

        info!(
            "Scheduler ready: dim={} step={}ms parallel={} telemetry={} nested_agency={}",
            config.dim(),
            config.scheduler.step_duration_ms,
            config.enable_parallel_streams(),
            config.enable_telemetry(),
            config.enable_nested_agency()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                engine: Mutex::new(engine),
                processor,
                agents,
                events,
                running: AtomicBool::new(false),
            }),
            ticker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &CycleConfig {
        &self.shared.config
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.shared.agents
    }

    /// Subscribe to every observation published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Stopped → Running. A no-op while already running.
    pub async fn start(&self) {
        let mut slot = self.ticker.lock().await;
        if slot.is_some() {
            debug!("start() while running, ignoring");
            return;
        }

        {
            // No cycle in progress: idle time before this start is not cycle time.
            let mut engine = self.shared.engine.lock().await;
            if engine.global_step % CYCLE_LENGTH == 0 {
                engine.cycle_started = Instant::now();
            }
        }

        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_ticker(self.shared.clone(), cancel.clone()));
        *slot = Some(Ticker { cancel, join });

        self.shared.running.store(true, Ordering::SeqCst);
        info!("Scheduler started ({}ms per step)", self.shared.config.scheduler.step_duration_ms);
        let _ = self.shared.events.send(SchedulerEvent::started());
    }

    /// Running → Stopped. A tick already in flight finishes first.
    /// A no-op while stopped.
    pub async fn stop(&self) {
        let mut slot = self.ticker.lock().await;
        let ticker = match slot.take() {
            Some(t) => t,
            None => {
                debug!("stop() while stopped, ignoring");
                return;
            }
        };

        ticker.cancel.cancel();
        if let Err(e) = ticker.join.await {
            error!("Ticker task ended abnormally: {}", e);
        }

        self.shared.running.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");
        let _ = self.shared.events.send(SchedulerEvent::stopped());
    }

    /// Run exactly one tick now, serialized with the timer loop.
    pub async fn step(&self) -> Result<StepAddress> {
        self.shared.tick().await
    }

    /// Run `n` ticks back to back.
    pub async fn advance(&self, n: u64) -> Result<()> {
        for _ in 0..n {
            self.shared.tick().await?;
        }
        Ok(())
    }

    /// Return streams, counters and telemetry to their initial state.
    /// Only allowed while stopped. Agents and hooks are kept.
    pub async fn reset(&self) -> Result<()> {
        let slot = self.ticker.lock().await;
        if slot.is_some() {
            return Err(Error::Internal("reset() requires a stopped scheduler".to_string()));
        }
        let mut engine = self.shared.engine.lock().await;
        engine.streams.reset();
        engine.telemetry.clear();
        engine.global_step = 0;
        engine.cycle_number = 0;
        engine.last_address = None;
        engine.cycle_started = Instant::now();
        info!("Scheduler reset");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Agents, hooks, perception
    // ------------------------------------------------------------------

    pub fn register_agent(&self, agent: CognitiveAgent) {
        self.shared.agents.register(agent);
        let active = self.shared.agents.active_count();
        let cap = self.shared.config.max_concurrent_agents();
        if active > cap {
            warn!("{} active agents exceeds advisory max_concurrent_agents={}", active, cap);
        }
    }

    pub fn deactivate_agent(&self, id: &str) -> bool {
        self.shared.agents.deactivate(id)
    }

    pub fn register_hook(&self, phase: Phase, stage: u8, hook: Arc<dyn StageHook>) -> Result<()> {
        self.shared.processor.register_hook(phase, stage, hook)
    }

    /// Ground a stream's perception by replacing its state vector.
    pub async fn set_stream_perception(&self, stream_id: u8, vector: Vec<f32>) -> Result<()> {
        let id = StreamId::from_number(stream_id).ok_or(Error::UnknownStream(stream_id))?;
        let mut engine = self.shared.engine.lock().await;
        engine.streams.set_perception(id, vector)?;
        debug!("Stream {} perception updated", id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub async fn get_state(&self) -> SchedulerState {
        let engine = self.shared.engine.lock().await;
        SchedulerState {
            running: self.is_running(),
            cycle_number: engine.cycle_number,
            current_step: engine.global_step,
            step: engine.last_address,
            streams: engine.streams.snapshot(),
            agents: self.shared.agents.list(),
        }
    }

    /// Retained cycle results, oldest first.
    pub async fn get_telemetry_history(&self) -> Vec<CycleResult> {
        self.shared.engine.lock().await.telemetry.history()
    }

    pub async fn get_metrics(&self) -> Metrics {
        let engine = self.shared.engine.lock().await;
        engine.telemetry.metrics(LiveCounters {
            total_cycles: engine.cycle_number,
            total_steps: engine.global_step,
            active_agents: self.shared.agents.active_count(),
            stream_saliences: engine.streams.saliences(),
        })
    }
}

impl Drop for CycleScheduler {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.cancel.cancel();
        }
    }
}

/// The timer loop. Each tick is awaited before the next interval tick is
/// taken, so a slow tick delays the schedule instead of overlapping it.
async fn run_ticker(shared: Arc<Shared>, cancel: CancellationToken) {
    let period = shared.config.step_duration();
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        if let Err(e) = shared.tick().await {
            error!("Tick failed: {}", e);
        }
    }
    debug!("Ticker loop exited");
}

impl Shared {
    async fn tick(&self) -> Result<StepAddress> {
        let mut engine = self.engine.lock().await;
        let global_step = engine.global_step + 1;
        let address = to_step_address(global_step)?;
        engine.global_step = global_step;

        debug!(
            "Step {} ({} {}/{}) primary stream {}",
            global_step,
            address.phase,
            address.stage,
            stage_name(address.phase, address.stage),
            address.primary_stream()
        );

        let streams = engine.streams.snapshot();
        let tuning = engine.streams.tuning();
        let outcomes = if self.config.enable_parallel_streams() {
            self.process_parallel(streams, address, tuning).await
        } else {
            self.process_sequential(streams, address, tuning)
        };

        for outcome in outcomes {
            for failure in &outcome.failures {
                let _ = self.events.send(SchedulerEvent::stage_error(
                    &failure.address,
                    failure.stream,
                    failure.message.clone(),
                ));
            }
            engine.streams.replace(outcome.stream);
        }
        engine.last_address = Some(address);

        let _ = self.events.send(SchedulerEvent::StepComplete {
            step: address,
            streams: engine.streams.snapshot(),
            timestamp: Utc::now(),
        });

        if global_step % CYCLE_LENGTH == 0 {
            self.complete_cycle(&mut engine);
        }

        Ok(address)
    }

    fn process_sequential(
        &self,
        streams: [StreamState; STREAM_COUNT],
        address: StepAddress,
        tuning: SalienceTuning,
    ) -> Vec<StreamOutcome> {
        streams
            .into_iter()
            .map(|stream| {
                let before = stream.clone();
                let processor = &self.processor;
                match std::panic::catch_unwind(AssertUnwindSafe(move || {
                    process_stream(processor, stream, address, tuning)
                })) {
                    Ok(outcome) => outcome,
                    Err(payload) => recover_stream(before, address, tuning, panic_message(payload)),
                }
            })
            .collect()
    }

    async fn process_parallel(
        &self,
        streams: [StreamState; STREAM_COUNT],
        address: StepAddress,
        tuning: SalienceTuning,
    ) -> Vec<StreamOutcome> {
        let handles: Vec<JoinHandle<StreamOutcome>> = streams
            .iter()
            .cloned()
            .map(|stream| {
                let processor = self.processor.clone();
                tokio::spawn(async move { process_stream(&processor, stream, address, tuning) })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        streams
            .into_iter()
            .zip(joined)
            .map(|(before, result)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    let message = match e.try_into_panic() {
                        Ok(payload) => panic_message(payload),
                        Err(e) => e.to_string(),
                    };
                    recover_stream(before, address, tuning, message)
                }
            })
            .collect()
    }

    fn complete_cycle(&self, engine: &mut Engine) {
        engine.cycle_number = engine.global_step / CYCLE_LENGTH;
        let elapsed_ms = engine.cycle_started.elapsed().as_secs_f64() * 1000.0;

        let result = CycleResult {
            cycle_number: engine.cycle_number,
            steps: cycle_addresses(),
            streams: engine.streams.snapshot(),
            telemetry: CycleTelemetry {
                processing_time_ms: elapsed_ms,
                memory_usage_bytes: engine.memory.resident_bytes(),
                active_agent_count: self.agents.active_count(),
            },
            completed_at: Utc::now(),
        };

        if self.config.enable_telemetry() {
            engine.telemetry.record(result.clone());
        }

        info!("Cycle {} complete in {:.1}ms", engine.cycle_number, elapsed_ms);
        let _ = self.events.send(SchedulerEvent::CycleComplete(result));
        engine.cycle_started = Instant::now();
    }
}

/// Bookkeeping then stage behavior for one stream.
fn process_stream(
    processor: &PhaseProcessor,
    mut stream: StreamState,
    address: StepAddress,
    tuning: SalienceTuning,
) -> StreamOutcome {
    advance_stream(&mut stream, &address, tuning);
    let failures = processor.process(&mut stream, &address);
    StreamOutcome { stream, failures }
}

/// A stream whose stage panicked: keep its pre-tick state, still advance its
/// counter so it stays in phase, and report the failure.
fn recover_stream(
    mut before: StreamState,
    address: StepAddress,
    tuning: SalienceTuning,
    message: String,
) -> StreamOutcome {
    error!(
        "Stream {} panicked in {}/{}: {}",
        before.stream_id,
        address.phase,
        stage_name(address.phase, address.stage),
        message
    );
    let stream_id = before.stream_id;
    advance_stream(&mut before, &address, tuning);
    StreamOutcome {
        stream: before,
        failures: vec![StageFailure {
            stream: stream_id,
            address,
            message: format!("panic: {}", message),
        }],
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
