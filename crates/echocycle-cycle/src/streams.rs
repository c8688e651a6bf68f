//! StreamSet — the three consciousness streams and their per-tick bookkeeping
//!
//! Streams start at local steps 0, 10 and 20 (0°, 120°, 240° of the cycle) and
//! every stream advances every tick, primary or not. Per-tick updates touch one
//! stream at a time and never read a sibling, which is what lets a tick process
//! the three streams on separate tasks.

use echocycle_core::{Error, Result, StepAddress, StreamId, StreamState, STREAM_COUNT};

const CYCLE_STEPS: u8 = 30;

/// Per-tick salience movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SalienceTuning {
    pub increment: f64,
    pub decay: f64,
}

impl Default for SalienceTuning {
    fn default() -> Self {
        Self { increment: 0.10, decay: 0.05 }
    }
}

/// Bookkeeping for one stream at one tick: salience up if it owns the step,
/// down otherwise, then advance its local counter.
pub fn advance_stream(stream: &mut StreamState, address: &StepAddress, tuning: SalienceTuning) {
    if stream.stream_id == address.primary_stream() {
        stream.salience = (stream.salience + tuning.increment).min(1.0);
    } else {
        stream.salience = (stream.salience - tuning.decay).max(0.0);
    }
    stream.current_step = (stream.current_step + 1) % CYCLE_STEPS;
}

pub struct StreamSet {
    streams: [StreamState; STREAM_COUNT],
    dim: usize,
    tuning: SalienceTuning,
}

impl StreamSet {
    pub fn new(dim: usize, tuning: SalienceTuning) -> Result<Self> {
        if dim == 0 {
            return Err(Error::config("stream dimension must be greater than 0"));
        }
        Ok(Self {
            streams: StreamId::ALL.map(|id| StreamState::new(id, dim)),
            dim,
            tuning,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn tuning(&self) -> SalienceTuning {
        self.tuning
    }

    pub fn streams(&self) -> &[StreamState; STREAM_COUNT] {
        &self.streams
    }

    pub fn get(&self, id: StreamId) -> &StreamState {
        &self.streams[id.index()]
    }

    pub fn get_mut(&mut self, id: StreamId) -> &mut StreamState {
        &mut self.streams[id.index()]
    }

    pub fn snapshot(&self) -> [StreamState; STREAM_COUNT] {
        self.streams.clone()
    }

    /// Put a stream back into its slot (after processing it off-set).
    pub fn replace(&mut self, stream: StreamState) {
        let idx = stream.stream_id.index();
        self.streams[idx] = stream;
    }

    /// Run the per-tick bookkeeping for all three streams.
    pub fn update(&mut self, address: &StepAddress) {
        let tuning = self.tuning;
        for stream in self.streams.iter_mut() {
            advance_stream(stream, address, tuning);
        }
    }

    pub fn saliences(&self) -> [f64; STREAM_COUNT] {
        std::array::from_fn(|i| self.streams[i].salience)
    }

    /// Overwrite a stream's state vector. The vector must be exactly `dim` long.
    pub fn set_perception(&mut self, id: StreamId, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::dimension_mismatch(self.dim, vector.len()));
        }
        self.get_mut(id).state_vector = vector;
        Ok(())
    }

    /// Back to the freshly constructed state.
    pub fn reset(&mut self) {
        self.streams = StreamId::ALL.map(|id| StreamState::new(id, self.dim));
    }
}
