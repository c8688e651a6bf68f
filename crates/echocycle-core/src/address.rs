//! Step addressing — maps a linear step counter onto the 30-step cycle
//!
//! 30 = LCM(2, 3, 5): 3 phases × 5 stages × 2 steps per stage. The dyad/triad
//! tags run on their own 4-step period, independent of phase and stage.

use crate::error::{Error, Result};
use crate::types::{Dyad, Phase, StepAddress, StreamId};

/// Steps in one full cycle.
pub const CYCLE_LENGTH: u64 = 30;

const STEPS_PER_PHASE: u64 = 10;
const STEPS_PER_STAGE: u64 = 2;

const DYAD_TRIAD_PATTERN: [(Dyad, u8); 4] = [(Dyad::A, 1), (Dyad::A, 2), (Dyad::B, 2), (Dyad::B, 3)];

/// Translate a 1-based step counter into its cycle coordinate.
///
/// Any counter ≥ 1 is accepted; it is normalized to `((step - 1) mod 30) + 1`
/// first, so `to_step_address(n)` and `to_step_address(n + 30)` always agree.
pub fn to_step_address(step: u64) -> Result<StepAddress> {
    if step < 1 {
        return Err(Error::InvalidStepNumber(step));
    }
    let offset = (step - 1) % CYCLE_LENGTH;
    let within_phase = offset % STEPS_PER_PHASE;
    let (dyad, triad) = DYAD_TRIAD_PATTERN[(offset % 4) as usize];

    Ok(StepAddress {
        step: (offset + 1) as u8,
        phase: Phase::from_index((offset / STEPS_PER_PHASE) as usize),
        stage: (within_phase / STEPS_PER_STAGE) as u8 + 1,
        step_in_stage: (within_phase % STEPS_PER_STAGE) as u8 + 1,
        dyad,
        triad,
    })
}

/// Which stream gets the salience boost at this step.
pub fn primary_stream_for_step(step: u64) -> Result<StreamId> {
    to_step_address(step).map(|address| address.primary_stream())
}

/// The 30 addresses of one cycle, in order.
pub fn cycle_addresses() -> Vec<StepAddress> {
    (1..=CYCLE_LENGTH)
        .filter_map(|step| to_step_address(step).ok())
        .collect()
}
