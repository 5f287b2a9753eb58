//! Step-pulse / step-reset ISR-equivalent logic (§4.5).
//!
//! The real ISR pair is modeled as two methods on [`Stepper`] driven once
//! per fast-phase tick by the cycle runner: [`Stepper::step_pulse_tick`]
//! (pop a segment, Bresenham-accumulate, assert step lines) and
//! [`Stepper::step_reset_tick`] (deassert after the pulse width).

use gcode_common::consts::N_AXIS;
use gcode_common::hal::StepOutput;
use gcode_common::motion::{DirectionBits, MotionBlock};

use crate::segment::Segment;

/// Bresenham per-axis error accumulators for the block currently being
/// stepped.
#[derive(Debug, Clone, Copy, Default)]
struct Bresenham {
    counter: [i32; N_AXIS],
}

impl Bresenham {
    fn reset(&mut self, block: &MotionBlock) {
        let half = block.step_event_count as i32 / 2;
        for i in 0..N_AXIS {
            self.counter[i] = half;
        }
    }

    /// Advance one step-event tick; returns which axes should pulse.
    fn advance(&mut self, block: &MotionBlock) -> [bool; N_AXIS] {
        let mut pulse = [false; N_AXIS];
        for i in 0..N_AXIS {
            self.counter[i] -= block.steps[i] as i32;
            if self.counter[i] < 0 {
                pulse[i] = true;
                self.counter[i] += block.step_event_count as i32;
            }
        }
        pulse
    }
}

/// Outcome of one `step_pulse_tick` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTickResult {
    /// A step event was issued.
    Stepped,
    /// The current segment (and possibly block) was exhausted; caller
    /// should pull the next segment/block before the next tick.
    SegmentComplete,
    /// Nothing queued; stepper is idle.
    Idle,
    /// A segment is loaded but this tick falls short of the segment's
    /// `cycles_per_tick` pacing divider; no step event issued.
    Waiting,
}

/// Drives step/direction/enable lines for one machine via a `StepOutput`
/// collaborator, consuming segments handed to it by the cycle runner.
pub struct Stepper<'a> {
    output: &'a mut dyn StepOutput,
    bresenham: Bresenham,
    axis_lock: DirectionBits,
    remaining_in_segment: u32,
    active: bool,
    /// Fast-phase ticks between step events for the loaded segment (§4.4
    /// velocity profile pacing); 1 means a step event every tick.
    cycles_per_tick: u32,
    /// Ticks remaining before the next step event is due.
    tick_countdown: u32,
}

impl<'a> Stepper<'a> {
    pub fn new(output: &'a mut dyn StepOutput) -> Self {
        Self {
            output,
            bresenham: Bresenham::default(),
            axis_lock: DirectionBits::empty(),
            remaining_in_segment: 0,
            active: false,
            cycles_per_tick: 1,
            tick_countdown: 0,
        }
    }

    /// Restrict stepping to a subset of axes, e.g. during a homing phase
    /// that only moves axes in the current cycle mask (§4.7).
    pub fn set_axis_lock(&mut self, lock: DirectionBits) {
        self.axis_lock = lock;
    }

    pub fn load_block(&mut self, block: &MotionBlock) {
        self.bresenham.reset(block);
        self.active = true;
        for axis in 0..N_AXIS {
            self.output.set_direction(axis, block.direction_bits.is_negative(axis));
        }
    }

    pub fn load_segment(&mut self, segment: &Segment) {
        self.remaining_in_segment = segment.n_step;
        self.cycles_per_tick = segment.cycles_per_tick.max(1);
        self.tick_countdown = self.cycles_per_tick;
    }

    /// One Bresenham step event for the loaded block, gated by
    /// `axis_lock` when non-empty (homing single-axis restriction), and
    /// paced by the loaded segment's `cycles_per_tick` divider.
    pub fn step_pulse_tick(&mut self, block: &MotionBlock) -> StepTickResult {
        if !self.active || self.remaining_in_segment == 0 {
            return StepTickResult::Idle;
        }
        self.tick_countdown -= 1;
        if self.tick_countdown > 0 {
            return StepTickResult::Waiting;
        }
        self.tick_countdown = self.cycles_per_tick;
        let pulses = self.bresenham.advance(block);
        let locked = !self.axis_lock.is_empty();
        for axis in 0..N_AXIS {
            if !pulses[axis] {
                continue;
            }
            if locked && self.axis_lock.bits() & (1 << axis) == 0 {
                continue;
            }
            self.output.set_step(axis, true);
        }
        self.remaining_in_segment -= 1;
        if self.remaining_in_segment == 0 {
            StepTickResult::SegmentComplete
        } else {
            StepTickResult::Stepped
        }
    }

    /// Deassert all step lines after the configured pulse width has
    /// elapsed; the cycle runner calls this a fixed delay after
    /// `step_pulse_tick` within the same fast-phase tick.
    pub fn step_reset_tick(&mut self) {
        for axis in 0..N_AXIS {
            self.output.set_step(axis, false);
        }
    }

    /// Full cancellation: stop issuing pulses and drop any in-flight
    /// segment. The planner/segment generator must be re-synced from a
    /// complete stop afterward (`cycle_reinitialize`, §4.5).
    pub fn reset(&mut self) {
        self.active = false;
        self.remaining_in_segment = 0;
        self.tick_countdown = 0;
        self.step_reset_tick();
    }

    pub fn is_active(&self) -> bool {
        self.active && self.remaining_in_segment > 0
    }
}
