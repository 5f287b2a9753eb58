//! The planner's motion-block entity (§3 "Motion block") and its
//! `condition` bitfield.

use crate::consts::N_AXIS;
use bitflags::bitflags;

bitflags! {
    /// Per-block condition flags. Combinable, unlike the modal enums in
    /// [`crate::modal`] — a block can simultaneously be a rapid, carry no
    /// feed override, and run the spindle CW with flood coolant on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Condition: u16 {
        /// Rapid move (G0); ignores the programmed feed rate.
        const RAPID_MOTION      = 1 << 0;
        /// System motion (homing/parking/jog): bypasses normal queuing and
        /// forced deceleration-to-stop (§4.4 "System motions").
        const SYSTEM_MOTION     = 1 << 1;
        /// Feed/rapid overrides do not apply to this block.
        const NO_FEED_OVERRIDE  = 1 << 2;
        /// Feed rate is inverse-time (G93): `feed_rate` is already
        /// minutes^-1, scaled by `millimeters` at insertion.
        const INVERSE_TIME      = 1 << 3;
        /// Spindle runs clockwise for the duration of this block.
        const SPINDLE_CW        = 1 << 4;
        /// Spindle runs counter-clockwise for the duration of this block.
        const SPINDLE_CCW       = 1 << 5;
        /// Flood coolant active for the duration of this block.
        const COOLANT_FLOOD     = 1 << 6;
        /// Mist coolant active for the duration of this block.
        const COOLANT_MIST      = 1 << 7;
    }
}

bitflags! {
    /// Per-axis direction bitfield. Bit `i` set means axis `i` moves in the
    /// negative direction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirectionBits: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
        const A = 1 << 3;
        const B = 1 << 4;
    }
}

impl DirectionBits {
    pub const fn for_axis(axis: usize) -> Self {
        Self::from_bits_truncate(1 << axis)
    }

    pub const fn is_negative(self, axis: usize) -> bool {
        self.intersects(Self::for_axis(axis))
    }
}

/// A single planner ring-buffer entry (§3 "Motion block (planner entity)").
///
/// Created once by the interpreter via `PlannerBufferLine`, never mutated
/// externally afterward; mutated only by the planner's velocity
/// recalculation (§4.3) and by the segment generator reading the
/// currently-executing block's updated exit speed (§4.4). Destroyed when
/// the stepper advances past it.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionBlock {
    /// Per-axis step counts for this block (always non-negative magnitudes;
    /// sign lives in `direction_bits`).
    pub steps: [u32; N_AXIS],
    /// `max(steps[i])` — the number of step events the slowest-dominant
    /// axis needs, used by Bresenham accumulation in the stepper.
    pub step_event_count: u32,
    pub direction_bits: DirectionBits,
    /// Euclidean path length in millimeters.
    pub millimeters: f32,
    /// Acceleration for this block's direction, mm/min^2, limited to the
    /// smallest per-axis acceleration projected onto the unit vector.
    pub acceleration: f32,
    pub rapid_rate: f32,
    pub programmed_rate: f32,
    /// Entry speed squared, (mm/min)^2. Mutated by look-ahead passes.
    pub entry_speed_sqr: f32,
    /// Entry speed squared this block can reach given deceleration from
    /// its own nominal speed back to the next block's junction.
    pub max_entry_speed_sqr: f32,
    /// Junction speed squared limit computed at insertion time from the
    /// centripetal formula (§4.3); never changes after insertion.
    pub max_junction_speed_sqr: f32,
    pub condition: Condition,
    pub line_number: i32,
    pub spindle_speed: f32,
    /// True if this block is a backlash compensation insertion (§4.3);
    /// such blocks do not update the planner's "previous unit vector"
    /// used for junction computation and never coalesce with look-ahead
    /// optimization across the compensation boundary.
    pub backlash_motion: bool,
    /// The rate this block was originally planned at, before any
    /// override rescaling. Override re-plan always rescales from this
    /// value rather than from the current `programmed_rate`, so repeated
    /// override changes never compound rounding error.
    pub nominal_rate: f32,
}

impl MotionBlock {
    /// An empty block suitable as a ring-buffer filler before any line has
    /// been planned into that slot.
    pub fn zeroed() -> Self {
        Self {
            steps: [0; N_AXIS],
            step_event_count: 0,
            direction_bits: DirectionBits::empty(),
            millimeters: 0.0,
            acceleration: 0.0,
            rapid_rate: 0.0,
            programmed_rate: 0.0,
            entry_speed_sqr: 0.0,
            max_entry_speed_sqr: 0.0,
            max_junction_speed_sqr: 0.0,
            condition: Condition::empty(),
            line_number: 0,
            spindle_speed: 0.0,
            backlash_motion: false,
            nominal_rate: 0.0,
        }
    }

    /// Invariant 1 of §8: `0 <= entry_speed_sqr <= max_entry_speed_sqr <=
    /// max_junction_speed_sqr`.
    pub fn speed_invariant_holds(&self) -> bool {
        self.entry_speed_sqr >= 0.0
            && self.entry_speed_sqr <= self.max_entry_speed_sqr + f32::EPSILON
            && self.max_entry_speed_sqr <= self.max_junction_speed_sqr + f32::EPSILON
    }

    /// Invariant of §3: `step_event_count >= steps[i]` for all axes.
    pub fn step_count_invariant_holds(&self) -> bool {
        self.steps.iter().all(|&s| s <= self.step_event_count)
    }
}
