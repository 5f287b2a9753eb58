//! Motion planner: ring buffer of [`MotionBlock`]s with look-ahead
//! velocity-profile recalculation (§4.3).

use gcode_common::consts::{
    BLOCK_BUFFER_SIZE, JUNCTION_COS_REVERSAL, JUNCTION_COS_STRAIGHT, MIN_FEED_RATE, N_AXIS,
};
use gcode_common::modal::ParserState;
use gcode_common::motion::{Condition, DirectionBits, MotionBlock};
use gcode_common::settings::Settings;

use crate::error::PlannerError;

/// Planner ring buffer. `head` is the next free slot, `tail` the oldest
/// unexecuted block, `planned` the boundary up to which look-ahead has
/// already settled entry speeds (§4.3).
pub struct Planner {
    blocks: Vec<MotionBlock>,
    head: usize,
    tail: usize,
    planned: usize,
    count: usize,
    prev_unit_vector: [f32; N_AXIS],
    prev_nominal_speed: f32,
    /// Direction of the most recent motion on each axis, for backlash
    /// reversal detection (§4.3 "Backlash compensation").
    prev_direction_bits: DirectionBits,
    /// Whether each axis has moved at least once since the planner was
    /// reset, so the very first move on an axis never triggers a bogus
    /// reversal against an all-zero `prev_direction_bits`.
    axis_has_moved: [bool; N_AXIS],
}

fn ring_next(i: usize) -> usize {
    (i + 1) % BLOCK_BUFFER_SIZE
}

impl Planner {
    pub fn new() -> Self {
        Self {
            blocks: vec![MotionBlock::zeroed(); BLOCK_BUFFER_SIZE],
            head: 0,
            tail: 0,
            planned: 0,
            count: 0,
            prev_unit_vector: [0.0; N_AXIS],
            prev_nominal_speed: 0.0,
            prev_direction_bits: DirectionBits::empty(),
            axis_has_moved: [false; N_AXIS],
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == BLOCK_BUFFER_SIZE
    }

    /// Oldest unexecuted block, the one the segment generator consumes
    /// from next.
    pub fn tail_block(&self) -> Option<&MotionBlock> {
        if self.count == 0 {
            None
        } else {
            Some(&self.blocks[self.tail])
        }
    }

    /// Drop the tail block once the stepper has fully consumed it.
    pub fn discard_tail(&mut self) -> Option<MotionBlock> {
        if self.count == 0 {
            return None;
        }
        let block = self.blocks[self.tail].clone();
        self.tail = ring_next(self.tail);
        self.count -= 1;
        if self.planned == self.tail && self.count > 0 {
            // Tail advanced past the look-ahead boundary; nothing left to
            // replan behind it.
        }
        Some(block)
    }

    fn axis_vector(start: &[f32; N_AXIS], end: &[f32; N_AXIS]) -> ([f32; N_AXIS], f32) {
        let mut delta = [0.0f32; N_AXIS];
        let mut mm = 0.0f32;
        for i in 0..N_AXIS {
            delta[i] = end[i] - start[i];
            mm += delta[i] * delta[i];
        }
        mm = mm.sqrt();
        let mut unit = [0.0f32; N_AXIS];
        if mm > f32::EPSILON {
            for i in 0..N_AXIS {
                unit[i] = delta[i] / mm;
            }
        }
        (unit, mm)
    }

    /// Insert a new line segment from `start` to `end` (already in
    /// millimeters, machine coordinates). Computes step counts, direction
    /// bits, block acceleration/rate limits, and this block's junction
    /// speed limit against the previous block's unit vector (§4.3).
    pub fn plan_line(
        &mut self,
        start: &[f32; N_AXIS],
        end: &[f32; N_AXIS],
        parser_state: &ParserState,
        settings: &Settings,
    ) -> Result<(), PlannerError> {
        self.plan_line_ex(start, end, parser_state, settings, Condition::empty())
    }

    /// Same as [`Planner::plan_line`], but ORs `extra_condition` into the
    /// inserted block's condition flags. Used for jog lines
    /// (`Condition::SYSTEM_MOTION`) and other callers that need a block
    /// tagged beyond what `parser_state` alone implies.
    pub fn plan_line_ex(
        &mut self,
        start: &[f32; N_AXIS],
        end: &[f32; N_AXIS],
        parser_state: &ParserState,
        settings: &Settings,
        extra_condition: Condition,
    ) -> Result<(), PlannerError> {
        if self.is_full() {
            return Err(PlannerError::BufferFull);
        }

        let (unit_vector, millimeters) = Self::axis_vector(start, end);
        if millimeters <= f32::EPSILON {
            return Ok(());
        }

        let mut steps = [0u32; N_AXIS];
        let mut direction_bits = DirectionBits::empty();
        for i in 0..N_AXIS {
            let delta = end[i] - start[i];
            steps[i] = (delta.abs() * settings.axes[i].steps_per_mm).round() as u32;
            if delta < 0.0 {
                direction_bits |= DirectionBits::for_axis(i);
            }
        }
        let step_event_count = *steps.iter().max().unwrap_or(&0);

        self.insert_backlash_compensation(steps, direction_bits, settings);

        // Block acceleration/rate limited by the slowest-dominant axis
        // projected onto the unit vector.
        let mut acceleration = f32::MAX;
        let mut rapid_rate = f32::MAX;
        for i in 0..N_AXIS {
            let component = unit_vector[i].abs();
            if component > f32::EPSILON {
                acceleration = acceleration.min(settings.axes[i].acceleration / component);
                rapid_rate = rapid_rate.min(settings.axes[i].max_rate / component);
            }
        }
        if acceleration == f32::MAX {
            acceleration = 0.0;
        }
        if rapid_rate == f32::MAX {
            rapid_rate = 0.0;
        }

        let is_rapid = matches!(parser_state.motion, gcode_common::modal::MotionMode::Seek);
        let programmed_rate = if is_rapid {
            rapid_rate
        } else {
            parser_state.feed_rate.min(rapid_rate)
        };

        let mut condition = extra_condition;
        if is_rapid {
            condition |= Condition::RAPID_MOTION;
        }
        match parser_state.spindle {
            gcode_common::modal::SpindleMode::Cw => condition |= Condition::SPINDLE_CW,
            gcode_common::modal::SpindleMode::Ccw => condition |= Condition::SPINDLE_CCW,
            gcode_common::modal::SpindleMode::Off => {}
        }
        if parser_state.coolant.contains(gcode_common::modal::CoolantMode::FLOOD) {
            condition |= Condition::COOLANT_FLOOD;
        }
        if parser_state.coolant.contains(gcode_common::modal::CoolantMode::MIST) {
            condition |= Condition::COOLANT_MIST;
        }

        // Junction speed limit (§4.3 centripetal formula), computed against
        // the previous planned block's unit vector.
        let max_junction_speed_sqr = if self.count == 0 {
            0.0
        } else {
            let cos_theta: f32 = -self
                .prev_unit_vector
                .iter()
                .zip(unit_vector.iter())
                .map(|(a, b)| a * b)
                .sum::<f32>();
            if cos_theta > JUNCTION_COS_STRAIGHT {
                0.0
            } else if cos_theta < JUNCTION_COS_REVERSAL {
                rapid_rate * rapid_rate
            } else {
                let cos_theta = cos_theta.clamp(-1.0, 1.0);
                let sin_half = ((1.0 - cos_theta) / 2.0).max(0.0).sqrt();
                if sin_half > 1.0 - f32::EPSILON {
                    f32::MAX
                } else {
                    (settings.junction_deviation * acceleration * sin_half / (1.0 - sin_half))
                        .max(0.0)
                }
            }
        };

        let nominal_speed_sqr = programmed_rate * programmed_rate;
        let block = MotionBlock {
            steps,
            step_event_count,
            direction_bits,
            millimeters,
            acceleration,
            rapid_rate,
            programmed_rate,
            entry_speed_sqr: 0.0,
            max_entry_speed_sqr: max_junction_speed_sqr.min(nominal_speed_sqr),
            max_junction_speed_sqr: max_junction_speed_sqr.min(nominal_speed_sqr),
            condition,
            line_number: 0,
            spindle_speed: parser_state.spindle_speed,
            backlash_motion: false,
            nominal_rate: programmed_rate,
        };

        self.blocks[self.head] = block;
        self.head = ring_next(self.head);
        self.count += 1;
        self.prev_unit_vector = unit_vector;
        self.prev_nominal_speed = programmed_rate;
        self.prev_direction_bits = direction_bits;
        for i in 0..N_AXIS {
            if steps[i] > 0 {
                self.axis_has_moved[i] = true;
            }
        }

        self.recalculate();
        Ok(())
    }

    /// Detects per-axis direction reversal against the previously planned
    /// move and, if any reversed axis has nonzero configured backlash,
    /// inserts a dedicated rapid-rate compensation block ahead of the
    /// caller's main block (§4.3 "Backlash compensation"). Best-effort:
    /// silently skipped if the buffer has no room, since a missed
    /// compensation move is preferable to rejecting the commanded motion.
    fn insert_backlash_compensation(
        &mut self,
        steps: [u32; N_AXIS],
        direction_bits: DirectionBits,
        settings: &Settings,
    ) {
        if self.is_full() {
            return;
        }

        let mut comp_steps = [0u32; N_AXIS];
        let mut comp_direction = DirectionBits::empty();
        let mut any_reversal = false;
        for i in 0..N_AXIS {
            if steps[i] == 0 || !self.axis_has_moved[i] || settings.axes[i].backlash <= 0.0 {
                continue;
            }
            if direction_bits.is_negative(i) == self.prev_direction_bits.is_negative(i) {
                continue;
            }
            any_reversal = true;
            comp_steps[i] = (settings.axes[i].backlash * settings.axes[i].steps_per_mm).round() as u32;
            if direction_bits.is_negative(i) {
                comp_direction |= DirectionBits::for_axis(i);
            }
        }
        if !any_reversal {
            return;
        }

        let step_event_count = *comp_steps.iter().max().unwrap_or(&0);
        if step_event_count == 0 {
            return;
        }

        let mut acceleration = f32::MAX;
        let mut rapid_rate = f32::MAX;
        for i in 0..N_AXIS {
            if comp_steps[i] > 0 {
                acceleration = acceleration.min(settings.axes[i].acceleration);
                rapid_rate = rapid_rate.min(settings.axes[i].max_rate);
            }
        }
        if acceleration == f32::MAX {
            acceleration = 0.0;
        }
        if rapid_rate == f32::MAX {
            rapid_rate = 0.0;
        }

        let millimeters = (0..N_AXIS)
            .map(|i| comp_steps[i] as f32 / settings.axes[i].steps_per_mm.max(f32::EPSILON))
            .fold(0.0f32, f32::max);

        let block = MotionBlock {
            steps: comp_steps,
            step_event_count,
            direction_bits: comp_direction,
            millimeters,
            acceleration,
            rapid_rate,
            programmed_rate: rapid_rate,
            entry_speed_sqr: 0.0,
            max_entry_speed_sqr: rapid_rate * rapid_rate,
            max_junction_speed_sqr: rapid_rate * rapid_rate,
            condition: Condition::RAPID_MOTION | Condition::NO_FEED_OVERRIDE | Condition::SYSTEM_MOTION,
            line_number: 0,
            spindle_speed: 0.0,
            backlash_motion: true,
            nominal_rate: rapid_rate,
        };

        self.blocks[self.head] = block;
        self.head = ring_next(self.head);
        self.count += 1;
        // Deliberately does not update prev_unit_vector/prev_nominal_speed:
        // the backlash move does not participate in junction-speed
        // coalescing with the surrounding program motion.
    }

    /// Rescales the queued (not-yet-executing) blocks' feed rate from
    /// each block's stored `nominal_rate` by the given override
    /// percentages, then re-runs look-ahead. Rescaling from the original
    /// nominal rate rather than the current `programmed_rate` keeps
    /// repeated override changes from compounding rounding error
    /// (§4.6 "Overrides").
    pub fn replan_overrides(&mut self, feed_override_pct: u8, rapid_override_pct: u8) {
        if self.count == 0 {
            return;
        }
        let mut idx = self.tail;
        for _ in 0..self.count {
            let block = &mut self.blocks[idx];
            if !block.backlash_motion && !block.condition.contains(Condition::NO_FEED_OVERRIDE) {
                let pct = if block.condition.contains(Condition::RAPID_MOTION) {
                    rapid_override_pct
                } else {
                    feed_override_pct
                };
                let scaled = block.nominal_rate * (pct as f32 / 100.0);
                let scaled = scaled.clamp(MIN_FEED_RATE, block.rapid_rate.max(MIN_FEED_RATE));
                block.programmed_rate = scaled;
                let nominal_speed_sqr = scaled * scaled;
                block.max_entry_speed_sqr = block.max_junction_speed_sqr.min(nominal_speed_sqr);
            }
            idx = ring_next(idx);
        }
        self.recalculate();
    }

    /// Reverse pass (lower entry speeds back from the newest block) then
    /// forward pass (raise successor entry speeds up to what's reachable),
    /// re-run after every insertion and after any override change (§4.3).
    pub fn recalculate(&mut self) {
        if self.count < 2 {
            return;
        }

        let mut indices = Vec::with_capacity(self.count);
        let mut idx = self.tail;
        for _ in 0..self.count {
            indices.push(idx);
            idx = ring_next(idx);
        }

        // Reverse pass: last block's entry speed is only bounded by its
        // own junction limit; each earlier block is bounded by how much
        // the next block can decelerate from.
        let mut next_entry_speed_sqr = 0.0f32;
        for (i, &pos) in indices.iter().enumerate().rev() {
            let block = &mut self.blocks[pos];
            if i == indices.len() - 1 {
                block.entry_speed_sqr = block.max_junction_speed_sqr.min(block.max_entry_speed_sqr);
            } else {
                let max_reachable = next_entry_speed_sqr + 2.0 * block.acceleration * block.millimeters;
                block.entry_speed_sqr = block.max_junction_speed_sqr.min(max_reachable).min(block.max_entry_speed_sqr);
            }
            next_entry_speed_sqr = block.entry_speed_sqr;
        }

        // Forward pass: raise entry speeds up to what's reachable from the
        // previous block's (possibly lowered) entry speed, never exceeding
        // what the reverse pass already settled.
        let mut prev_exit_speed_sqr = 0.0f32;
        for (i, &pos) in indices.iter().enumerate() {
            let block = &mut self.blocks[pos];
            if i > 0 {
                let reachable = prev_exit_speed_sqr + 2.0 * block.acceleration * block.millimeters;
                if reachable < block.entry_speed_sqr {
                    block.entry_speed_sqr = reachable;
                }
            }
            prev_exit_speed_sqr = block.entry_speed_sqr + 2.0 * block.acceleration * block.millimeters;
        }

        self.planned = indices[indices.len() - 1];
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_axis_move_step_count_matches_distance() {
        let mut planner = Planner::new();
        let settings = Settings::default();
        let state = ParserState::default();
        planner
            .plan_line(&[0.0; N_AXIS], &{ let mut e = [0.0; N_AXIS]; e[0] = 10.0; e }, &state, &settings)
            .unwrap();
        let b = planner.tail_block().unwrap();
        assert_eq!(b.steps[0], (10.0 * settings.axes[0].steps_per_mm).round() as u32);
        assert!(b.step_count_invariant_holds());
    }

    #[test]
    fn full_buffer_rejects_insertion() {
        let mut planner = Planner::new();
        let settings = Settings::default();
        let state = ParserState::default();
        for i in 0..BLOCK_BUFFER_SIZE {
            let start = { let mut s = [0.0; N_AXIS]; s[0] = i as f32; s };
            let end = { let mut e = [0.0; N_AXIS]; e[0] = i as f32 + 1.0; e };
            planner.plan_line(&start, &end, &state, &settings).unwrap();
        }
        let start = { let mut s = [0.0; N_AXIS]; s[0] = 99.0; s };
        let end = { let mut e = [0.0; N_AXIS]; e[0] = 100.0; e };
        assert_eq!(
            planner.plan_line(&start, &end, &state, &settings).unwrap_err(),
            PlannerError::BufferFull
        );
    }

    #[test]
    fn junction_speed_invariant_holds_after_recalculate() {
        let mut planner = Planner::new();
        let settings = Settings::default();
        let state = ParserState::default();
        planner
            .plan_line(&[0.0; N_AXIS], &{ let mut e = [0.0; N_AXIS]; e[0] = 10.0; e }, &state, &settings)
            .unwrap();
        planner
            .plan_line(
                &{ let mut s = [0.0; N_AXIS]; s[0] = 10.0; s },
                &{ let mut e = [0.0; N_AXIS]; e[0] = 10.0; e[1] = 10.0; e },
                &state,
                &settings,
            )
            .unwrap();
        for pos in 0..planner.len() {
            let idx = (planner.tail + pos) % BLOCK_BUFFER_SIZE;
            assert!(planner.blocks[idx].speed_invariant_holds());
        }
    }

    #[test]
    fn discard_tail_reduces_count() {
        let mut planner = Planner::new();
        let settings = Settings::default();
        let state = ParserState::default();
        planner
            .plan_line(&[0.0; N_AXIS], &{ let mut e = [0.0; N_AXIS]; e[0] = 1.0; e }, &state, &settings)
            .unwrap();
        assert_eq!(planner.len(), 1);
        planner.discard_tail();
        assert_eq!(planner.len(), 0);
    }
}
