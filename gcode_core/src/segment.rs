//! Segment generator (§4.4): slices the planner's tail block into a
//! bounded run of fixed-duration step segments with an accel/cruise/decel
//! velocity profile.

use gcode_common::consts::{AMASS_LEVELS, CYCLE_TIME_US, SEGMENT_BUFFER_SIZE};
use gcode_common::motion::MotionBlock;

/// One segment: a fixed number of step events to issue at a constant
/// step rate before the profile is re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub n_step: u32,
    pub cycles_per_tick: u32,
    pub amass_level: u8,
}

/// Three-phase trapezoidal/triangular velocity profile for one block,
/// expressed in mm and mm/min (§4.4).
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub accelerate_until: f32,
    pub decelerate_after: f32,
    pub nominal_speed_sqr: f32,
    pub exit_speed_sqr: f32,
}

impl Profile {
    /// Build the profile for `block`, given the speed the block after it
    /// can enter at (queried fresh each time since look-ahead may have
    /// lowered it since the last inspection, §4.4).
    pub fn new(block: &MotionBlock, exit_speed_sqr: f32) -> Self {
        let nominal_speed_sqr = block.programmed_rate * block.programmed_rate;
        let accel_to_nominal =
            (nominal_speed_sqr - block.entry_speed_sqr) / (2.0 * block.acceleration.max(f32::EPSILON));
        let decel_from_nominal =
            (nominal_speed_sqr - exit_speed_sqr) / (2.0 * block.acceleration.max(f32::EPSILON));

        if accel_to_nominal + decel_from_nominal >= block.millimeters {
            // Triangular profile: never reaches nominal speed.
            let intersection = 0.5
                * (block.millimeters
                    + (block.entry_speed_sqr - exit_speed_sqr) / (2.0 * block.acceleration.max(f32::EPSILON)));
            let intersection = intersection.clamp(0.0, block.millimeters);
            Profile {
                accelerate_until: intersection,
                decelerate_after: intersection,
                nominal_speed_sqr,
                exit_speed_sqr,
            }
        } else {
            Profile {
                accelerate_until: accel_to_nominal.max(0.0),
                decelerate_after: (block.millimeters - decel_from_nominal).max(0.0),
                nominal_speed_sqr,
                exit_speed_sqr,
            }
        }
    }

    /// Velocity squared, mm/min, at distance `s` into the block.
    pub fn speed_sqr_at(&self, s: f32, block: &MotionBlock) -> f32 {
        if s <= self.accelerate_until {
            block.entry_speed_sqr + 2.0 * block.acceleration * s
        } else if s >= self.decelerate_after {
            let remaining = (block.millimeters - s).max(0.0);
            self.exit_speed_sqr + 2.0 * block.acceleration * remaining
        } else {
            self.nominal_speed_sqr
        }
    }
}

/// Number of fast-phase ticks between step events at `rate` (mm/min) for
/// `block`'s step-to-millimeter ratio, the real pacing divider consumed
/// by the stepper (§4.4/§4.5). Always at least 1: a rate fast enough to
/// need sub-tick pacing is rejected upstream by the rate limiter, not
/// silently sped up here.
fn compute_cycles_per_tick(rate: f32, block: &MotionBlock) -> u32 {
    if block.millimeters <= f32::EPSILON || block.step_event_count == 0 {
        return 1;
    }
    let steps_per_mm = block.step_event_count as f32 / block.millimeters;
    let step_rate_per_sec = (rate.max(1.0) / 60.0) * steps_per_mm;
    if step_rate_per_sec <= f32::EPSILON {
        return 1;
    }
    let cycle_time_seconds = CYCLE_TIME_US as f32 / 1_000_000.0;
    let cycles = (1.0 / (step_rate_per_sec * cycle_time_seconds)).round();
    cycles.max(1.0) as u32
}

/// Selects the smallest AMASS level whose scaled step rate keeps a
/// 16-bit timer reload in range, re-derived at the exact event boundary
/// rather than averaged (§9).
pub fn select_amass_level(steps_per_min: f32) -> u8 {
    let steps_per_sec = steps_per_min / 60.0;
    for level in 0..AMASS_LEVELS {
        let scaled = steps_per_sec * (1u32 << level) as f32;
        let reload = (CYCLE_TIME_US as f32 * 1000.0) / scaled.max(1.0);
        if reload <= u16::MAX as f32 {
            return level;
        }
    }
    AMASS_LEVELS - 1
}

/// Produce up to [`SEGMENT_BUFFER_SIZE`] segments covering `block`,
/// re-querying `exit_speed_sqr` for the final segment's target speed.
/// System motions (homing/parking/jog, `condition.SYSTEM_MOTION`) bypass
/// the normal forced-deceleration profile and run at a constant rate
/// instead, per §4.4.
pub fn generate_segments(block: &MotionBlock, exit_speed_sqr: f32) -> Vec<Segment> {
    if block.condition.contains(gcode_common::motion::Condition::SYSTEM_MOTION) {
        let rate = block.programmed_rate.max(1.0);
        let amass = select_amass_level(rate);
        return vec![Segment {
            n_step: block.step_event_count,
            cycles_per_tick: compute_cycles_per_tick(rate, block),
            amass_level: amass,
        }];
    }

    let profile = Profile::new(block, exit_speed_sqr);
    let mut segments = Vec::with_capacity(SEGMENT_BUFFER_SIZE);
    if block.step_event_count == 0 {
        return segments;
    }

    let slice_count = SEGMENT_BUFFER_SIZE.min(block.step_event_count.max(1) as usize);
    let step_per_slice = (block.step_event_count as f32 / slice_count as f32).max(1.0);
    let mut issued = 0u32;
    for i in 0..slice_count {
        let s = block.millimeters * (i as f32 + 1.0) / slice_count as f32;
        let speed_sqr = profile.speed_sqr_at(s, block).max(1.0);
        let rate = speed_sqr.sqrt();
        let amass = select_amass_level(rate);
        let n_step = if i == slice_count - 1 {
            block.step_event_count - issued
        } else {
            step_per_slice.round() as u32
        };
        issued += n_step;
        if n_step == 0 {
            continue;
        }
        segments.push(Segment {
            n_step,
            cycles_per_tick: compute_cycles_per_tick(rate, block),
            amass_level: amass,
        });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcode_common::motion::Condition;

    fn sample_block() -> MotionBlock {
        let mut b = MotionBlock::zeroed();
        b.steps = [1000, 0, 0, 0, 0];
        b.step_event_count = 1000;
        b.millimeters = 10.0;
        b.acceleration = 500.0;
        b.programmed_rate = 600.0;
        b.entry_speed_sqr = 0.0;
        b
    }

    #[test]
    fn segments_sum_to_block_step_count() {
        let block = sample_block();
        let segments = generate_segments(&block, 0.0);
        let total: u32 = segments.iter().map(|s| s.n_step).sum();
        assert_eq!(total, block.step_event_count);
    }

    #[test]
    fn segment_count_bounded_by_buffer_size() {
        let block = sample_block();
        let segments = generate_segments(&block, 0.0);
        assert!(segments.len() <= SEGMENT_BUFFER_SIZE);
    }

    #[test]
    fn system_motion_bypasses_profile_and_emits_single_segment() {
        let mut block = sample_block();
        block.condition = Condition::SYSTEM_MOTION;
        let segments = generate_segments(&block, 0.0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].n_step, block.step_event_count);
    }

    #[test]
    fn amass_level_never_exceeds_max() {
        for rate in [1.0, 100.0, 10_000.0, 1_000_000.0] {
            assert!(select_amass_level(rate) < AMASS_LEVELS);
        }
    }
}
