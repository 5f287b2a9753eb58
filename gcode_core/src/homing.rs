//! Homing cycle supervisor (§4.7).
//!
//! Generalized from a single-axis-per-phase `HomingSupervisor` shape
//! (phase enum + `tick`/timeout-budget) to a multi-axis-per-phase
//! GRBL-style homing cycle: approach at seek rate, pull off, locate at
//! feed rate, pull off again.

use gcode_common::consts::{HOMING_AXIS_LOCATE_SCALAR, HOMING_AXIS_SEARCH_SCALAR, N_AXIS};
use gcode_common::error::AlarmCode;
use gcode_common::motion::DirectionBits;
use gcode_common::settings::Settings;

/// Internal phase of the homing cycle for the axis group currently
/// homing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    Idle,
    Approach,
    PullOff,
    Locate,
    FinalPullOff,
    Complete,
    Failed,
}

/// Outcome of one [`HomingSupervisor::tick`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomingTickResult {
    InProgress,
    PhaseComplete,
    /// The whole cycle mask group finished; caller sets `sys_position`
    /// for each homed axis to `max_travel + pull_off` (signed by the
    /// configured direction) or `0.0` if force-set-origin is active.
    Success,
    Failed { reason: AlarmCode },
}

/// Per-cycle-group homing supervisor. One instance handles one entry of
/// `Settings::homing_cycle_mask` (the set of axes that home together).
pub struct HomingSupervisor {
    phase: HomingPhase,
    axis_mask: DirectionBits,
    seek_rate: f32,
    feed_rate: f32,
    pull_off: f32,
    /// Remaining travel budget for the current phase, per axis, mm.
    remaining: [f32; N_AXIS],
}

impl HomingSupervisor {
    pub fn new(axis_mask: u8, settings: &Settings) -> Self {
        Self {
            phase: HomingPhase::Idle,
            axis_mask: DirectionBits::from_bits_truncate(axis_mask),
            seek_rate: settings.homing_seek_rate,
            feed_rate: settings.homing_feed_rate,
            pull_off: settings.homing_pulloff,
            remaining: [0.0; N_AXIS],
        }
    }

    pub const fn phase(&self) -> HomingPhase {
        self.phase
    }

    /// Begin the approach phase: drive the masked axes toward their
    /// limit switches at `seek_rate * HOMING_AXIS_SEARCH_SCALAR *
    /// |max_travel|` (§4.7).
    pub fn start(&mut self, settings: &Settings) {
        self.phase = HomingPhase::Approach;
        for axis in 0..N_AXIS {
            if self.axis_mask.bits() & (1 << axis) != 0 {
                self.remaining[axis] = settings.axes[axis].max_travel.abs() * HOMING_AXIS_SEARCH_SCALAR;
            } else {
                self.remaining[axis] = 0.0;
            }
        }
    }

    pub fn seek_rate(&self) -> f32 {
        self.seek_rate
    }

    pub fn feed_rate(&self) -> f32 {
        self.feed_rate
    }

    /// Advance one tick given which masked axes reported a limit-switch
    /// trigger this tick, and whether a reset/door event interrupted the
    /// cycle. Distance traveled this tick (`step_mm`) is subtracted from
    /// each active axis's remaining budget; exhausting it before a
    /// trigger is a search/locate failure.
    pub fn tick(
        &mut self,
        limit_triggered: DirectionBits,
        step_mm: f32,
        aborted: bool,
    ) -> HomingTickResult {
        if aborted {
            self.phase = HomingPhase::Failed;
            let reason = match self.phase {
                _ => AlarmCode::HomingFailReset,
            };
            return HomingTickResult::Failed { reason };
        }

        match self.phase {
            HomingPhase::Idle | HomingPhase::Complete | HomingPhase::Failed => {
                HomingTickResult::InProgress
            }
            HomingPhase::Approach => {
                let mut any_active = false;
                let mut all_triggered = true;
                for axis in 0..N_AXIS {
                    if self.axis_mask.bits() & (1 << axis) == 0 {
                        continue;
                    }
                    any_active = true;
                    if limit_triggered.bits() & (1 << axis) != 0 {
                        continue;
                    }
                    all_triggered = false;
                    self.remaining[axis] -= step_mm;
                    if self.remaining[axis] <= 0.0 {
                        self.phase = HomingPhase::Failed;
                        return HomingTickResult::Failed {
                            reason: AlarmCode::HomingFailApproach,
                        };
                    }
                }
                if any_active && all_triggered {
                    self.phase = HomingPhase::PullOff;
                    for axis in 0..N_AXIS {
                        if self.axis_mask.bits() & (1 << axis) != 0 {
                            self.remaining[axis] = self.pull_off;
                        }
                    }
                    return HomingTickResult::PhaseComplete;
                }
                HomingTickResult::InProgress
            }
            HomingPhase::PullOff => {
                let mut done = true;
                for axis in 0..N_AXIS {
                    if self.axis_mask.bits() & (1 << axis) == 0 {
                        continue;
                    }
                    self.remaining[axis] -= step_mm;
                    if self.remaining[axis] > 0.0 {
                        done = false;
                    }
                }
                if done {
                    self.phase = HomingPhase::Locate;
                    for axis in 0..N_AXIS {
                        if self.axis_mask.bits() & (1 << axis) != 0 {
                            self.remaining[axis] = self.pull_off * HOMING_AXIS_LOCATE_SCALAR;
                        }
                    }
                    return HomingTickResult::PhaseComplete;
                }
                if self.remaining.iter().any(|&r| r < -self.pull_off * 4.0) {
                    self.phase = HomingPhase::Failed;
                    return HomingTickResult::Failed {
                        reason: AlarmCode::HomingFailPulloff,
                    };
                }
                HomingTickResult::InProgress
            }
            HomingPhase::Locate => {
                let mut any_active = false;
                let mut all_triggered = true;
                for axis in 0..N_AXIS {
                    if self.axis_mask.bits() & (1 << axis) == 0 {
                        continue;
                    }
                    any_active = true;
                    if limit_triggered.bits() & (1 << axis) != 0 {
                        continue;
                    }
                    all_triggered = false;
                    self.remaining[axis] -= step_mm;
                    if self.remaining[axis] <= 0.0 {
                        self.phase = HomingPhase::Failed;
                        return HomingTickResult::Failed {
                            reason: AlarmCode::HomingFailApproach,
                        };
                    }
                }
                if any_active && all_triggered {
                    self.phase = HomingPhase::FinalPullOff;
                    for axis in 0..N_AXIS {
                        if self.axis_mask.bits() & (1 << axis) != 0 {
                            self.remaining[axis] = self.pull_off;
                        }
                    }
                    return HomingTickResult::PhaseComplete;
                }
                HomingTickResult::InProgress
            }
            HomingPhase::FinalPullOff => {
                let mut done = true;
                for axis in 0..N_AXIS {
                    if self.axis_mask.bits() & (1 << axis) == 0 {
                        continue;
                    }
                    self.remaining[axis] -= step_mm;
                    if self.remaining[axis] > 0.0 {
                        done = false;
                    }
                }
                if done {
                    self.phase = HomingPhase::Complete;
                    return HomingTickResult::Success;
                }
                HomingTickResult::InProgress
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn starts_in_idle_phase() {
        let s = settings();
        let sup = HomingSupervisor::new(0b001, &s);
        assert_eq!(sup.phase(), HomingPhase::Idle);
    }

    #[test]
    fn full_cycle_reaches_success() {
        let s = settings();
        let mut sup = HomingSupervisor::new(0b001, &s);
        sup.start(&s);
        assert_eq!(sup.phase(), HomingPhase::Approach);

        // Drive until the limit switch trips on the approach phase.
        let triggered = DirectionBits::for_axis(0);
        let none = DirectionBits::empty();
        let mut result;
        loop {
            result = sup.tick(none, 1.0, false);
            if result == HomingTickResult::InProgress {
                continue;
            }
            break;
        }
        assert_eq!(sup.tick(triggered, 0.0, false), HomingTickResult::PhaseComplete);
        assert_eq!(sup.phase(), HomingPhase::PullOff);

        loop {
            result = sup.tick(none, 1.0, false);
            if result == HomingTickResult::PhaseComplete {
                break;
            }
        }
        assert_eq!(sup.phase(), HomingPhase::Locate);

        loop {
            result = sup.tick(none, 0.1, false);
            if result == HomingTickResult::InProgress {
                continue;
            }
            break;
        }
        assert_eq!(sup.tick(triggered, 0.0, false), HomingTickResult::PhaseComplete);
        assert_eq!(sup.phase(), HomingPhase::FinalPullOff);

        loop {
            result = sup.tick(none, 1.0, false);
            if result == HomingTickResult::Success {
                break;
            }
        }
        assert_eq!(sup.phase(), HomingPhase::Complete);
    }

    #[test]
    fn abort_raises_homing_fail_reset_alarm() {
        let s = settings();
        let mut sup = HomingSupervisor::new(0b001, &s);
        sup.start(&s);
        let result = sup.tick(DirectionBits::empty(), 0.0, true);
        assert_eq!(
            result,
            HomingTickResult::Failed { reason: AlarmCode::HomingFailReset }
        );
        assert_eq!(sup.phase(), HomingPhase::Failed);
    }

    #[test]
    fn exhausting_search_travel_without_trigger_fails() {
        let mut s = settings();
        s.axes[0].max_travel = 1.0;
        let mut sup = HomingSupervisor::new(0b001, &s);
        sup.start(&s);
        let none = DirectionBits::empty();
        let mut result = HomingTickResult::InProgress;
        for _ in 0..10 {
            result = sup.tick(none, 1.0, false);
            if result != HomingTickResult::InProgress {
                break;
            }
        }
        assert_eq!(
            result,
            HomingTickResult::Failed { reason: AlarmCode::HomingFailApproach }
        );
    }
}
