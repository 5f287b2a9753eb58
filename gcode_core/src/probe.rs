//! Probing cycle (G38.x), §4.7.
//!
//! A probe move is an ordinary motion block with the probe armed; the
//! stepper ISR snapshots machine position the instant the probe input
//! trips and raises a motion-cancel request, same as a feed hold but
//! triggered by contact rather than an operator.

use gcode_common::consts::N_AXIS;
use gcode_common::error::{AlarmCode, StatusCode};
use gcode_common::modal::MotionMode;

/// Probe arm/trigger state for the currently executing probe move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Inactive,
    Active,
    Triggered,
}

/// Outcome of a completed probe cycle, reported via `[PRB:...]` (§6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub position: [f32; N_AXIS],
    pub success: bool,
}

/// Supervises one G38.x probe move.
pub struct ProbeCycle {
    state: ProbeState,
    mode: MotionMode,
    latched_position: [f32; N_AXIS],
}

impl ProbeCycle {
    pub fn new() -> Self {
        Self {
            state: ProbeState::Inactive,
            mode: MotionMode::ProbeToward,
            latched_position: [0.0; N_AXIS],
        }
    }

    pub const fn state(&self) -> ProbeState {
        self.state
    }

    /// Arm the probe for `mode`; only the four probe motion modes are
    /// valid (§4.1 fractional G-code whitelist).
    pub fn arm(&mut self, mode: MotionMode) -> Result<(), StatusCode> {
        if !mode.is_probe() {
            return Err(StatusCode::GcodeUnsupportedCommand);
        }
        self.mode = mode;
        self.state = ProbeState::Active;
        Ok(())
    }

    /// Called once per fast-phase tick while `state == Active`.
    /// `triggered` reflects the raw `ProbeInput` reading this tick;
    /// `current_position` is the machine position at this tick.
    /// Returns `Some(true)` on contact (motion should be cancelled),
    /// `None` while still searching.
    pub fn tick(&mut self, triggered: bool, current_position: &[f32; N_AXIS]) -> Option<bool> {
        if self.state != ProbeState::Active {
            return None;
        }
        let wants_contact = matches!(self.mode, MotionMode::ProbeToward | MotionMode::ProbeTowardNoError);
        let edge = triggered == wants_contact;
        if edge {
            self.latched_position = *current_position;
            self.state = ProbeState::Triggered;
            return Some(true);
        }
        None
    }

    /// Finish the cycle once motion has fully stopped. `motion_completed`
    /// is true if the commanded travel ran out before contact. Whether
    /// the lack of contact is an error depends on the probe mode's
    /// "no-error" variants (G38.3/G38.5).
    pub fn finish(&mut self, motion_completed_without_contact: bool) -> Result<ProbeResult, AlarmCode> {
        let result = if self.state == ProbeState::Triggered {
            Ok(ProbeResult { position: self.latched_position, success: true })
        } else if motion_completed_without_contact {
            let tolerant = matches!(
                self.mode,
                MotionMode::ProbeTowardNoError | MotionMode::ProbeAwayNoError
            );
            if tolerant {
                Ok(ProbeResult { position: self.latched_position, success: false })
            } else {
                Err(AlarmCode::ProbeFailContact)
            }
        } else {
            Err(AlarmCode::ProbeFailInitial)
        };
        self.state = ProbeState::Inactive;
        result
    }
}

impl Default for ProbeCycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_rejects_non_probe_motion_mode() {
        let mut probe = ProbeCycle::new();
        assert!(probe.arm(MotionMode::Linear).is_err());
    }

    #[test]
    fn contact_latches_position_and_cancels_motion() {
        let mut probe = ProbeCycle::new();
        probe.arm(MotionMode::ProbeToward).unwrap();
        assert_eq!(probe.tick(false, &[0.0; N_AXIS]), None);
        let pos = [1.0, 2.0, 3.0, 0.0, 0.0];
        assert_eq!(probe.tick(true, &pos), Some(true));
        assert_eq!(probe.state(), ProbeState::Triggered);
        let result = probe.finish(false).unwrap();
        assert_eq!(result.position, pos);
        assert!(result.success);
    }

    #[test]
    fn no_contact_is_alarm_for_error_variant() {
        let mut probe = ProbeCycle::new();
        probe.arm(MotionMode::ProbeToward).unwrap();
        assert_eq!(probe.finish(true).unwrap_err(), AlarmCode::ProbeFailContact);
    }

    #[test]
    fn no_contact_is_tolerated_for_no_error_variant() {
        let mut probe = ProbeCycle::new();
        probe.arm(MotionMode::ProbeTowardNoError).unwrap();
        let result = probe.finish(true).unwrap();
        assert!(!result.success);
    }
}
