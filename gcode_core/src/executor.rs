//! Real-time executor / master state machine (§4.6).
//!
//! A transition-table style global machine lifecycle (`handle_event`
//! matching `(state, event)` tuples, returning `TransitionResult::Ok`/
//! `Rejected`), generalized to the twelve machine states this
//! controller needs and to the cross-ISR flag variables described in
//! §4.6/§5.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Top-level machine state (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Idle,
    Cycle,
    Hold,
    Jog,
    Homing,
    Alarm,
    CheckMode,
    SafetyDoor,
    Sleep,
    FeedDwell,
    ToolChange,
    Busy,
}

/// Event delivered to the executor, mirroring `sys_rt_exec_state` bits
/// and program-level requests (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
    Reset,
    HardReset,
    HardLimit,
    SoftLimitDuringCycle,
    FeedHold,
    SafetyDoor,
    CycleStart,
    MotionCancel,
    Sleep,
    JogStart,
    JogCancel,
    HomingStart,
    HomingComplete,
    HomingFailed,
    ToolChangeStart,
    ToolChangeComplete,
    DwellComplete,
    CheckModeToggle,
}

/// Result of a [`Executor::handle_event`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    Ok(MachineState),
    Rejected(&'static str),
}

/// Three sub-states of a spindle-stop override requested during Hold
/// (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpindleStopOverride {
    #[default]
    Disabled,
    Initiate,
    Restore,
}

/// Accessory/motion override percentage, clamped to `[MIN, MAX]` and
/// stepped by coarse/fine increments (§4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverridePercent {
    pub value: u8,
    pub min: u8,
    pub max: u8,
    pub coarse_step: u8,
    pub fine_step: u8,
}

impl OverridePercent {
    pub fn new(default: u8, min: u8, max: u8, coarse_step: u8, fine_step: u8) -> Self {
        Self { value: default, min, max, coarse_step, fine_step }
    }

    pub fn reset(&mut self, default: u8) {
        self.value = default.clamp(self.min, self.max);
    }

    /// Jump directly to a discrete value (e.g. the rapid override's
    /// medium/low presets, which don't fit the coarse/fine delta scheme).
    pub fn set(&mut self, value: u8) {
        self.value = value.clamp(self.min, self.max);
    }

    pub fn adjust(&mut self, delta: i16) {
        let new_value = (self.value as i16 + delta).clamp(self.min as i16, self.max as i16);
        self.value = new_value as u8;
    }

    pub fn coarse_plus(&mut self) {
        self.adjust(self.coarse_step as i16);
    }
    pub fn coarse_minus(&mut self) {
        self.adjust(-(self.coarse_step as i16));
    }
    pub fn fine_plus(&mut self) {
        self.adjust(self.fine_step as i16);
    }
    pub fn fine_minus(&mut self) {
        self.adjust(-(self.fine_step as i16));
    }
}

/// Cross-ISR flag variables (§5: "single short critical section,
/// AcqRel-writer / Acquire-reader, no double-read debounce" — resolved
/// open question).
#[derive(Debug, Default)]
pub struct RealtimeFlags {
    exec_state: AtomicU8,
    exec_alarm: AtomicU8,
    override_requests: AtomicU32,
}

impl RealtimeFlags {
    pub fn set_exec_state(&self, bits: u8) {
        self.exec_state.fetch_or(bits, Ordering::AcqRel);
    }
    pub fn take_exec_state(&self) -> u8 {
        self.exec_state.swap(0, Ordering::AcqRel)
    }
    pub fn set_alarm(&self, code: u8) {
        self.exec_alarm.store(code, Ordering::AcqRel);
    }
    pub fn read_alarm(&self) -> u8 {
        self.exec_alarm.load(Ordering::Acquire)
    }
    pub fn request_override(&self, bit: u32) {
        self.override_requests.fetch_or(bit, Ordering::AcqRel);
    }
    pub fn take_override_requests(&self) -> u32 {
        self.override_requests.swap(0, Ordering::AcqRel)
    }
}

/// Master executor state machine (§4.6).
pub struct Executor {
    state: MachineState,
    pub feed_override: OverridePercent,
    pub rapid_override: OverridePercent,
    pub spindle_override: OverridePercent,
    pub spindle_stop_override: SpindleStopOverride,
    pub flags: RealtimeFlags,
    in_motion: bool,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            state: MachineState::Idle,
            feed_override: OverridePercent::new(100, 10, 200, 10, 1),
            rapid_override: OverridePercent::new(100, 25, 100, 25, 0),
            spindle_override: OverridePercent::new(100, 10, 200, 10, 1),
            spindle_stop_override: SpindleStopOverride::default(),
            flags: RealtimeFlags::default(),
            in_motion: false,
        }
    }

    pub const fn state(&self) -> MachineState {
        self.state
    }

    pub fn set_in_motion(&mut self, in_motion: bool) {
        self.in_motion = in_motion;
    }

    /// Attempt a transition given an event, per the §4.6 transition table.
    pub fn handle_event(&mut self, event: MachineEvent) -> TransitionResult {
        use MachineEvent::*;
        use MachineState::*;

        let next = match (self.state, event) {
            // EXEC_RESET: any state -> Idle, or Alarm (with ABORT_CYCLE) if
            // motion was in flight.
            (_, Reset) => {
                if self.in_motion {
                    self.in_motion = false;
                    Alarm
                } else {
                    Idle
                }
            }
            // A hard reset always lands in Idle or Alarm, never falls
            // through to another branch (§9 resolved open question).
            (_, HardReset) => {
                self.in_motion = false;
                Idle
            }

            (_, HardLimit) => Alarm,

            (Cycle, SoftLimitDuringCycle) => Hold,
            (Hold, SoftLimitDuringCycle) => Alarm,

            (Cycle, FeedHold) => Hold,
            (FeedDwell, FeedHold) => Hold,

            (_, SafetyDoor) if self.state != Alarm => SafetyDoor,

            (Idle, CycleStart) => Cycle,
            (Hold, CycleStart) => Cycle,
            (SafetyDoor, CycleStart) if !self.in_motion => Idle,

            (Cycle, MotionCancel) => Hold,
            (Hold, MotionCancel) => Idle,

            (_, Sleep) if self.state != Homing => Sleep,

            (Idle, JogStart) => Jog,
            (Jog, JogStart) => Jog,
            (Jog, JogCancel) => Hold,

            (Idle, HomingStart) => Homing,
            (Homing, HomingComplete) => Idle,
            (Homing, HomingFailed) => Alarm,

            (Idle, ToolChangeStart) => ToolChange,
            (ToolChange, ToolChangeComplete) => Idle,

            (FeedDwell, DwellComplete) => Cycle,

            (Idle, CheckModeToggle) => CheckMode,
            (CheckMode, CheckModeToggle) => Idle,

            _ => return TransitionResult::Rejected(invalid_transition_reason(self.state, event)),
        };

        self.state = next;
        TransitionResult::Ok(next)
    }

    pub fn force_alarm(&mut self) {
        self.state = MachineState::Alarm;
        self.in_motion = false;
    }

    pub const fn allows_motion(&self) -> bool {
        matches!(
            self.state,
            MachineState::Cycle | MachineState::Jog | MachineState::Homing
        )
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid_transition_reason(state: MachineState, event: MachineEvent) -> &'static str {
    use MachineState::*;
    match state {
        Alarm => "Alarm: only Reset/HardReset ($X) or HomingStart ($H) allowed",
        _ => {
            let _ = event;
            "event not valid for current state"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MachineEvent::*;
    use MachineState::*;

    #[test]
    fn initial_state_is_idle() {
        let exec = Executor::new();
        assert_eq!(exec.state(), Idle);
    }

    #[test]
    fn cycle_start_then_feed_hold_then_resume() {
        let mut exec = Executor::new();
        assert_eq!(exec.handle_event(CycleStart), TransitionResult::Ok(Cycle));
        assert_eq!(exec.handle_event(FeedHold), TransitionResult::Ok(Hold));
        assert_eq!(exec.handle_event(CycleStart), TransitionResult::Ok(Cycle));
    }

    #[test]
    fn hard_limit_forces_alarm_from_any_state() {
        let mut exec = Executor::new();
        exec.handle_event(CycleStart);
        assert_eq!(exec.handle_event(HardLimit), TransitionResult::Ok(Alarm));
    }

    #[test]
    fn reset_during_motion_lands_in_alarm() {
        let mut exec = Executor::new();
        exec.handle_event(CycleStart);
        exec.set_in_motion(true);
        assert_eq!(exec.handle_event(Reset), TransitionResult::Ok(Alarm));
    }

    #[test]
    fn reset_without_motion_lands_in_idle() {
        let mut exec = Executor::new();
        assert_eq!(exec.handle_event(Reset), TransitionResult::Ok(Idle));
    }

    #[test]
    fn jog_cancel_transitions_to_hold() {
        let mut exec = Executor::new();
        exec.handle_event(JogStart);
        assert_eq!(exec.handle_event(JogCancel), TransitionResult::Ok(Hold));
    }

    #[test]
    fn override_percent_clamps_to_bounds() {
        let mut ov = OverridePercent::new(100, 10, 200, 10, 1);
        for _ in 0..50 {
            ov.coarse_plus();
        }
        assert_eq!(ov.value, 200);
        for _ in 0..50 {
            ov.coarse_minus();
        }
        assert_eq!(ov.value, 10);
    }

    #[test]
    fn homing_failure_raises_alarm() {
        let mut exec = Executor::new();
        exec.handle_event(HomingStart);
        assert_eq!(exec.handle_event(HomingFailed), TransitionResult::Ok(Alarm));
    }

    #[test]
    fn realtime_flags_round_trip_across_acquire_release() {
        let flags = RealtimeFlags::default();
        flags.set_exec_state(0b0001);
        flags.set_exec_state(0b0010);
        assert_eq!(flags.take_exec_state(), 0b0011);
        assert_eq!(flags.take_exec_state(), 0);
    }
}
