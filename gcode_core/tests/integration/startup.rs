//! Settings defaults and a full homing cycle drive through the
//! executor's state machine the way controller startup does.

use gcode_common::motion::DirectionBits;
use gcode_common::settings::Settings;

use gcode_core::executor::{Executor, MachineEvent, TransitionResult};
use gcode_core::homing::{HomingSupervisor, HomingTickResult};

#[test]
fn default_settings_validate() {
    let settings = Settings::default();
    assert!(settings.validate().is_ok());
}

#[test]
fn homing_cycle_drives_executor_from_idle_to_idle() {
    let settings = Settings::default();
    let mut executor = Executor::new();
    assert_eq!(executor.handle_event(MachineEvent::HomingStart), TransitionResult::Ok(gcode_core::executor::MachineState::Homing));

    let mut homing = HomingSupervisor::new(DirectionBits::X.bits(), &settings);
    homing.start(&settings);

    let mut result = HomingTickResult::InProgress;
    for _ in 0..10_000 {
        result = homing.tick(DirectionBits::empty(), 1.0, false);
        if !matches!(result, HomingTickResult::InProgress) {
            if result == HomingTickResult::PhaseComplete {
                continue;
            }
            break;
        }
    }

    match result {
        HomingTickResult::Success => {
            assert_eq!(
                executor.handle_event(MachineEvent::HomingComplete),
                TransitionResult::Ok(gcode_core::executor::MachineState::Idle)
            );
        }
        HomingTickResult::Failed { .. } => {
            assert_eq!(
                executor.handle_event(MachineEvent::HomingFailed),
                TransitionResult::Ok(gcode_core::executor::MachineState::Alarm)
            );
        }
        other => panic!("homing cycle did not converge: {other:?}"),
    }
}
