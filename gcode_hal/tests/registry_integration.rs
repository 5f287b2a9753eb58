//! Integration tests exercising the registry and simulated machine
//! together across the crate boundary, the way a HAL consumer would.

use gcode_common::consts::N_AXIS;
use gcode_common::hal::{LimitInput, NvramBackend, StepOutput};
use gcode_hal::{DriverRegistry, SimLimitSwitch};

#[test]
fn default_machine_steps_and_trips_a_limit_switch() {
    let registry = DriverRegistry::default();
    let mut machine = registry.create_machine("default").expect("default machine");

    machine.limit_switches[0] = Some(SimLimitSwitch { limit_position: 1.0, negative_direction: false });
    machine.set_direction(0, false);
    for _ in 0..300 {
        machine.set_step(0, true);
        machine.set_step(0, false);
    }

    assert!(machine.position_mm(0) >= 1.0);
    assert_eq!(machine.read_bank() & 1, 1);
}

#[test]
fn unregistered_machine_name_is_an_error() {
    let registry = DriverRegistry::default();
    assert!(registry.create_machine("no-such-machine").is_err());
}

#[test]
fn nvram_persists_across_load_store() {
    let registry = DriverRegistry::default();
    let mut machine = registry.create_machine("default").expect("default machine");
    let record: Vec<u8> = (0..N_AXIS as u8).collect();
    machine.store_record(0, &record).expect("store");
    assert_eq!(machine.load_record(0, record.len()).expect("load"), record);
}
