//! # gcode_hal
//!
//! Simulation backend and driver registry for `gcode_core`'s external
//! collaborator contracts (§6). Real stepper/limit/probe/spindle/coolant
//! hardware, serial/TCP transport, and CRC routines are out of this
//! workspace's scope; this crate's `SimulatedMachine` is the only
//! implementation built here, standing in for all of them in tests and
//! the demo binary.
//!
//! # Module Structure
//!
//! - [`sim`] — `SimulatedMachine`, implementing every `gcode_common::hal`
//!   collaborator trait plus CRC-8.
//! - [`driver_registry`] — named-configuration registry.

pub mod driver_registry;
pub mod sim;

pub use crate::driver_registry::DriverRegistry;
pub use crate::sim::{SimCrc8, SimLimitSwitch, SimulatedMachine};
