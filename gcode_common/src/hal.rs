//! External-collaborator trait contracts and their constants (§6).
//!
//! `gcode_core` depends only on the traits re-exported here, never on a
//! concrete driver; `gcode_hal::sim::SimulatedMachine` is the one
//! implementation this workspace ships.

pub mod consts;
pub mod driver;

pub use driver::{
    ByteTransport, CoolantOutput, Crc8, HalError, LimitInput, NvramBackend, ProbeInput,
    SpindleOutput, StepOutput,
};
