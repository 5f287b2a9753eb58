//! Simulation backend: one concrete type implementing every collaborator
//! trait `gcode_core` depends on (§6 "collaborator trait contracts"),
//! standing in for real stepper/limit/probe/spindle/coolant/NVRAM
//! hardware.

use gcode_common::consts::N_AXIS;
use gcode_common::hal::{
    ByteTransport, CoolantOutput, Crc8, HalError, LimitInput, NvramBackend, ProbeInput,
    SpindleOutput, StepOutput,
};
use std::collections::VecDeque;

/// CRC-8-CCITT (poly 0x07, init 0x00), the same checksum GRBL-family
/// firmware uses for its EEPROM/NVRAM records.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimCrc8;

impl Crc8 for SimCrc8 {
    fn crc8(&self, bytes: &[u8]) -> u8 {
        let mut crc = 0u8;
        for &byte in bytes {
            crc ^= byte;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
            }
        }
        crc
    }
}

/// Simulated limit-switch positions: an axis trips its bit once
/// `position` crosses `limit_position` in the approach direction.
#[derive(Debug, Clone, Copy)]
pub struct SimLimitSwitch {
    pub limit_position: f32,
    pub negative_direction: bool,
}

/// One simulated machine: tracks axis position/direction/step lines,
/// a limit-switch bank, a probe contact position, spindle/coolant
/// state, a byte-addressable NVRAM blob, and a loopback byte transport.
pub struct SimulatedMachine {
    pub step_lines: [bool; N_AXIS],
    pub direction_reversed: [bool; N_AXIS],
    pub enabled: [bool; N_AXIS],
    pub position_steps: [i64; N_AXIS],
    pub limit_switches: [Option<SimLimitSwitch>; N_AXIS],
    pub probe_contact_position: Option<f32>,
    pub steps_per_mm: [f32; N_AXIS],
    pub spindle_rpm: f32,
    pub spindle_cw: bool,
    pub flood: bool,
    pub mist: bool,
    nvram: Vec<u8>,
    rx_queue: VecDeque<u8>,
    tx_log: Vec<u8>,
}

impl SimulatedMachine {
    pub fn new(steps_per_mm: [f32; N_AXIS]) -> Self {
        Self {
            step_lines: [false; N_AXIS],
            direction_reversed: [false; N_AXIS],
            enabled: [false; N_AXIS],
            position_steps: [0; N_AXIS],
            limit_switches: [None; N_AXIS],
            probe_contact_position: None,
            steps_per_mm,
            spindle_rpm: 0.0,
            spindle_cw: false,
            flood: false,
            mist: false,
            nvram: vec![0u8; 8192],
            rx_queue: VecDeque::new(),
            tx_log: Vec::new(),
        }
    }

    /// Position of axis `axis` in millimeters, derived from its step
    /// count and configured resolution.
    pub fn position_mm(&self, axis: usize) -> f32 {
        self.position_steps[axis] as f32 / self.steps_per_mm[axis].max(f32::EPSILON)
    }

    /// Feed a byte into the machine's receive queue, as if it arrived
    /// over a serial/TCP line (outside this crate's scope; a test hook).
    pub fn feed_rx_byte(&mut self, byte: u8) {
        self.rx_queue.push_back(byte);
    }

    pub fn tx_log(&self) -> &[u8] {
        &self.tx_log
    }
}

impl StepOutput for SimulatedMachine {
    fn set_step(&mut self, axis: usize, on: bool) {
        let was_off = !self.step_lines[axis];
        self.step_lines[axis] = on;
        if on && was_off {
            if self.direction_reversed[axis] {
                self.position_steps[axis] -= 1;
            } else {
                self.position_steps[axis] += 1;
            }
        }
    }

    fn set_direction(&mut self, axis: usize, reverse: bool) {
        self.direction_reversed[axis] = reverse;
    }

    fn set_enable(&mut self, axis: usize, on: bool) {
        self.enabled[axis] = on;
    }
}

impl LimitInput for SimulatedMachine {
    fn read_bank(&self) -> u8 {
        let mut bank = 0u8;
        for axis in 0..N_AXIS {
            if let Some(sw) = self.limit_switches[axis] {
                let pos = self.position_mm(axis);
                let tripped = if sw.negative_direction {
                    pos <= sw.limit_position
                } else {
                    pos >= sw.limit_position
                };
                if tripped {
                    bank |= 1 << axis;
                }
            }
        }
        bank
    }
}

impl ProbeInput for SimulatedMachine {
    fn is_triggered(&self) -> bool {
        match self.probe_contact_position {
            Some(contact) => self.position_mm(2) <= contact,
            None => false,
        }
    }
}

impl SpindleOutput for SimulatedMachine {
    fn set_speed(&mut self, rpm: f32) {
        self.spindle_rpm = rpm;
    }
    fn set_direction_cw(&mut self, cw: bool) {
        self.spindle_cw = cw;
    }
    fn stop(&mut self) {
        self.spindle_rpm = 0.0;
    }
}

impl CoolantOutput for SimulatedMachine {
    fn set_flood(&mut self, on: bool) {
        self.flood = on;
    }
    fn set_mist(&mut self, on: bool) {
        self.mist = on;
    }
}

impl NvramBackend for SimulatedMachine {
    fn load_record(&self, offset: usize, len: usize) -> Result<Vec<u8>, HalError> {
        if offset + len > self.nvram.len() {
            return Err(HalError::NvramError(format!(
                "read out of range: offset={offset} len={len} capacity={}",
                self.nvram.len()
            )));
        }
        Ok(self.nvram[offset..offset + len].to_vec())
    }

    fn store_record(&mut self, offset: usize, bytes: &[u8]) -> Result<(), HalError> {
        if offset + bytes.len() > self.nvram.len() {
            return Err(HalError::NvramError(format!(
                "write out of range: offset={offset} len={} capacity={}",
                bytes.len(),
                self.nvram.len()
            )));
        }
        self.nvram[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl ByteTransport for SimulatedMachine {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx_queue.pop_front()
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.tx_log.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc8_is_deterministic_and_nonzero_for_nonzero_input() {
        let crc = SimCrc8;
        let a = crc.crc8(b"hello");
        let b = crc.crc8(b"hello");
        assert_eq!(a, b);
        assert_ne!(crc.crc8(b"hello"), crc.crc8(b"world"));
    }

    #[test]
    fn stepping_advances_position_by_direction() {
        let mut machine = SimulatedMachine::new([100.0; N_AXIS]);
        machine.set_direction(0, false);
        machine.set_step(0, true);
        machine.set_step(0, false);
        machine.set_step(0, true);
        assert_eq!(machine.position_steps[0], 2);
        assert!((machine.position_mm(0) - 0.02).abs() < 1e-6);
    }

    #[test]
    fn limit_switch_trips_when_position_crosses_threshold() {
        let mut machine = SimulatedMachine::new([100.0; N_AXIS]);
        machine.limit_switches[0] = Some(SimLimitSwitch { limit_position: 0.01, negative_direction: false });
        assert_eq!(machine.read_bank(), 0);
        machine.set_step(0, true);
        machine.set_step(0, false);
        assert_eq!(machine.read_bank(), 1);
    }

    #[test]
    fn nvram_round_trips_within_capacity() {
        let mut machine = SimulatedMachine::new([100.0; N_AXIS]);
        machine.store_record(10, &[1, 2, 3]).unwrap();
        assert_eq!(machine.load_record(10, 3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn nvram_rejects_out_of_range_access() {
        let machine = SimulatedMachine::new([100.0; N_AXIS]);
        assert!(machine.load_record(9000, 10).is_err());
    }

    #[test]
    fn probe_triggers_on_z_contact() {
        let mut machine = SimulatedMachine::new([100.0; N_AXIS]);
        machine.probe_contact_position = Some(-1.0);
        assert!(!machine.is_triggered());
        machine.set_direction(2, true);
        for _ in 0..150 {
            machine.set_step(2, true);
            machine.set_step(2, false);
        }
        assert!(machine.is_triggered());
    }

    #[test]
    fn byte_transport_loopback_via_feed_rx_byte() {
        let mut machine = SimulatedMachine::new([100.0; N_AXIS]);
        machine.feed_rx_byte(b'?');
        assert_eq!(machine.read_byte(), Some(b'?'));
        assert_eq!(machine.read_byte(), None);
        machine.write_bytes(b"ok\r\n");
        assert_eq!(machine.tx_log(), b"ok\r\n");
    }
}
