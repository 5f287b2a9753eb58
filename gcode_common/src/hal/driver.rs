//! External-collaborator trait contracts (§6).
//!
//! Everything in this module is a *contract*: `gcode_core` talks to the
//! outside world only through these traits. Real UART/SPI/I²C/GPIO/TCP/CRC
//! backends are out of scope (§1); `gcode_hal::sim::SimulatedMachine` is the
//! only implementation built in this workspace.

use thiserror::Error;

/// Error type for HAL collaborator operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    #[error("driver initialization failed: {0}")]
    InitFailed(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("hardware communication error: {0}")]
    CommunicationError(String),

    #[error("driver not found: {0}")]
    DriverNotFound(String),

    #[error("nvram error: {0}")]
    NvramError(String),
}

/// Non-blocking byte transport for the line protocol (§6 "Line protocol").
/// Models the serial/TCP channel; framing, if any, is applied above this
/// trait by the collaborator, not by `gcode_core`.
pub trait ByteTransport: Send {
    /// Returns the next available byte, or `None` if none is buffered yet.
    fn read_byte(&mut self) -> Option<u8>;

    /// Queue bytes for transmission. Must not block.
    fn write_bytes(&mut self, bytes: &[u8]);
}

/// CRC-8 computation, provided by the collaborator (§1: "CRC-8/16/32
/// routines" are out of scope for `gcode_core` to implement).
pub trait Crc8 {
    fn crc8(&self, bytes: &[u8]) -> u8;
}

/// NVRAM byte I/O contract (§6 "NVRAM layout"). `gcode_core` only ever
/// reads/writes whole records at a known offset; CRC validation of the
/// returned bytes is performed by the caller using a [`Crc8`] instance the
/// same backend usually also provides.
pub trait NvramBackend: Send {
    /// # Errors
    /// Returns [`HalError::NvramError`] if the offset/length is out of the
    /// backend's addressable range or the underlying read fails.
    fn load_record(&self, offset: usize, len: usize) -> Result<Vec<u8>, HalError>;

    /// # Errors
    /// Returns [`HalError::NvramError`] if the write fails.
    fn store_record(&mut self, offset: usize, bytes: &[u8]) -> Result<(), HalError>;
}

/// Step/direction/enable output contract (§4.5, §6). Mutated only by the
/// stepper, never by the foreground directly.
pub trait StepOutput: Send {
    fn set_step(&mut self, axis: usize, asserted: bool);
    fn set_direction(&mut self, axis: usize, negative: bool);
    fn set_enable(&mut self, axis: usize, enabled: bool);
}

/// Debounced-by-caller limit switch input bank (§4.7). `read_bank` returns
/// one bit per axis; debounce happens in `gcode_core`'s 1 ms tick, not here.
pub trait LimitInput: Send {
    fn read_bank(&self) -> u8;
}

/// Probe input contract (§4.7 "Probing").
pub trait ProbeInput: Send {
    fn is_triggered(&self) -> bool;
}

/// Spindle PWM duty + direction contract.
pub trait SpindleOutput: Send {
    fn set_speed(&mut self, rpm: f32);
    fn set_direction_cw(&mut self, cw: bool);
    fn stop(&mut self);
}

/// Flood/mist coolant on-off contract.
pub trait CoolantOutput: Send {
    fn set_flood(&mut self, on: bool);
    fn set_mist(&mut self, on: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTransport;
    impl ByteTransport for NullTransport {
        fn read_byte(&mut self) -> Option<u8> {
            None
        }
        fn write_bytes(&mut self, _bytes: &[u8]) {}
    }

    #[test]
    fn null_transport_never_yields_a_byte() {
        let mut t = NullTransport;
        assert_eq!(t.read_byte(), None);
    }

    #[test]
    fn hal_error_display() {
        let e = HalError::DriverNotFound("simulation".into());
        assert!(e.to_string().contains("simulation"));
    }
}
