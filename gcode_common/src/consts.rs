//! System-wide constants for the G-code core workspace.
//!
//! Single source of truth for axis limits and default tuning values.
//! Imported by `gcode_core` and `gcode_hal` — no duplication permitted.

/// Maximum number of axes (X, Y, Z, A, B).
pub const N_AXIS: usize = 5;

/// Default system cycle time in microseconds (1 kHz = 1000 µs).
pub const CYCLE_TIME_US: u64 = 1000;

/// Minimum allowed cycle time [µs] for runtime config.
pub const CYCLE_TIME_US_MIN: u32 = 100;

/// Maximum allowed cycle time [µs] for runtime config.
pub const CYCLE_TIME_US_MAX: u32 = 10_000;

/// Default configuration directory path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gcode_core/config.toml";

/// Default NVRAM state file name.
pub const DEFAULT_STATE_FILE: &str = "gcode_core.nvram";

/// Minimum speed the planner will ever plan a junction or block entry at,
/// in mm/min (squared form is `MIN_JUNCTION_SPEED * MIN_JUNCTION_SPEED`).
pub const MIN_JUNCTION_SPEED: f32 = 0.0;

/// Minimum feed rate accepted by the interpreter, mm/min.
pub const MIN_FEED_RATE: f32 = 0.001;

/// Number of arc segments between exact trigonometric re-anchoring.
pub const N_ARC_CORRECTION: u32 = 12;

/// Cosine threshold above which a junction is treated as a straight
/// continuation (`max_junction_speed_sqr` clamped to `MIN_JUNCTION_SPEED^2`).
pub const JUNCTION_COS_STRAIGHT: f32 = 0.999_999;

/// Cosine threshold below which a junction is treated as a full reversal
/// (unbounded junction speed, limited only by block rates).
pub const JUNCTION_COS_REVERSAL: f32 = -0.999_999;

/// Scalar applied to `|max_travel|` for the homing seek phase.
pub const HOMING_AXIS_SEARCH_SCALAR: f32 = 1.5;

/// Scalar applied to `pull_off` for the homing locate phase.
pub const HOMING_AXIS_LOCATE_SCALAR: f32 = 5.0;

/// Planner ring buffer capacity. Power of two, per §4.3.
pub const BLOCK_BUFFER_SIZE: usize = 16;

/// Segment ring buffer capacity, per §4.4.
pub const SEGMENT_BUFFER_SIZE: usize = 6;

/// Number of AMASS resolution levels the segment generator may select
/// between to keep a 16-bit timer reload in range across the full rate span.
pub const AMASS_LEVELS: u8 = 4;

/// Number of persisted work coordinate system slots (G54..G59).
pub const N_COORDINATE_SYSTEMS: usize = 6;

/// Minimum tool table size, per §3.
pub const MIN_TOOL_TABLE_SIZE: usize = 20;

/// Default junction deviation, mm.
pub const DEFAULT_JUNCTION_DEVIATION: f32 = 0.01;

/// Default arc tolerance, mm.
pub const DEFAULT_ARC_TOLERANCE: f32 = 0.002;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(N_AXIS > 0 && N_AXIS <= 5);
        assert!(CYCLE_TIME_US > 0);
        assert!(CYCLE_TIME_US as u32 >= CYCLE_TIME_US_MIN);
        assert!(CYCLE_TIME_US as u32 <= CYCLE_TIME_US_MAX);
    }

    #[test]
    fn block_buffer_size_is_power_of_two() {
        assert!(BLOCK_BUFFER_SIZE.is_power_of_two());
        assert!(BLOCK_BUFFER_SIZE >= 16);
    }

    #[test]
    fn junction_cosine_thresholds_bracket_zero() {
        assert!(JUNCTION_COS_STRAIGHT > 0.0);
        assert!(JUNCTION_COS_REVERSAL < 0.0);
        assert!((JUNCTION_COS_STRAIGHT + JUNCTION_COS_REVERSAL).abs() < 1e-5);
    }
}
