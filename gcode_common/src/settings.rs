//! The persisted machine `Settings` record, tool table, and coordinate
//! system slots (§3 "Settings record").
//!
//! These are plain data: loading/validating/hot-reloading them against an
//! [`crate::hal::NvramBackend`] collaborator is `gcode_core::config`'s job.
//! CRC protection of the serialized bytes is likewise a collaborator
//! concern (`gcode_common::hal::Crc8`), never computed here.

use crate::consts::{MIN_TOOL_TABLE_SIZE, N_AXIS, N_COORDINATE_SYSTEMS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("axis {axis}: {field} must be positive, got {value}")]
    NonPositive {
        axis: usize,
        field: &'static str,
        value: String,
    },
    #[error("spindle_rpm_min ({min}) must not exceed spindle_rpm_max ({max})")]
    SpindleRangeInverted { min: f32, max: f32 },
    #[error("junction_deviation must be positive, got {0}")]
    InvalidJunctionDeviation(f32),
    #[error("arc_tolerance must be positive, got {0}")]
    InvalidArcTolerance(f32),
    #[error("homing_pulloff must be positive, got {0}")]
    InvalidPulloff(f32),
}

/// Per-axis kinematic and input-wiring parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSettings {
    pub steps_per_mm: f32,
    pub max_rate: f32,
    pub acceleration: f32,
    pub max_travel: f32,
    /// Backlash compensation distance, mm (§4.3 "Backlash compensation").
    pub backlash: f32,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            steps_per_mm: 250.0,
            max_rate: 500.0,
            acceleration: 10.0,
            max_travel: 200.0,
            backlash: 0.0,
        }
    }
}

/// Feature toggles that change interpreter/executor behavior (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub homing_enabled: bool,
    /// Soft limits require homing to have completed at least once.
    pub soft_limits_enabled: bool,
    pub hard_limits_enabled: bool,
    /// Limit switches shared between directions on an axis (§4.7).
    pub homing_single_axis_commands: bool,
    /// Door/safety-input honored as a feed hold source.
    pub safety_door_enabled: bool,
    /// M7 (mist) permitted; GRBL gates this behind a laser/mist build flag.
    pub mist_coolant_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            homing_enabled: true,
            soft_limits_enabled: false,
            hard_limits_enabled: true,
            homing_single_axis_commands: false,
            safety_door_enabled: false,
            mist_coolant_enabled: true,
        }
    }
}

/// Tool-change handling mode (§9 supplement, `M56`/`$TC`-style selection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum ToolChangeMode {
    /// No tool change support; `T`/`M6` are parsed but no-ops.
    #[default]
    Disabled = 0,
    /// Pause and wait for the operator to swap the tool manually.
    ManualPause = 1,
    /// Probe the new tool length against a fixed sensor position.
    ProbeAtFixedPosition = 2,
}

/// The full persisted machine settings record (§3 "Settings record").
///
/// One instance lives in `gcode_core`'s runtime state; `gcode_core::config`
/// is responsible for loading it from NVRAM/TOML, validating it with
/// [`Settings::validate`], and performing hot-reload swaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub axes: [AxisSettings; N_AXIS],
    /// Bitmask, bit `i` set means axis `i`'s step output is inverted.
    pub step_invert_mask: u8,
    /// Bitmask, bit `i` set means axis `i`'s direction output is inverted.
    pub direction_invert_mask: u8,
    /// Bitmask, bit `i` set means axis `i`'s limit input is inverted.
    pub limit_invert_mask: u8,
    /// Minimum step pulse width, microseconds.
    pub step_pulse_microseconds: f32,
    /// Delay between direction-pin settle and first step pulse, microseconds.
    pub step_idle_delay_ms: u16,
    pub spindle_rpm_min: f32,
    pub spindle_rpm_max: f32,
    /// Which axes participate in the homing cycle and in what mask order
    /// (§4.6 "Homing cycle"); bit `i` set means axis `i` homes.
    pub homing_cycle_mask: [u8; N_AXIS],
    pub homing_seek_rate: f32,
    pub homing_feed_rate: f32,
    pub homing_pulloff: f32,
    pub homing_debounce_ms: u16,
    pub junction_deviation: f32,
    pub arc_tolerance: f32,
    /// Fixed machine-frame position of the tool-length touch-off sensor,
    /// used by `ToolChangeMode::ProbeAtFixedPosition` (§9 supplement).
    pub tool_length_sensor_position: [f32; N_AXIS],
    pub features: FeatureFlags,
    pub tool_change_mode: ToolChangeMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            axes: [AxisSettings::default(); N_AXIS],
            step_invert_mask: 0,
            direction_invert_mask: 0,
            limit_invert_mask: 0,
            step_pulse_microseconds: 10.0,
            step_idle_delay_ms: 25,
            spindle_rpm_min: 0.0,
            spindle_rpm_max: 1000.0,
            homing_cycle_mask: [0b100, 0b011, 0, 0, 0],
            homing_seek_rate: 500.0,
            homing_feed_rate: 25.0,
            homing_pulloff: 1.0,
            homing_debounce_ms: 250,
            junction_deviation: crate::consts::DEFAULT_JUNCTION_DEVIATION,
            arc_tolerance: crate::consts::DEFAULT_ARC_TOLERANCE,
            tool_length_sensor_position: [0.0; N_AXIS],
            features: FeatureFlags::default(),
            tool_change_mode: ToolChangeMode::default(),
        }
    }
}

impl Settings {
    /// Validates the record per §3's invariants. Called by
    /// `gcode_core::config` before committing a loaded or hot-reloaded
    /// settings record to the runtime.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (i, axis) in self.axes.iter().enumerate() {
            if axis.steps_per_mm <= 0.0 {
                return Err(SettingsError::NonPositive {
                    axis: i,
                    field: "steps_per_mm",
                    value: axis.steps_per_mm.to_string(),
                });
            }
            if axis.max_rate <= 0.0 {
                return Err(SettingsError::NonPositive {
                    axis: i,
                    field: "max_rate",
                    value: axis.max_rate.to_string(),
                });
            }
            if axis.acceleration <= 0.0 {
                return Err(SettingsError::NonPositive {
                    axis: i,
                    field: "acceleration",
                    value: axis.acceleration.to_string(),
                });
            }
            if axis.backlash < 0.0 {
                return Err(SettingsError::NonPositive {
                    axis: i,
                    field: "backlash",
                    value: axis.backlash.to_string(),
                });
            }
        }
        if self.spindle_rpm_min > self.spindle_rpm_max {
            return Err(SettingsError::SpindleRangeInverted {
                min: self.spindle_rpm_min,
                max: self.spindle_rpm_max,
            });
        }
        if self.junction_deviation <= 0.0 {
            return Err(SettingsError::InvalidJunctionDeviation(
                self.junction_deviation,
            ));
        }
        if self.arc_tolerance <= 0.0 {
            return Err(SettingsError::InvalidArcTolerance(self.arc_tolerance));
        }
        if self.homing_pulloff <= 0.0 {
            return Err(SettingsError::InvalidPulloff(self.homing_pulloff));
        }
        Ok(())
    }
}

/// One tool's length/radius offsets, persisted in the tool table (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolEntry {
    pub x_offset: f32,
    pub y_offset: f32,
    pub z_offset: f32,
    pub reserved: f32,
}

/// Fixed-capacity tool table, indexed by tool number (§3: "at least 20
/// entries"). Entry 0 is the no-tool/default-offset slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolTable {
    entries: Vec<ToolEntry>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self {
            entries: vec![ToolEntry::default(); MIN_TOOL_TABLE_SIZE],
        }
    }

    pub fn get(&self, tool: u8) -> Option<&ToolEntry> {
        self.entries.get(tool as usize)
    }

    pub fn set(&mut self, tool: u8, entry: ToolEntry) -> bool {
        match self.entries.get_mut(tool as usize) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ToolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The seven persisted coordinate-system offset slots: G54..G59 plus the
/// combined G28/G30 predefined position pair (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystems {
    /// Work coordinate system offsets, indexed by [`crate::modal::CoordinateSystem`].
    pub work: [[f32; N_AXIS]; N_COORDINATE_SYSTEMS],
    pub g28_position: [f32; N_AXIS],
    pub g30_position: [f32; N_AXIS],
    /// G92 non-persistent coordinate offset, applied on top of the active WCS.
    pub g92_offset: [f32; N_AXIS],
}

impl Default for CoordinateSystems {
    fn default() -> Self {
        Self {
            work: [[0.0; N_AXIS]; N_COORDINATE_SYSTEMS],
            g28_position: [0.0; N_AXIS],
            g30_position: [0.0; N_AXIS],
            g92_offset: [0.0; N_AXIS],
        }
    }
}

impl CoordinateSystems {
    /// Clears the G92 offset on every axis (§9: "G49 clears both static and
    /// dynamic tool offsets on all axes" resolves the analogous G92.1
    /// behavior the same way).
    pub fn clear_g92(&mut self) {
        self.g92_offset = [0.0; N_AXIS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_steps_per_mm_is_rejected() {
        let mut s = Settings::default();
        s.axes[0].steps_per_mm = 0.0;
        assert!(matches!(
            s.validate(),
            Err(SettingsError::NonPositive { axis: 0, .. })
        ));
    }

    #[test]
    fn inverted_spindle_range_is_rejected() {
        let mut s = Settings::default();
        s.spindle_rpm_min = 500.0;
        s.spindle_rpm_max = 100.0;
        assert!(matches!(
            s.validate(),
            Err(SettingsError::SpindleRangeInverted { .. })
        ));
    }

    #[test]
    fn tool_table_has_minimum_size_and_round_trips() {
        let mut table = ToolTable::new();
        assert!(table.len() >= MIN_TOOL_TABLE_SIZE);
        let entry = ToolEntry {
            z_offset: 12.5,
            ..Default::default()
        };
        assert!(table.set(3, entry));
        assert_eq!(table.get(3).unwrap().z_offset, 12.5);
        assert!(!table.set(200, entry));
    }

    #[test]
    fn clear_g92_zeroes_all_axes() {
        let mut cs = CoordinateSystems::default();
        cs.g92_offset = [1.0, 2.0, 3.0, 4.0, 5.0];
        cs.clear_g92();
        assert_eq!(cs.g92_offset, [0.0; N_AXIS]);
    }
}
