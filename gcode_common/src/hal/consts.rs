//! Constants shared by `gcode_core` and its HAL collaborators.

/// Canonical driver-registry service name (used for logging).
pub const HAL_SERVICE_NAME: &str = "gcode_hal";

/// NVRAM record offset for the persisted [`crate::settings::Settings`] blob.
pub const NVRAM_SETTINGS_OFFSET: usize = 0;

/// Maximum serialized length reserved for the settings record, CRC byte
/// excluded. The record is serialized as TOML text and padded with NUL
/// bytes to this length; `gcode_core::config` trims trailing NULs on load.
pub const SETTINGS_RECORD_LEN: usize = 1024;

/// NVRAM record offset for the startup-line block (§9 supplement).
pub const NVRAM_STARTUP_LINES_OFFSET: usize = 1024;

/// NVRAM record offset for the persisted [`crate::settings::CoordinateSystems`].
pub const NVRAM_COORDINATES_OFFSET: usize = 2048;

/// Number of bytes reserved for each startup line, including its CRC byte.
pub const STARTUP_LINE_LEN: usize = 80;

/// Number of startup lines persisted (`$N0`, `$N1`), per §9 supplement.
pub const N_STARTUP_LINE: usize = 2;
