//! Prelude module for common re-exports.
//!
//! ```rust
//! use gcode_common::prelude::*;
//! ```

// ─── Logging & configuration ───────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── System constants ───────────────────────────────────────────────
pub use crate::consts::{
    AMASS_LEVELS, BLOCK_BUFFER_SIZE, CYCLE_TIME_US, N_AXIS, N_COORDINATE_SYSTEMS,
    SEGMENT_BUFFER_SIZE,
};

// ─── Error/alarm codes ──────────────────────────────────────────────
pub use crate::error::{AlarmCode, StatusCode};

// ─── Modal state ────────────────────────────────────────────────────
pub use crate::modal::{
    ArcDistanceMode, CoolantMode, CoordinateSystem, DistanceMode, FeedRateMode, MotionMode,
    ParserState, Plane, ProgramFlow, SpindleMode, Units,
};

// ─── Motion/planner entities ────────────────────────────────────────
pub use crate::motion::{Condition, DirectionBits, MotionBlock};

// ─── Settings ───────────────────────────────────────────────────────
pub use crate::settings::{CoordinateSystems, Settings, ToolTable};

// ─── HAL collaborator contracts ─────────────────────────────────────
pub use crate::hal::{
    ByteTransport, CoolantOutput, Crc8, HalError, LimitInput, NvramBackend, ProbeInput,
    SpindleOutput, StepOutput,
};
