//! Crate-level error aggregation.
//!
//! Each seam gets its own `thiserror` enum, and a thin top-level
//! `CoreError` wraps them for call sites that need to propagate across
//! seams (e.g. `main.rs`).

use gcode_common::error::StatusCode;
use gcode_common::hal::HalError;
use thiserror::Error;

pub use crate::config::ConfigError;

/// A recoverable per-block parse/interpret error, reported as `error:<N>`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct GcodeError(pub StatusCode);

impl From<StatusCode> for GcodeError {
    fn from(code: StatusCode) -> Self {
        Self(code)
    }
}

/// Planner-local errors. Distinct from [`GcodeError`] because a full
/// buffer is an operational condition, not a per-block parse failure —
/// it is retried by the caller rather than reported to the sender.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlannerError {
    #[error("planner ring buffer is full")]
    BufferFull,
    #[error("no block at the requested ring position")]
    EmptyBuffer,
}

/// Top-level error for call sites that cross seams (`main.rs`, the cycle
/// runner's setup path).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gcode(#[from] GcodeError),
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    Hal(#[from] HalError),
    #[error("real-time setup failed: {0}")]
    RtSetup(String),
}
