//! Shared types for the G-code core workspace.
//!
//! This crate provides the constants, modal-state types, error codes, and
//! external-collaborator trait contracts used by both `gcode_core` and
//! `gcode_hal`. It carries no parsing or motion logic of its own.
//!
//! # Module Structure
//!
//! - [`consts`] - system-wide constants (axis count, buffer sizes, tuning defaults)
//! - [`config`] - generic TOML configuration loading traits and types
//! - [`error`] - `StatusCode` and `AlarmCode`
//! - [`modal`] - modal-group enums and `ParserState`
//! - [`motion`] - `MotionBlock`, `Condition`, `DirectionBits`
//! - [`settings`] - the persisted `Settings` record, `ToolTable`, `CoordinateSystems`
//! - [`hal`] - external-collaborator trait contracts
//! - [`prelude`] - common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use gcode_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod error;
pub mod hal;
pub mod modal;
pub mod motion;
pub mod prelude;
pub mod settings;
