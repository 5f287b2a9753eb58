//! Per-block status codes and asynchronous alarm codes.
//!
//! Modeled as `#[repr(u8)]` enums with a `from_u8` round-trip, the same
//! convention the workspace uses for its other wire-visible state enums,
//! rather than as `bitflags` — these codes are mutually exclusive per
//! report, unlike the combinable [`crate::motion::Condition`] bitfield.

use serde::{Deserialize, Serialize};

/// Recoverable per-block error, reported to the sender as `error:<N>`.
///
/// Raised by the parser or interpreter while validating a single line;
/// no modal state has been mutated when one of these is returned, since
/// mutation is always the last phase of interpretation (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    ExpectedCommandLetter = 1,
    BadNumberFormat = 2,
    InvalidStatement = 3,
    NegativeValue = 4,
    HomingDisabled = 5,
    StepPulseTooShort = 6,
    SettingReadFail = 7,
    ProtectedSetting = 8,
    SystemGcLock = 9,
    SoftLimitError = 10,
    Overflow = 11,
    MaxStepRateExceeded = 12,
    CheckDoor = 13,
    LineLengthExceeded = 14,
    TravelExceeded = 15,
    InvalidJogCommand = 16,
    SettingDisabledLaser = 17,
    GcodeUnsupportedCommand = 20,
    GcodeModalGroupViolation = 21,
    GcodeUndefinedFeedRate = 22,
    GcodeCommandValueNotInteger = 23,
    GcodeAxisCommandConflict = 24,
    GcodeWordRepeated = 25,
    GcodeNoAxisWords = 26,
    GcodeInvalidLineNumber = 27,
    GcodeValueWordMissing = 28,
    GcodeUnsupportedCoordSys = 29,
    GcodeG53InvalidMotionMode = 30,
    GcodeAxisWordsExist = 31,
    GcodeNoAxisWordsInPlane = 32,
    GcodeInvalidTarget = 33,
    GcodeArcRadiusError = 34,
    GcodeNoOffsetsInPlane = 35,
    GcodeUnusedWords = 36,
    GcodeG43DynamicAxisError = 37,
    GcodeMaxValueExceeded = 38,
}

impl StatusCode {
    pub const fn from_u8(v: u8) -> Option<Self> {
        use StatusCode::*;
        Some(match v {
            1 => ExpectedCommandLetter,
            2 => BadNumberFormat,
            3 => InvalidStatement,
            4 => NegativeValue,
            5 => HomingDisabled,
            6 => StepPulseTooShort,
            7 => SettingReadFail,
            8 => ProtectedSetting,
            9 => SystemGcLock,
            10 => SoftLimitError,
            11 => Overflow,
            12 => MaxStepRateExceeded,
            13 => CheckDoor,
            14 => LineLengthExceeded,
            15 => TravelExceeded,
            16 => InvalidJogCommand,
            17 => SettingDisabledLaser,
            20 => GcodeUnsupportedCommand,
            21 => GcodeModalGroupViolation,
            22 => GcodeUndefinedFeedRate,
            23 => GcodeCommandValueNotInteger,
            24 => GcodeAxisCommandConflict,
            25 => GcodeWordRepeated,
            26 => GcodeNoAxisWords,
            27 => GcodeInvalidLineNumber,
            28 => GcodeValueWordMissing,
            29 => GcodeUnsupportedCoordSys,
            30 => GcodeG53InvalidMotionMode,
            31 => GcodeAxisWordsExist,
            32 => GcodeNoAxisWordsInPlane,
            33 => GcodeInvalidTarget,
            34 => GcodeArcRadiusError,
            35 => GcodeNoOffsetsInPlane,
            36 => GcodeUnusedWords,
            37 => GcodeG43DynamicAxisError,
            38 => GcodeMaxValueExceeded,
            _ => return None,
        })
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error:{}", *self as u8)
    }
}

impl std::error::Error for StatusCode {}

/// Asynchronous operational fault. Raising one forces a full `MC_Reset`
/// (steppers, spindle, coolant stopped) and a transition to `Alarm` (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AlarmCode {
    HardLimit = 1,
    SoftLimit = 2,
    AbortCycle = 3,
    ProbeFailInitial = 4,
    ProbeFailContact = 5,
    HomingFailReset = 6,
    HomingFailDoor = 7,
    HomingFailPulloff = 8,
    HomingFailApproach = 9,
}

impl AlarmCode {
    pub const fn from_u8(v: u8) -> Option<Self> {
        use AlarmCode::*;
        Some(match v {
            1 => HardLimit,
            2 => SoftLimit,
            3 => AbortCycle,
            4 => ProbeFailInitial,
            5 => ProbeFailContact,
            6 => HomingFailReset,
            7 => HomingFailDoor,
            8 => HomingFailPulloff,
            9 => HomingFailApproach,
            _ => return None,
        })
    }

    /// True for faults that imply the machine position may no longer be
    /// trustworthy, requiring homing before further motion (§7).
    pub const fn requires_rehoming(self) -> bool {
        matches!(
            self,
            AlarmCode::HardLimit
                | AlarmCode::HomingFailReset
                | AlarmCode::HomingFailDoor
                | AlarmCode::HomingFailPulloff
                | AlarmCode::HomingFailApproach
        )
    }
}

impl std::fmt::Display for AlarmCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ALARM:{}", *self as u8)
    }
}

impl std::error::Error for AlarmCode {}
