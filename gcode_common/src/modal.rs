//! Parser modal state: the enumerated modal groups a G-code block mutates
//! or is validated against (§3 "Parser modal state").
//!
//! Each modal group is a small `#[repr(u8)]` enum with a `from_u8` const-fn
//! round trip and a `Default`, following the same convention the workspace
//! uses for its other wire-visible state enums.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Motion modal group (G0/G1/G2/G3/G38.x/G73/G76/G80/G81../G33).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum MotionMode {
    #[default]
    Seek = 0, // G0
    Linear = 1,      // G1
    CwArc = 2,       // G2
    CcwArc = 3,      // G3
    ProbeToward = 4, // G38.2
    ProbeTowardNoError = 5, // G38.3
    ProbeAway = 6,   // G38.4
    ProbeAwayNoError = 7, // G38.5
    DrillCanned = 8, // G81
    DrillDwellCanned = 9, // G82
    DrillPeckCanned = 10, // G83
    ChipBreakCanned = 11, // G73
    Threading = 12, // G33/G76
    None = 13,      // G80
}

impl MotionMode {
    pub const fn from_u8(v: u8) -> Option<Self> {
        use MotionMode::*;
        Some(match v {
            0 => Seek,
            1 => Linear,
            2 => CwArc,
            3 => CcwArc,
            4 => ProbeToward,
            5 => ProbeTowardNoError,
            6 => ProbeAway,
            7 => ProbeAwayNoError,
            8 => DrillCanned,
            9 => DrillDwellCanned,
            10 => DrillPeckCanned,
            11 => ChipBreakCanned,
            12 => Threading,
            13 => None,
            _ => return Option::None,
        })
    }

    pub const fn is_canned_cycle(self) -> bool {
        matches!(
            self,
            MotionMode::DrillCanned
                | MotionMode::DrillDwellCanned
                | MotionMode::DrillPeckCanned
                | MotionMode::ChipBreakCanned
        )
    }

    pub const fn is_probe(self) -> bool {
        matches!(
            self,
            MotionMode::ProbeToward
                | MotionMode::ProbeTowardNoError
                | MotionMode::ProbeAway
                | MotionMode::ProbeAwayNoError
        )
    }
}

/// Plane select modal group (G17/G18/G19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Plane {
    #[default]
    Xy = 0, // G17
    Zx = 1, // G18
    Yz = 2, // G19
}

impl Plane {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Plane::Xy),
            1 => Some(Plane::Zx),
            2 => Some(Plane::Yz),
            _ => None,
        }
    }

    /// Axis indices `(plane_a, plane_b, plane_normal)` for this plane.
    pub const fn axes(self) -> (usize, usize, usize) {
        match self {
            Plane::Xy => (0, 1, 2),
            Plane::Zx => (2, 0, 1),
            Plane::Yz => (1, 2, 0),
        }
    }
}

/// Units modal group (G20/G21).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Units {
    Inches = 0, // G20
    #[default]
    Millimeters = 1, // G21
}

impl Units {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Units::Inches),
            1 => Some(Units::Millimeters),
            _ => None,
        }
    }

    /// Conversion factor from this unit to millimeters.
    pub const fn to_mm_factor(self) -> f32 {
        match self {
            Units::Inches => 25.4,
            Units::Millimeters => 1.0,
        }
    }
}

/// Distance modal group (G90/G91).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum DistanceMode {
    #[default]
    Absolute = 0, // G90
    Incremental = 1, // G91
}

/// Arc IJK distance mode (G90.1/G91.1) — always incremental per RS274/NGC
/// in practice, but tracked separately per the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum ArcDistanceMode {
    Absolute = 0,
    #[default]
    Incremental = 1, // G91.1
}

/// Feed rate modal group (G93/G94).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum FeedRateMode {
    InverseTime = 0, // G93
    #[default]
    UnitsPerMinute = 1, // G94
}

/// Active work coordinate system (G54..G59).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum CoordinateSystem {
    #[default]
    G54 = 0,
    G55 = 1,
    G56 = 2,
    G57 = 3,
    G58 = 4,
    G59 = 5,
}

impl CoordinateSystem {
    pub const fn from_u8(v: u8) -> Option<Self> {
        use CoordinateSystem::*;
        Some(match v {
            0 => G54,
            1 => G55,
            2 => G56,
            3 => G57,
            4 => G58,
            5 => G59,
            _ => return None,
        })
    }
}

/// Spindle modal group (M3/M4/M5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum SpindleMode {
    Cw = 0,   // M3
    Ccw = 1,  // M4
    #[default]
    Off = 2, // M5
}

bitflags! {
    /// Coolant modal group (M7/M8/M9) — flood and mist are independently
    /// combinable, unlike the exclusive enums above.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(transparent)]
    pub struct CoolantMode: u8 {
        const FLOOD = 0b01; // M8
        const MIST  = 0b10; // M7 (requires laser/M7-enabled feature flag)
    }
}

/// Program flow modal group (M0/M1/M2/M30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum ProgramFlow {
    #[default]
    Running = 0,
    Paused = 1,  // M0
    OptionalStop = 2, // M1
    CompletedM2 = 3, // M2
    CompletedM30 = 4, // M30
}

impl ProgramFlow {
    pub const fn is_complete(self) -> bool {
        matches!(self, ProgramFlow::CompletedM2 | ProgramFlow::CompletedM30)
    }
}

/// Tool length offset modal group (G43/G43.1/G49).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum ToolLengthMode {
    #[default]
    None = 0, // G49
    Table = 1, // G43
    Dynamic = 2, // G43.1
}

/// Path control modal group (G61/G61.1/G64 — only exact-path G61 supported).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum PathControlMode {
    #[default]
    ExactPath = 0, // G61
}

/// Retract mode for canned cycles (G98/G99).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum RetractMode {
    #[default]
    OldZ = 0, // G98
    RPlane = 1, // G99
}

/// Lathe diameter mode (G7/G8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum LatheMode {
    Diameter = 0, // G7
    #[default]
    Radius = 1, // G8
}

/// Spindle speed mode (G96/G97).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum SpindleSpeedMode {
    SurfaceSpeed = 0, // G96
    #[default]
    Rpm = 1, // G97
}

/// Override control modal group (M48/M49).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum OverrideControlMode {
    #[default]
    Enabled = 0, // M48
    Disabled = 1, // M49
}

/// The parser's aggregate modal state. Mutated only in interpreter phase 3
/// (§4.2) and only for blocks that pass phase 1/2 validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserState {
    pub motion: MotionMode,
    pub plane: Plane,
    pub units: Units,
    pub distance: DistanceMode,
    pub arc_distance: ArcDistanceMode,
    pub feed_rate_mode: FeedRateMode,
    pub coord_system: CoordinateSystem,
    pub spindle: SpindleMode,
    pub coolant: CoolantMode,
    pub program_flow: ProgramFlow,
    pub tool_length: ToolLengthMode,
    pub path_control: PathControlMode,
    pub retract: RetractMode,
    pub lathe: LatheMode,
    pub spindle_speed_mode: SpindleSpeedMode,
    pub override_control: OverrideControlMode,
    /// Currently selected tool number.
    pub tool: u8,
    /// Commanded feed rate, mm/min (or 1/min for inverse time).
    pub feed_rate: f32,
    /// Commanded spindle speed, RPM.
    pub spindle_speed: f32,
}

impl Default for ParserState {
    fn default() -> Self {
        Self {
            motion: MotionMode::default(),
            plane: Plane::default(),
            units: Units::default(),
            distance: DistanceMode::default(),
            arc_distance: ArcDistanceMode::default(),
            feed_rate_mode: FeedRateMode::default(),
            coord_system: CoordinateSystem::default(),
            spindle: SpindleMode::default(),
            coolant: CoolantMode::default(),
            program_flow: ProgramFlow::default(),
            tool_length: ToolLengthMode::default(),
            path_control: PathControlMode::default(),
            retract: RetractMode::default(),
            lathe: LatheMode::default(),
            spindle_speed_mode: SpindleSpeedMode::default(),
            override_control: OverrideControlMode::default(),
            tool: 0,
            feed_rate: 0.0,
            spindle_speed: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_mode_round_trips() {
        for v in 0u8..=13 {
            let m = MotionMode::from_u8(v).unwrap();
            assert_eq!(m as u8, v);
        }
        assert!(MotionMode::from_u8(14).is_none());
    }

    #[test]
    fn plane_axes_match_rs274() {
        assert_eq!(Plane::Xy.axes(), (0, 1, 2));
        assert_eq!(Plane::Zx.axes(), (2, 0, 1));
        assert_eq!(Plane::Yz.axes(), (1, 2, 0));
    }

    #[test]
    fn units_conversion_factor() {
        assert_eq!(Units::Millimeters.to_mm_factor(), 1.0);
        assert!((Units::Inches.to_mm_factor() - 25.4).abs() < f32::EPSILON);
    }

    #[test]
    fn coolant_mode_flags_are_independent() {
        let mut c = CoolantMode::empty();
        c.insert(CoolantMode::FLOOD);
        assert!(c.contains(CoolantMode::FLOOD));
        assert!(!c.contains(CoolantMode::MIST));
        c.insert(CoolantMode::MIST);
        assert!(c.contains(CoolantMode::FLOOD) && c.contains(CoolantMode::MIST));
    }

    #[test]
    fn program_flow_completion() {
        assert!(ProgramFlow::CompletedM2.is_complete());
        assert!(ProgramFlow::CompletedM30.is_complete());
        assert!(!ProgramFlow::Running.is_complete());
        assert!(!ProgramFlow::Paused.is_complete());
    }

    #[test]
    fn parser_state_default_matches_grbl_power_on_state() {
        let s = ParserState::default();
        assert_eq!(s.motion, MotionMode::Seek);
        assert_eq!(s.plane, Plane::Xy);
        assert_eq!(s.units, Units::Millimeters);
        assert_eq!(s.distance, DistanceMode::Absolute);
        assert_eq!(s.coord_system, CoordinateSystem::G54);
    }
}
