//! Four-phase interpreter pipeline (§4.2): capture/validate words, compute
//! the motion target in millimeters, apply modal effects in canonical
//! order, then submit motion to the planner.

use gcode_common::consts::{DEFAULT_ARC_TOLERANCE, MIN_FEED_RATE, N_ARC_CORRECTION, N_AXIS};
use gcode_common::error::StatusCode;
use gcode_common::modal::{
    CoolantMode, CoordinateSystem, DistanceMode, FeedRateMode, MotionMode, OverrideControlMode,
    ParserState, ProgramFlow, RetractMode, SpindleMode, ToolLengthMode, Units,
};
use gcode_common::motion::Condition;
use gcode_common::settings::{CoordinateSystems, Settings, ToolTable};

use crate::error::GcodeError;
use crate::parser::{lex_words, modal_group_of, ModalGroup, Word};
use crate::planner::Planner;

/// Machine position in millimeters, all axes.
pub type Position = [f32; N_AXIS];

/// Words outside the axis letters that feed arc geometry, canned cycles,
/// and synchronized motion (§4.2). Collected once per line; `i`/`j`/`k`
/// and `r`/`q` are already converted to millimeters, `p` is left in
/// whatever unit the consuming cycle expects (seconds for dwell, raw
/// pitch for threading), and `l`/`h` are unitless counts/indices.
#[derive(Debug, Clone, Copy, Default)]
struct CycleWords {
    i: Option<f32>,
    j: Option<f32>,
    k: Option<f32>,
    r: Option<f32>,
    p: Option<f32>,
    q: Option<f32>,
    l: Option<u32>,
    h: Option<u8>,
}

/// A non-modal command that consumes axis words for its own purpose
/// (arc center offset excepted) rather than as a commanded motion target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NonMotion {
    ToolLengthTable,
    ToolLengthDynamic,
    SetOffset,
}

/// Everything the interpreter needs across calls: modal state, machine
/// position, and the active work offsets (§3).
pub struct Interpreter {
    pub parser_state: ParserState,
    pub position: Position,
    pub coords: CoordinateSystems,
    pub tool_length_offset: [f32; N_AXIS],
    pub tool_table: ToolTable,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            parser_state: ParserState::default(),
            position: [0.0; N_AXIS],
            coords: CoordinateSystems::default(),
            tool_length_offset: [0.0; N_AXIS],
            tool_table: ToolTable::new(),
        }
    }

    fn work_offset(&self) -> [f32; N_AXIS] {
        let mut wco = self.coords.work[self.parser_state.coord_system as usize];
        for i in 0..N_AXIS {
            wco[i] += self.coords.g92_offset[i] + self.tool_length_offset[i];
        }
        wco
    }

    /// Phase 1: collect words, detect modal-group duplicates.
    fn capture(&self, words: &[Word]) -> Result<(), GcodeError> {
        let mut seen: Vec<ModalGroup> = Vec::new();
        for w in words {
            let g = modal_group_of(*w);
            if g == ModalGroup::None {
                continue;
            }
            if seen.contains(&g) {
                return Err(GcodeError(StatusCode::GcodeModalGroupViolation));
            }
            seen.push(g);
        }
        Ok(())
    }

    /// Phase 2: compute the commanded target position in millimeters
    /// under the active units/distance mode.
    fn compute_target(&self, words: &[Word]) -> Result<(Position, bool), GcodeError> {
        Ok(self.compute_target_with(words, self.parser_state.units, self.parser_state.distance))
    }

    /// Same as [`Interpreter::compute_target`], but with `units`/`distance`
    /// supplied by the caller instead of read from `parser_state` — used
    /// by jog lines, which are evaluated against modal overrides that are
    /// never committed to `parser_state` (§4.6 "Jogging").
    fn compute_target_with(
        &self,
        words: &[Word],
        units: Units,
        distance: DistanceMode,
    ) -> (Position, bool) {
        let factor = units.to_mm_factor();
        let mut target = self.position;
        let mut any_axis = false;
        let wco = self.work_offset();
        for w in words {
            let axis = Self::axis_index(w.letter);
            if let Some(axis) = axis {
                any_axis = true;
                let mm = w.value * factor;
                target[axis] = match distance {
                    DistanceMode::Absolute => mm + wco[axis],
                    DistanceMode::Incremental => self.position[axis] + mm,
                };
            }
        }
        (target, any_axis)
    }

    const fn axis_index(letter: u8) -> Option<usize> {
        match letter {
            b'X' => Some(0),
            b'Y' => Some(1),
            b'Z' => Some(2),
            b'A' => Some(3),
            b'B' => Some(4),
            _ => None,
        }
    }

    /// Axis words converted to millimeters with no work-offset or
    /// distance-mode semantics applied — used by commands that reuse the
    /// axis letters for something other than a motion target (G43.1's
    /// dynamic offset, G92's set-offset).
    fn raw_axis_values(words: &[Word], units: Units) -> [Option<f32>; N_AXIS] {
        let factor = units.to_mm_factor();
        let mut out = [None; N_AXIS];
        for w in words {
            if let Some(axis) = Self::axis_index(w.letter) {
                out[axis] = Some(w.value * factor);
            }
        }
        out
    }

    /// Collect I/J/K/R/P/Q/L/H words (§4.2), converting the length-valued
    /// ones (I/J/K/R/Q) to millimeters.
    fn capture_cycle_words(&self, words: &[Word]) -> CycleWords {
        let factor = self.parser_state.units.to_mm_factor();
        let mut out = CycleWords::default();
        for w in words {
            match w.letter {
                b'I' => out.i = Some(w.value * factor),
                b'J' => out.j = Some(w.value * factor),
                b'K' => out.k = Some(w.value * factor),
                b'R' => out.r = Some(w.value * factor),
                b'P' => out.p = Some(w.value),
                b'Q' => out.q = Some(w.value * factor),
                b'L' => out.l = Some(w.value.round().max(0.0) as u32),
                b'H' => out.h = Some(w.value.round().max(0.0) as u8),
                _ => {}
            }
        }
        out
    }

    /// Phase 3/4: apply modal-group letter words that take effect
    /// immediately (plane, units, distance, coord system, tool length
    /// mode, program flow), in canonical order, then submit the motion
    /// block if one was requested.
    pub fn execute_line(
        &mut self,
        line: &str,
        settings: &Settings,
        planner: &mut Planner,
    ) -> Result<(), GcodeError> {
        if line.is_empty() {
            return Ok(());
        }
        if line.starts_with("$J=") {
            return self.execute_jog(line, settings, planner);
        }
        let words = lex_words(line).map_err(GcodeError)?;
        self.capture(&words)?;

        let mut non_motion: Option<NonMotion> = None;

        for w in &words {
            if w.letter != b'G' {
                continue;
            }
            let code = (w.value * 10.0).round() as i32;
            match code {
                0 => self.parser_state.motion = MotionMode::Seek,
                10 => self.parser_state.motion = MotionMode::Linear,
                20 => self.parser_state.motion = MotionMode::CwArc,
                30 => self.parser_state.motion = MotionMode::CcwArc,
                330 | 760 => self.parser_state.motion = MotionMode::Threading,
                382 => self.parser_state.motion = MotionMode::ProbeToward,
                383 => self.parser_state.motion = MotionMode::ProbeTowardNoError,
                384 => self.parser_state.motion = MotionMode::ProbeAway,
                385 => self.parser_state.motion = MotionMode::ProbeAwayNoError,
                730 => self.parser_state.motion = MotionMode::ChipBreakCanned,
                800 => self.parser_state.motion = MotionMode::None,
                810 => self.parser_state.motion = MotionMode::DrillCanned,
                820 => self.parser_state.motion = MotionMode::DrillDwellCanned,
                830 => self.parser_state.motion = MotionMode::DrillPeckCanned,
                170 => self.parser_state.plane = gcode_common::modal::Plane::Xy,
                180 => self.parser_state.plane = gcode_common::modal::Plane::Zx,
                190 => self.parser_state.plane = gcode_common::modal::Plane::Yz,
                200 => self.parser_state.units = Units::Inches,
                210 => self.parser_state.units = Units::Millimeters,
                900 => self.parser_state.distance = DistanceMode::Absolute,
                910 => self.parser_state.distance = DistanceMode::Incremental,
                930 => self.parser_state.feed_rate_mode = FeedRateMode::InverseTime,
                940 => self.parser_state.feed_rate_mode = FeedRateMode::UnitsPerMinute,
                540 => self.parser_state.coord_system = CoordinateSystem::G54,
                550 => self.parser_state.coord_system = CoordinateSystem::G55,
                560 => self.parser_state.coord_system = CoordinateSystem::G56,
                570 => self.parser_state.coord_system = CoordinateSystem::G57,
                580 => self.parser_state.coord_system = CoordinateSystem::G58,
                590 => self.parser_state.coord_system = CoordinateSystem::G59,
                980 => self.parser_state.retract = RetractMode::OldZ,
                990 => self.parser_state.retract = RetractMode::RPlane,
                430 => {
                    self.parser_state.tool_length = ToolLengthMode::Table;
                    non_motion = Some(NonMotion::ToolLengthTable);
                }
                431 => {
                    self.parser_state.tool_length = ToolLengthMode::Dynamic;
                    non_motion = Some(NonMotion::ToolLengthDynamic);
                }
                490 => {
                    // G49 clears both static and dynamic offsets on all axes.
                    self.parser_state.tool_length = ToolLengthMode::None;
                    self.tool_length_offset = [0.0; N_AXIS];
                }
                920 => non_motion = Some(NonMotion::SetOffset),
                921 => self.coords.clear_g92(),
                _ => {}
            }
        }

        for w in &words {
            match w.letter {
                b'F' => self.parser_state.feed_rate = w.value * self.parser_state.units.to_mm_factor(),
                b'S' => self.parser_state.spindle_speed = w.value.max(0.0),
                b'T' => self.parser_state.tool = w.value.round().max(0.0) as u8,
                _ => {}
            }
        }

        for w in &words {
            if w.letter != b'M' {
                continue;
            }
            match w.value.round() as i32 {
                0 => self.parser_state.program_flow = ProgramFlow::Paused,
                1 => self.parser_state.program_flow = ProgramFlow::OptionalStop,
                2 => self.parser_state.program_flow = ProgramFlow::CompletedM2,
                30 => self.parser_state.program_flow = ProgramFlow::CompletedM30,
                3 => self.parser_state.spindle = SpindleMode::Cw,
                4 => self.parser_state.spindle = SpindleMode::Ccw,
                5 => self.parser_state.spindle = SpindleMode::Off,
                7 => self.parser_state.coolant.insert(CoolantMode::MIST),
                8 => self.parser_state.coolant.insert(CoolantMode::FLOOD),
                9 => self.parser_state.coolant = CoolantMode::empty(),
                48 => self.parser_state.override_control = OverrideControlMode::Enabled,
                49 => self.parser_state.override_control = OverrideControlMode::Disabled,
                // M6: the active tool is already committed by the T word above;
                // the pause/probe tool-change cycle itself is an executor/cycle
                // concern (`Settings::tool_change_mode`), not a parser one.
                6 => {}
                _ => {}
            }
        }

        if let Some(cmd) = non_motion {
            match cmd {
                NonMotion::ToolLengthTable => {
                    let cyc = self.capture_cycle_words(&words);
                    let tool = cyc.h.unwrap_or(self.parser_state.tool);
                    let entry = self.tool_table.get(tool).copied().unwrap_or_default();
                    self.tool_length_offset[0] = entry.x_offset;
                    self.tool_length_offset[1] = entry.y_offset;
                    self.tool_length_offset[2] = entry.z_offset;
                }
                NonMotion::ToolLengthDynamic => {
                    let raw = Self::raw_axis_values(&words, self.parser_state.units);
                    for axis in 0..N_AXIS {
                        if let Some(v) = raw[axis] {
                            self.tool_length_offset[axis] = v;
                        }
                    }
                }
                NonMotion::SetOffset => {
                    let raw = Self::raw_axis_values(&words, self.parser_state.units);
                    for axis in 0..N_AXIS {
                        if let Some(v) = raw[axis] {
                            self.coords.g92_offset[axis] = self.position[axis]
                                - self.coords.work[self.parser_state.coord_system as usize][axis]
                                - self.tool_length_offset[axis]
                                - v;
                        }
                    }
                }
            }
            return Ok(());
        }

        let (target, any_axis) = self.compute_target(&words)?;
        let cyc = self.capture_cycle_words(&words);
        match self.parser_state.motion {
            MotionMode::None => {}
            m if m.is_probe() => {
                // Probing motion is submitted through `crate::probe`, not
                // the ordinary planner path; the interpreter only updates
                // the commanded target here.
                if !any_axis {
                    return Err(GcodeError(StatusCode::GcodeNoAxisWords));
                }
            }
            MotionMode::CwArc | MotionMode::CcwArc => {
                let clockwise = self.parser_state.motion == MotionMode::CwArc;
                self.plan_arc(&target, &cyc, clockwise, planner, settings)?;
            }
            m if m.is_canned_cycle() => {
                self.plan_canned_cycle(&target, &cyc, planner, settings)?;
            }
            MotionMode::Threading => {
                self.plan_threading(&target, &cyc, planner, settings)?;
            }
            _ => {
                if any_axis || self.parser_state.motion != MotionMode::Seek {
                    planner
                        .plan_line(&self.position, &target, &self.parser_state, settings)
                        .map_err(|_| GcodeError(StatusCode::Overflow))?;
                    self.position = target;
                }
            }
        }

        Ok(())
    }

    /// Parses and executes a `$J=` jog line (§4.6 "Jogging"). Bypasses
    /// the ordinary modal-group validation path entirely: a jog always
    /// behaves as G1/G94 regardless of the persisted modal state, and
    /// never mutates `parser_state` on success.
    pub fn execute_jog(
        &mut self,
        line: &str,
        settings: &Settings,
        planner: &mut Planner,
    ) -> Result<(), GcodeError> {
        let body = line
            .strip_prefix("$J=")
            .ok_or(GcodeError(StatusCode::InvalidJogCommand))?;
        let words = lex_words(body).map_err(|_| GcodeError(StatusCode::InvalidJogCommand))?;

        let mut jog_state = self.parser_state.clone();
        jog_state.motion = MotionMode::Linear;
        jog_state.feed_rate_mode = FeedRateMode::UnitsPerMinute;
        let mut units = self.parser_state.units;
        let mut distance = self.parser_state.distance;
        let mut feed_seen = false;

        for w in &words {
            match w.letter {
                b'F' => {
                    feed_seen = true;
                }
                b'G' => {
                    let code = (w.value * 10.0).round() as i32;
                    match code {
                        200 => units = Units::Inches,
                        210 => units = Units::Millimeters,
                        900 => distance = DistanceMode::Absolute,
                        910 => distance = DistanceMode::Incremental,
                        _ => return Err(GcodeError(StatusCode::InvalidJogCommand)),
                    }
                }
                b'X' | b'Y' | b'Z' | b'A' | b'B' => {}
                _ => return Err(GcodeError(StatusCode::InvalidJogCommand)),
            }
        }
        if !feed_seen {
            return Err(GcodeError(StatusCode::GcodeUndefinedFeedRate));
        }
        for w in &words {
            if w.letter == b'F' {
                jog_state.feed_rate = w.value * units.to_mm_factor();
            }
        }
        if jog_state.feed_rate <= 0.0 {
            return Err(GcodeError(StatusCode::GcodeUndefinedFeedRate));
        }

        let (target, any_axis) = self.compute_target_with(&words, units, distance);
        if !any_axis {
            return Err(GcodeError(StatusCode::InvalidJogCommand));
        }

        if settings.features.soft_limits_enabled {
            for axis in 0..N_AXIS {
                if target[axis].abs() > settings.axes[axis].max_travel.abs() {
                    return Err(GcodeError(StatusCode::TravelExceeded));
                }
            }
        }

        planner
            .plan_line_ex(&self.position, &target, &jog_state, settings, Condition::SYSTEM_MOTION)
            .map_err(|_| GcodeError(StatusCode::Overflow))?;
        self.position = target;
        Ok(())
    }

    /// Decomposes a G2/G3 arc into short line segments and submits each
    /// to the planner, grounded on the center-format/radius-format
    /// vector-rotation algorithm with periodic exact-trig re-anchoring
    /// (§4.2).
    fn plan_arc(
        &mut self,
        target: &Position,
        cyc: &CycleWords,
        clockwise: bool,
        planner: &mut Planner,
        settings: &Settings,
    ) -> Result<(), GcodeError> {
        let (axis_0, axis_1, axis_linear) = self.parser_state.plane.axes();
        let start = self.position;

        let mut offset = [0.0f32; N_AXIS];
        let radius;
        let is_ijk_form = cyc.r.is_none();

        if let Some(r) = cyc.r {
            let x = target[axis_0] - start[axis_0];
            let y = target[axis_1] - start[axis_1];
            if x.abs() < f32::EPSILON && y.abs() < f32::EPSILON {
                return Err(GcodeError(StatusCode::GcodeInvalidTarget));
            }
            let mut r = r;
            let h_x2_div_d_sq = 4.0 * r * r - x * x - y * y;
            if h_x2_div_d_sq < 0.0 {
                return Err(GcodeError(StatusCode::GcodeArcRadiusError));
            }
            let mut h_x2_div_d = -h_x2_div_d_sq.sqrt() / (x * x + y * y).sqrt().max(f32::EPSILON);
            if !clockwise {
                h_x2_div_d = -h_x2_div_d;
            }
            if r < 0.0 {
                h_x2_div_d = -h_x2_div_d;
                r = -r;
            }
            offset[axis_0] = 0.5 * (x - y * h_x2_div_d);
            offset[axis_1] = 0.5 * (y + x * h_x2_div_d);
            radius = r;
        } else {
            offset[0] = cyc.i.unwrap_or(0.0);
            offset[1] = cyc.j.unwrap_or(0.0);
            offset[2] = cyc.k.unwrap_or(0.0);
            if offset[axis_0].abs() < f32::EPSILON && offset[axis_1].abs() < f32::EPSILON {
                return Err(GcodeError(StatusCode::GcodeNoOffsetsInPlane));
            }
            radius = (offset[axis_0] * offset[axis_0] + offset[axis_1] * offset[axis_1]).sqrt();
        }

        let center_0 = start[axis_0] + offset[axis_0];
        let center_1 = start[axis_1] + offset[axis_1];

        if is_ijk_form {
            // The commanded target and the IJK-derived center must describe
            // a mutually consistent radius within tolerance.
            let target_r = ((target[axis_0] - center_0).powi(2) + (target[axis_1] - center_1).powi(2)).sqrt();
            let delta = (target_r - radius).abs();
            if delta > 0.005 && delta > 0.001 * radius {
                return Err(GcodeError(StatusCode::GcodeInvalidTarget));
            }
        }

        let mut r_axis0 = -offset[axis_0];
        let mut r_axis1 = -offset[axis_1];
        let rt_axis0 = target[axis_0] - center_0;
        let rt_axis1 = target[axis_1] - center_1;

        const ARC_ANGULAR_TRAVEL_EPSILON: f32 = 5e-7;
        let mut angular_travel =
            (r_axis0 * rt_axis1 - r_axis1 * rt_axis0).atan2(r_axis0 * rt_axis0 + r_axis1 * rt_axis1);
        if clockwise {
            if angular_travel >= -ARC_ANGULAR_TRAVEL_EPSILON {
                angular_travel -= 2.0 * std::f32::consts::PI;
            }
        } else if angular_travel <= ARC_ANGULAR_TRAVEL_EPSILON {
            angular_travel += 2.0 * std::f32::consts::PI;
        }

        let segments = Self::arc_segment_count(angular_travel, radius, settings.arc_tolerance);
        let theta_per_segment = angular_travel / segments as f32;
        let linear_per_segment = (target[axis_linear] - start[axis_linear]) / segments as f32;

        // Vector-rotation increment, re-anchored to exact cos/sin every
        // `N_ARC_CORRECTION` segments to bound single-precision drift.
        let mut cos_t = 2.0 - theta_per_segment * theta_per_segment;
        let mut sin_t = theta_per_segment * 0.166_666_67 * (cos_t + 4.0);
        cos_t *= 0.5;

        let mut position = start;
        let mut count = 0u32;
        for i in 1..segments {
            if count < N_ARC_CORRECTION {
                let r_axisi = r_axis0 * sin_t + r_axis1 * cos_t;
                r_axis0 = r_axis0 * cos_t - r_axis1 * sin_t;
                r_axis1 = r_axisi;
                count += 1;
            } else {
                let angle = i as f32 * theta_per_segment;
                let cos_ti = angle.cos();
                let sin_ti = angle.sin();
                r_axis0 = -offset[axis_0] * cos_ti + offset[axis_1] * sin_ti;
                r_axis1 = -offset[axis_0] * sin_ti - offset[axis_1] * cos_ti;
                count = 0;
            }

            position[axis_0] = center_0 + r_axis0;
            position[axis_1] = center_1 + r_axis1;
            position[axis_linear] += linear_per_segment;

            planner
                .plan_line(&self.position, &position, &self.parser_state, settings)
                .map_err(|_| GcodeError(StatusCode::Overflow))?;
            self.position = position;
        }

        // Final segment snaps exactly to the commanded target, eliminating
        // residual drift from the incremental rotation.
        planner
            .plan_line(&self.position, target, &self.parser_state, settings)
            .map_err(|_| GcodeError(StatusCode::Overflow))?;
        self.position = *target;
        Ok(())
    }

    fn submit_rapid(
        &mut self,
        target: &Position,
        planner: &mut Planner,
        settings: &Settings,
    ) -> Result<(), GcodeError> {
        let mut state = self.parser_state.clone();
        state.motion = MotionMode::Seek;
        planner
            .plan_line(&self.position, target, &state, settings)
            .map_err(|_| GcodeError(StatusCode::Overflow))?;
        self.position = *target;
        Ok(())
    }

    fn submit_feed(
        &mut self,
        target: &Position,
        planner: &mut Planner,
        settings: &Settings,
    ) -> Result<(), GcodeError> {
        let mut state = self.parser_state.clone();
        state.motion = MotionMode::Linear;
        planner
            .plan_line(&self.position, target, &state, settings)
            .map_err(|_| GcodeError(StatusCode::Overflow))?;
        self.position = *target;
        Ok(())
    }

    /// Runs a canned drilling cycle (G81/G82/G83/G73): rapid to clear-Z
    /// if needed, then for each of `L` repeats, rapid to XY, rapid to the
    /// R-plane, feed to Z (peck-stepping for G83, chip-breaking for G73),
    /// and retract per G98/G99 (§4.2).
    fn plan_canned_cycle(
        &mut self,
        target: &Position,
        cyc: &CycleWords,
        planner: &mut Planner,
        settings: &Settings,
    ) -> Result<(), GcodeError> {
        let r = cyc.r.ok_or(GcodeError(StatusCode::GcodeValueWordMissing))?;
        let old = self.position;
        let wco = self.work_offset();

        let mut clear_z = r + wco[2];
        let mut target_z = target[2];
        let (delta_x, delta_y) = if self.parser_state.distance == DistanceMode::Incremental {
            clear_z += old[2];
            target_z = clear_z + (target[2] - old[2]);
            (target[0] - old[0], target[1] - old[1])
        } else {
            (0.0, 0.0)
        };
        if clear_z < target_z {
            return Err(GcodeError(StatusCode::GcodeInvalidTarget));
        }
        let needs_peck = !matches!(
            self.parser_state.motion,
            MotionMode::DrillCanned | MotionMode::DrillDwellCanned
        );
        if needs_peck && cyc.q.filter(|q| *q > 0.0).is_none() {
            return Err(GcodeError(StatusCode::GcodeValueWordMissing));
        }

        let mut xyz = old;
        if old[2] < clear_z {
            xyz[2] = clear_z;
            self.submit_rapid(&xyz, planner, settings)?;
        }

        let repeats = cyc.l.unwrap_or(1).max(1);
        for repeat in 0..repeats {
            xyz[0] = target[0] + delta_x * repeat as f32;
            xyz[1] = target[1] + delta_y * repeat as f32;
            self.submit_rapid(&xyz, planner, settings)?;

            xyz[2] = clear_z;
            self.submit_rapid(&xyz, planner, settings)?;

            match self.parser_state.motion {
                MotionMode::DrillCanned | MotionMode::DrillDwellCanned => {
                    xyz[2] = target_z;
                    self.submit_feed(&xyz, planner, settings)?;
                }
                _ => {
                    // `needs_peck` above already guarantees a positive Q.
                    let q = cyc.q.filter(|q| *q > 0.0).unwrap_or(1.0);
                    let mut curr_z = clear_z - q;
                    loop {
                        let exit = curr_z <= target_z;
                        if exit {
                            curr_z = target_z;
                        }
                        xyz[2] = curr_z;
                        self.submit_feed(&xyz, planner, settings)?;

                        if self.parser_state.motion == MotionMode::DrillPeckCanned {
                            xyz[2] = clear_z;
                        } else {
                            xyz[2] += 2.0;
                        }
                        self.submit_rapid(&xyz, planner, settings)?;

                        if exit {
                            break;
                        }
                        xyz[2] = curr_z + 0.4;
                        self.submit_rapid(&xyz, planner, settings)?;
                        curr_z -= q;
                    }
                }
            }

            xyz[2] = if self.parser_state.retract == RetractMode::OldZ && clear_z < old[2] {
                old[2]
            } else {
                clear_z
            };
            self.submit_rapid(&xyz, planner, settings)?;
        }

        Ok(())
    }

    /// Synchronized motion (G33/G76): feed rate is derived from the live
    /// spindle speed and the commanded pitch (`P`) rather than the
    /// ordinary modal feed rate, requiring the spindle to be turning
    /// (§4.2 "Synchronized motion").
    fn plan_threading(
        &mut self,
        target: &Position,
        cyc: &CycleWords,
        planner: &mut Planner,
        settings: &Settings,
    ) -> Result<(), GcodeError> {
        if self.parser_state.spindle_speed <= 0.0 {
            return Err(GcodeError(StatusCode::GcodeUndefinedFeedRate));
        }
        let pitch = cyc.p.ok_or(GcodeError(StatusCode::GcodeValueWordMissing))?;

        let mut state = self.parser_state.clone();
        state.motion = MotionMode::Linear;
        state.feed_rate = (self.parser_state.spindle_speed * pitch).max(MIN_FEED_RATE);
        planner
            .plan_line(&self.position, target, &state, settings)
            .map_err(|_| GcodeError(StatusCode::Overflow))?;
        self.position = *target;
        Ok(())
    }

    /// Arc segment count for a commanded angular travel `theta` (radians)
    /// and radius `r`, per §4.2's formula, re-anchored to exact
    /// trigonometry every [`N_ARC_CORRECTION`] segments by the caller.
    pub fn arc_segment_count(theta: f32, r: f32, tolerance: f32) -> u32 {
        let tolerance = if tolerance <= 0.0 {
            DEFAULT_ARC_TOLERANCE
        } else {
            tolerance
        };
        let denom = (tolerance * (2.0 * r - tolerance)).max(0.0).sqrt();
        if denom <= f32::EPSILON {
            return 1;
        }
        let n = ((0.5 * theta.abs() * r) / denom).floor();
        n.max(1.0) as u32
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Planner;

    #[test]
    fn g0_linear_updates_position_and_enqueues_block() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp
            .execute_line("G1X10Y20F500", &settings, &mut planner)
            .unwrap();
        assert_eq!(interp.position[0], 10.0);
        assert_eq!(interp.position[1], 20.0);
        assert_eq!(planner.len(), 1);
    }

    #[test]
    fn modal_group_violation_is_rejected() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        let err = interp
            .execute_line("G0G1X10", &settings, &mut planner)
            .unwrap_err();
        assert_eq!(err.0, StatusCode::GcodeModalGroupViolation);
    }

    #[test]
    fn incremental_distance_accumulates() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_line("G91G1X5", &settings, &mut planner).unwrap();
        interp.execute_line("X5", &settings, &mut planner).unwrap();
        assert_eq!(interp.position[0], 10.0);
    }

    #[test]
    fn inch_units_convert_to_millimeters() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp
            .execute_line("G20G1X1", &settings, &mut planner)
            .unwrap();
        assert!((interp.position[0] - 25.4).abs() < 1e-3);
    }

    #[test]
    fn g49_clears_tool_length_offset() {
        let mut interp = Interpreter::new();
        interp.tool_length_offset[2] = 12.5;
        interp.parser_state.tool_length = ToolLengthMode::Table;
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_line("G49", &settings, &mut planner).unwrap();
        assert_eq!(interp.tool_length_offset[2], 0.0);
        assert_eq!(interp.parser_state.tool_length, ToolLengthMode::None);
    }

    #[test]
    fn g43_1_sets_dynamic_tool_length_offset() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_line("G43.1Z-12.5", &settings, &mut planner).unwrap();
        assert_eq!(interp.tool_length_offset[2], -12.5);
        assert_eq!(interp.parser_state.tool_length, ToolLengthMode::Dynamic);
        // G43.1's axis word must not be treated as a motion target.
        assert_eq!(planner.len(), 0);
        assert_eq!(interp.position[2], 0.0);
    }

    #[test]
    fn g43_loads_offset_from_tool_table() {
        let mut interp = Interpreter::new();
        interp.tool_table.set(
            5,
            gcode_common::settings::ToolEntry { x_offset: 1.0, y_offset: 2.0, z_offset: -3.5, reserved: 0.0 },
        );
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_line("T5M6", &settings, &mut planner).unwrap();
        interp.execute_line("G43", &settings, &mut planner).unwrap();
        assert_eq!(interp.tool_length_offset, [1.0, 2.0, -3.5, 0.0, 0.0]);
    }

    #[test]
    fn g92_sets_offset_so_position_reads_as_commanded() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_line("G1X10", &settings, &mut planner).unwrap();
        interp.execute_line("G92X0", &settings, &mut planner).unwrap();
        assert_eq!(interp.coords.g92_offset[0], 10.0);
        assert_eq!(planner.len(), 1);
    }

    #[test]
    fn m_codes_update_spindle_coolant_and_program_flow() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_line("M3S1000", &settings, &mut planner).unwrap();
        assert_eq!(interp.parser_state.spindle, SpindleMode::Cw);
        assert_eq!(interp.parser_state.spindle_speed, 1000.0);
        interp.execute_line("M8", &settings, &mut planner).unwrap();
        assert!(interp.parser_state.coolant.contains(CoolantMode::FLOOD));
        interp.execute_line("M9", &settings, &mut planner).unwrap();
        assert!(interp.parser_state.coolant.is_empty());
        interp.execute_line("M30", &settings, &mut planner).unwrap();
        assert!(interp.parser_state.program_flow.is_complete());
    }

    #[test]
    fn arc_segment_count_is_at_least_one() {
        let n = Interpreter::arc_segment_count(std::f32::consts::PI, 10.0, 0.002);
        assert!(n >= 1);
        assert!(n <= N_ARC_CORRECTION * 20);
    }

    #[test]
    fn ccw_arc_decomposes_into_multiple_planner_blocks() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_line("G1X1F500", &settings, &mut planner).unwrap();
        interp.execute_line("G3X0Y1I-1J0F500", &settings, &mut planner).unwrap();
        assert!(planner.len() > 1);
        assert!((interp.position[0]).abs() < 1e-2);
        assert!((interp.position[1] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn arc_radius_mode_rejects_unreachable_radius() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_line("G1X10F500", &settings, &mut planner).unwrap();
        let err = interp
            .execute_line("G2X20Y0R0.001F500", &settings, &mut planner)
            .unwrap_err();
        assert_eq!(err.0, StatusCode::GcodeArcRadiusError);
    }

    #[test]
    fn drill_canned_cycle_retracts_to_r_plane_by_default() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp
            .execute_line("G81X10Y0Z-5R2F200", &settings, &mut planner)
            .unwrap();
        assert!((interp.position[2] - 2.0).abs() < 1e-2);
        assert!(planner.len() >= 3);
    }

    #[test]
    fn drill_peck_cycle_requires_q_word() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        let err = interp
            .execute_line("G83X10Y0Z-5R2F200", &settings, &mut planner)
            .unwrap_err();
        assert_eq!(err.0, StatusCode::GcodeValueWordMissing);
    }

    #[test]
    fn threading_requires_spindle_running() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        let err = interp
            .execute_line("G33Z-10P2", &settings, &mut planner)
            .unwrap_err();
        assert_eq!(err.0, StatusCode::GcodeUndefinedFeedRate);
    }

    #[test]
    fn threading_plans_feed_rate_from_rpm_times_pitch() {
        let mut interp = Interpreter::new();
        interp.parser_state.spindle_speed = 600.0;
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_line("G33Z-10P0.5", &settings, &mut planner).unwrap();
        let block = planner.tail_block().unwrap();
        assert!((block.programmed_rate - 300.0).abs() < 1.0);
    }

    #[test]
    fn jog_moves_without_mutating_persistent_feed_rate() {
        let mut interp = Interpreter::new();
        interp.parser_state.feed_rate = 500.0;
        let settings = Settings::default();
        let mut planner = Planner::new();
        interp.execute_jog("$J=G91X10F100", &settings, &mut planner).unwrap();
        assert_eq!(interp.position[0], 10.0);
        assert_eq!(interp.parser_state.feed_rate, 500.0);
        let block = planner.tail_block().unwrap();
        assert!(block.condition.contains(Condition::SYSTEM_MOTION));
    }

    #[test]
    fn jog_without_feed_word_is_rejected() {
        let mut interp = Interpreter::new();
        let settings = Settings::default();
        let mut planner = Planner::new();
        let err = interp.execute_jog("$J=X10", &settings, &mut planner).unwrap_err();
        assert_eq!(err.0, StatusCode::GcodeUndefinedFeedRate);
    }

    #[test]
    fn jog_rejected_past_soft_limit() {
        let mut interp = Interpreter::new();
        let mut settings = Settings::default();
        settings.features.soft_limits_enabled = true;
        settings.axes[0].max_travel = 50.0;
        let mut planner = Planner::new();
        let err = interp
            .execute_jog("$J=X100F100", &settings, &mut planner)
            .unwrap_err();
        assert_eq!(err.0, StatusCode::TravelExceeded);
    }
}
