//! Status report, alarm, and feedback message formatting (§6, §9
//! supplement).

use gcode_common::consts::N_AXIS;
use gcode_common::error::AlarmCode;
use gcode_common::modal::CoordinateSystem;
use gcode_common::settings::{CoordinateSystems, ToolTable};

use crate::executor::MachineState;

fn state_name(state: MachineState) -> &'static str {
    match state {
        MachineState::Idle => "Idle",
        MachineState::Cycle => "Run",
        MachineState::Hold => "Hold",
        MachineState::Jog => "Jog",
        MachineState::Homing => "Home",
        MachineState::Alarm => "Alarm",
        MachineState::CheckMode => "Check",
        MachineState::SafetyDoor => "Door",
        MachineState::Sleep => "Sleep",
        MachineState::FeedDwell => "Hold",
        MachineState::ToolChange => "Tool",
        MachineState::Busy => "Busy",
    }
}

fn fmt_axes(axes: &[f32; N_AXIS]) -> String {
    axes.iter()
        .map(|v| format!("{v:.3}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build a `<State|MPos:...|Bf:...|FS:...|WCO:...|Ov:...>` status report
/// line (§6). Fields after `MPos` are included only when the caller
/// supplies them, appending optional sections to a base line rather
/// than filling in a single rigid format string.
pub struct StatusReportBuilder<'a> {
    state: MachineState,
    machine_position: &'a [f32; N_AXIS],
    planner_free: Option<usize>,
    rx_free: Option<usize>,
    feed: Option<f32>,
    spindle_speed: Option<f32>,
    work_offset: Option<[f32; N_AXIS]>,
    overrides: Option<(u8, u8, u8)>,
}

impl<'a> StatusReportBuilder<'a> {
    pub fn new(state: MachineState, machine_position: &'a [f32; N_AXIS]) -> Self {
        Self {
            state,
            machine_position,
            planner_free: None,
            rx_free: None,
            feed: None,
            spindle_speed: None,
            work_offset: None,
            overrides: None,
        }
    }

    pub fn buffer_state(mut self, planner_free: usize, rx_free: usize) -> Self {
        self.planner_free = Some(planner_free);
        self.rx_free = Some(rx_free);
        self
    }

    pub fn feed_speed(mut self, feed: f32, spindle_speed: f32) -> Self {
        self.feed = Some(feed);
        self.spindle_speed = Some(spindle_speed);
        self
    }

    pub fn work_coordinate_offset(mut self, wco: [f32; N_AXIS]) -> Self {
        self.work_offset = Some(wco);
        self
    }

    pub fn overrides(mut self, feed_pct: u8, rapid_pct: u8, spindle_pct: u8) -> Self {
        self.overrides = Some((feed_pct, rapid_pct, spindle_pct));
        self
    }

    pub fn build(self) -> String {
        let mut out = format!("<{}|MPos:{}", state_name(self.state), fmt_axes(self.machine_position));
        if let (Some(pf), Some(rf)) = (self.planner_free, self.rx_free) {
            out.push_str(&format!("|Bf:{pf},{rf}"));
        }
        if let (Some(feed), Some(speed)) = (self.feed, self.spindle_speed) {
            out.push_str(&format!("|FS:{feed:.0},{speed:.0}"));
        }
        if let Some(wco) = self.work_offset {
            out.push_str(&format!("|WCO:{}", fmt_axes(&wco)));
        }
        if let Some((f, r, s)) = self.overrides {
            out.push_str(&format!("|Ov:{f},{r},{s}"));
        }
        out.push('>');
        out
    }
}

/// `ALARM:<N>` line per §6.
pub fn format_alarm(code: AlarmCode) -> String {
    format!("{code}\r\n")
}

/// `[MSG:...]` feedback line per §6.
pub fn format_feedback(message: &str) -> String {
    format!("[MSG:{message}]\r\n")
}

/// `[G54:...]`..`[G59:...]`, `[G28:...]`, `[G30:...]`, `[G92:...]` dump,
/// per §6.
pub fn format_coordinate_dump(coords: &CoordinateSystems) -> Vec<String> {
    let names = ["G54", "G55", "G56", "G57", "G58", "G59"];
    let mut lines: Vec<String> = names
        .iter()
        .zip(coords.work.iter())
        .map(|(name, axes)| format!("[{name}:{}]", fmt_axes(axes)))
        .collect();
    lines.push(format!("[G28:{}]", fmt_axes(&coords.g28_position)));
    lines.push(format!("[G30:{}]", fmt_axes(&coords.g30_position)));
    lines.push(format!("[G92:{}]", fmt_axes(&coords.g92_offset)));
    lines
}

/// `[TLO:...]` — active tool length offset, per §6.
pub fn format_tool_length_offset(offset_z: f32) -> String {
    format!("[TLO:{offset_z:.3}]")
}

/// `[PRB:...]` — last probe result, per §6.
pub fn format_probe_result(position: &[f32; N_AXIS], success: bool) -> String {
    format!("[PRB:{}:{}]", fmt_axes(position), success as u8)
}

/// `[TOOLn:...]` dump for `$#`/tool-table inspection, per §6.
pub fn format_tool_table(tools: &ToolTable) -> Vec<String> {
    tools
        .entries
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[TOOL{i}:{:.3},{:.3},{:.3}]", t.x_offset, t.y_offset, t.z_offset))
        .collect()
}

pub fn coordinate_system_letter(cs: CoordinateSystem) -> &'static str {
    match cs {
        CoordinateSystem::G54 => "G54",
        CoordinateSystem::G55 => "G55",
        CoordinateSystem::G56 => "G56",
        CoordinateSystem::G57 => "G57",
        CoordinateSystem::G58 => "G58",
        CoordinateSystem::G59 => "G59",
    }
}
