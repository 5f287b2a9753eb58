//! Deterministic cycle runner: fast-phase (stepper/segment, every tick)
//! and slow-phase (limit-input polling/debounce, every N ticks) per §2.
//!
//! RT setup sequence (mlockall, prefault, affinity, SCHED_FIFO) and
//! `CycleStats` carried over unchanged from the original cycle runner;
//! the cycle body itself is rewritten for the CNC fast/slow phase split
//! instead of a SHM read/process/write body.

use std::collections::VecDeque;

use gcode_common::consts::N_AXIS;
use gcode_common::error::StatusCode;
use gcode_common::hal::{ByteTransport, LimitInput, ProbeInput, StepOutput};
use gcode_common::settings::Settings;

use crate::executor::{Executor, MachineEvent, SpindleStopOverride};
use crate::interpreter::Interpreter;
use crate::parser::{AssemblerEvent, LineAssembler, RealtimeCommand};
use crate::planner::Planner;
use crate::probe::ProbeCycle;
use crate::segment::{generate_segments, Segment};
use crate::stepper::Stepper;

/// O(1) per-cycle timing statistics, no allocation.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub cycle_count: u64,
    pub last_cycle_ns: i64,
    pub min_cycle_ns: i64,
    pub max_cycle_ns: i64,
    pub sum_cycle_ns: i64,
    pub sum_sq_cycle_ns: i128,
    pub overruns: u64,
    pub max_latency_ns: i64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            sum_sq_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        self.sum_sq_cycle_ns += (duration_ns as i128) * (duration_ns as i128);
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors during RT setup or cycle execution.
#[derive(Debug)]
pub enum CycleError {
    RtSetup(String),
    CycleOverrun { actual_ns: i64, budget_ns: i64 },
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RtSetup(msg) => write!(f, "RT setup error: {msg}"),
            Self::CycleOverrun { actual_ns, budget_ns } => {
                write!(f, "cycle overrun: {actual_ns}ns > {budget_ns}ns budget")
            }
        }
    }
}

impl std::error::Error for CycleError {}

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{mlockall, MlockallFlags};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

fn prefault_stack() {
    let mut buf = [0u8; 1024 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param { sched_priority: priority };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup sequence. No-ops in simulation builds (no `rt` feature).
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

/// How often the slow phase (limit-input polling/debounce, wall-clock
/// bookkeeping) runs, in fast-phase ticks (§2).
const SLOW_PHASE_DIVISOR: u64 = 10;

/// Drives the fast-phase (stepper/segment) and slow-phase (limit
/// polling) work each tick, and owns the planner/segment/stepper
/// pipeline end to end.
pub struct CycleRunner<'a> {
    pub settings: Settings,
    pub executor: Executor,
    pub planner: Planner,
    pub probe: ProbeCycle,
    pub interpreter: Interpreter,
    pub stats: CycleStats,
    cycle_time_ns: i64,
    current_segments: Vec<Segment>,
    segment_index: usize,
    position: [f32; N_AXIS],
    stepper: Stepper<'a>,
    limit_input: &'a dyn LimitInput,
    probe_input: &'a dyn ProbeInput,
    transport: Option<&'a mut dyn ByteTransport>,
    assembler: LineAssembler,
    /// Lines accepted off the wire/program feed but not yet handed to
    /// the interpreter, throttled against planner occupancy so a single
    /// arc or canned cycle can't starve the ring buffer (§4.1 "Line
    /// Assembler" / §4.2).
    pending_lines: VecDeque<String>,
    /// `ok`/`error:<N>` lines produced by the interpreter pump, drained
    /// by whatever owns the transport.
    pub responses: VecDeque<String>,
}

impl<'a> CycleRunner<'a> {
    pub fn new(
        settings: Settings,
        step_output: &'a mut dyn StepOutput,
        limit_input: &'a dyn LimitInput,
        probe_input: &'a dyn ProbeInput,
        cycle_time_us: u64,
    ) -> Self {
        Self {
            settings,
            executor: Executor::new(),
            planner: Planner::new(),
            probe: ProbeCycle::new(),
            interpreter: Interpreter::new(),
            stats: CycleStats::new(),
            cycle_time_ns: cycle_time_us as i64 * 1000,
            current_segments: Vec::new(),
            segment_index: 0,
            position: [0.0; N_AXIS],
            stepper: Stepper::new(step_output),
            limit_input,
            probe_input,
            transport: None,
            assembler: LineAssembler::new(),
            pending_lines: VecDeque::new(),
            responses: VecDeque::new(),
        }
    }

    /// Attach a byte transport to drain each tick (§6 "Line protocol").
    /// Optional: programs can also be queued directly with
    /// [`CycleRunner::load_program`]/[`CycleRunner::submit_line`] without
    /// ever attaching one.
    pub fn attach_transport(&mut self, transport: &'a mut dyn ByteTransport) {
        self.transport = Some(transport);
    }

    /// Drain whatever bytes are currently buffered on the attached
    /// transport, if any, writing back any `ok`/`error:<N>` responses
    /// the pump produced for them.
    fn drain_transport(&mut self) {
        let mut incoming = Vec::new();
        if let Some(transport) = self.transport.as_deref_mut() {
            while let Some(byte) = transport.read_byte() {
                incoming.push(byte);
            }
        }
        for byte in incoming {
            self.feed_byte(byte);
        }
        if self.responses.is_empty() {
            return;
        }
        if let Some(transport) = self.transport.as_deref_mut() {
            let flat: Vec<u8> = self.responses.drain(..).flat_map(|s| s.into_bytes()).collect();
            transport.write_bytes(&flat);
        }
    }

    /// Feed one transport byte through the real-time sniffer/line
    /// assembler (§4.1). Real-time bytes are dispatched immediately;
    /// completed lines are queued for the interpreter pump.
    pub fn feed_byte(&mut self, byte: u8) {
        let jogging = self.executor.state() == crate::executor::MachineState::Jog;
        match self.assembler.push_byte(byte, jogging) {
            AssemblerEvent::Pending => {}
            AssemblerEvent::Realtime(cmd) => self.apply_realtime_command(cmd),
            AssemblerEvent::Line(line) => self.submit_line(line),
            AssemblerEvent::Overflow => {
                self.responses.push_back(format!("{}\r\n", StatusCode::LineLengthExceeded));
            }
        }
    }

    /// Queue a pre-split line directly, bypassing the byte sniffer (used
    /// by `load_program` and tests that already have whole lines).
    pub fn submit_line(&mut self, line: String) {
        self.pending_lines.push_back(line);
    }

    /// Split `text` into non-blank lines and queue them in order.
    pub fn load_program(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if !line.is_empty() {
                self.pending_lines.push_back(line.to_string());
            }
        }
    }

    /// Hand queued lines to the interpreter while the planner has room,
    /// stopping (without dropping the line) the moment a line would
    /// overflow the ring buffer rather than losing queued work (§4.2).
    fn pump_interpreter(&mut self) {
        while let Some(line) = self.pending_lines.pop_front() {
            if self.planner.is_full() {
                self.pending_lines.push_front(line);
                break;
            }
            match self.interpreter.execute_line(&line, &self.settings, &mut self.planner) {
                Ok(()) => self.responses.push_back("ok\r\n".to_string()),
                Err(crate::error::GcodeError(StatusCode::Overflow)) => {
                    self.pending_lines.push_front(line);
                    break;
                }
                Err(e) => self.responses.push_back(format!("{e}\r\n")),
            }
        }
    }

    /// Apply a real-time command (§4.1/§4.6). Override adjustments call
    /// back into the planner via `replan_overrides` so a running job's
    /// queued blocks actually rescale, not just new ones planned after
    /// the change.
    pub fn apply_realtime_command(&mut self, cmd: RealtimeCommand) {
        use RealtimeCommand::*;
        let before = (self.executor.feed_override.value, self.executor.rapid_override.value);
        match cmd {
            Reset => {
                self.executor.handle_event(MachineEvent::Reset);
            }
            StatusReportQuery => {}
            CycleStart => {
                self.executor.handle_event(MachineEvent::CycleStart);
            }
            FeedHold => {
                self.executor.handle_event(MachineEvent::FeedHold);
            }
            SafetyDoor => {
                self.executor.handle_event(MachineEvent::SafetyDoor);
            }
            JogCancel => {
                self.executor.handle_event(MachineEvent::JogCancel);
            }
            FeedOverrideReset => self.executor.feed_override.reset(100),
            FeedOverrideCoarsePlus => self.executor.feed_override.coarse_plus(),
            FeedOverrideCoarseMinus => self.executor.feed_override.coarse_minus(),
            FeedOverrideFinePlus => self.executor.feed_override.fine_plus(),
            FeedOverrideFineMinus => self.executor.feed_override.fine_minus(),
            RapidOverrideReset => self.executor.rapid_override.reset(100),
            RapidOverrideMedium => self.executor.rapid_override.set(50),
            RapidOverrideLow => self.executor.rapid_override.set(25),
            SpindleOverrideReset => self.executor.spindle_override.reset(100),
            SpindleOverrideCoarsePlus => self.executor.spindle_override.coarse_plus(),
            SpindleOverrideCoarseMinus => self.executor.spindle_override.coarse_minus(),
            SpindleOverrideFinePlus => self.executor.spindle_override.fine_plus(),
            SpindleOverrideFineMinus => self.executor.spindle_override.fine_minus(),
            ToggleSpindleStop => {
                self.executor.spindle_stop_override = match self.executor.spindle_stop_override {
                    SpindleStopOverride::Disabled => SpindleStopOverride::Initiate,
                    _ => SpindleStopOverride::Disabled,
                };
            }
            ToggleFloodCoolant | ToggleMistCoolant => {}
        }
        let after = (self.executor.feed_override.value, self.executor.rapid_override.value);
        if before != after {
            self.planner.replan_overrides(after.0, after.1);
        }
    }

    /// Fast-phase work: pull the next segment if needed, issue a step
    /// event, and feed the probe monitor if armed (§4.4/§4.5).
    pub fn fast_phase_tick(&mut self) {
        if self.current_segments.is_empty() || self.segment_index >= self.current_segments.len() {
            self.refill_segments();
        }
        let Some(block) = self.planner.tail_block().cloned() else {
            return;
        };
        if self.segment_index < self.current_segments.len() {
            let segment = self.current_segments[self.segment_index];
            self.stepper.load_segment(&segment);
            let result = self.stepper.step_pulse_tick(&block);
            self.stepper.step_reset_tick();
            if result == crate::stepper::StepTickResult::SegmentComplete {
                self.segment_index += 1;
            }
            if self.probe.state() == crate::probe::ProbeState::Active {
                let triggered = self.probe_input.is_triggered();
                if self.probe.tick(triggered, &self.position) == Some(true) {
                    self.executor.handle_event(MachineEvent::MotionCancel);
                }
            }
            if self.segment_index >= self.current_segments.len() && !self.stepper.is_active() {
                self.planner.discard_tail();
                self.current_segments.clear();
                self.segment_index = 0;
            }
        }
    }

    fn refill_segments(&mut self) {
        if let Some(block) = self.planner.tail_block() {
            self.current_segments = generate_segments(block, 0.0);
            self.segment_index = 0;
            self.stepper.load_block(block);
        }
    }

    /// Slow-phase work: poll and debounce the limit-input bank, raising
    /// a hard-limit event on the executor when a bit trips outside an
    /// expected homing sequence (§2/§5).
    pub fn slow_phase_tick(&mut self) {
        let bank = self.limit_input.read_bank();
        if bank != 0 && self.executor.allows_motion() && self.executor.state() != crate::executor::MachineState::Homing
        {
            self.executor.handle_event(MachineEvent::HardLimit);
        }
    }

    /// Run one full tick: fast phase every call, slow phase every
    /// [`SLOW_PHASE_DIVISOR`] calls.
    pub fn tick(&mut self, tick_index: u64) {
        self.drain_transport();
        self.pump_interpreter();
        self.fast_phase_tick();
        if tick_index % SLOW_PHASE_DIVISOR == 0 {
            self.slow_phase_tick();
        }
    }

    pub fn cycle_time_ns(&self) -> i64 {
        self.cycle_time_ns
    }

    /// Enter the deterministic cycle loop. Never returns under normal
    /// operation; uses `clock_nanosleep(TIMER_ABSTIME)` for drift-free
    /// pacing under the `rt` feature, `std::thread::sleep` otherwise.
    ///
    /// # Errors
    /// Returns [`CycleError::CycleOverrun`] on the first overrun detected
    /// when built with the `rt` feature (hard real-time deadline).
    pub fn run(&mut self) -> Result<(), CycleError> {
        #[cfg(feature = "rt")]
        {
            self.run_rt_loop()
        }
        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(None)
        }
    }

    /// Run a bounded number of ticks using the simulation pacing loop,
    /// for demo binaries and integration tests that need the loop to
    /// terminate rather than run forever.
    pub fn run_for(&mut self, ticks: u64) -> Result<(), CycleError> {
        self.run_sim_loop(Some(ticks))
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self) -> Result<(), CycleError> {
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

        let clock = ClockId::CLOCK_MONOTONIC;
        let mut next_wake =
            clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
        let mut tick_index = 0u64;

        loop {
            next_wake = timespec_add_ns(next_wake, self.cycle_time_ns);

            let cycle_start =
                clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
            let wake_latency_ns = timespec_diff_ns(&cycle_start, &next_wake).abs();

            self.tick(tick_index);
            tick_index = tick_index.wrapping_add(1);

            let cycle_end =
                clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")))?;
            let duration_ns = timespec_diff_ns(&cycle_end, &cycle_start);

            self.stats.record(duration_ns, wake_latency_ns);

            if duration_ns > self.cycle_time_ns {
                self.stats.overruns += 1;
                return Err(CycleError::CycleOverrun {
                    actual_ns: duration_ns,
                    budget_ns: self.cycle_time_ns,
                });
            }

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
    }

    fn run_sim_loop(&mut self, max_ticks: Option<u64>) -> Result<(), CycleError> {
        use std::time::Instant;

        let cycle_duration = std::time::Duration::from_nanos(self.cycle_time_ns as u64);
        let mut tick_index = 0u64;

        loop {
            if let Some(limit) = max_ticks {
                if tick_index >= limit {
                    return Ok(());
                }
            }

            let cycle_start = Instant::now();
            self.tick(tick_index);
            tick_index = tick_index.wrapping_add(1);

            let elapsed = cycle_start.elapsed();
            let duration_ns = elapsed.as_nanos() as i64;
            self.stats.record(duration_ns, 0);

            if duration_ns > self.cycle_time_ns {
                self.stats.overruns += 1;
            }

            if let Some(remaining) = cycle_duration.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
    }
}

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let total_ns = ts.tv_nsec() + ns as i64;
    let extra_sec = total_ns.div_euclid(1_000_000_000);
    let rem_ns = total_ns.rem_euclid(1_000_000_000);
    TimeSpec::new(ts.tv_sec() + extra_sec, rem_ns)
}

#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_stats_basic() {
        let mut stats = CycleStats::new();
        assert_eq!(stats.cycle_count, 0);
        assert_eq!(stats.avg_cycle_ns(), 0);

        stats.record(500_000, 1_000);
        assert_eq!(stats.cycle_count, 1);
        assert_eq!(stats.last_cycle_ns, 500_000);
        assert_eq!(stats.avg_cycle_ns(), 500_000);

        stats.record(600_000, 500);
        assert_eq!(stats.max_cycle_ns, 600_000);
        assert_eq!(stats.avg_cycle_ns(), 550_000);
    }

    #[test]
    fn rt_setup_no_rt_feature_is_noop() {
        #[cfg(not(feature = "rt"))]
        {
            assert!(rt_setup(0, 80).is_ok());
        }
    }

    #[test]
    fn cycle_error_display() {
        let err = CycleError::CycleOverrun { actual_ns: 1_500_000, budget_ns: 1_000_000 };
        let msg = format!("{err}");
        assert!(msg.contains("1500000"));
        assert!(msg.contains("1000000"));
    }

    struct NullOutput;
    impl StepOutput for NullOutput {
        fn set_step(&mut self, _axis: usize, _asserted: bool) {}
        fn set_direction(&mut self, _axis: usize, _negative: bool) {}
        fn set_enable(&mut self, _axis: usize, _enabled: bool) {}
    }

    struct NullLimit;
    impl LimitInput for NullLimit {
        fn read_bank(&self) -> u8 {
            0
        }
    }

    struct NullProbe;
    impl ProbeInput for NullProbe {
        fn is_triggered(&self) -> bool {
            false
        }
    }

    fn test_runner<'a>(
        output: &'a mut NullOutput,
        limit: &'a NullLimit,
        probe: &'a NullProbe,
    ) -> CycleRunner<'a> {
        CycleRunner::new(Settings::default(), output, limit, probe, 1000)
    }

    #[test]
    fn submitted_line_is_interpreted_and_reports_ok() {
        let mut output = NullOutput;
        let limit = NullLimit;
        let probe = NullProbe;
        let mut runner = test_runner(&mut output, &limit, &probe);
        runner.submit_line("G1X10F500".to_string());
        runner.tick(0);
        assert_eq!(runner.responses.pop_front(), Some("ok\r\n".to_string()));
        assert_eq!(runner.planner.len(), 1);
    }

    #[test]
    fn invalid_line_reports_error_and_does_not_block_the_queue() {
        let mut output = NullOutput;
        let limit = NullLimit;
        let probe = NullProbe;
        let mut runner = test_runner(&mut output, &limit, &probe);
        runner.submit_line("G1X".to_string());
        runner.submit_line("G1X5F500".to_string());
        runner.tick(0);
        let first = runner.responses.pop_front().unwrap();
        assert!(first.starts_with("error:"));
        assert_eq!(runner.responses.pop_front(), Some("ok\r\n".to_string()));
    }

    #[test]
    fn load_program_queues_and_runs_every_line() {
        let mut output = NullOutput;
        let limit = NullLimit;
        let probe = NullProbe;
        let mut runner = test_runner(&mut output, &limit, &probe);
        runner.load_program("G21G90\nG0X10Y10\nG1Z-1F200\n");
        runner.tick(0);
        assert_eq!(runner.responses.len(), 3);
        assert!(runner.responses.iter().all(|r| r == "ok\r\n"));
    }

    #[test]
    fn feed_byte_dispatches_override_realtime_command() {
        let mut output = NullOutput;
        let limit = NullLimit;
        let probe = NullProbe;
        let mut runner = test_runner(&mut output, &limit, &probe);
        assert_eq!(runner.executor.feed_override.value, 100);
        runner.feed_byte(0x91);
        assert_eq!(runner.executor.feed_override.value, 110);
    }

    #[test]
    fn override_change_replans_queued_blocks() {
        let mut output = NullOutput;
        let limit = NullLimit;
        let probe = NullProbe;
        let mut runner = test_runner(&mut output, &limit, &probe);
        runner.submit_line("G1X10F400".to_string());
        runner.tick(0);
        let before_rate = runner.planner.tail_block().unwrap().programmed_rate;
        runner.apply_realtime_command(RealtimeCommand::FeedOverrideCoarsePlus);
        let after_rate = runner.planner.tail_block().unwrap().programmed_rate;
        assert!(after_rate > before_rate);
    }

    #[test]
    fn non_override_realtime_command_does_not_replan() {
        let mut output = NullOutput;
        let limit = NullLimit;
        let probe = NullProbe;
        let mut runner = test_runner(&mut output, &limit, &probe);
        runner.submit_line("G1X10F500".to_string());
        runner.tick(0);
        let before_rate = runner.planner.tail_block().unwrap().programmed_rate;
        runner.apply_realtime_command(RealtimeCommand::StatusReportQuery);
        let after_rate = runner.planner.tail_block().unwrap().programmed_rate;
        assert_eq!(before_rate, after_rate);
    }
}
