//! # gcode_core foreground binary
//!
//! Loads settings, constructs a simulated machine through
//! `gcode_hal::DriverRegistry`, and drives the cycle runner for a
//! bounded demo run. A real deployment would wire a real HAL backend
//! in place of the simulation and let [`gcode_core::cycle::CycleRunner::run`]
//! run forever under the `rt` feature.

use std::sync::{Arc, Mutex};

use clap::Parser;
use gcode_common::hal::{LimitInput, ProbeInput, StepOutput};
use gcode_common::settings::Settings;
use gcode_core::cycle::{rt_setup, CycleRunner};
use gcode_hal::{DriverRegistry, SimulatedMachine};
use tracing::{info, warn};

/// gcode_core - G-code interpreter and real-time motion controller core
#[derive(Parser, Debug)]
#[command(name = "gcode_core")]
#[command(version)]
#[command(about = "G-code interpreter, motion planner, and real-time executor core")]
struct Args {
    /// Path to a TOML settings file. Falls back to defaults if omitted.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Path to a G-code program to run. Falls back to a short embedded
    /// demo program if omitted.
    #[arg(short, long)]
    program: Option<std::path::PathBuf>,

    /// Named machine configuration to request from the HAL driver registry.
    #[arg(short, long, default_value = "default")]
    machine: String,

    /// System cycle time in microseconds.
    #[arg(long, default_value_t = 1000)]
    cycle_time_us: u64,

    /// CPU core to pin the cycle loop to (only effective with the `rt` feature).
    #[arg(long, default_value_t = 0)]
    cpu_core: usize,

    /// SCHED_FIFO priority (only effective with the `rt` feature).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Number of ticks to run before exiting. Only used without the `rt` feature.
    #[arg(long, default_value_t = 5000)]
    ticks: u64,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

/// Short demo program run when `--program` is omitted: a rapid to a
/// corner, a dwell-free drilling cycle, and a return to the origin.
const DEMO_PROGRAM: &str = "\
G21G90
G0X10Y10
G1Z-2F200
G81X20Y10Z-3R2F150
G0X0Y0Z0
M5
";

/// Shared handle to the simulated machine, so the cycle runner can hold
/// a `&mut dyn StepOutput` and `&dyn LimitInput`/`&dyn ProbeInput` at
/// once even though all three are implemented on the same value. Uses
/// `Arc<Mutex<_>>` rather than `Rc<RefCell<_>>` since the HAL
/// collaborator traits require `Send`.
struct SharedMachine(Arc<Mutex<SimulatedMachine>>);

impl StepOutput for SharedMachine {
    fn set_step(&mut self, axis: usize, asserted: bool) {
        self.0.lock().unwrap().set_step(axis, asserted);
    }
    fn set_direction(&mut self, axis: usize, negative: bool) {
        self.0.lock().unwrap().set_direction(axis, negative);
    }
    fn set_enable(&mut self, axis: usize, enabled: bool) {
        self.0.lock().unwrap().set_enable(axis, enabled);
    }
}

impl LimitInput for SharedMachine {
    fn read_bank(&self) -> u8 {
        self.0.lock().unwrap().read_bank()
    }
}

impl ProbeInput for SharedMachine {
    fn is_triggered(&self) -> bool {
        self.0.lock().unwrap().is_triggered()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(args.verbose);

    info!("gcode_core v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = match &args.config {
        Some(path) => gcode_core::config::load_settings_toml(path)?,
        None => {
            warn!("no --config given, starting with default settings");
            Settings::default()
        }
    };

    let registry = DriverRegistry::default();
    let machine = registry.create_machine(&args.machine)?;
    info!("simulated machine '{}' attached", args.machine);

    let machine = Arc::new(Mutex::new(machine));
    let mut step_output = SharedMachine(machine.clone());
    let limit_input = SharedMachine(machine.clone());
    let probe_input = SharedMachine(machine);

    if let Err(e) = rt_setup(args.cpu_core, args.rt_priority) {
        warn!("RT setup skipped/failed: {e}");
    }

    let mut runner =
        CycleRunner::new(settings, &mut step_output, &limit_input, &probe_input, args.cycle_time_us);

    let program = match &args.program {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            info!("no --program given, running the embedded demo program");
            DEMO_PROGRAM.to_string()
        }
    };
    runner.load_program(&program);

    #[cfg(feature = "rt")]
    {
        runner.run()?;
    }
    #[cfg(not(feature = "rt"))]
    {
        runner.run_for(args.ticks)?;
        info!(
            "cycle run complete: {} ticks, avg {}ns, max {}ns, {} overruns",
            args.ticks,
            runner.stats.avg_cycle_ns(),
            runner.stats.max_cycle_ns,
            runner.stats.overruns
        );
        for response in runner.responses.drain(..) {
            print!("{response}");
        }
    }

    Ok(())
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
