//! # gcode_hal demo binary
//!
//! Stands up a named [`SimulatedMachine`](gcode_hal::SimulatedMachine)
//! and exercises its collaborator traits, logging each step — a
//! stand-in for a real HAL process a production deployment would run
//! as a separate service talking to `gcode_core` over the line
//! protocol (§6).

use clap::Parser;
use gcode_common::consts::N_AXIS;
use gcode_common::hal::{Crc8, LimitInput, NvramBackend, StepOutput};
use gcode_hal::driver_registry::DriverRegistry;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// gcode_hal - simulation backend for gcode_core's external collaborators
#[derive(Parser, Debug)]
#[command(name = "gcode_hal")]
#[command(version)]
#[command(about = "Simulation backend for the G-code motion controller's HAL contracts")]
struct Args {
    /// Named machine configuration to instantiate from the registry.
    #[arg(short, long, default_value = "default")]
    machine: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("gcode_hal startup failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("gcode_hal v{} starting...", env!("CARGO_PKG_VERSION"));

    let registry = DriverRegistry::default();
    let mut machine = registry.create_machine(&args.machine)?;

    info!("simulated machine '{}' constructed", args.machine);

    // Exercise each collaborator trait once, as a smoke demonstration.
    machine.store_record(0, &[1, 2, 3])?;
    let echoed = machine.load_record(0, 3)?;
    info!("nvram round trip: {:?}", echoed);

    let crc = gcode_hal::SimCrc8;
    info!("computed checksum: {}", crc.crc8(&echoed));

    machine.set_direction(0, false);
    for _ in 0..10 {
        machine.set_step(0, true);
        machine.set_step(0, false);
    }
    info!("stepped X axis to {} mm", machine.position_mm(0));
    info!("limit bank: {:#010b}", machine.read_bank());

    info!("gcode_hal demo complete ({} axes)", N_AXIS);
    Ok(())
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
