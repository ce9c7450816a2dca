//! Scripted braking-and-steering scenario on the simulation harness.
//!
//! Runs the full pipeline against the built-in (or a supplied)
//! calibration and prints the diagnostic summary. Useful for bring-up
//! and for eyeballing the control behavior without hardware.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use ecu_common::config::FileCalibrationStore;
use ecu_common::hal::NoopCollaborators;
use ecu_common::wheel::WheelPosition;
use ecu_runtime::Scheduler;
use ecu_runtime::sim::{
    RecordingActuators, RecordingComms, ScriptedSensors, SimClock, SimWatchdogHw,
    driving_snapshot,
};

#[derive(Debug, Parser)]
#[command(name = "ecu_runtime", about = "Simulated ECU control pipeline")]
struct Args {
    /// Calibration TOML file; built-in defaults when omitted.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Number of 1 ms ticks to simulate.
    #[arg(long, default_value_t = 3000)]
    ticks: u32,

    /// Persist the diagnostic store to this file at exit.
    #[arg(long)]
    diag_out: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let store = match &args.calibration {
        Some(path) => FileCalibrationStore::load(path)?,
        None => FileCalibrationStore::with_defaults(),
    };

    let clock = SimClock::new(0);
    let sensors = ScriptedSensors::new(driving_snapshot([80.0; 4], 80.0, 2.0, 5.0, 2.0));
    let actuators = RecordingActuators::new();
    let comms = RecordingComms::new();
    let watchdog = SimWatchdogHw::new();

    let mut scheduler = Scheduler::from_store(
        clock.clone(),
        sensors.clone(),
        actuators.clone(),
        comms.clone(),
        watchdog,
        NoopCollaborators,
        &store,
    )?;
    info!("self-tests passed, starting scenario");

    for tick in 0..args.ticks {
        clock.advance(1);

        // Braking event: the front-right wheel starts locking after one
        // second and recovers one second later.
        if tick == 1000 {
            sensors.update(|snap| {
                snap.wheel_speeds[WheelPosition::FrontRight].value = 30.0;
            });
        }
        if tick == 2000 {
            sensors.update(|snap| {
                snap.wheel_speeds[WheelPosition::FrontRight].value = 80.0;
            });
        }

        scheduler.tick()?;
    }

    let stats = scheduler.diagnostics().statistics();
    let safety = scheduler.supervisor().statistics();
    let log = actuators.log();
    info!(
        abs_activations = scheduler.abs().activation_count(),
        vehicle_speed = scheduler.abs().vehicle_speed(),
        assist_torque = scheduler.eps().last_params().total_nm,
        active_dtcs = stats.active_dtc_count,
        events = stats.event_count,
        violations = safety.total_violations,
        pressure_commands = log.pressure_commands,
        motor_commands = log.motor_commands,
        "scenario complete"
    );

    if let Some(path) = &args.diag_out {
        scheduler.diagnostics().save(path)?;
        info!(path = %path.display(), "diagnostic store persisted");
    }

    Ok(())
}
