//! Simulation harness: deterministic clock, scripted sensors and
//! recording actuator/comms/watchdog doubles.
//!
//! Every device hands out cloneable handles (shared interior state) so a
//! test or the demo binary can drive the script and inspect the outputs
//! while the scheduler owns the device.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ecu_common::error::EcuError;
use ecu_common::hal::{
    ActuatorSink, CommsSink, MotorCommand, SensorProvider, TimeSource, WatchdogHardware,
    WatchdogId,
};
use ecu_common::sensors::{SensorChannel, SensorSnapshot};
use ecu_common::wheel::{WheelArray, WheelPosition};

// ─── Clock ──────────────────────────────────────────────────────────

/// Manually advanced millisecond clock.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<u32>>,
}

impl SimClock {
    /// Clock starting at `start` ms.
    pub fn new(start: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Advance the clock by `ms`.
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }

    /// Set the absolute tick.
    pub fn set(&self, tick: u32) {
        self.now.set(tick);
    }
}

impl TimeSource for SimClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

// ─── Sensors ────────────────────────────────────────────────────────

/// Sensor provider serving a script the test mutates between ticks.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSensors {
    state: Rc<RefCell<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    snapshot: SensorSnapshot,
    fail_with: Option<EcuError>,
}

impl ScriptedSensors {
    /// Provider primed with an initial snapshot.
    pub fn new(snapshot: SensorSnapshot) -> Self {
        Self {
            state: Rc::new(RefCell::new(ScriptState {
                snapshot,
                fail_with: None,
            })),
        }
    }

    /// Replace the scripted snapshot.
    pub fn set(&self, snapshot: SensorSnapshot) {
        self.state.borrow_mut().snapshot = snapshot;
    }

    /// Edit the scripted snapshot in place.
    pub fn update(&self, f: impl FnOnce(&mut SensorSnapshot)) {
        f(&mut self.state.borrow_mut().snapshot);
    }

    /// Make the next snapshot call fail once with `error`.
    pub fn fail_next(&self, error: EcuError) {
        self.state.borrow_mut().fail_with = Some(error);
    }
}

impl SensorProvider for ScriptedSensors {
    fn snapshot(&mut self, now: u32) -> Result<SensorSnapshot, EcuError> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.fail_with.take() {
            return Err(error);
        }
        let mut snapshot = state.snapshot;
        snapshot.timestamp = now;
        Ok(snapshot)
    }
}

/// A fully-valid driving snapshot for scripting.
pub fn driving_snapshot(
    wheel_speeds_kmh: [f32; 4],
    vehicle_speed_kmh: f32,
    driver_torque_nm: f32,
    steering_angle_deg: f32,
    steering_velocity_dps: f32,
) -> SensorSnapshot {
    let ch = |v: f32| SensorChannel::good(v, 0);
    let mut snapshot = SensorSnapshot {
        timestamp: 0,
        master_cylinder_pressure: ch(10.0),
        steering_angle: ch(steering_angle_deg),
        steering_velocity: ch(steering_velocity_dps),
        driver_torque: ch(driver_torque_nm),
        vehicle_speed: ch(vehicle_speed_kmh),
        ecu_temperature: ch(35.0),
        motor_temperature: ch(40.0),
        ..Default::default()
    };
    snapshot.imu.yaw_rate = ch(0.0);
    snapshot.imu.lateral_accel = ch(0.0);
    snapshot.imu.longitudinal_accel = ch(0.0);
    for pos in WheelPosition::ALL {
        snapshot.wheel_speeds[pos] = ch(wheel_speeds_kmh[pos.index()]);
        snapshot.wheel_pressures[pos] = ch(8.0);
    }
    snapshot
}

// ─── Actuators ──────────────────────────────────────────────────────

/// Everything the control core commanded, for inspection.
#[derive(Debug, Clone, Default)]
pub struct ActuatorLog {
    /// Last commanded pressure per wheel.
    pub wheel_pressures: WheelArray<f32>,
    /// Total pressure commands issued.
    pub pressure_commands: u32,
    /// Last motor command.
    pub motor: MotorCommand,
    /// Total motor commands issued.
    pub motor_commands: u32,
    /// Emergency-stop invocations.
    pub emergency_stops: u32,
    /// Shutdown invocations.
    pub shutdowns: u32,
}

/// Recording actuator sink.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuators {
    log: Rc<RefCell<ActuatorLog>>,
}

impl RecordingActuators {
    /// Fresh sink with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the log.
    pub fn log(&self) -> ActuatorLog {
        self.log.borrow().clone()
    }
}

impl ActuatorSink for RecordingActuators {
    fn set_wheel_pressure(&mut self, wheel: WheelPosition, pressure: f32) -> Result<(), EcuError> {
        let mut log = self.log.borrow_mut();
        log.wheel_pressures[wheel] = pressure;
        log.pressure_commands += 1;
        Ok(())
    }

    fn set_motor_command(&mut self, command: &MotorCommand) -> Result<(), EcuError> {
        let mut log = self.log.borrow_mut();
        log.motor = *command;
        log.motor_commands += 1;
        Ok(())
    }

    fn emergency_stop(&mut self) {
        self.log.borrow_mut().emergency_stops += 1;
    }

    fn shutdown(&mut self) -> Result<(), EcuError> {
        self.log.borrow_mut().shutdowns += 1;
        Ok(())
    }
}

// ─── Comms ──────────────────────────────────────────────────────────

/// Everything sent over the bus.
#[derive(Debug, Clone, Default)]
pub struct CommsLog {
    /// DTC notifications as `(wire code, confirmed)`.
    pub dtcs: Vec<(u16, bool)>,
    /// Shutdown notifications sent.
    pub shutdown_notifications: u32,
}

/// Recording communication sink.
#[derive(Debug, Clone, Default)]
pub struct RecordingComms {
    log: Rc<RefCell<CommsLog>>,
}

impl RecordingComms {
    /// Fresh sink with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the log.
    pub fn log(&self) -> CommsLog {
        self.log.borrow().clone()
    }
}

impl CommsSink for RecordingComms {
    fn send_dtc(&mut self, code: u16, confirmed: bool) -> Result<(), EcuError> {
        self.log.borrow_mut().dtcs.push((code, confirmed));
        Ok(())
    }

    fn send_shutdown_notification(&mut self) -> Result<(), EcuError> {
        self.log.borrow_mut().shutdown_notifications += 1;
        Ok(())
    }
}

// ─── Watchdog hardware ──────────────────────────────────────────────

/// Counting watchdog peripheral double.
#[derive(Debug, Clone, Default)]
pub struct SimWatchdogHw {
    refreshes: Rc<RefCell<[u32; WatchdogId::COUNT]>>,
}

impl SimWatchdogHw {
    /// Fresh peripheral with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes observed for one channel.
    pub fn refresh_count(&self, id: WatchdogId) -> u32 {
        self.refreshes.borrow()[id.index()]
    }
}

impl WatchdogHardware for SimWatchdogHw {
    fn refresh(&mut self, id: WatchdogId) {
        self.refreshes.borrow_mut()[id.index()] += 1;
    }
}
