//! Contracts the hardware/platform side must satisfy.
//!
//! The control core routes every hardware interaction through these
//! traits: a monotonic millisecond clock, the sensor snapshot provider,
//! the hydraulic/motor actuator sink, the CAN communication sink, the
//! hardware watchdog and the read-only calibration store. Implementations
//! live outside this workspace (or in `ecu_runtime`'s simulation harness).
//!
//! # Timing Contracts
//!
//! | Operation | Max Duration | RT Constraint |
//! |-----------|--------------|---------------|
//! | `SensorProvider::snapshot` | 0.5 ms | **HARD** |
//! | `ActuatorSink::*` | 0.5 ms | **HARD** |
//! | `CommsSink::*` | 0.5 ms | **HARD** |
//! | `CalibrationStore::*` | init only | None (pre-RT) |

use crate::calib::{AbsCalibration, AssistMap};
use crate::error::EcuError;
use crate::sensors::SensorSnapshot;
use crate::wheel::WheelPosition;

/// Difference `now − earlier` on the wrapping 32-bit millisecond clock.
///
/// Correct across the ~49 day wrap-around as long as the real interval is
/// below 2³¹ ms.
#[inline]
pub const fn tick_delta(now: u32, earlier: u32) -> u32 {
    now.wrapping_sub(earlier)
}

/// Monotonically non-decreasing 32-bit millisecond tick.
pub trait TimeSource {
    /// Current tick [ms]. Wraps after ~49 days; consumers must only ever
    /// difference ticks through [`tick_delta`].
    fn now_ms(&self) -> u32;
}

/// Supplies one validated sensor snapshot per tick.
pub trait SensorProvider {
    /// Acquire the snapshot for the current tick.
    ///
    /// The provider guarantees `valid` and `quality` are set on every
    /// channel; it never blocks past the 0.5 ms collaborator budget.
    fn snapshot(&mut self, now: u32) -> Result<SensorSnapshot, EcuError>;
}

/// Command for the three-phase assist motor driver.
///
/// PWM duty cycles are zero at this layer; the downstream motor driver
/// performs the actual three-phase modulation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorCommand {
    /// Target assist torque [Nm].
    pub target_torque_nm: f32,
    /// Phase current limit [A].
    pub current_limit_a: f32,
    /// Motor output stage enable.
    pub enable: bool,
    /// Command timestamp [ms tick].
    pub timestamp: u32,
    /// Per-phase PWM duty cycles, always zero here.
    pub pwm_duty: [u16; 3],
}

/// Hydraulic and motor actuator sink.
pub trait ActuatorSink {
    /// Command one wheel's brake pressure, `pressure ∈ [0, 1]` scaling the
    /// maximum hydraulic pressure.
    fn set_wheel_pressure(&mut self, wheel: WheelPosition, pressure: f32)
    -> Result<(), EcuError>;

    /// Command the assist motor.
    fn set_motor_command(&mut self, command: &MotorCommand) -> Result<(), EcuError>;

    /// Immediately force all actuators passive. Idempotent and callable
    /// from the emergency interrupt context.
    fn emergency_stop(&mut self);

    /// Transition the hydraulics to the safe passive state.
    fn shutdown(&mut self) -> Result<(), EcuError>;
}

/// CAN communication sink.
///
/// Both operations must tolerate being called while the system is entering
/// shutdown.
pub trait CommsSink {
    /// Notify the bus of a stored or confirmed DTC.
    fn send_dtc(&mut self, code: u16, confirmed: bool) -> Result<(), EcuError>;

    /// Broadcast the shutdown notification.
    fn send_shutdown_notification(&mut self) -> Result<(), EcuError>;
}

/// Identifies one supervised watchdog channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WatchdogId {
    /// Main 1 ms control task.
    MainTask = 0,
    /// Safety supervisor task.
    SafetyTask = 1,
    /// ABS control task.
    AbsTask = 2,
    /// EPS control task.
    EpsTask = 3,
    /// Communication task.
    CommsTask = 4,
    /// Diagnostic task.
    DiagTask = 5,
    /// Emergency loop; the only watchdog serviced after shutdown.
    Emergency = 6,
}

impl WatchdogId {
    /// All channels in index order.
    pub const ALL: [Self; 7] = [
        Self::MainTask,
        Self::SafetyTask,
        Self::AbsTask,
        Self::EpsTask,
        Self::CommsTask,
        Self::DiagTask,
        Self::Emergency,
    ];

    /// Number of watchdog channels.
    pub const COUNT: usize = Self::ALL.len();

    /// Array index of this channel.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Hardware watchdog peripheral; resets the ECU when starved.
pub trait WatchdogHardware {
    /// Service one watchdog channel.
    fn refresh(&mut self, id: WatchdogId);
}

/// Read-only access to the persisted calibration tables.
pub trait CalibrationStore {
    /// ABS per-wheel calibration.
    fn abs_calibration(&self) -> Result<AbsCalibration, EcuError>;

    /// EPS 10×8 base-assist map.
    fn assist_map(&self) -> Result<AssistMap, EcuError>;
}

/// Hook points for the stability/traction collaborators.
///
/// Their control laws are out of scope; the scheduler only honors their
/// periodicities (ESC every 5 ticks, TCS every 10).
pub trait CollaboratorTasks {
    /// ESC task slot, invoked every 5 ticks.
    fn esc_task(&mut self, _snapshot: &SensorSnapshot, _now: u32) {}

    /// TCS task slot, invoked every 10 ticks.
    fn tcs_task(&mut self, _snapshot: &SensorSnapshot, _now: u32) {}
}

/// Default no-op collaborators.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCollaborators;

impl CollaboratorTasks for NoopCollaborators {}
