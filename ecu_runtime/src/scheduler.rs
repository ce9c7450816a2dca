//! The 1 ms cooperative scheduler.
//!
//! Single-threaded, driven by an external periodic tick. Within a tick
//! the component order is fixed (safety → sensors → ABS → EPS →
//! actuators → diagnostics); sticky flags set early in a tick are visible
//! to every later component. After the supervisor reaches `Shutdown` the
//! scheduler stops calling the control laws and only re-commands the
//! manual-braking state and services the emergency watchdog.

use tracing::{error, warn};

use ecu_common::config::CalibrationConfig;
use ecu_common::consts::{
    COMMS_PERIOD_TICKS, DIAG_PERIOD_TICKS, EPS_MONITOR_PERIOD_TICKS, ESC_PERIOD_TICKS,
    TCS_PERIOD_TICKS,
};
use ecu_common::error::EcuError;
use ecu_common::hal::{
    ActuatorSink, CalibrationStore, CollaboratorTasks, CommsSink, MotorCommand, SensorProvider,
    TimeSource, WatchdogHardware, WatchdogId, tick_delta,
};
use ecu_common::sensors::SensorSnapshot;
use ecu_common::wheel::{WheelArray, WheelPosition};
use ecu_diagnostic::DiagnosticStore;
use ecu_ebs::{AbsSystem, VehicleSpeedEstimator};
use ecu_eps::EpsSystem;
use ecu_safety::{SafetyState, SafetySupervisor, Severity, Violation};

use crate::emergency::EmergencyCell;
use crate::stats::CycleStats;
use crate::validation::SnapshotValidator;

/// Tolerance for the duplicated reference-speed computation [km/h].
const DUAL_CHANNEL_SPEED_TOL: f32 = 0.1;

/// The scheduler owns every control-core singleton; there is exactly one
/// writer per datum per tick.
pub struct Scheduler<T, S, A, C, W, X>
where
    T: TimeSource,
    S: SensorProvider,
    A: ActuatorSink,
    C: CommsSink,
    W: WatchdogHardware,
    X: CollaboratorTasks,
{
    time: T,
    sensors: S,
    actuators: A,
    comms: C,
    watchdog_hw: W,
    collaborators: X,
    supervisor: SafetySupervisor,
    diag: DiagnosticStore,
    abs: AbsSystem,
    eps: EpsSystem,
    validator: SnapshotValidator,
    secondary_estimator: VehicleSpeedEstimator,
    emergency: EmergencyCell,
    stats: CycleStats,
    tick_count: u64,
}

impl<T, S, A, C, W, X> Scheduler<T, S, A, C, W, X>
where
    T: TimeSource,
    S: SensorProvider,
    A: ActuatorSink,
    C: CommsSink,
    W: WatchdogHardware,
    X: CollaboratorTasks,
{
    /// Build the pipeline from a calibration store and run every startup
    /// self-test (supervisor, ABS, EPS).
    ///
    /// # Errors
    /// `SelfTestFailed` (with the corresponding DTCs stored) when any
    /// self-test fails; the scheduler is not usable then.
    pub fn from_store(
        time: T,
        sensors: S,
        actuators: A,
        comms: C,
        watchdog_hw: W,
        collaborators: X,
        store: &dyn CalibrationStore,
    ) -> Result<Self, EcuError> {
        let config = CalibrationConfig {
            abs: store.abs_calibration()?,
            eps: store.assist_map()?,
        };
        Self::new(time, sensors, actuators, comms, watchdog_hw, collaborators, config)
    }

    /// Build the pipeline from an already-loaded calibration set.
    ///
    /// # Errors
    /// `SelfTestFailed` when any startup self-test fails.
    pub fn new(
        time: T,
        sensors: S,
        actuators: A,
        comms: C,
        watchdog_hw: W,
        collaborators: X,
        config: CalibrationConfig,
    ) -> Result<Self, EcuError> {
        let now = time.now_ms();
        let mut diag = DiagnosticStore::new();
        let mut supervisor = SafetySupervisor::new(now);
        let mut abs = AbsSystem::new(config.abs);
        let mut eps = EpsSystem::new(config.eps);

        supervisor.complete_init(now, &mut diag)?;
        abs.run_self_test(now, &mut diag)?;
        eps.init(now, &mut diag)?;

        Ok(Self {
            time,
            sensors,
            actuators,
            comms,
            watchdog_hw,
            collaborators,
            supervisor,
            diag,
            abs,
            eps,
            validator: SnapshotValidator::new(),
            secondary_estimator: VehicleSpeedEstimator::new(),
            emergency: EmergencyCell::new(),
            stats: CycleStats::new(),
            tick_count: 0,
        })
    }

    /// Execute one 1 ms tick. Returns the safety state after the tick.
    ///
    /// # Errors
    /// `Timeout` when the sensor provider failed this tick. Control-law
    /// errors are handled internally (DTCs, violations, degradation).
    pub fn tick(&mut self) -> Result<SafetyState, EcuError> {
        let now = self.time.now_ms();
        self.tick_count += 1;
        let tick = self.tick_count;

        // The emergency ISR writes a single word; honor it first.
        if self.emergency.shutdown_requested()
            && self.supervisor.state() != SafetyState::Shutdown
        {
            error!("emergency shutdown requested from interrupt context");
            self.supervisor.graceful_shutdown(
                now,
                &mut self.diag,
                &mut self.actuators,
                &mut self.comms,
            );
            self.eps.shutdown(now, &mut self.actuators);
        }

        // 1. Refresh the main-task watchdog.
        self.watchdog_hw.refresh(WatchdogId::MainTask);
        let _ = self.supervisor.kick(
            WatchdogId::MainTask,
            now,
            &mut self.diag,
            &mut self.actuators,
            &mut self.comms,
        );

        // 2. Safety supervisor per-cycle monitor.
        let state =
            self.supervisor
                .monitor(now, &mut self.diag, &mut self.actuators, &mut self.comms);
        if state == SafetyState::Shutdown {
            return Ok(self.shutdown_tick(now));
        }
        self.watchdog_hw.refresh(WatchdogId::SafetyTask);
        let _ = self.supervisor.kick(
            WatchdogId::SafetyTask,
            now,
            &mut self.diag,
            &mut self.actuators,
            &mut self.comms,
        );

        // 3. Sensor snapshot, bracketed by the collaborator deadline.
        let read_start = self.time.now_ms();
        let snapshot = self.sensors.snapshot(now);
        let read_end = self.time.now_ms();
        if tick_delta(read_end, read_start) > 0 {
            // The 0.5 ms budget is below tick resolution; crossing a tick
            // boundary proves the deadline was missed.
            self.supervisor.report_violation(
                Violation::Timing,
                Severity::Medium,
                read_end,
                &mut self.diag,
                &mut self.actuators,
                &mut self.comms,
            );
        }
        let mut snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(EcuError::Timeout) => {
                self.supervisor.report_violation(
                    Violation::Timing,
                    Severity::Medium,
                    now,
                    &mut self.diag,
                    &mut self.actuators,
                    &mut self.comms,
                );
                return Err(EcuError::Timeout);
            }
            Err(e) => {
                self.supervisor.report_violation(
                    Violation::Integrity,
                    Severity::Critical,
                    now,
                    &mut self.diag,
                    &mut self.actuators,
                    &mut self.comms,
                );
                return Err(e);
            }
        };

        // 4. Validate the snapshot before any control law sees it.
        let abs_states = WheelArray::from_fn(|pos| self.abs.wheel(pos).state);
        self.validator
            .validate(&mut snapshot, &abs_states, now, &mut self.diag);

        // 5. ABS control, every tick.
        match self
            .abs
            .control(&snapshot, now, &mut self.actuators, &mut self.diag)
        {
            Ok(()) => {
                self.submit_reference_speed_channels(&snapshot);
            }
            Err(EcuError::Fault) => {
                // All four wheel sensors lost: system integrity failure.
                self.supervisor.report_violation(
                    Violation::Integrity,
                    Severity::Critical,
                    now,
                    &mut self.diag,
                    &mut self.actuators,
                    &mut self.comms,
                );
                if self.supervisor.state() == SafetyState::Shutdown {
                    self.eps.shutdown(now, &mut self.actuators);
                    return Ok(SafetyState::Shutdown);
                }
            }
            Err(e) => warn!(?e, "ABS control error"),
        }
        self.watchdog_hw.refresh(WatchdogId::AbsTask);
        let _ = self.supervisor.kick(
            WatchdogId::AbsTask,
            now,
            &mut self.diag,
            &mut self.actuators,
            &mut self.comms,
        );

        // 6. Collaborator periodicities.
        if tick % ESC_PERIOD_TICKS == 0 {
            self.collaborators.esc_task(&snapshot, now);
        }
        if tick % TCS_PERIOD_TICKS == 0 {
            self.collaborators.tcs_task(&snapshot, now);
        }
        if tick % COMMS_PERIOD_TICKS == 0 {
            self.diag.process_pending(now, &mut self.comms);
            self.watchdog_hw.refresh(WatchdogId::CommsTask);
            let _ = self.supervisor.kick(
                WatchdogId::CommsTask,
                now,
                &mut self.diag,
                &mut self.actuators,
                &mut self.comms,
            );
        }

        // 7. EPS main task, every tick.
        if let Err(e) = self
            .eps
            .main_task(&snapshot, now, &mut self.actuators, &mut self.diag)
        {
            warn!(?e, "EPS main task error");
        }
        self.watchdog_hw.refresh(WatchdogId::EpsTask);
        let _ = self.supervisor.kick(
            WatchdogId::EpsTask,
            now,
            &mut self.diag,
            &mut self.actuators,
            &mut self.comms,
        );

        // 8. EPS safety monitor.
        if tick % EPS_MONITOR_PERIOD_TICKS == 0 {
            let safe = self.supervisor.is_system_safe();
            self.eps
                .safety_monitor(safe, now, &mut self.actuators, &mut self.diag);
        }

        // 9. Diagnostic housekeeping.
        if tick % DIAG_PERIOD_TICKS == 0 {
            self.diag.update(now);
            self.eps.diagnostic_task(&self.diag, now);
            self.watchdog_hw.refresh(WatchdogId::DiagTask);
            let _ = self.supervisor.kick(
                WatchdogId::DiagTask,
                now,
                &mut self.diag,
                &mut self.actuators,
                &mut self.comms,
            );
        }

        // Execution-time bookkeeping; spilling past the tick is an
        // overrun the next monitor call escalates.
        let elapsed = tick_delta(self.time.now_ms(), now);
        self.stats.record(elapsed);

        Ok(self.supervisor.state())
    }

    /// Duplicate the reference-speed computation on an independent
    /// estimator instance and hand both results to the dual-channel
    /// monitor. Divergence indicates corruption of either channel.
    fn submit_reference_speed_channels(&mut self, snapshot: &SensorSnapshot) {
        let speeds = WheelArray::from_fn(|pos| {
            snapshot.wheel_speeds[pos]
                .value_if_valid()
                .filter(|v| (0.0..=ecu_common::consts::MAX_WHEEL_SPEED_KMH).contains(v))
        });
        let secondary = self.secondary_estimator.estimate(&speeds);
        self.supervisor.submit_dual_channel(
            self.abs.vehicle_speed(),
            secondary,
            DUAL_CHANNEL_SPEED_TOL,
        );
    }

    /// Post-shutdown tick: hold manual braking, keep the motor off and
    /// service only the emergency watchdog.
    fn shutdown_tick(&mut self, now: u32) -> SafetyState {
        for wheel in WheelPosition::ALL {
            let _ = self.actuators.set_wheel_pressure(wheel, 1.0);
        }
        let _ = self.actuators.set_motor_command(&MotorCommand {
            target_torque_nm: 0.0,
            current_limit_a: 0.0,
            enable: false,
            timestamp: now,
            pwm_duty: [0, 0, 0],
        });
        self.watchdog_hw.refresh(WatchdogId::Emergency);
        self.supervisor.kick_emergency(now);
        SafetyState::Shutdown
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The emergency-shutdown word, for ISR registration and tests.
    pub fn emergency_cell(&self) -> &EmergencyCell {
        &self.emergency
    }

    /// Safety supervisor.
    pub fn supervisor(&self) -> &SafetySupervisor {
        &self.supervisor
    }

    /// Diagnostic store.
    pub fn diagnostics(&self) -> &DiagnosticStore {
        &self.diag
    }

    /// Mutable diagnostic store (persistence, DTC clearing tools).
    pub fn diagnostics_mut(&mut self) -> &mut DiagnosticStore {
        &mut self.diag
    }

    /// ABS core.
    pub fn abs(&self) -> &AbsSystem {
        &self.abs
    }

    /// One wheel's ABS control state.
    pub fn wheel_state(&self, pos: WheelPosition) -> &ecu_ebs::AbsWheelState {
        self.abs.wheel(pos)
    }

    /// EPS core.
    pub fn eps(&self) -> &EpsSystem {
        &self.eps
    }

    /// Execution statistics.
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Ticks executed.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
