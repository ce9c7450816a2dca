//! EPS system aggregate: mode management, the 1 ms main task and the
//! safety monitor.

use tracing::{info, warn};

use ecu_common::calib::AssistMap;
use ecu_common::consts::{EPS_CURRENT_LIMIT_DEGRADED_A, EPS_CURRENT_LIMIT_NORMAL_A};
use ecu_common::diag::{DiagEventKind, DtcCode};
use ecu_common::error::EcuError;
use ecu_common::hal::{ActuatorSink, MotorCommand};
use ecu_common::sensors::SensorSnapshot;
use ecu_diagnostic::DiagnosticStore;

use crate::assist::{AssistInputs, AssistanceParams, calculate_assistance};
use crate::limits::SafetyLimiter;
use crate::motor::build_motor_command;
use crate::selftest::eps_self_test;
use crate::state::{EpsSystemState, OperatingMode, SystemStatus};

/// The EPS control core.
#[derive(Debug)]
pub struct EpsSystem {
    state: EpsSystemState,
    map: AssistMap,
    limiter: SafetyLimiter,
    last_params: AssistanceParams,
}

impl EpsSystem {
    /// Build the system around a base-assist map; stays in `Init` until
    /// [`EpsSystem::init`] passes the self-test.
    pub fn new(map: AssistMap) -> Self {
        Self {
            state: EpsSystemState::new(),
            map,
            limiter: SafetyLimiter::new(),
            last_params: AssistanceParams::default(),
        }
    }

    /// Run the self-test and enter `Normal`/`Ready` with assistance on.
    ///
    /// # Errors
    /// `SelfTestFailed` (and an `AlgorithmSelfTestFailed` DTC): the system
    /// latches `Fault` with assistance off.
    pub fn init(&mut self, now: u32, diag: &mut DiagnosticStore) -> Result<(), EcuError> {
        match eps_self_test(&self.map) {
            Ok(()) => {
                self.state.enter_mode(OperatingMode::Normal);
                self.state.status = SystemStatus::Ready;
                info!("EPS self-test passed, assistance enabled");
                Ok(())
            }
            Err(e) => {
                let _ = diag.set_dtc(DtcCode::AlgorithmSelfTestFailed, now);
                self.state.record_fault(now);
                self.state.status = SystemStatus::Fault;
                Err(e)
            }
        }
    }

    /// Main cyclic task, called every 1 ms tick.
    ///
    /// # Errors
    /// `InvalidParam` when a required sensor channel is invalid this tick
    /// (the fault counter is bumped and no torque is commanded).
    pub fn main_task<A: ActuatorSink>(
        &mut self,
        snapshot: &SensorSnapshot,
        now: u32,
        actuators: &mut A,
        diag: &mut DiagnosticStore,
    ) -> Result<(), EcuError> {
        self.state.uptime_ticks = self.state.uptime_ticks.wrapping_add(1);

        if !self.state.assistance_enabled() {
            // FailSafe / Sleep / Init: keep the motor demonstrably off.
            self.limiter.reset();
            self.last_params = AssistanceParams::limited_zero(now);
            let cmd = self.disabled_command(now);
            if actuators.set_motor_command(&cmd).is_err() {
                warn!("disabled motor command rejected");
            }
            return Ok(());
        }

        let inputs = match self.gather_inputs(snapshot, now, diag) {
            Some(inputs) => inputs,
            None => {
                self.state.record_fault(now);
                if self.state.status != SystemStatus::Fault {
                    self.state.status = SystemStatus::Degraded;
                }
                return Err(EcuError::InvalidParam);
            }
        };

        let mut params = match calculate_assistance(&self.map, &inputs, now) {
            Ok(params) => params,
            Err(EcuError::DirectionMismatch) => {
                let _ = diag.set_dtc(DtcCode::AssistDirectionMismatch, now);
                self.state.record_fault(now);
                AssistanceParams::limited_zero(now)
            }
            Err(e) => return Err(e),
        };

        self.limiter.apply(&mut params, diag, now);

        let cmd = build_motor_command(&params, &self.state, now);
        if actuators.set_motor_command(&cmd).is_err() {
            warn!("motor command rejected");
            self.state.record_fault(now);
        }
        self.last_params = params;

        if self.state.status != SystemStatus::Fault
            && self.state.status != SystemStatus::Degraded
        {
            self.state.status = SystemStatus::Active;
        }
        Ok(())
    }

    /// Safety monitor task (10 ms): forces `FailSafe` while the safety
    /// supervisor reports the system unsafe.
    pub fn safety_monitor<A: ActuatorSink>(
        &mut self,
        system_safe: bool,
        now: u32,
        actuators: &mut A,
        diag: &mut DiagnosticStore,
    ) {
        if !system_safe && self.state.mode != OperatingMode::FailSafe {
            self.enter_fail_safe(now, actuators, diag);
        }
    }

    /// Mode change request handling.
    ///
    /// `Normal` is refused from `FailSafe`; `Init` requests are ignored.
    pub fn request_mode<A: ActuatorSink>(
        &mut self,
        requested: OperatingMode,
        now: u32,
        actuators: &mut A,
        diag: &mut DiagnosticStore,
    ) {
        match requested {
            OperatingMode::Normal => {
                if self.state.mode != OperatingMode::FailSafe {
                    self.state.enter_mode(OperatingMode::Normal);
                    self.state.status = SystemStatus::Active;
                }
            }
            OperatingMode::Degraded => {
                self.state.enter_mode(OperatingMode::Degraded);
                self.state.status = SystemStatus::Degraded;
            }
            OperatingMode::FailSafe => {
                self.enter_fail_safe(now, actuators, diag);
            }
            OperatingMode::Sleep => {
                self.state.enter_mode(OperatingMode::Sleep);
                self.state.status = SystemStatus::Sleep;
                let cmd = self.disabled_command(now);
                if actuators.set_motor_command(&cmd).is_err() {
                    warn!("sleep motor command rejected");
                }
            }
            OperatingMode::Init => {}
        }
    }

    /// Shutdown entry point: assistance off, low-power state.
    pub fn shutdown<A: ActuatorSink>(&mut self, now: u32, actuators: &mut A) {
        self.state.enter_mode(OperatingMode::Sleep);
        self.state.status = SystemStatus::Sleep;
        let cmd = self.disabled_command(now);
        if actuators.set_motor_command(&cmd).is_err() {
            warn!("shutdown motor command rejected");
        }
    }

    /// Diagnostic task (100 ms): mirror persistent faults into the state.
    pub fn diagnostic_task(&mut self, diag: &DiagnosticStore, now: u32) {
        if diag.active_count() > 0 {
            self.state.last_fault_tick = now;
        }
    }

    fn enter_fail_safe<A: ActuatorSink>(
        &mut self,
        now: u32,
        actuators: &mut A,
        diag: &mut DiagnosticStore,
    ) {
        self.state.enter_mode(OperatingMode::FailSafe);
        self.state.status = SystemStatus::Fault;
        self.state.record_fault(now);
        self.limiter.reset();
        diag.log_event(
            DiagEventKind::SafetyStateChange,
            OperatingMode::FailSafe as u32,
            now,
        );
        warn!("EPS entering fail-safe, manual steering remains available");

        let cmd = self.disabled_command(now);
        if actuators.set_motor_command(&cmd).is_err() {
            warn!("fail-safe motor command rejected");
        }
    }

    fn disabled_command(&self, now: u32) -> MotorCommand {
        MotorCommand {
            target_torque_nm: 0.0,
            current_limit_a: if self.state.mode == OperatingMode::Degraded {
                EPS_CURRENT_LIMIT_DEGRADED_A
            } else {
                EPS_CURRENT_LIMIT_NORMAL_A
            },
            enable: false,
            timestamp: now,
            pwm_duty: [0, 0, 0],
        }
    }

    fn gather_inputs(
        &mut self,
        snapshot: &SensorSnapshot,
        now: u32,
        diag: &mut DiagnosticStore,
    ) -> Option<AssistInputs> {
        let torque = snapshot.driver_torque.value_if_valid();
        let speed = snapshot.vehicle_speed.value_if_valid();
        let angle = snapshot.steering_angle.value_if_valid();
        let velocity = snapshot.steering_velocity.value_if_valid();

        if torque.is_none() {
            let _ = diag.set_dtc(DtcCode::TorqueSensor, now);
        }
        if angle.is_none() || velocity.is_none() {
            let _ = diag.set_dtc(DtcCode::SteeringAngleSensor, now);
        }

        Some(AssistInputs {
            driver_torque_nm: torque?,
            vehicle_speed_kmh: speed?,
            steering_angle_deg: angle?,
            steering_velocity_dps: velocity?,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Aggregate controller state.
    #[inline]
    pub const fn state(&self) -> &EpsSystemState {
        &self.state
    }

    /// Last tick's assist parameters.
    #[inline]
    pub const fn last_params(&self) -> &AssistanceParams {
        &self.last_params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_common::sensors::SensorChannel;
    use ecu_common::wheel::WheelPosition;

    #[derive(Default)]
    struct TestActuators {
        motor_commands: std::vec::Vec<MotorCommand>,
    }

    impl ActuatorSink for TestActuators {
        fn set_wheel_pressure(&mut self, _w: WheelPosition, _p: f32) -> Result<(), EcuError> {
            Ok(())
        }
        fn set_motor_command(&mut self, command: &MotorCommand) -> Result<(), EcuError> {
            self.motor_commands.push(*command);
            Ok(())
        }
        fn emergency_stop(&mut self) {}
        fn shutdown(&mut self) -> Result<(), EcuError> {
            Ok(())
        }
    }

    fn snapshot(torque: f32, speed: f32, angle: f32, velocity: f32, now: u32) -> SensorSnapshot {
        SensorSnapshot {
            timestamp: now,
            driver_torque: SensorChannel::good(torque, now),
            vehicle_speed: SensorChannel::good(speed, now),
            steering_angle: SensorChannel::good(angle, now),
            steering_velocity: SensorChannel::good(velocity, now),
            ..Default::default()
        }
    }

    fn ready_system(diag: &mut DiagnosticStore) -> EpsSystem {
        let mut eps = EpsSystem::new(AssistMap::default());
        eps.init(0, diag).unwrap();
        eps
    }

    #[test]
    fn init_enables_assistance() {
        let mut diag = DiagnosticStore::new();
        let eps = ready_system(&mut diag);
        assert_eq!(eps.state().mode, OperatingMode::Normal);
        assert_eq!(eps.state().status, SystemStatus::Ready);
        assert!(eps.state().assistance_enabled());
    }

    #[test]
    fn mid_speed_tick_produces_reference_torque() {
        let mut diag = DiagnosticStore::new();
        let mut eps = ready_system(&mut diag);
        let mut act = TestActuators::default();

        // Ramp the torque up over a few ticks so the rate limit is quiet.
        eps.main_task(&snapshot(3.0, 50.0, 10.0, 5.0, 1), 1, &mut act, &mut diag)
            .unwrap();
        eps.main_task(&snapshot(3.0, 50.0, 10.0, 5.0, 2), 2, &mut act, &mut diag)
            .unwrap();

        let params = eps.last_params();
        assert!((params.total_nm - 1.567).abs() < 0.01, "total = {}", params.total_nm);
        assert!(!params.safety_limited);
        assert!(!params.rate_limited);
        assert!(!params.oscillation_detected);

        let cmd = act.motor_commands.last().unwrap();
        assert!(cmd.enable);
        assert_eq!(cmd.current_limit_a, EPS_CURRENT_LIMIT_NORMAL_A);
        assert!((cmd.target_torque_nm - params.total_nm).abs() < 1e-6);
        assert_eq!(eps.state().status, SystemStatus::Active);
    }

    #[test]
    fn degraded_mode_limits_current() {
        let mut diag = DiagnosticStore::new();
        let mut eps = ready_system(&mut diag);
        let mut act = TestActuators::default();

        eps.request_mode(OperatingMode::Degraded, 1, &mut act, &mut diag);
        eps.main_task(&snapshot(2.0, 30.0, 0.0, 0.0, 2), 2, &mut act, &mut diag)
            .unwrap();

        let cmd = act.motor_commands.last().unwrap();
        assert_eq!(cmd.current_limit_a, EPS_CURRENT_LIMIT_DEGRADED_A);
        assert!(cmd.enable);
    }

    #[test]
    fn fail_safe_disables_motor_but_keeps_manual_steering() {
        let mut diag = DiagnosticStore::new();
        let mut eps = ready_system(&mut diag);
        let mut act = TestActuators::default();

        eps.safety_monitor(false, 5, &mut act, &mut diag);
        assert_eq!(eps.state().mode, OperatingMode::FailSafe);
        assert!(!eps.state().assistance_enabled());
        assert!(eps.state().manual_steering_available());

        // Every subsequent tick keeps the motor off.
        for t in 6..20u32 {
            eps.main_task(&snapshot(3.0, 50.0, 0.0, 0.0, t), t, &mut act, &mut diag)
                .unwrap();
            let cmd = act.motor_commands.last().unwrap();
            assert!(!cmd.enable);
            assert_eq!(cmd.target_torque_nm, 0.0);
        }
    }

    #[test]
    fn normal_request_refused_from_fail_safe() {
        let mut diag = DiagnosticStore::new();
        let mut eps = ready_system(&mut diag);
        let mut act = TestActuators::default();

        eps.safety_monitor(false, 5, &mut act, &mut diag);
        eps.request_mode(OperatingMode::Normal, 6, &mut act, &mut diag);
        assert_eq!(eps.state().mode, OperatingMode::FailSafe);
        assert!(!eps.state().assistance_enabled());
    }

    #[test]
    fn invalid_torque_sensor_degrades_without_torque_output() {
        let mut diag = DiagnosticStore::new();
        let mut eps = ready_system(&mut diag);
        let mut act = TestActuators::default();

        let mut snap = snapshot(3.0, 50.0, 0.0, 0.0, 1);
        snap.driver_torque = SensorChannel::invalid(3.0, 1);
        assert_eq!(
            eps.main_task(&snap, 1, &mut act, &mut diag),
            Err(EcuError::InvalidParam)
        );
        assert_eq!(eps.state().status, SystemStatus::Degraded);
        assert_eq!(eps.state().fault_count, 1);
        assert!(diag.is_active(DtcCode::TorqueSensor));
        assert!(act.motor_commands.is_empty());
    }

    #[test]
    fn oscillation_zeroes_output_with_dtc() {
        let mut diag = DiagnosticStore::new();
        let mut eps = ready_system(&mut diag);
        let mut act = TestActuators::default();

        // Driver torque square wave at 25 km/h: ±3 Nm alternating each
        // tick produces an alternating assist total above 2 Nm.
        let mut detected = false;
        for t in 1..=12u32 {
            let torque = if t % 2 == 0 { 3.0 } else { -3.0 };
            eps.main_task(&snapshot(torque, 25.0, 0.0, 0.0, t), t, &mut act, &mut diag)
                .unwrap();
            if eps.last_params().oscillation_detected {
                detected = true;
                assert_eq!(eps.last_params().total_nm, 0.0);
            }
        }
        assert!(detected, "oscillation must be rejected within 10 ticks");
        assert!(diag.is_active(DtcCode::AssistOscillation));
    }

    #[test]
    fn sleep_request_turns_everything_off() {
        let mut diag = DiagnosticStore::new();
        let mut eps = ready_system(&mut diag);
        let mut act = TestActuators::default();

        eps.request_mode(OperatingMode::Sleep, 3, &mut act, &mut diag);
        assert_eq!(eps.state().mode, OperatingMode::Sleep);
        assert_eq!(eps.state().status, SystemStatus::Sleep);
        assert!(!eps.state().assistance_enabled());
        assert!(!act.motor_commands.last().unwrap().enable);
    }
}
