//! ABS system aggregate: four wheels, the reference-speed estimator and
//! the 1 ms control entry point.

use tracing::warn;

use ecu_common::calib::AbsCalibration;
use ecu_common::diag::{DiagEventKind, DtcCode};
use ecu_common::error::EcuError;
use ecu_common::hal::ActuatorSink;
use ecu_common::sensors::SensorSnapshot;
use ecu_common::wheel::{WheelArray, WheelPosition};
use ecu_diagnostic::DiagnosticStore;

use crate::modulation::modulate;
use crate::selftest::algorithm_self_test;
use crate::speed::VehicleSpeedEstimator;
use crate::state::AbsState;
use crate::wheel::{AbsWheelState, StateChange};

/// The ABS control core.
#[derive(Debug)]
pub struct AbsSystem {
    wheels: WheelArray<AbsWheelState>,
    estimator: VehicleSpeedEstimator,
    calibration: AbsCalibration,
    vehicle_speed: f32,
    enabled: bool,
    any_wheel_active: bool,
    activation_count: u32,
    self_test_passed: bool,
}

impl AbsSystem {
    /// Build the system from a calibration set. The algorithm self-test
    /// has not run yet; activation stays blocked until it passes.
    pub fn new(calibration: AbsCalibration) -> Self {
        Self {
            wheels: WheelArray::from_fn(|_| AbsWheelState::new()),
            estimator: VehicleSpeedEstimator::new(),
            calibration,
            vehicle_speed: 0.0,
            enabled: true,
            any_wheel_active: false,
            activation_count: 0,
            self_test_passed: false,
        }
    }

    /// Run the algorithm self-test; failure stores the
    /// `AlgorithmSelfTestFailed` DTC and keeps activation blocked.
    pub fn run_self_test(
        &mut self,
        now: u32,
        diag: &mut DiagnosticStore,
    ) -> Result<(), EcuError> {
        match algorithm_self_test(&self.calibration) {
            Ok(()) => {
                self.self_test_passed = true;
                Ok(())
            }
            Err(e) => {
                self.self_test_passed = false;
                let _ = diag.set_dtc(DtcCode::AlgorithmSelfTestFailed, now);
                Err(e)
            }
        }
    }

    /// Main ABS control function, called every 1 ms tick.
    ///
    /// # Errors
    /// - `NotInitialized` while the system is disabled.
    /// - `Fault` when all four wheel sensors are lost this tick (the
    ///   caller escalates this as an Integrity violation).
    pub fn control<A: ActuatorSink>(
        &mut self,
        snapshot: &SensorSnapshot,
        now: u32,
        actuators: &mut A,
        diag: &mut DiagnosticStore,
    ) -> Result<(), EcuError> {
        if !self.enabled {
            return Err(EcuError::NotInitialized);
        }

        // Validate wheel samples; a failing sample latches the wheel fault.
        let mut speeds: WheelArray<Option<f32>> = WheelArray::from_fn(|_| None);
        let mut valid_wheels = 0u32;
        for pos in WheelPosition::ALL {
            let channel = snapshot.wheel_speeds[pos];
            let sample = channel
                .value_if_valid()
                .filter(|v| (0.0..=ecu_common::consts::MAX_WHEEL_SPEED_KMH).contains(v));
            let wheel = &mut self.wheels[pos];
            match sample {
                Some(v) => {
                    speeds[pos] = Some(v);
                    valid_wheels += 1;
                    wheel.fault = false;
                }
                None => {
                    if !wheel.fault {
                        wheel.fault = true;
                        wheel.stats.fault_count += 1;
                        let _ = diag.set_dtc(DtcCode::WheelSpeedSensor(pos), now);
                        diag.log_event(DiagEventKind::SensorFault, pos.index() as u32, now);
                    }
                }
            }
        }
        if valid_wheels == 0 {
            return Err(EcuError::Fault);
        }

        self.vehicle_speed = self.estimator.estimate(&speeds);
        self.any_wheel_active = false;

        for pos in WheelPosition::ALL {
            let cal = self.calibration.wheels[pos];
            if !cal.enabled {
                continue;
            }

            let wheel = &mut self.wheels[pos];
            if let Some(speed) = speeds[pos] {
                wheel.update_measurements(speed, self.vehicle_speed);
            }

            let change = wheel.step(
                self.vehicle_speed,
                &cal,
                self.calibration.min_activation_speed,
                self.self_test_passed,
                now,
            );
            match change {
                StateChange::Activated { from_inactive } => {
                    self.activation_count += 1;
                    if from_inactive {
                        diag.log_event(DiagEventKind::AbsActivation, pos.index() as u32, now);
                    }
                }
                StateChange::Faulted => {
                    warn!(wheel = pos.label(), "wheel reverted to manual pressure");
                }
                _ => {}
            }

            match wheel.state {
                AbsState::Active => {
                    let pressure = modulate(wheel, &cal, now);
                    if actuators.set_wheel_pressure(pos, pressure).is_err() {
                        warn!(wheel = pos.label(), "pressure command rejected");
                    }
                }
                AbsState::Fault => {
                    wheel.pressure_command = 1.0;
                    if actuators.set_wheel_pressure(pos, 1.0).is_err() {
                        warn!(wheel = pos.label(), "manual pressure command rejected");
                    }
                }
                _ => {}
            }

            wheel.update_statistics(now);
            if wheel.state == AbsState::Active && !wheel.fault {
                self.any_wheel_active = true;
            }
        }

        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Current wheel state.
    pub fn wheel(&self, pos: WheelPosition) -> &AbsWheelState {
        &self.wheels[pos]
    }

    /// Mutable wheel state (calibration/bring-up tooling).
    pub fn wheel_mut(&mut self, pos: WheelPosition) -> &mut AbsWheelState {
        &mut self.wheels[pos]
    }

    /// Filtered vehicle reference speed [km/h].
    #[inline]
    pub const fn vehicle_speed(&self) -> f32 {
        self.vehicle_speed
    }

    /// True while any non-faulted wheel is modulating.
    #[inline]
    pub const fn is_active(&self) -> bool {
        self.any_wheel_active
    }

    /// Cumulative activation count across all wheels.
    #[inline]
    pub const fn activation_count(&self) -> u32 {
        self.activation_count
    }

    /// Whether the algorithm self-test has passed.
    #[inline]
    pub const fn self_test_passed(&self) -> bool {
        self.self_test_passed
    }

    /// Enable or disable the whole system.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Active calibration.
    pub fn calibration(&self) -> &AbsCalibration {
        &self.calibration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_common::hal::MotorCommand;
    use ecu_common::sensors::SensorChannel;

    #[derive(Default)]
    struct TestActuators {
        pressures: std::vec::Vec<(WheelPosition, f32)>,
    }

    impl ActuatorSink for TestActuators {
        fn set_wheel_pressure(&mut self, wheel: WheelPosition, p: f32) -> Result<(), EcuError> {
            self.pressures.push((wheel, p));
            Ok(())
        }
        fn set_motor_command(&mut self, _command: &MotorCommand) -> Result<(), EcuError> {
            Ok(())
        }
        fn emergency_stop(&mut self) {}
        fn shutdown(&mut self) -> Result<(), EcuError> {
            Ok(())
        }
    }

    fn snapshot(speeds: [f32; 4], now: u32) -> SensorSnapshot {
        let mut snap = SensorSnapshot {
            timestamp: now,
            ..Default::default()
        };
        for pos in WheelPosition::ALL {
            snap.wheel_speeds[pos] = SensorChannel::good(speeds[pos.index()], now);
        }
        snap
    }

    fn ready_system(diag: &mut DiagnosticStore) -> AbsSystem {
        let mut abs = AbsSystem::new(AbsCalibration::default());
        abs.run_self_test(0, diag).unwrap();
        abs
    }

    #[test]
    fn straight_driving_stays_inactive() {
        let mut diag = DiagnosticStore::new();
        let mut abs = ready_system(&mut diag);
        let mut act = TestActuators::default();

        for t in 1..200u32 {
            abs.control(&snapshot([50.0; 4], t), t, &mut act, &mut diag)
                .unwrap();
        }
        assert!(!abs.is_active());
        assert_eq!(abs.activation_count(), 0);
        assert!(act.pressures.is_empty());
        assert!((abs.vehicle_speed() - 50.0).abs() < 0.5);
    }

    #[test]
    fn locking_wheel_activates_and_reduces_pressure() {
        let mut diag = DiagnosticStore::new();
        let mut abs = ready_system(&mut diag);
        let mut act = TestActuators::default();

        // Let the reference speed settle first.
        for t in 1..200u32 {
            abs.control(&snapshot([50.0; 4], t), t, &mut act, &mut diag)
                .unwrap();
        }
        // FR drops to 20 km/h: slip well above threshold against the
        // (max + mean) / 2 = 46.25 km/h reference.
        let mut activated_at = None;
        for t in 200..400u32 {
            abs.control(&snapshot([50.0, 20.0, 50.0, 50.0], t), t, &mut act, &mut diag)
                .unwrap();
            if activated_at.is_none()
                && abs.wheel(WheelPosition::FrontRight).state == AbsState::Active
            {
                activated_at = Some(t);
            }
        }
        let t0 = activated_at.expect("FR wheel should activate");
        assert!(abs.is_active());
        assert!(abs.activation_count() >= 1);
        assert_eq!(diag.events().count_of(DiagEventKind::AbsActivation), 1);
        // First modulation step: 0.8 × 1.0.
        let fr_first = act
            .pressures
            .iter()
            .find(|(p, _)| *p == WheelPosition::FrontRight)
            .unwrap();
        assert!((fr_first.1 - 0.8).abs() < 1e-6);
        // Reference speed settles to (50 + 42.5) / 2.
        assert!(
            (abs.vehicle_speed() - 46.25).abs() < 0.5,
            "v = {}",
            abs.vehicle_speed()
        );
        // Activation happened promptly after the drop.
        assert!(t0 < 260);
    }

    #[test]
    fn pressure_commands_stay_bounded_over_long_runs() {
        let mut diag = DiagnosticStore::new();
        let mut abs = ready_system(&mut diag);
        let mut act = TestActuators::default();

        for t in 1..2000u32 {
            // Alternate slip on and off to force modulation cycles.
            let fr = if (t / 50) % 2 == 0 { 20.0 } else { 48.0 };
            abs.control(&snapshot([50.0, fr, 50.0, 50.0], t), t, &mut act, &mut diag)
                .unwrap();
            for pos in WheelPosition::ALL {
                let p = abs.wheel(pos).pressure_command;
                assert!((0.0..=1.0).contains(&p), "pressure {p} out of range");
            }
        }
        for &(_, p) in &act.pressures {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn invalid_sensor_faults_wheel_and_commands_full_pressure() {
        let mut diag = DiagnosticStore::new();
        let mut abs = ready_system(&mut diag);
        let mut act = TestActuators::default();

        let mut snap = snapshot([50.0; 4], 1);
        snap.wheel_speeds[WheelPosition::RearLeft] = SensorChannel::invalid(50.0, 1);
        abs.control(&snap, 1, &mut act, &mut diag).unwrap();

        let rl = abs.wheel(WheelPosition::RearLeft);
        assert!(rl.fault);
        assert_eq!(rl.stats.fault_count, 1);
        assert!(diag.is_active(DtcCode::WheelSpeedSensor(WheelPosition::RearLeft)));
        // The wheel is not yet in Fault state (it was Inactive), but once
        // there it must command 1.0; drive it through the arc.
        let mut snap2 = snapshot([50.0; 4], 2);
        snap2.wheel_speeds[WheelPosition::RearLeft] = SensorChannel::invalid(50.0, 2);
        abs.control(&snap2, 2, &mut act, &mut diag).unwrap();
        assert!(!abs.is_active());
    }

    #[test]
    fn all_sensors_lost_reports_fault() {
        let mut diag = DiagnosticStore::new();
        let mut abs = ready_system(&mut diag);
        let mut act = TestActuators::default();

        let mut snap = SensorSnapshot::default();
        snap.timestamp = 1;
        assert_eq!(
            abs.control(&snap, 1, &mut act, &mut diag),
            Err(EcuError::Fault)
        );
    }

    #[test]
    fn disabled_wheel_is_skipped() {
        let mut diag = DiagnosticStore::new();
        let mut cal = AbsCalibration::default();
        cal.wheels[WheelPosition::FrontRight].enabled = false;
        let mut abs = AbsSystem::new(cal);
        abs.run_self_test(0, &mut diag).unwrap();
        let mut act = TestActuators::default();

        for t in 1..400u32 {
            abs.control(&snapshot([50.0, 20.0, 50.0, 50.0], t), t, &mut act, &mut diag)
                .unwrap();
        }
        assert_eq!(abs.wheel(WheelPosition::FrontRight).state, AbsState::Inactive);
        assert_eq!(abs.activation_count(), 0);
    }

    #[test]
    fn disabled_system_rejects_control() {
        let mut diag = DiagnosticStore::new();
        let mut abs = ready_system(&mut diag);
        let mut act = TestActuators::default();
        abs.set_enabled(false);
        assert_eq!(
            abs.control(&snapshot([50.0; 4], 1), 1, &mut act, &mut diag),
            Err(EcuError::NotInitialized)
        );
    }
}
