//! Snapshot validation in front of the control laws.
//!
//! Range checks on every channel, plausibility on the slow-moving
//! references, and a stuck-at-zero detector for the wheel speed sensors
//! (the classic tone-wheel failure). A failing channel is invalidated in
//! place (its numeric value never reaches a control law) and funnels
//! into the diagnostic store.

use tracing::warn;

use ecu_common::consts::{
    MAX_BRAKE_PRESSURE_BAR, MAX_DRIVER_TORQUE_NM, MAX_LATERAL_ACCEL_MS2, MAX_STEERING_ANGLE_DEG,
    MAX_TEMPERATURE_C, MAX_WHEEL_SPEED_KMH, MAX_YAW_RATE_DPS, MIN_TEMPERATURE_C,
};
use ecu_common::diag::{DiagEventKind, DtcCode};
use ecu_common::hal::tick_delta;
use ecu_common::sensors::{SensorChannel, SensorSnapshot};
use ecu_common::wheel::{WheelArray, WheelPosition};
use ecu_diagnostic::DiagnosticStore;
use ecu_ebs::AbsState;
use ecu_safety::{TemporalWindow, plausibility_check, range_check};

/// Maximum plausible vehicle-speed change [km/h per s].
const VEHICLE_SPEED_MAX_RATE: f32 = 100.0;

/// Maximum plausible steering-angle change [deg per s].
const STEERING_ANGLE_MAX_RATE: f32 = 2000.0;

/// Wheel readings this close to zero count as "no signal" [km/h].
const WHEEL_ZERO_BAND_KMH: f32 = 0.5;

/// Vehicle speed above which a flat-zero wheel sensor is implausible.
const WHEEL_ZERO_MIN_VEHICLE_KMH: f32 = 10.0;

/// Stuck-at-zero observation window [ticks].
const WHEEL_ZERO_WINDOW: usize = 8;

/// Stateful snapshot validator.
#[derive(Debug, Default)]
pub struct SnapshotValidator {
    previous: Option<SensorSnapshot>,
    zero_windows: WheelArray<TemporalWindow<WHEEL_ZERO_WINDOW>>,
}

impl SnapshotValidator {
    /// Fresh validator with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the snapshot in place. `abs_states` excludes actively
    /// modulated wheels from the stuck-at-zero check (a locked wheel
    /// legitimately reads zero).
    pub fn validate(
        &mut self,
        snapshot: &mut SensorSnapshot,
        abs_states: &WheelArray<AbsState>,
        now: u32,
        diag: &mut DiagnosticStore,
    ) {
        // ── Range checks ────────────────────────────────────────────
        for pos in WheelPosition::ALL {
            check_range(
                &mut snapshot.wheel_speeds[pos],
                0.0,
                MAX_WHEEL_SPEED_KMH,
                Some(DtcCode::WheelSpeedSensor(pos)),
                now,
                diag,
            );
            check_range(
                &mut snapshot.wheel_pressures[pos],
                0.0,
                MAX_BRAKE_PRESSURE_BAR,
                Some(DtcCode::PressureSensorWheel(pos)),
                now,
                diag,
            );
        }
        check_range(
            &mut snapshot.master_cylinder_pressure,
            0.0,
            MAX_BRAKE_PRESSURE_BAR,
            Some(DtcCode::PressureSensorMasterCylinder),
            now,
            diag,
        );
        check_range(
            &mut snapshot.imu.yaw_rate,
            -MAX_YAW_RATE_DPS,
            MAX_YAW_RATE_DPS,
            Some(DtcCode::ImuSensor),
            now,
            diag,
        );
        check_range(
            &mut snapshot.imu.lateral_accel,
            -MAX_LATERAL_ACCEL_MS2,
            MAX_LATERAL_ACCEL_MS2,
            Some(DtcCode::ImuSensor),
            now,
            diag,
        );
        check_range(
            &mut snapshot.imu.longitudinal_accel,
            -MAX_LATERAL_ACCEL_MS2,
            MAX_LATERAL_ACCEL_MS2,
            Some(DtcCode::ImuSensor),
            now,
            diag,
        );
        check_range(
            &mut snapshot.steering_angle,
            -MAX_STEERING_ANGLE_DEG,
            MAX_STEERING_ANGLE_DEG,
            Some(DtcCode::SteeringAngleSensor),
            now,
            diag,
        );
        check_range(
            &mut snapshot.driver_torque,
            -MAX_DRIVER_TORQUE_NM,
            MAX_DRIVER_TORQUE_NM,
            Some(DtcCode::TorqueSensor),
            now,
            diag,
        );
        check_range(&mut snapshot.vehicle_speed, 0.0, MAX_WHEEL_SPEED_KMH, None, now, diag);
        check_range(
            &mut snapshot.ecu_temperature,
            MIN_TEMPERATURE_C,
            MAX_TEMPERATURE_C,
            None,
            now,
            diag,
        );
        check_range(
            &mut snapshot.motor_temperature,
            MIN_TEMPERATURE_C,
            MAX_TEMPERATURE_C,
            None,
            now,
            diag,
        );

        // ── Plausibility against the previous snapshot ──────────────
        if let Some(prev) = &self.previous {
            let dt = tick_delta(snapshot.timestamp, prev.timestamp);
            check_plausibility(
                &mut snapshot.vehicle_speed,
                &prev.vehicle_speed,
                VEHICLE_SPEED_MAX_RATE,
                dt,
                now,
                diag,
            );
            check_plausibility(
                &mut snapshot.steering_angle,
                &prev.steering_angle,
                STEERING_ANGLE_MAX_RATE,
                dt,
                now,
                diag,
            );
        }

        // ── Stuck-at-zero wheel sensors ─────────────────────────────
        let vehicle = snapshot.vehicle_speed.value_if_valid().unwrap_or(0.0);
        for pos in WheelPosition::ALL {
            let channel = &mut snapshot.wheel_speeds[pos];
            let window = &mut self.zero_windows[pos];
            let Some(v) = channel.value_if_valid() else {
                window.reset();
                continue;
            };
            let suspicious = v.abs() < WHEEL_ZERO_BAND_KMH
                && vehicle > WHEEL_ZERO_MIN_VEHICLE_KMH
                && abs_states[pos] != AbsState::Active;
            if !suspicious {
                window.reset();
                continue;
            }
            if window.observe(v, WHEEL_ZERO_BAND_KMH).is_err() {
                warn!(wheel = pos.label(), "wheel speed stuck at zero");
                invalidate(channel, Some(DtcCode::WheelSpeedSensor(pos)), now, diag);
                window.reset();
            }
        }

        self.previous = Some(*snapshot);
    }

    /// Drop the history (sensor restart).
    pub fn reset(&mut self) {
        self.previous = None;
        for (_, window) in self.zero_windows.iter_mut() {
            window.reset();
        }
    }
}

fn check_range(
    channel: &mut SensorChannel,
    lo: f32,
    hi: f32,
    dtc: Option<DtcCode>,
    now: u32,
    diag: &mut DiagnosticStore,
) {
    if let Some(v) = channel.value_if_valid() {
        if range_check(v, lo, hi).is_err() {
            invalidate(channel, dtc, now, diag);
        }
    }
}

fn check_plausibility(
    channel: &mut SensorChannel,
    previous: &SensorChannel,
    max_rate: f32,
    dt_ms: u32,
    now: u32,
    diag: &mut DiagnosticStore,
) {
    let (Some(cur), Some(prev)) = (channel.value_if_valid(), previous.value_if_valid()) else {
        return;
    };
    if plausibility_check(cur, prev, max_rate, dt_ms).is_err() {
        invalidate(channel, None, now, diag);
    }
}

fn invalidate(
    channel: &mut SensorChannel,
    dtc: Option<DtcCode>,
    now: u32,
    diag: &mut DiagnosticStore,
) {
    *channel = SensorChannel::invalid(channel.value, now);
    if let Some(code) = dtc {
        if !diag.is_active(code) {
            diag.log_event(DiagEventKind::SensorFault, u32::from(code.code()), now);
        }
        let _ = diag.set_dtc(code, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_common::sensors::SensorChannel;

    fn healthy_snapshot(now: u32) -> SensorSnapshot {
        let mut snap = SensorSnapshot {
            timestamp: now,
            master_cylinder_pressure: SensorChannel::good(20.0, now),
            steering_angle: SensorChannel::good(5.0, now),
            steering_velocity: SensorChannel::good(0.0, now),
            driver_torque: SensorChannel::good(2.0, now),
            vehicle_speed: SensorChannel::good(50.0, now),
            ecu_temperature: SensorChannel::good(40.0, now),
            motor_temperature: SensorChannel::good(45.0, now),
            ..Default::default()
        };
        snap.imu.yaw_rate = SensorChannel::good(1.0, now);
        snap.imu.lateral_accel = SensorChannel::good(0.5, now);
        snap.imu.longitudinal_accel = SensorChannel::good(-2.0, now);
        for pos in WheelPosition::ALL {
            snap.wheel_speeds[pos] = SensorChannel::good(50.0, now);
            snap.wheel_pressures[pos] = SensorChannel::good(15.0, now);
        }
        snap
    }

    fn inactive_states() -> WheelArray<AbsState> {
        WheelArray::from_fn(|_| AbsState::Inactive)
    }

    #[test]
    fn healthy_snapshot_stays_valid() {
        let mut validator = SnapshotValidator::new();
        let mut diag = DiagnosticStore::new();
        let mut snap = healthy_snapshot(1);
        validator.validate(&mut snap, &inactive_states(), 1, &mut diag);

        assert!(snap.driver_torque.valid);
        for pos in WheelPosition::ALL {
            assert!(snap.wheel_speeds[pos].valid);
        }
        assert_eq!(diag.active_count(), 0);
    }

    #[test]
    fn out_of_range_wheel_speed_is_invalidated_with_dtc() {
        let mut validator = SnapshotValidator::new();
        let mut diag = DiagnosticStore::new();
        let mut snap = healthy_snapshot(1);
        snap.wheel_speeds[WheelPosition::FrontLeft] = SensorChannel::good(350.0, 1);

        validator.validate(&mut snap, &inactive_states(), 1, &mut diag);
        assert!(!snap.wheel_speeds[WheelPosition::FrontLeft].valid);
        assert!(diag.is_active(DtcCode::WheelSpeedSensor(WheelPosition::FrontLeft)));
        assert_eq!(diag.events().count_of(DiagEventKind::SensorFault), 1);
    }

    #[test]
    fn excessive_torque_reading_is_invalidated() {
        let mut validator = SnapshotValidator::new();
        let mut diag = DiagnosticStore::new();
        let mut snap = healthy_snapshot(1);
        snap.driver_torque = SensorChannel::good(80.0, 1);

        validator.validate(&mut snap, &inactive_states(), 1, &mut diag);
        assert!(!snap.driver_torque.valid);
        assert!(diag.is_active(DtcCode::TorqueSensor));
    }

    #[test]
    fn vehicle_speed_jump_is_implausible() {
        let mut validator = SnapshotValidator::new();
        let mut diag = DiagnosticStore::new();

        let mut snap = healthy_snapshot(1);
        validator.validate(&mut snap, &inactive_states(), 1, &mut diag);

        // 30 km/h jump in 1 ms is far past 100 km/h per second.
        let mut snap = healthy_snapshot(2);
        snap.vehicle_speed = SensorChannel::good(80.0, 2);
        validator.validate(&mut snap, &inactive_states(), 2, &mut diag);
        assert!(!snap.vehicle_speed.valid);
    }

    #[test]
    fn stuck_at_zero_wheel_is_flagged_after_window() {
        let mut validator = SnapshotValidator::new();
        let mut diag = DiagnosticStore::new();

        for t in 1..=(WHEEL_ZERO_WINDOW as u32 + 2) {
            let mut snap = healthy_snapshot(t);
            snap.wheel_speeds[WheelPosition::RearRight] = SensorChannel::good(0.0, t);
            validator.validate(&mut snap, &inactive_states(), t, &mut diag);
            if t < WHEEL_ZERO_WINDOW as u32 {
                assert!(snap.wheel_speeds[WheelPosition::RearRight].valid);
            }
            if t == WHEEL_ZERO_WINDOW as u32 {
                assert!(!snap.wheel_speeds[WheelPosition::RearRight].valid);
                assert!(diag.is_active(DtcCode::WheelSpeedSensor(WheelPosition::RearRight)));
            }
        }
    }

    #[test]
    fn locked_wheel_under_abs_is_not_stuck() {
        let mut validator = SnapshotValidator::new();
        let mut diag = DiagnosticStore::new();
        let mut states = inactive_states();
        states[WheelPosition::FrontRight] = AbsState::Active;

        for t in 1..=40u32 {
            let mut snap = healthy_snapshot(t);
            snap.wheel_speeds[WheelPosition::FrontRight] = SensorChannel::good(0.0, t);
            validator.validate(&mut snap, &states, t, &mut diag);
            assert!(snap.wheel_speeds[WheelPosition::FrontRight].valid);
        }
    }

    #[test]
    fn rolling_wheel_resets_the_zero_window() {
        let mut validator = SnapshotValidator::new();
        let mut diag = DiagnosticStore::new();

        // Alternate near-zero and rolling readings: never enough
        // consecutive zeros to trip the window.
        for t in 1..=60u32 {
            let mut snap = healthy_snapshot(t);
            let v = if t % 4 == 0 { 50.0 } else { 0.0 };
            snap.wheel_speeds[WheelPosition::FrontLeft] = SensorChannel::good(v, t);
            validator.validate(&mut snap, &inactive_states(), t, &mut diag);
            assert!(snap.wheel_speeds[WheelPosition::FrontLeft].valid);
        }
    }
}
