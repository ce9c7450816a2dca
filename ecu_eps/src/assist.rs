//! Assist-torque calculation.
//!
//! Order: base map lookup → speed scaling → return-to-center → damping →
//! direction check → sum. Safety limiting happens afterwards in
//! [`crate::limits`].

use ecu_common::calib::AssistMap;
use ecu_common::consts::{
    EPS_DAMPING_COEFFICIENT, EPS_DAMPING_LIMIT_NM, EPS_HIGH_SPEED_THRESHOLD_KMH,
    EPS_LOW_SPEED_THRESHOLD_KMH, EPS_MIN_ASSIST_FACTOR, EPS_MIN_TORQUE_THRESHOLD_NM,
    EPS_RTC_GAIN, EPS_RTC_LIMIT_NM, EPS_RTC_THRESHOLD_NM, EPS_SPEED_DAMPING_FACTOR,
    EPS_SPEED_RTC_FACTOR,
};
use ecu_common::error::EcuError;
use ecu_common::math::clamp;

/// Validated inputs for one assist calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssistInputs {
    /// Driver torque at the column [Nm].
    pub driver_torque_nm: f32,
    /// Vehicle speed [km/h].
    pub vehicle_speed_kmh: f32,
    /// Steering angle [deg].
    pub steering_angle_deg: f32,
    /// Steering angular velocity [deg/s].
    pub steering_velocity_dps: f32,
}

/// Assist components and limiting flags for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AssistanceParams {
    /// Speed-scaled base assist [Nm].
    pub base_nm: f32,
    /// Return-to-center component [Nm].
    pub return_to_center_nm: f32,
    /// Damping component [Nm].
    pub damping_nm: f32,
    /// Total commanded assist [Nm].
    pub total_nm: f32,
    /// Applied speed scale factor.
    pub speed_factor: f32,
    /// Calculation timestamp [ms tick].
    pub timestamp: u32,
    /// Magnitude clamp applied this tick.
    pub safety_limited: bool,
    /// Rate limit applied this tick.
    pub rate_limited: bool,
    /// Oscillation rejection active this tick.
    pub oscillation_detected: bool,
}

impl AssistanceParams {
    /// Zero-torque parameters with the safety-limited flag set, used when
    /// the calculation itself fails.
    pub const fn limited_zero(timestamp: u32) -> Self {
        Self {
            base_nm: 0.0,
            return_to_center_nm: 0.0,
            damping_nm: 0.0,
            total_nm: 0.0,
            speed_factor: 0.0,
            timestamp,
            safety_limited: true,
            rate_limited: false,
            oscillation_detected: false,
        }
    }
}

/// Speed-sensitive assist scale: 1.0 up to 10 km/h, 0.3 from 100 km/h,
/// linear in between.
pub fn speed_factor(vehicle_speed_kmh: f32) -> f32 {
    if vehicle_speed_kmh <= EPS_LOW_SPEED_THRESHOLD_KMH {
        1.0
    } else if vehicle_speed_kmh >= EPS_HIGH_SPEED_THRESHOLD_KMH {
        EPS_MIN_ASSIST_FACTOR
    } else {
        let range = EPS_HIGH_SPEED_THRESHOLD_KMH - EPS_LOW_SPEED_THRESHOLD_KMH;
        let offset = vehicle_speed_kmh - EPS_LOW_SPEED_THRESHOLD_KMH;
        1.0 - (offset / range) * (1.0 - EPS_MIN_ASSIST_FACTOR)
    }
}

/// Return-to-center torque, active only near zero driver torque.
fn return_to_center(driver_torque_nm: f32, steering_angle_deg: f32, speed_kmh: f32) -> f32 {
    if driver_torque_nm.abs() >= EPS_RTC_THRESHOLD_NM {
        return 0.0;
    }
    let torque =
        -steering_angle_deg * EPS_RTC_GAIN * (1.0 + speed_kmh * EPS_SPEED_RTC_FACTOR);
    clamp(torque, -EPS_RTC_LIMIT_NM, EPS_RTC_LIMIT_NM)
}

/// Damping torque opposing the steering velocity.
fn damping(steering_velocity_dps: f32, speed_kmh: f32) -> f32 {
    let torque = -steering_velocity_dps
        * EPS_DAMPING_COEFFICIENT
        * (1.0 + speed_kmh * EPS_SPEED_DAMPING_FACTOR);
    clamp(torque, -EPS_DAMPING_LIMIT_NM, EPS_DAMPING_LIMIT_NM)
}

/// Compute the assist components for one tick.
///
/// # Errors
/// `DirectionMismatch` when the speed-scaled base assist opposes the
/// driver torque (the caller stores the DTC and zeroes the total).
pub fn calculate_assistance(
    map: &AssistMap,
    inputs: &AssistInputs,
    now: u32,
) -> Result<AssistanceParams, EcuError> {
    let torque = inputs.driver_torque_nm;
    let speed = inputs.vehicle_speed_kmh;

    let factor = speed_factor(speed);
    let mut scaled_base = 0.0;
    if torque.abs() > EPS_MIN_TORQUE_THRESHOLD_NM {
        let magnitude = map.lookup(torque.abs(), speed);
        let base = if torque < 0.0 { -magnitude } else { magnitude };
        scaled_base = base * factor;

        // The assist must push with the driver, never against.
        if (torque > 0.0 && scaled_base < 0.0) || (torque < 0.0 && scaled_base > 0.0) {
            return Err(EcuError::DirectionMismatch);
        }
    }

    let rtc = return_to_center(torque, inputs.steering_angle_deg, speed);
    let damp = damping(inputs.steering_velocity_dps, speed);

    Ok(AssistanceParams {
        base_nm: scaled_base,
        return_to_center_nm: rtc,
        damping_nm: damp,
        total_nm: scaled_base + rtc + damp,
        speed_factor: factor,
        timestamp: now,
        safety_limited: false,
        rate_limited: false,
        oscillation_detected: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> AssistMap {
        AssistMap::default()
    }

    #[test]
    fn speed_factor_endpoints_and_ramp() {
        assert_eq!(speed_factor(0.0), 1.0);
        assert_eq!(speed_factor(10.0), 1.0);
        assert_eq!(speed_factor(100.0), EPS_MIN_ASSIST_FACTOR);
        assert_eq!(speed_factor(250.0), EPS_MIN_ASSIST_FACTOR);
        // Midpoint of the ramp: 55 km/h → 1 − 0.5·0.7 = 0.65.
        assert!((speed_factor(55.0) - 0.65).abs() < 1e-6);
    }

    #[test]
    fn mid_speed_reference_case() {
        // 3 Nm driver torque at 50 km/h, 10° angle, 5°/s velocity.
        let inputs = AssistInputs {
            driver_torque_nm: 3.0,
            vehicle_speed_kmh: 50.0,
            steering_angle_deg: 10.0,
            steering_velocity_dps: 5.0,
        };
        let params = calculate_assistance(&map(), &inputs, 7).unwrap();

        assert!((params.speed_factor - (1.0 - (40.0 / 90.0) * 0.7)).abs() < 1e-4);
        // Base map cell is 3.0 Nm, scaled by the speed factor.
        assert!((params.base_nm - 3.0 * params.speed_factor).abs() < 1e-4);
        // RTC inactive above the 1 Nm driver torque threshold.
        assert_eq!(params.return_to_center_nm, 0.0);
        // Damping: −0.05 · 5 · (1 + 50·0.02) = −0.5.
        assert!((params.damping_nm + 0.5).abs() < 1e-4);
        assert!((params.total_nm - 1.567).abs() < 0.01);
        assert!(!params.safety_limited && !params.rate_limited && !params.oscillation_detected);
        assert_eq!(params.timestamp, 7);
    }

    #[test]
    fn negative_driver_torque_gives_negative_assist() {
        let inputs = AssistInputs {
            driver_torque_nm: -3.0,
            vehicle_speed_kmh: 50.0,
            steering_angle_deg: 0.0,
            steering_velocity_dps: 0.0,
        };
        let params = calculate_assistance(&map(), &inputs, 0).unwrap();
        assert!(params.base_nm < 0.0);
        assert!(params.total_nm < 0.0);
    }

    #[test]
    fn below_torque_threshold_yields_no_base_assist() {
        let inputs = AssistInputs {
            driver_torque_nm: 0.05,
            vehicle_speed_kmh: 30.0,
            steering_angle_deg: 0.0,
            steering_velocity_dps: 0.0,
        };
        let params = calculate_assistance(&map(), &inputs, 0).unwrap();
        assert_eq!(params.base_nm, 0.0);
    }

    #[test]
    fn return_to_center_active_only_near_zero_torque() {
        // Hands nearly off at 20° angle, 50 km/h.
        let inputs = AssistInputs {
            driver_torque_nm: 0.0,
            vehicle_speed_kmh: 50.0,
            steering_angle_deg: 20.0,
            steering_velocity_dps: 0.0,
        };
        let params = calculate_assistance(&map(), &inputs, 0).unwrap();
        // −20 · 0.02 · (1 + 50·0.01) = −0.6.
        assert!((params.return_to_center_nm + 0.6).abs() < 1e-4);
        assert!(params.total_nm < 0.0);
    }

    #[test]
    fn rtc_component_is_clamped() {
        let inputs = AssistInputs {
            driver_torque_nm: 0.0,
            vehicle_speed_kmh: 100.0,
            steering_angle_deg: 700.0,
            steering_velocity_dps: 0.0,
        };
        let params = calculate_assistance(&map(), &inputs, 0).unwrap();
        assert_eq!(params.return_to_center_nm, -EPS_RTC_LIMIT_NM);
    }

    #[test]
    fn damping_component_is_clamped() {
        let inputs = AssistInputs {
            driver_torque_nm: 0.0,
            vehicle_speed_kmh: 100.0,
            steering_angle_deg: 0.0,
            steering_velocity_dps: 500.0,
        };
        let params = calculate_assistance(&map(), &inputs, 0).unwrap();
        assert_eq!(params.damping_nm, -EPS_DAMPING_LIMIT_NM);
    }

    #[test]
    fn limited_zero_params_are_flagged() {
        let params = AssistanceParams::limited_zero(9);
        assert_eq!(params.total_nm, 0.0);
        assert!(params.safety_limited);
        assert_eq!(params.timestamp, 9);
    }
}
