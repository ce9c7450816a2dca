//! ABS algorithm self-test.
//!
//! Verifies the calibration ranges and two reference calculations before
//! the `Inactive → Active` arc is unblocked.

use ecu_common::calib::AbsCalibration;
use ecu_common::error::EcuError;
use ecu_common::math::slip_ratio;
use ecu_common::wheel::WheelArray;

use crate::speed::VehicleSpeedEstimator;

/// Validate the calibration and the slip / reference-speed math.
///
/// # Errors
/// `SelfTestFailed` on any range or reference-value check failure.
pub fn algorithm_self_test(calibration: &AbsCalibration) -> Result<(), EcuError> {
    for (_, cal) in calibration.wheels.iter() {
        if !(cal.slip_threshold > 0.0 && cal.slip_threshold <= 1.0) {
            return Err(EcuError::SelfTestFailed);
        }
        if !(cal.slip_target > 0.0 && cal.slip_target < cal.slip_threshold) {
            return Err(EcuError::SelfTestFailed);
        }
    }

    // Reference slip: 40 km/h wheel at 50 km/h vehicle → 0.2.
    if (slip_ratio(40.0, 50.0) - 0.2).abs() > 0.001 {
        return Err(EcuError::SelfTestFailed);
    }

    // Reference speed: uniform 50 km/h converges to 50 ± 0.1 on a private
    // estimator instance (the running instance's filter is untouched).
    let mut estimator = VehicleSpeedEstimator::new();
    let speeds: WheelArray<Option<f32>> = WheelArray::from_fn(|_| Some(50.0));
    let mut estimate = 0.0;
    for _ in 0..200 {
        estimate = estimator.estimate(&speeds);
    }
    if (estimate - 50.0).abs() > 0.1 {
        return Err(EcuError::SelfTestFailed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_common::wheel::WheelPosition;

    #[test]
    fn default_calibration_passes() {
        assert!(algorithm_self_test(&AbsCalibration::default()).is_ok());
    }

    #[test]
    fn zero_threshold_fails() {
        let mut cal = AbsCalibration::default();
        cal.wheels[WheelPosition::FrontLeft].slip_threshold = 0.0;
        assert_eq!(
            algorithm_self_test(&cal),
            Err(EcuError::SelfTestFailed)
        );
    }

    #[test]
    fn target_at_threshold_fails() {
        let mut cal = AbsCalibration::default();
        cal.wheels[WheelPosition::RearRight].slip_target =
            cal.wheels[WheelPosition::RearRight].slip_threshold;
        assert_eq!(
            algorithm_self_test(&cal),
            Err(EcuError::SelfTestFailed)
        );
    }
}
