//! EPS startup self-test.
//!
//! Exercises the base-assist lookup at representative grid points,
//! range-checks the calibration, and verifies the oscillation detector
//! flags a square wave while passing a single step.

use ecu_common::calib::AssistMap;
use ecu_common::error::EcuError;

use crate::limits::detect_oscillation;

/// Validate the assist map and the oscillation detector.
///
/// # Errors
/// `SelfTestFailed` on any failed check.
pub fn eps_self_test(map: &AssistMap) -> Result<(), EcuError> {
    if map.validate().is_err() {
        return Err(EcuError::SelfTestFailed);
    }

    // Representative grid points must come back exactly.
    let t3 = map.torque_axis[3];
    let s4 = map.speed_axis[4];
    if (map.lookup(t3, s4) - map.table[3][4]).abs() > 1e-3 {
        return Err(EcuError::SelfTestFailed);
    }
    if map.lookup(map.torque_axis[0], map.speed_axis[0]) != map.table[0][0] {
        return Err(EcuError::SelfTestFailed);
    }
    let last_t = map.torque_axis.len() - 1;
    let last_s = map.speed_axis.len() - 1;
    if (map.lookup(map.torque_axis[last_t], map.speed_axis[last_s])
        - map.table[last_t][last_s])
        .abs()
        > 1e-3
    {
        return Err(EcuError::SelfTestFailed);
    }

    // A four-cycle ±3 Nm square wave must trip the detector...
    let square = [3.0, -3.0, 3.0, -3.0, 3.0, -3.0, 3.0, -3.0, 3.0, -3.0];
    if !detect_oscillation(&square) {
        return Err(EcuError::SelfTestFailed);
    }
    // ...while a single-shot 3 Nm step passes.
    let step = [0.0, 0.0, 0.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0];
    if detect_oscillation(&step) {
        return Err(EcuError::SelfTestFailed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_passes() {
        assert!(eps_self_test(&AssistMap::default()).is_ok());
    }

    #[test]
    fn corrupted_map_fails() {
        let mut map = AssistMap::default();
        map.table[3][4] = f32::NAN;
        assert_eq!(eps_self_test(&map), Err(EcuError::SelfTestFailed));
    }

    #[test]
    fn non_monotone_axis_fails() {
        let mut map = AssistMap::default();
        map.torque_axis[5] = map.torque_axis[4];
        assert_eq!(eps_self_test(&map), Err(EcuError::SelfTestFailed));
    }
}
