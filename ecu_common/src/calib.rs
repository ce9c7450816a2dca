//! Calibration tables for the ABS and EPS control cores.
//!
//! Both tables are plain-old-data with `validate()` methods; they are read
//! through the [`crate::hal::CalibrationStore`] contract at startup and
//! never change during operation.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::consts::{
    ABS_MIN_ACTIVATION_SPEED_KMH, ABS_PRESSURE_INCREASE_RATE, ABS_PRESSURE_REDUCTION_RATE,
    ABS_SLIP_TARGET_DEFAULT, ABS_SLIP_THRESHOLD_DEFAULT, MAX_WHEEL_SPEED_KMH,
};
use crate::math::clamp;
use crate::wheel::WheelArray;

// ─── ABS per-wheel calibration ──────────────────────────────────────

/// Tuning of one wheel's slip controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WheelCalibration {
    /// Slip ratio above which ABS activates, in (0, 1].
    #[serde(default = "default_slip_threshold")]
    pub slip_threshold: f32,
    /// Slip ratio the modulation targets, in (0, slip_threshold).
    #[serde(default = "default_slip_target")]
    pub slip_target: f32,
    /// Multiplicative pressure reduction per cycle, in (0, 1).
    #[serde(default = "default_reduction_rate")]
    pub reduction_rate: f32,
    /// Multiplicative pressure increase per cycle, > 1.
    #[serde(default = "default_increase_rate")]
    pub increase_rate: f32,
    /// Per-wheel enable; a disabled wheel is never modulated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_slip_threshold() -> f32 {
    ABS_SLIP_THRESHOLD_DEFAULT
}
fn default_slip_target() -> f32 {
    ABS_SLIP_TARGET_DEFAULT
}
fn default_reduction_rate() -> f32 {
    ABS_PRESSURE_REDUCTION_RATE
}
fn default_increase_rate() -> f32 {
    ABS_PRESSURE_INCREASE_RATE
}
fn default_enabled() -> bool {
    true
}

impl Default for WheelCalibration {
    fn default() -> Self {
        Self {
            slip_threshold: ABS_SLIP_THRESHOLD_DEFAULT,
            slip_target: ABS_SLIP_TARGET_DEFAULT,
            reduction_rate: ABS_PRESSURE_REDUCTION_RATE,
            increase_rate: ABS_PRESSURE_INCREASE_RATE,
            enabled: true,
        }
    }
}

/// Full ABS calibration: four wheel tables plus the activation speed floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbsCalibration {
    /// Per-wheel slip controller tuning in `[FL, FR, RL, RR]` order.
    #[serde(default)]
    pub wheels: WheelArray<WheelCalibration>,
    /// Vehicle speed below which ABS never activates [km/h].
    #[serde(default = "default_min_activation_speed")]
    pub min_activation_speed: f32,
}

fn default_min_activation_speed() -> f32 {
    ABS_MIN_ACTIVATION_SPEED_KMH
}

impl Default for AbsCalibration {
    fn default() -> Self {
        Self {
            wheels: WheelArray::default(),
            min_activation_speed: ABS_MIN_ACTIVATION_SPEED_KMH,
        }
    }
}

impl AbsCalibration {
    /// Validate every per-wheel table and the activation floor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (pos, cal) in self.wheels.iter() {
            if !(cal.slip_threshold > 0.0 && cal.slip_threshold <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{}: slip_threshold={} out of (0, 1]",
                    pos.label(),
                    cal.slip_threshold
                )));
            }
            if !(cal.slip_target > 0.0 && cal.slip_target < cal.slip_threshold) {
                return Err(ConfigError::ValidationError(format!(
                    "{}: slip_target={} must be in (0, slip_threshold={})",
                    pos.label(),
                    cal.slip_target,
                    cal.slip_threshold
                )));
            }
            if !(cal.reduction_rate > 0.0 && cal.reduction_rate < 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{}: reduction_rate={} out of (0, 1)",
                    pos.label(),
                    cal.reduction_rate
                )));
            }
            if cal.increase_rate <= 1.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{}: increase_rate={} must be > 1",
                    pos.label(),
                    cal.increase_rate
                )));
            }
        }
        if !(self.min_activation_speed > 0.0 && self.min_activation_speed < MAX_WHEEL_SPEED_KMH) {
            return Err(ConfigError::ValidationError(format!(
                "min_activation_speed={} out of (0, {})",
                self.min_activation_speed, MAX_WHEEL_SPEED_KMH
            )));
        }
        Ok(())
    }
}

// ─── EPS base-assist map ────────────────────────────────────────────

/// Driver torque breakpoints of the assist map.
pub const ASSIST_MAP_TORQUE_POINTS: usize = 10;
/// Vehicle speed breakpoints of the assist map.
pub const ASSIST_MAP_SPEED_POINTS: usize = 8;

/// 10×8 base-assist lookup table with bilinear interpolation.
///
/// Rows are driver torque magnitudes, columns are vehicle speeds. Lookups
/// clamp both inputs to the grid before interpolating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistMap {
    /// Driver torque breakpoints [Nm], strictly increasing.
    pub torque_axis: [f32; ASSIST_MAP_TORQUE_POINTS],
    /// Vehicle speed breakpoints [km/h], strictly increasing.
    pub speed_axis: [f32; ASSIST_MAP_SPEED_POINTS],
    /// Assist torque [Nm] per (torque, speed) grid point.
    pub table: [[f32; ASSIST_MAP_SPEED_POINTS]; ASSIST_MAP_TORQUE_POINTS],
}

impl Default for AssistMap {
    fn default() -> Self {
        Self {
            torque_axis: [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            speed_axis: [0.0, 12.5, 25.0, 37.5, 50.0, 62.5, 75.0, 87.5],
            table: [
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                [2.0, 1.8, 1.5, 1.2, 1.0, 0.8, 0.6, 0.4],
                [4.0, 3.6, 3.0, 2.4, 2.0, 1.6, 1.2, 0.8],
                [6.0, 5.4, 4.5, 3.6, 3.0, 2.4, 1.8, 1.2],
                [8.0, 7.2, 6.0, 4.8, 4.0, 3.2, 2.4, 1.6],
                [10.0, 9.0, 7.5, 6.0, 5.0, 4.0, 3.0, 2.0],
                [12.0, 10.8, 9.0, 7.2, 6.0, 4.8, 3.6, 2.4],
                [14.0, 12.6, 10.5, 8.4, 7.0, 5.6, 4.2, 2.8],
                [16.0, 14.4, 12.0, 9.6, 8.0, 6.4, 4.8, 3.2],
                [18.0, 16.2, 13.5, 10.8, 9.0, 7.2, 5.4, 3.6],
            ],
        }
    }
}

impl AssistMap {
    /// Bilinear lookup of the base assist [Nm] for a torque magnitude and
    /// vehicle speed. Inputs are clamped to the grid.
    pub fn lookup(&self, torque_nm: f32, speed_kmh: f32) -> f32 {
        let (ti, tf) = axis_locate(&self.torque_axis, torque_nm);
        let (si, sf) = axis_locate(&self.speed_axis, speed_kmh);

        let c00 = self.table[ti][si];
        let c01 = self.table[ti][si + 1];
        let c10 = self.table[ti + 1][si];
        let c11 = self.table[ti + 1][si + 1];

        let low = c00 + (c01 - c00) * sf;
        let high = c10 + (c11 - c10) * sf;
        low + (high - low) * tf
    }

    /// Validate axis monotonicity and table contents.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for w in self.torque_axis.windows(2) {
            if w[1] <= w[0] {
                return Err(ConfigError::ValidationError(
                    "assist map torque axis must be strictly increasing".to_string(),
                ));
            }
        }
        for w in self.speed_axis.windows(2) {
            if w[1] <= w[0] {
                return Err(ConfigError::ValidationError(
                    "assist map speed axis must be strictly increasing".to_string(),
                ));
            }
        }
        for row in &self.table {
            for &v in row {
                if !v.is_finite() || v < 0.0 {
                    return Err(ConfigError::ValidationError(format!(
                        "assist map cell {v} must be finite and non-negative"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Locate `x` on a breakpoint axis: returns the lower cell index and the
/// fractional position inside that cell, with `x` clamped to the axis.
fn axis_locate(axis: &[f32], x: f32) -> (usize, f32) {
    let last = axis.len() - 1;
    let x = clamp(x, axis[0], axis[last]);
    let mut i = 0;
    while i < last - 1 && x > axis[i + 1] {
        i += 1;
    }
    let span = axis[i + 1] - axis[i];
    let frac = if span > 0.0 { (x - axis[i]) / span } else { 0.0 };
    (i, clamp(frac, 0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wheel::WheelPosition;

    #[test]
    fn default_abs_calibration_is_valid() {
        assert!(AbsCalibration::default().validate().is_ok());
    }

    #[test]
    fn slip_target_above_threshold_rejected() {
        let mut cal = AbsCalibration::default();
        cal.wheels[WheelPosition::FrontLeft].slip_target = 0.2;
        assert!(matches!(
            cal.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn reduction_rate_of_one_rejected() {
        let mut cal = AbsCalibration::default();
        cal.wheels[WheelPosition::RearLeft].reduction_rate = 1.0;
        assert!(cal.validate().is_err());
    }

    #[test]
    fn default_map_is_valid() {
        assert!(AssistMap::default().validate().is_ok());
    }

    #[test]
    fn lookup_hits_grid_points_exactly() {
        let map = AssistMap::default();
        assert!((map.lookup(3.0, 50.0) - 3.0).abs() < 1e-6);
        assert!((map.lookup(1.0, 0.0) - 2.0).abs() < 1e-6);
        assert!((map.lookup(9.0, 87.5) - 3.6).abs() < 1e-6);
    }

    #[test]
    fn lookup_interpolates_between_grid_points() {
        let map = AssistMap::default();
        // Midway between 2 Nm and 3 Nm rows at 0 km/h: (4.0 + 6.0) / 2.
        assert!((map.lookup(2.5, 0.0) - 5.0).abs() < 1e-6);
        // Midway between speed columns 0 and 12.5 at 1 Nm: (2.0 + 1.8) / 2.
        assert!((map.lookup(1.0, 6.25) - 1.9).abs() < 1e-6);
    }

    #[test]
    fn lookup_clamps_out_of_grid_inputs() {
        let map = AssistMap::default();
        assert!((map.lookup(50.0, 300.0) - map.lookup(9.0, 87.5)).abs() < 1e-6);
        assert!((map.lookup(-2.0, -10.0) - map.lookup(0.0, 0.0)).abs() < 1e-6);
    }

    #[test]
    fn non_monotone_axis_rejected() {
        let mut map = AssistMap::default();
        map.speed_axis[3] = map.speed_axis[2];
        assert!(map.validate().is_err());
    }
}
