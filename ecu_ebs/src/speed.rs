//! Vehicle reference speed estimator.
//!
//! The raw estimate is `(max + mean) / 2` over the valid wheel samples:
//! the fastest wheel approximates the non-braking reference while the
//! mean damps sensor noise on a single outlier. A first-order low-pass
//! (α = 0.1) removes high-frequency artefacts. The max contributes to
//! the mean as well; the per-wheel slip calibration is tuned against
//! that estimate, so the double-count is kept deliberately.

use ecu_common::consts::{MAX_WHEEL_SPEED_KMH, SPEED_FILTER_ALPHA};
use ecu_common::filter::LowPassFilter;
use ecu_common::wheel::WheelArray;

/// Filtered vehicle reference speed [km/h].
#[derive(Debug, Clone, Copy)]
pub struct VehicleSpeedEstimator {
    filter: LowPassFilter,
}

impl VehicleSpeedEstimator {
    /// Fresh estimator; the filter state starts at standstill.
    pub const fn new() -> Self {
        Self {
            filter: LowPassFilter::new(SPEED_FILTER_ALPHA),
        }
    }

    /// Feed one tick of wheel speeds and return the filtered estimate.
    ///
    /// Samples that are absent, negative or above the plausible maximum
    /// are ignored. With no valid sample the result is 0 and the filter
    /// state is left untouched.
    pub fn estimate(&mut self, speeds: &WheelArray<Option<f32>>) -> f32 {
        let mut max_speed = 0.0_f32;
        let mut sum = 0.0_f32;
        let mut valid = 0u32;

        for (_, sample) in speeds.iter() {
            if let Some(v) = *sample {
                if (0.0..=MAX_WHEEL_SPEED_KMH).contains(&v) {
                    max_speed = max_speed.max(v);
                    sum += v;
                    valid += 1;
                }
            }
        }

        if valid == 0 {
            return 0.0;
        }

        let mean = sum / valid as f32;
        let raw = (max_speed + mean) / 2.0;
        self.filter.apply(raw)
    }

    /// Last filtered output.
    #[inline]
    pub const fn output(&self) -> f32 {
        self.filter.output()
    }

    /// Reset the filter to standstill.
    pub fn reset(&mut self) {
        self.filter.reset();
    }
}

impl Default for VehicleSpeedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(v: f32) -> WheelArray<Option<f32>> {
        WheelArray::from_fn(|_| Some(v))
    }

    #[test]
    fn converges_to_uniform_speed() {
        let mut est = VehicleSpeedEstimator::new();
        let mut out = 0.0;
        for _ in 0..200 {
            out = est.estimate(&all(50.0));
        }
        assert!((out - 50.0).abs() < 0.1);
    }

    #[test]
    fn one_slipping_wheel_settles_between_max_and_mean() {
        // Speeds [50, 20, 50, 50]: mean 42.5, max 50 → raw 46.25.
        let speeds = WheelArray::new([Some(50.0), Some(20.0), Some(50.0), Some(50.0)]);
        let mut est = VehicleSpeedEstimator::new();
        let mut out = 0.0;
        for _ in 0..300 {
            out = est.estimate(&speeds);
        }
        assert!((out - 46.25).abs() < 0.1);
    }

    #[test]
    fn ignores_out_of_range_samples() {
        let speeds = WheelArray::new([Some(50.0), Some(-3.0), Some(400.0), Some(50.0)]);
        let mut est = VehicleSpeedEstimator::new();
        let mut out = 0.0;
        for _ in 0..200 {
            out = est.estimate(&speeds);
        }
        // Only the two 50 km/h wheels count: mean 50, max 50.
        assert!((out - 50.0).abs() < 0.1);
    }

    #[test]
    fn no_valid_sample_yields_zero_and_preserves_filter() {
        let mut est = VehicleSpeedEstimator::new();
        for _ in 0..100 {
            est.estimate(&all(50.0));
        }
        let before = est.output();
        assert_eq!(est.estimate(&WheelArray::from_fn(|_| None)), 0.0);
        assert_eq!(est.output(), before);
    }

    #[test]
    fn steady_state_is_monotone_in_any_single_wheel() {
        // Raising one wheel (within range) never lowers the estimate.
        let mut prev = 0.0;
        for fourth in [10.0, 30.0, 50.0, 80.0, 120.0] {
            let speeds = WheelArray::new([Some(50.0), Some(50.0), Some(50.0), Some(fourth)]);
            let mut est = VehicleSpeedEstimator::new();
            let mut out = 0.0;
            for _ in 0..400 {
                out = est.estimate(&speeds);
            }
            assert!(out >= prev);
            prev = out;
        }
    }
}
