//! Time-stamped sensor snapshot consumed by the control pipeline.
//!
//! Every scalar carries a `valid` flag and a quality byte. When
//! `valid == false` the numeric value MUST NOT flow into any control law;
//! it may only increment fault counters. The control crates enforce this
//! by reading channels through [`SensorChannel::value_if_valid`].

use crate::wheel::WheelArray;

/// Full quality byte of a healthy reading.
pub const QUALITY_FULL: u8 = 0xFF;

/// One validated sensor scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorChannel {
    /// Raw reading in the channel's engineering unit.
    pub value: f32,
    /// Acquisition timestamp [ms tick].
    pub timestamp: u32,
    /// False when the reading must not be used by control laws.
    pub valid: bool,
    /// Driver-reported quality (0 = unusable, 255 = full).
    pub quality: u8,
}

impl SensorChannel {
    /// A healthy reading with full quality.
    pub const fn good(value: f32, timestamp: u32) -> Self {
        Self {
            value,
            timestamp,
            valid: true,
            quality: QUALITY_FULL,
        }
    }

    /// An invalidated reading; the stored value is retained for diagnosis.
    pub const fn invalid(value: f32, timestamp: u32) -> Self {
        Self {
            value,
            timestamp,
            valid: false,
            quality: 0,
        }
    }

    /// The value, gated by the validity flag.
    #[inline]
    pub fn value_if_valid(&self) -> Option<f32> {
        self.valid.then_some(self.value)
    }
}

impl Default for SensorChannel {
    fn default() -> Self {
        Self::invalid(0.0, 0)
    }
}

/// Inertial measurement triple.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuData {
    /// Yaw rate [deg/s].
    pub yaw_rate: SensorChannel,
    /// Lateral acceleration [m/s²].
    pub lateral_accel: SensorChannel,
    /// Longitudinal acceleration [m/s²].
    pub longitudinal_accel: SensorChannel,
}

/// One tick's worth of validated sensor data.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    /// Acquisition timestamp [ms tick].
    pub timestamp: u32,
    /// Wheel speeds [km/h], ≥ 0 when healthy.
    pub wheel_speeds: WheelArray<SensorChannel>,
    /// Master cylinder pressure [bar].
    pub master_cylinder_pressure: SensorChannel,
    /// Wheel cylinder pressures [bar].
    pub wheel_pressures: WheelArray<SensorChannel>,
    /// Inertial measurements.
    pub imu: ImuData,
    /// Steering angle [deg], positive left.
    pub steering_angle: SensorChannel,
    /// Steering angular velocity [deg/s].
    pub steering_velocity: SensorChannel,
    /// Driver torque at the steering column [Nm].
    pub driver_torque: SensorChannel,
    /// Vehicle speed from the speed signal [km/h].
    pub vehicle_speed: SensorChannel,
    /// ECU board temperature [°C].
    pub ecu_temperature: SensorChannel,
    /// Assist motor temperature [°C].
    pub motor_temperature: SensorChannel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_channel_yields_no_value() {
        let ch = SensorChannel::invalid(42.0, 7);
        assert_eq!(ch.value_if_valid(), None);
        assert_eq!(ch.value, 42.0);
        assert_eq!(ch.quality, 0);
    }

    #[test]
    fn good_channel_yields_value() {
        let ch = SensorChannel::good(3.5, 12);
        assert_eq!(ch.value_if_valid(), Some(3.5));
        assert_eq!(ch.quality, QUALITY_FULL);
        assert_eq!(ch.timestamp, 12);
    }

    #[test]
    fn default_snapshot_is_fully_invalid() {
        let snap = SensorSnapshot::default();
        assert!(!snap.driver_torque.valid);
        for (_, ch) in snap.wheel_speeds.iter() {
            assert!(!ch.valid);
        }
    }
}
