//! Diagnostic trouble code and event vocabulary.
//!
//! In-memory representation is a sum type; the CAN-over-the-wire numbering
//! is an encoding concern handled by the `code()`/`id()` methods only.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::wheel::WheelPosition;

/// Diagnostic trouble codes raised by the control cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtcCode {
    /// Wheel speed sensor fault at one position.
    WheelSpeedSensor(WheelPosition),
    /// Master cylinder pressure sensor fault.
    PressureSensorMasterCylinder,
    /// Wheel cylinder pressure sensor fault at one position.
    PressureSensorWheel(WheelPosition),
    /// IMU (yaw / lateral / longitudinal) fault.
    ImuSensor,
    /// Steering angle sensor fault.
    SteeringAngleSensor,
    /// Driver torque sensor fault.
    TorqueSensor,
    /// Sensor subsystem self-test failure.
    SensorSelfTestFailed,
    /// Actuator subsystem self-test failure.
    ActuatorSelfTestFailed,
    /// Safety subsystem self-test failure.
    SafetySelfTestFailed,
    /// Control algorithm self-test failure.
    AlgorithmSelfTestFailed,
    /// EPS assist torque exceeded the safety limit.
    ExcessiveAssistTorque,
    /// EPS assist torque opposed the driver torque.
    AssistDirectionMismatch,
    /// EPS assist output oscillation.
    AssistOscillation,
    /// Control cycle exceeded its time budget.
    TimingViolation,
    /// Watchdog timed out or was kicked abnormally.
    WatchdogTimeout,
    /// Memory canary destroyed.
    MemoryCorruption,
    /// Dual-channel comparison failure.
    DualChannelMismatch,
    /// System integrity check failure.
    SystemIntegrityFault,
}

impl DtcCode {
    /// 16-bit wire code transmitted over CAN.
    pub const fn code(self) -> u16 {
        match self {
            Self::WheelSpeedSensor(pos) => 0x1001 + pos as u16,
            Self::PressureSensorMasterCylinder => 0x1010,
            Self::PressureSensorWheel(pos) => 0x1011 + pos as u16,
            Self::ImuSensor => 0x1020,
            Self::SteeringAngleSensor => 0x1021,
            Self::TorqueSensor => 0x1022,
            Self::SensorSelfTestFailed => 0x4001,
            Self::ActuatorSelfTestFailed => 0x4002,
            Self::SafetySelfTestFailed => 0x4004,
            Self::AlgorithmSelfTestFailed => 0x4005,
            Self::ExcessiveAssistTorque => 0x5001,
            Self::AssistDirectionMismatch => 0x5002,
            Self::AssistOscillation => 0x5003,
            Self::TimingViolation => 0x7001,
            Self::WatchdogTimeout => 0x7002,
            Self::MemoryCorruption => 0x7003,
            Self::DualChannelMismatch => 0x7004,
            Self::SystemIntegrityFault => 0x7005,
        }
    }
}

bitflags! {
    /// Status byte of a stored DTC.
    ///
    /// Invariant: `CONFIRMED` implies `ACTIVE` while the fault persists.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DtcStatus: u8 {
        /// The fault condition is currently present.
        const ACTIVE = 0x01;
        /// First seen, not yet confirmed.
        const PENDING = 0x02;
        /// Confirmed by repetition or persistence.
        const CONFIRMED = 0x04;
    }
}

impl Serialize for DtcStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for DtcStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u8::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

/// Diagnostic event types written to the circular log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagEventKind {
    /// Controller start.
    SystemStart,
    /// Graceful shutdown executed.
    SystemShutdown,
    /// Safety supervisor changed state.
    SafetyStateChange,
    /// Safety violation reported.
    SafetyViolation,
    /// ABS activated on a wheel.
    AbsActivation,
    /// ESC intervention (collaborator).
    EscActivation,
    /// TCS intervention (collaborator).
    TcsActivation,
    /// A DTC was stored.
    DtcSet,
    /// A DTC was cleared.
    DtcCleared,
    /// A DTC was confirmed.
    DtcConfirmed,
    /// A sensor channel failed validation.
    SensorFault,
}

impl DiagEventKind {
    /// Wire identifier of the event type.
    pub const fn id(self) -> u8 {
        match self {
            Self::SystemStart => 0x01,
            Self::SystemShutdown => 0x02,
            Self::SafetyStateChange => 0x10,
            Self::SafetyViolation => 0x11,
            Self::AbsActivation => 0x20,
            Self::EscActivation => 0x21,
            Self::TcsActivation => 0x22,
            Self::DtcSet => 0x30,
            Self::DtcCleared => 0x31,
            Self::DtcConfirmed => 0x32,
            Self::SensorFault => 0x40,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eps_codes_match_calibration_sheet() {
        assert_eq!(DtcCode::ExcessiveAssistTorque.code(), 0x5001);
        assert_eq!(DtcCode::AssistDirectionMismatch.code(), 0x5002);
        assert_eq!(DtcCode::AssistOscillation.code(), 0x5003);
    }

    #[test]
    fn wheel_sensor_codes_are_per_position() {
        assert_eq!(DtcCode::WheelSpeedSensor(WheelPosition::FrontLeft).code(), 0x1001);
        assert_eq!(DtcCode::WheelSpeedSensor(WheelPosition::RearRight).code(), 0x1004);
        assert_eq!(DtcCode::PressureSensorWheel(WheelPosition::FrontRight).code(), 0x1012);
    }

    #[test]
    fn wire_codes_are_unique() {
        let mut codes = vec![
            DtcCode::PressureSensorMasterCylinder,
            DtcCode::ImuSensor,
            DtcCode::SteeringAngleSensor,
            DtcCode::TorqueSensor,
            DtcCode::SensorSelfTestFailed,
            DtcCode::ActuatorSelfTestFailed,
            DtcCode::SafetySelfTestFailed,
            DtcCode::AlgorithmSelfTestFailed,
            DtcCode::ExcessiveAssistTorque,
            DtcCode::AssistDirectionMismatch,
            DtcCode::AssistOscillation,
            DtcCode::TimingViolation,
            DtcCode::WatchdogTimeout,
            DtcCode::MemoryCorruption,
            DtcCode::DualChannelMismatch,
            DtcCode::SystemIntegrityFault,
        ];
        for pos in WheelPosition::ALL {
            codes.push(DtcCode::WheelSpeedSensor(pos));
            codes.push(DtcCode::PressureSensorWheel(pos));
        }
        let mut wire: Vec<u16> = codes.iter().map(|c| c.code()).collect();
        wire.sort_unstable();
        wire.dedup();
        assert_eq!(wire.len(), codes.len());
    }

    #[test]
    fn confirmed_status_carries_active() {
        let status = DtcStatus::ACTIVE | DtcStatus::CONFIRMED;
        assert!(status.contains(DtcStatus::ACTIVE));
        assert!(!status.contains(DtcStatus::PENDING));
    }
}
