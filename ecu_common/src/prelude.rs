//! Common re-exports for convenience.

pub use crate::calib::{AbsCalibration, AssistMap, WheelCalibration};
pub use crate::config::{CalibrationConfig, ConfigError, ConfigLoader};
pub use crate::diag::{DiagEventKind, DtcCode, DtcStatus};
pub use crate::error::EcuError;
pub use crate::filter::LowPassFilter;
pub use crate::hal::{
    ActuatorSink, CalibrationStore, CollaboratorTasks, CommsSink, MotorCommand,
    NoopCollaborators, SensorProvider, TimeSource, WatchdogHardware, WatchdogId, tick_delta,
};
pub use crate::math::{clamp, km_h_to_m_s, slip_ratio};
pub use crate::sensors::{ImuData, SensorChannel, SensorSnapshot};
pub use crate::wheel::{WheelArray, WheelPosition};
