//! Electronic power steering (EPS) assist-torque core.
//!
//! Per 1 ms tick: base assist from the 10×8 calibration map, speed
//! scaling, return-to-center, damping, a direction check, then the
//! safety-limiting chain (magnitude clamp → oscillation detector → rate
//! limit) and the motor command.
//!
//! Dominant safety goal: manual steering stays available in every mode;
//! `FailSafe` forces assistance off.

pub mod assist;
pub mod limits;
pub mod motor;
pub mod selftest;
pub mod state;
pub mod system;

pub use assist::{AssistInputs, AssistanceParams, calculate_assistance, speed_factor};
pub use limits::{SafetyLimiter, detect_oscillation};
pub use motor::build_motor_command;
pub use selftest::eps_self_test;
pub use state::{EpsSystemState, OperatingMode, SystemStatus};
pub use system::EpsSystem;
