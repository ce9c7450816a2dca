//! Anti-lock braking (ABS) control core.
//!
//! Hard real-time 1 ms loop over four wheels: slip estimation against the
//! vehicle reference speed, a per-wheel state machine (`Inactive →
//! Monitoring → Active → Fault`) and pressure modulation through the
//! reduction / hold / increase phases.
//!
//! A faulted wheel reverts to full manual pressure and is excluded from
//! the any-wheel-active aggregation; the other wheels continue.

pub mod modulation;
pub mod selftest;
pub mod speed;
pub mod state;
pub mod system;
pub mod wheel;

pub use selftest::algorithm_self_test;
pub use speed::VehicleSpeedEstimator;
pub use state::{AbsPhase, AbsState};
pub use system::AbsSystem;
pub use wheel::{AbsWheelState, StateChange, WheelStatistics};
