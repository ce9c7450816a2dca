//! Safety primitives, watchdog management and the safety supervisor.
//!
//! The check primitives are pure: they fail with a specific
//! [`ecu_common::error::EcuError`] kind and never mutate the supervisor;
//! the caller reports the violation. The supervisor owns the overall
//! safety state and the escalation policy (Normal → Degraded →
//! Fault → Shutdown).

pub mod checks;
pub mod crc;
pub mod memory;
pub mod supervisor;
pub mod watchdog;

pub use checks::{TemporalWindow, dual_channel_compare, plausibility_check, range_check};
pub use crc::{crc32_compute, crc32_verify};
pub use memory::MemoryGuard;
pub use supervisor::{SafetySupervisor, SafetyLevel, SafetyState, SafetyStatistics, Severity, Violation};
pub use watchdog::WatchdogTimer;
