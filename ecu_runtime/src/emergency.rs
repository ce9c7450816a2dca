//! Emergency-shutdown word shared with the interrupt context.
//!
//! The emergency ISR writes exactly one 32-bit word: the requested
//! safety state. The main loop treats it as volatile and checks it at
//! the top of every tick. After requesting shutdown the ISR touches no
//! other state.

use core::sync::atomic::{AtomicU32, Ordering};

use ecu_common::hal::ActuatorSink;
use ecu_safety::SafetyState;

const NO_REQUEST: u32 = u32::MAX;

/// Single-word channel from the emergency ISR to the main loop.
#[derive(Debug)]
pub struct EmergencyCell {
    word: AtomicU32,
}

impl EmergencyCell {
    /// Cell with no pending request.
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(NO_REQUEST),
        }
    }

    /// ISR entry point: request the terminal shutdown state and force the
    /// actuators passive. `emergency_stop` is idempotent by contract.
    pub fn trigger<A: ActuatorSink>(&self, actuators: &mut A) {
        self.word
            .store(SafetyState::Shutdown as u32, Ordering::SeqCst);
        actuators.emergency_stop();
    }

    /// Request shutdown without touching the actuators (self-test paths).
    pub fn request_shutdown(&self) {
        self.word
            .store(SafetyState::Shutdown as u32, Ordering::SeqCst);
    }

    /// Whether the ISR has requested shutdown.
    pub fn shutdown_requested(&self) -> bool {
        self.word.load(Ordering::SeqCst) == SafetyState::Shutdown as u32
    }

    /// Clear the request (external reset path only).
    pub fn clear(&self) {
        self.word.store(NO_REQUEST, Ordering::SeqCst);
    }
}

impl Default for EmergencyCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecu_common::error::EcuError;
    use ecu_common::hal::MotorCommand;
    use ecu_common::wheel::WheelPosition;

    #[derive(Default)]
    struct CountingActuators {
        emergency_stops: u32,
    }

    impl ActuatorSink for CountingActuators {
        fn set_wheel_pressure(&mut self, _w: WheelPosition, _p: f32) -> Result<(), EcuError> {
            Ok(())
        }
        fn set_motor_command(&mut self, _c: &MotorCommand) -> Result<(), EcuError> {
            Ok(())
        }
        fn emergency_stop(&mut self) {
            self.emergency_stops += 1;
        }
        fn shutdown(&mut self) -> Result<(), EcuError> {
            Ok(())
        }
    }

    #[test]
    fn fresh_cell_has_no_request() {
        let cell = EmergencyCell::new();
        assert!(!cell.shutdown_requested());
    }

    #[test]
    fn trigger_requests_shutdown_and_stops_actuators() {
        let cell = EmergencyCell::new();
        let mut act = CountingActuators::default();
        cell.trigger(&mut act);
        assert!(cell.shutdown_requested());
        assert_eq!(act.emergency_stops, 1);

        // Idempotent re-trigger.
        cell.trigger(&mut act);
        assert!(cell.shutdown_requested());
    }

    #[test]
    fn clear_resets_the_request() {
        let cell = EmergencyCell::new();
        cell.request_shutdown();
        cell.clear();
        assert!(!cell.shutdown_requested());
    }
}
