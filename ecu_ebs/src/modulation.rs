//! Pressure modulation inside the `Active` state.
//!
//! Reduction steps the command down until the wheel accelerates again,
//! hold waits for the slip to settle, increase steps back up until slip
//! re-enters. The natural reduction/increase oscillation is expected to
//! settle into 4–20 Hz; excursions are logged but never change state.

use tracing::warn;

use ecu_common::calib::WheelCalibration;
use ecu_common::consts::{
    ABS_CYCLE_FREQ_MAX_HZ, ABS_CYCLE_FREQ_MIN_HZ, ABS_RECOVERY_THRESHOLD_MS2,
};
use ecu_common::hal::tick_delta;
use ecu_common::math::clamp;

use crate::state::AbsPhase;
use crate::wheel::AbsWheelState;

/// Run one modulation step, updating the wheel's phase and pressure
/// command. Returns the clamped pressure command.
pub fn modulate(wheel: &mut AbsWheelState, cal: &WheelCalibration, now: u32) -> f32 {
    let mut pressure = wheel.pressure_command;

    match wheel.phase {
        AbsPhase::PressureReduction => {
            pressure *= cal.reduction_rate;
            if wheel.wheel_acceleration > ABS_RECOVERY_THRESHOLD_MS2 {
                wheel.enter_phase(AbsPhase::PressureHold, now);
            }
        }
        AbsPhase::PressureHold => {
            if wheel.slip_ratio < cal.slip_target {
                wheel.enter_phase(AbsPhase::PressureIncrease, now);
            } else if wheel.slip_ratio > cal.slip_threshold {
                enter_reduction(wheel, now);
            }
        }
        AbsPhase::PressureIncrease => {
            pressure *= cal.increase_rate;
            if wheel.slip_ratio > cal.slip_threshold {
                enter_reduction(wheel, now);
            }
        }
        AbsPhase::Normal => {
            pressure = 1.0;
        }
    }

    wheel.pressure_command = clamp(pressure, 0.0, 1.0);
    wheel.pressure_command
}

/// Enter the reduction phase, checking the modulation-frequency window
/// against the previous reduction entry.
fn enter_reduction(wheel: &mut AbsWheelState, now: u32) {
    if let Some(previous) = wheel.last_reduction_entry {
        let period_ms = tick_delta(now, previous);
        if period_ms > 0 {
            let freq_hz = 1000.0 / period_ms as f32;
            if !(ABS_CYCLE_FREQ_MIN_HZ..=ABS_CYCLE_FREQ_MAX_HZ).contains(&freq_hz) {
                warn!(freq_hz, "ABS modulation frequency outside 4-20 Hz window");
            }
        }
    }
    wheel.last_reduction_entry = Some(now);
    wheel.enter_phase(AbsPhase::PressureReduction, now);
}
