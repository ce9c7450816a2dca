//! Motor command generation.
//!
//! PWM duty cycles stay zero at this layer; the downstream motor driver
//! owns the three-phase modulation.

use ecu_common::consts::{EPS_CURRENT_LIMIT_DEGRADED_A, EPS_CURRENT_LIMIT_NORMAL_A};
use ecu_common::hal::MotorCommand;

use crate::assist::AssistanceParams;
use crate::state::{EpsSystemState, OperatingMode, SystemStatus};

/// Build the motor command for this tick's limited assist parameters.
pub fn build_motor_command(
    params: &AssistanceParams,
    state: &EpsSystemState,
    now: u32,
) -> MotorCommand {
    let current_limit_a = if state.mode == OperatingMode::Degraded {
        EPS_CURRENT_LIMIT_DEGRADED_A
    } else {
        EPS_CURRENT_LIMIT_NORMAL_A
    };

    MotorCommand {
        target_torque_nm: params.total_nm,
        current_limit_a,
        enable: state.assistance_enabled() && state.status != SystemStatus::Fault,
        timestamp: now,
        pwm_duty: [0, 0, 0],
    }
}
