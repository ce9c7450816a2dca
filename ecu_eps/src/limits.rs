//! Safety limiting of the assist total.
//!
//! Chain order: magnitude clamp (DTC 0x5001) → oscillation rejection over
//! a 10-deep ring of recent totals (DTC 0x5003) → per-tick rate limit
//! against the previous output. The rate constant is a per-tick delta by
//! design; see `EPS_MAX_ASSIST_RATE_NM`.

use ecu_common::consts::{
    EPS_MAX_ASSIST_RATE_NM, EPS_MAX_ASSIST_TORQUE_NM, EPS_OSCILLATION_AMPLITUDE_NM,
    EPS_OSCILLATION_BUFFER_SIZE, EPS_OSCILLATION_SIGN_CHANGES,
};
use ecu_common::diag::DtcCode;
use ecu_diagnostic::DiagnosticStore;

use crate::assist::AssistanceParams;

/// Count sign changes and peak amplitude over a torque history; true when
/// the buffer shows a harmful oscillation (> 4 sign changes at > 2 Nm).
pub fn detect_oscillation(data: &[f32]) -> bool {
    if data.len() < 3 {
        return false;
    }
    let mut sign_changes = 0u8;
    let mut max_amplitude = 0.0_f32;
    for pair in data.windows(2) {
        if (pair[0] > 0.0 && pair[1] < 0.0) || (pair[0] < 0.0 && pair[1] > 0.0) {
            sign_changes += 1;
        }
        max_amplitude = max_amplitude.max(pair[1].abs());
    }
    sign_changes > EPS_OSCILLATION_SIGN_CHANGES && max_amplitude > EPS_OSCILLATION_AMPLITUDE_NM
}

/// Stateful safety-limiting chain.
#[derive(Debug, Clone, Copy)]
pub struct SafetyLimiter {
    history: [f32; EPS_OSCILLATION_BUFFER_SIZE],
    index: usize,
    prev_total: f32,
}

impl SafetyLimiter {
    /// Fresh limiter with an empty (zeroed) history.
    pub const fn new() -> Self {
        Self {
            history: [0.0; EPS_OSCILLATION_BUFFER_SIZE],
            index: 0,
            prev_total: 0.0,
        }
    }

    /// Apply the limiting chain to this tick's parameters, setting the
    /// sticky flags and the corresponding DTCs.
    pub fn apply(&mut self, params: &mut AssistanceParams, diag: &mut DiagnosticStore, now: u32) {
        // Magnitude clamp.
        if params.total_nm.abs() > EPS_MAX_ASSIST_TORQUE_NM {
            let _ = diag.set_dtc(DtcCode::ExcessiveAssistTorque, now);
            params.total_nm = if params.total_nm > 0.0 {
                EPS_MAX_ASSIST_TORQUE_NM
            } else {
                -EPS_MAX_ASSIST_TORQUE_NM
            };
            params.safety_limited = true;
        }

        // Oscillation rejection over the recent-total ring.
        self.history[self.index] = params.total_nm;
        self.index = (self.index + 1) % EPS_OSCILLATION_BUFFER_SIZE;
        if detect_oscillation(&self.history) {
            let _ = diag.set_dtc(DtcCode::AssistOscillation, now);
            params.total_nm = 0.0;
            params.oscillation_detected = true;
        }

        // Per-tick rate limit against the previous output.
        let delta = params.total_nm - self.prev_total;
        if delta.abs() > EPS_MAX_ASSIST_RATE_NM {
            params.total_nm = if delta > 0.0 {
                self.prev_total + EPS_MAX_ASSIST_RATE_NM
            } else {
                self.prev_total - EPS_MAX_ASSIST_RATE_NM
            };
            params.rate_limited = true;
        }
        self.prev_total = params.total_nm;
    }

    /// Clear the history and the rate-limit reference (assist disabled).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Previous tick's final output [Nm].
    #[inline]
    pub const fn prev_total(&self) -> f32 {
        self.prev_total
    }
}

impl Default for SafetyLimiter {
    fn default() -> Self {
        Self::new()
    }
}
