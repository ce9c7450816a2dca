//! Per-wheel ABS state: measurements, state machine and statistics.

use ecu_common::calib::WheelCalibration;
use ecu_common::consts::{ACCEL_FILTER_ALPHA, CYCLE_TIME_MS};
use ecu_common::filter::LowPassFilter;
use ecu_common::math::{km_h_to_m_s, slip_ratio};

use crate::state::{AbsPhase, AbsState};

/// Monotone per-wheel statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelStatistics {
    /// Entries into the `Active` state.
    pub activation_count: u32,
    /// Accumulated time spent `Active` [ms].
    pub total_active_time_ms: u32,
    /// Highest slip ratio observed.
    pub max_slip_ratio: f32,
    /// Tick of the most recent `Active` cycle.
    pub last_activation_tick: u32,
    /// Fault latches observed.
    pub fault_count: u32,
}

/// Outcome of one state-machine step, interpreted by the system level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// No transition this tick.
    None,
    /// Entered `Active`; `from_inactive` distinguishes a fresh activation
    /// from a re-entry out of `Monitoring`.
    Activated {
        /// True when the previous state was `Inactive`.
        from_inactive: bool,
    },
    /// Left `Active` for `Monitoring`.
    Deactivated,
    /// Fault latched while `Active`.
    Faulted,
    /// Fault cleared, wheel back to `Inactive`.
    Cleared,
}

/// Complete per-wheel control state.
#[derive(Debug, Clone, Copy)]
pub struct AbsWheelState {
    /// Current ABS state.
    pub state: AbsState,
    /// Current modulation phase (meaningful while `Active`).
    pub phase: AbsPhase,
    /// Current slip ratio ∈ [0, 1].
    pub slip_ratio: f32,
    /// Commanded pressure ∈ [0, 1]; starts at master-cylinder pass-through.
    pub pressure_command: f32,
    /// Wheel speed of the previous tick [km/h].
    pub previous_speed_kmh: f32,
    /// Filtered wheel acceleration [m/s²].
    pub wheel_acceleration: f32,
    /// Tick of the current activation cycle.
    pub activation_tick: u32,
    /// Tick of the current phase entry.
    pub phase_tick: u32,
    /// Tick of the previous reduction-phase entry, for the
    /// modulation-frequency plausibility log.
    pub last_reduction_entry: Option<u32>,
    /// Sensor fault latched for this wheel.
    pub fault: bool,
    /// Monotone statistics.
    pub stats: WheelStatistics,
    accel_filter: LowPassFilter,
}

impl AbsWheelState {
    /// Fresh wheel at standstill, pressure at full pass-through.
    pub const fn new() -> Self {
        Self {
            state: AbsState::Inactive,
            phase: AbsPhase::Normal,
            slip_ratio: 0.0,
            pressure_command: 1.0,
            previous_speed_kmh: 0.0,
            wheel_acceleration: 0.0,
            activation_tick: 0,
            phase_tick: 0,
            last_reduction_entry: None,
            fault: false,
            stats: WheelStatistics {
                activation_count: 0,
                total_active_time_ms: 0,
                max_slip_ratio: 0.0,
                last_activation_tick: 0,
                fault_count: 0,
            },
            accel_filter: LowPassFilter::new(ACCEL_FILTER_ALPHA),
        }
    }

    /// Update slip ratio and filtered acceleration from this tick's wheel
    /// speed and the vehicle reference speed.
    pub fn update_measurements(&mut self, speed_kmh: f32, vehicle_speed_kmh: f32) {
        let dt_s = CYCLE_TIME_MS as f32 / 1000.0;
        let raw_accel =
            (km_h_to_m_s(speed_kmh) - km_h_to_m_s(self.previous_speed_kmh)) / dt_s;
        self.wheel_acceleration = self.accel_filter.apply(raw_accel);
        self.slip_ratio = slip_ratio(speed_kmh, vehicle_speed_kmh);
        self.previous_speed_kmh = speed_kmh;
    }

    /// Enter a modulation phase, stamping the phase timer.
    pub fn enter_phase(&mut self, phase: AbsPhase, now: u32) {
        self.phase = phase;
        self.phase_tick = now;
    }

    /// Execute one state-machine step.
    ///
    /// `activation_allowed` gates the `Inactive → Active` arc on the
    /// algorithm self-test having passed.
    pub fn step(
        &mut self,
        vehicle_speed: f32,
        cal: &WheelCalibration,
        min_activation_speed: f32,
        activation_allowed: bool,
        now: u32,
    ) -> StateChange {
        let previous = self.state;

        match self.state {
            AbsState::Inactive => {
                if activation_allowed
                    && vehicle_speed > min_activation_speed
                    && self.slip_ratio > cal.slip_threshold
                    && !self.fault
                {
                    self.state = AbsState::Active;
                    self.activation_tick = now;
                    self.enter_phase(AbsPhase::PressureReduction, now);
                }
            }
            AbsState::Monitoring => {
                if self.fault {
                    self.state = AbsState::Fault;
                } else if self.slip_ratio > cal.slip_threshold {
                    self.state = AbsState::Active;
                    self.enter_phase(AbsPhase::PressureReduction, now);
                } else if vehicle_speed < min_activation_speed {
                    self.state = AbsState::Inactive;
                }
            }
            AbsState::Active => {
                if self.fault {
                    self.state = AbsState::Fault;
                } else if self.slip_ratio < cal.slip_target && self.wheel_acceleration > -1.0 {
                    self.state = AbsState::Monitoring;
                    self.phase = AbsPhase::Normal;
                }
            }
            AbsState::Fault => {
                if !self.fault {
                    self.state = AbsState::Inactive;
                }
            }
        }

        if previous != AbsState::Active && self.state == AbsState::Active {
            self.stats.activation_count += 1;
            StateChange::Activated {
                from_inactive: previous == AbsState::Inactive,
            }
        } else if previous == AbsState::Active && self.state == AbsState::Monitoring {
            StateChange::Deactivated
        } else if previous != AbsState::Fault && self.state == AbsState::Fault {
            StateChange::Faulted
        } else if previous == AbsState::Fault && self.state == AbsState::Inactive {
            StateChange::Cleared
        } else {
            StateChange::None
        }
    }

    /// Per-tick statistics update.
    pub fn update_statistics(&mut self, now: u32) {
        if self.slip_ratio > self.stats.max_slip_ratio {
            self.stats.max_slip_ratio = self.slip_ratio;
        }
        if self.state == AbsState::Active {
            self.stats.total_active_time_ms += CYCLE_TIME_MS;
            self.stats.last_activation_tick = now;
        }
    }
}

impl Default for AbsWheelState {
    fn default() -> Self {
        Self::new()
    }
}
