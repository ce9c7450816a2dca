//! Safety supervisor state machine and escalation policy.
//!
//! Owns the overall safety state (`Init → Operational ↔ Degraded →
//! Fault → Shutdown`), the watchdog descriptors, the memory canaries and
//! the dual-channel monitor. Violations map to a fixed severity and
//! escalate through one policy: Low logs, Medium degrades, High faults,
//! Critical performs the graceful shutdown (full manual braking pressure
//! on all four wheels, shutdown event and CAN notification).
//!
//! `Shutdown` is terminal until an external [`SafetySupervisor::reset`];
//! anything reported afterwards is logged but cannot un-shutdown.

use tracing::{error, info, warn};

use ecu_common::consts::{
    SAFETY_COMMS_WATCHDOG_TIMEOUT_MS, SAFETY_CONTROL_WATCHDOG_TIMEOUT_MS,
    SAFETY_DIAG_WATCHDOG_TIMEOUT_MS, SAFETY_EMERGENCY_WATCHDOG_TIMEOUT_MS,
    SAFETY_MAIN_WATCHDOG_TIMEOUT_MS, SAFETY_MAX_CYCLE_TIME_MS,
    SAFETY_MAX_DUAL_CHANNEL_FAILURES, SAFETY_MIN_KICK_INTERVAL_MS,
    SAFETY_MONITOR_WATCHDOG_TIMEOUT_MS,
};
use ecu_common::diag::{DiagEventKind, DtcCode};
use ecu_common::error::EcuError;
use ecu_common::hal::{ActuatorSink, CommsSink, WatchdogId, tick_delta};
use ecu_common::wheel::WheelPosition;
use ecu_diagnostic::DiagnosticStore;

use crate::crc::crc32_verify;
use crate::memory::MemoryGuard;
use crate::watchdog::WatchdogTimer;

// ─── State & violation vocabulary ───────────────────────────────────

/// Overall safety state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SafetyState {
    /// Startup, before the self-test has passed.
    Init = 0,
    /// All monitors healthy.
    Operational = 1,
    /// Medium-severity condition present; reduced functionality.
    Degraded = 2,
    /// High-severity condition latched; fault reaction active.
    Fault = 3,
    /// Terminal safe state; only manual control remains.
    Shutdown = 4,
}

impl SafetyState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Init),
            1 => Some(Self::Operational),
            2 => Some(Self::Degraded),
            3 => Some(Self::Fault),
            4 => Some(Self::Shutdown),
            _ => None,
        }
    }
}

impl Default for SafetyState {
    fn default() -> Self {
        Self::Init
    }
}

/// Integrity level the supervisor enforces; fixed to the highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafetyLevel {
    /// ASIL-D equivalent.
    #[default]
    AsilD,
}

/// Violation kinds observed by the monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    /// Cycle time exceeded its budget.
    Timing,
    /// Canary pattern destroyed.
    Memory,
    /// Watchdog kicked abnormally.
    Watchdog,
    /// Redundant channels disagree.
    DualChannel,
    /// System-level integrity failure (expired watchdog, lost sensors).
    Integrity,
}

impl Violation {
    /// All kinds, in counter-index order.
    pub const ALL: [Self; 5] = [
        Self::Timing,
        Self::Memory,
        Self::Watchdog,
        Self::DualChannel,
        Self::Integrity,
    ];

    /// Fault-counter index.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Timing => 0,
            Self::Memory => 1,
            Self::Watchdog => 2,
            Self::DualChannel => 3,
            Self::Integrity => 4,
        }
    }

    /// Constant severity of this violation kind.
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::Timing => Severity::Medium,
            Self::Memory => Severity::High,
            Self::Watchdog => Severity::High,
            Self::DualChannel => Severity::High,
            Self::Integrity => Severity::Critical,
        }
    }

    /// Trouble code stored when this violation is reported.
    pub const fn dtc(self) -> DtcCode {
        match self {
            Self::Timing => DtcCode::TimingViolation,
            Self::Memory => DtcCode::MemoryCorruption,
            Self::Watchdog => DtcCode::WatchdogTimeout,
            Self::DualChannel => DtcCode::DualChannelMismatch,
            Self::Integrity => DtcCode::SystemIntegrityFault,
        }
    }
}

/// Escalation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Log only.
    Low,
    /// Transition to Degraded.
    Medium,
    /// Transition to Fault, latch the fault reaction.
    High,
    /// Graceful shutdown.
    Critical,
}

// ─── Monitor sub-state ──────────────────────────────────────────────

/// Per-cycle timing statistics.
#[derive(Debug, Clone, Copy)]
pub struct TimingStats {
    /// Tick of the previous monitor call.
    pub last_cycle_tick: u32,
    /// Longest observed cycle [ms].
    pub max_cycle_time_ms: u32,
    /// Cycles that exceeded the budget.
    pub overrun_count: u32,
}

/// Dual-channel comparison state.
#[derive(Debug, Clone, Copy)]
pub struct DualChannelState {
    /// Primary computation channel alive.
    pub primary_active: bool,
    /// Secondary computation channel alive.
    pub secondary_active: bool,
    /// Comparison failures observed.
    pub comparison_failures: u32,
    /// Tick of the last executed comparison.
    pub last_comparison_tick: u32,
    /// Value pair submitted for the next comparison: (primary, secondary, tolerance).
    submitted: Option<(f32, f32, f32)>,
}

/// Aggregate supervisor counters for external reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyStatistics {
    /// Violations reported since init.
    pub total_violations: u32,
    /// Current safety state.
    pub current_state: SafetyState,
    /// Longest observed cycle [ms].
    pub max_cycle_time_ms: u32,
    /// Cycle budget overruns.
    pub cycle_overruns: u32,
    /// Dual-channel comparison failures.
    pub dual_channel_failures: u32,
    /// Memory corruption events.
    pub memory_corruptions: u32,
}

// ─── Supervisor ─────────────────────────────────────────────────────

/// The single safety supervisor instance.
#[derive(Debug)]
pub struct SafetySupervisor {
    state: SafetyState,
    previous_state: SafetyState,
    level: SafetyLevel,
    timing: TimingStats,
    memory: MemoryGuard,
    dual_channel: DualChannelState,
    watchdogs: [WatchdogTimer; WatchdogId::COUNT],
    fault_counters: [u32; Violation::ALL.len()],
    total_violations: u32,
    fault_reaction_active: bool,
    system_enabled: bool,
}

impl SafetySupervisor {
    /// Supervisor in `Init`, watchdogs primed at `now`, emergency disarmed.
    pub fn new(now: u32) -> Self {
        let watchdogs = [
            WatchdogTimer::new(SAFETY_MAIN_WATCHDOG_TIMEOUT_MS, SAFETY_MIN_KICK_INTERVAL_MS, now),
            WatchdogTimer::new(
                SAFETY_MONITOR_WATCHDOG_TIMEOUT_MS,
                SAFETY_MIN_KICK_INTERVAL_MS,
                now,
            ),
            WatchdogTimer::new(
                SAFETY_CONTROL_WATCHDOG_TIMEOUT_MS,
                SAFETY_MIN_KICK_INTERVAL_MS,
                now,
            ),
            WatchdogTimer::new(
                SAFETY_CONTROL_WATCHDOG_TIMEOUT_MS,
                SAFETY_MIN_KICK_INTERVAL_MS,
                now,
            ),
            WatchdogTimer::new(
                SAFETY_COMMS_WATCHDOG_TIMEOUT_MS,
                SAFETY_MIN_KICK_INTERVAL_MS,
                now,
            ),
            WatchdogTimer::new(
                SAFETY_DIAG_WATCHDOG_TIMEOUT_MS,
                SAFETY_MIN_KICK_INTERVAL_MS,
                now,
            ),
            // The emergency watchdog is armed by the graceful shutdown and
            // serviced with no lower kick bound from the emergency loop.
            WatchdogTimer::disarmed(SAFETY_EMERGENCY_WATCHDOG_TIMEOUT_MS, 0),
        ];
        Self {
            state: SafetyState::Init,
            previous_state: SafetyState::Init,
            level: SafetyLevel::AsilD,
            timing: TimingStats {
                last_cycle_tick: now,
                max_cycle_time_ms: 0,
                overrun_count: 0,
            },
            memory: MemoryGuard::new(),
            dual_channel: DualChannelState {
                primary_active: true,
                secondary_active: true,
                comparison_failures: 0,
                last_comparison_tick: now,
                submitted: None,
            },
            watchdogs,
            fault_counters: [0; Violation::ALL.len()],
            total_violations: 0,
            fault_reaction_active: false,
            system_enabled: false,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Current safety state.
    #[inline]
    pub const fn state(&self) -> SafetyState {
        self.state
    }

    /// State before the most recent transition.
    #[inline]
    pub const fn previous_state(&self) -> SafetyState {
        self.previous_state
    }

    /// Enforced integrity level.
    #[inline]
    pub const fn level(&self) -> SafetyLevel {
        self.level
    }

    /// Whether the control laws may run.
    #[inline]
    pub const fn system_enabled(&self) -> bool {
        self.system_enabled
    }

    /// Whether the High-severity fault reaction is latched.
    #[inline]
    pub const fn fault_reaction_active(&self) -> bool {
        self.fault_reaction_active
    }

    /// One watchdog descriptor.
    pub fn watchdog(&self, id: WatchdogId) -> &WatchdogTimer {
        &self.watchdogs[id.index()]
    }

    /// System is safe while Operational/Degraded with healthy monitors.
    pub fn is_system_safe(&self) -> bool {
        matches!(self.state, SafetyState::Operational | SafetyState::Degraded)
            && self.memory.corruption_count() == 0
            && self.dual_channel.comparison_failures <= SAFETY_MAX_DUAL_CHANNEL_FAILURES
    }

    /// Aggregate counters.
    pub fn statistics(&self) -> SafetyStatistics {
        SafetyStatistics {
            total_violations: self.total_violations,
            current_state: self.state,
            max_cycle_time_ms: self.timing.max_cycle_time_ms,
            cycle_overruns: self.timing.overrun_count,
            dual_channel_failures: self.dual_channel.comparison_failures,
            memory_corruptions: self.memory.corruption_count(),
        }
    }

    /// Violations reported for one kind.
    pub fn fault_count(&self, violation: Violation) -> u32 {
        self.fault_counters[violation.index()]
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Run the startup self-test and enter `Operational`.
    ///
    /// # Errors
    /// `SelfTestFailed` (and a `SafetySelfTestFailed` DTC) when any check
    /// fails; the supervisor stays in `Init`.
    pub fn complete_init(
        &mut self,
        now: u32,
        diag: &mut DiagnosticStore,
    ) -> Result<(), EcuError> {
        if self.state != SafetyState::Init {
            return Err(EcuError::InvalidParam);
        }
        if self.self_test().is_err() {
            let _ = diag.set_dtc(DtcCode::SafetySelfTestFailed, now);
            return Err(EcuError::SelfTestFailed);
        }
        self.transition(SafetyState::Operational, now, diag);
        self.system_enabled = true;
        diag.log_event(DiagEventKind::SystemStart, 0, now);
        Ok(())
    }

    /// Startup self-test: canaries, CRC reference vector, state encoding,
    /// watchdog kick round-trip.
    fn self_test(&mut self) -> Result<(), EcuError> {
        self.memory.verify().map_err(|_| EcuError::SelfTestFailed)?;
        if !crc32_verify(b"123456789", 0x0376_E6E7) {
            return Err(EcuError::SelfTestFailed);
        }
        if SafetyState::from_u8(SafetyState::Degraded as u8) != Some(SafetyState::Degraded) {
            return Err(EcuError::SelfTestFailed);
        }
        let mut scratch = WatchdogTimer::new(10, 0, 0);
        scratch.kick(1).map_err(|_| EcuError::SelfTestFailed)?;
        Ok(())
    }

    /// Leave `Degraded` after the medium-severity condition cleared.
    ///
    /// # Errors
    /// `InvalidParam` from any state other than `Degraded`.
    pub fn recover(&mut self, now: u32, diag: &mut DiagnosticStore) -> Result<(), EcuError> {
        if self.state != SafetyState::Degraded {
            return Err(EcuError::InvalidParam);
        }
        self.transition(SafetyState::Operational, now, diag);
        Ok(())
    }

    /// External reset out of the terminal `Shutdown` state.
    pub fn reset(&mut self, now: u32) {
        *self = Self::new(now);
    }

    // ── Watchdogs ───────────────────────────────────────────────────

    /// Service one watchdog; abnormal kicks report a `Watchdog` violation.
    pub fn kick<A: ActuatorSink, C: CommsSink>(
        &mut self,
        id: WatchdogId,
        now: u32,
        diag: &mut DiagnosticStore,
        actuators: &mut A,
        comms: &mut C,
    ) -> Result<(), EcuError> {
        let result = self.watchdogs[id.index()].kick(now);
        if result == Err(EcuError::WatchdogViolation) {
            self.report_violation(
                Violation::Watchdog,
                Violation::Watchdog.default_severity(),
                now,
                diag,
                actuators,
                comms,
            );
        }
        result
    }

    /// Arm the emergency watchdog (normally done by the graceful shutdown).
    pub fn arm_emergency_watchdog(&mut self, now: u32) {
        self.watchdogs[WatchdogId::Emergency.index()].arm(now);
    }

    /// Service the emergency watchdog from the shutdown loop or the
    /// emergency interrupt. No reporting: past shutdown nothing escalates.
    pub fn kick_emergency(&mut self, now: u32) {
        let _ = self.watchdogs[WatchdogId::Emergency.index()].kick(now);
    }

    // ── Dual channel ────────────────────────────────────────────────

    /// Submit the redundant value pair for the next per-cycle comparison.
    pub fn submit_dual_channel(&mut self, primary: f32, secondary: f32, tolerance: f32) {
        self.dual_channel.submitted = Some((primary, secondary, tolerance));
    }

    /// Mark the processing channels alive or dead.
    pub fn set_channel_activity(&mut self, primary: bool, secondary: bool) {
        self.dual_channel.primary_active = primary;
        self.dual_channel.secondary_active = secondary;
    }

    // ── Per-cycle monitor ───────────────────────────────────────────

    /// Per-cycle monitor: timing → watchdog integrity → canaries → dual
    /// channel. Returns the (possibly escalated) safety state.
    ///
    /// In `Shutdown` the monitor is inert; only the emergency loop runs.
    pub fn monitor<A: ActuatorSink, C: CommsSink>(
        &mut self,
        now: u32,
        diag: &mut DiagnosticStore,
        actuators: &mut A,
        comms: &mut C,
    ) -> SafetyState {
        if self.state == SafetyState::Shutdown {
            return self.state;
        }

        // 1. Cycle timing.
        let cycle_time = tick_delta(now, self.timing.last_cycle_tick);
        self.timing.last_cycle_tick = now;
        if cycle_time > self.timing.max_cycle_time_ms {
            self.timing.max_cycle_time_ms = cycle_time;
        }
        if cycle_time > SAFETY_MAX_CYCLE_TIME_MS {
            self.timing.overrun_count += 1;
            self.report_violation(
                Violation::Timing,
                Violation::Timing.default_severity(),
                now,
                diag,
                actuators,
                comms,
            );
        }

        // 2. Watchdog expiry is a system-integrity failure.
        let any_expired = self.watchdogs.iter().any(|wd| wd.is_expired(now));
        if any_expired {
            self.report_violation(
                Violation::Integrity,
                Violation::Integrity.default_severity(),
                now,
                diag,
                actuators,
                comms,
            );
        }

        // 3. Memory canaries (verify restores the pattern).
        if self.memory.verify().is_err() {
            self.report_violation(
                Violation::Memory,
                Violation::Memory.default_severity(),
                now,
                diag,
                actuators,
                comms,
            );
        }

        // 4. Dual-channel comparison.
        if self.dual_channel.primary_active && self.dual_channel.secondary_active {
            if let Some((primary, secondary, tolerance)) = self.dual_channel.submitted.take() {
                self.dual_channel.last_comparison_tick = now;
                if crate::checks::dual_channel_compare(primary, secondary, tolerance).is_err() {
                    self.dual_channel.comparison_failures += 1;
                    self.report_violation(
                        Violation::DualChannel,
                        Violation::DualChannel.default_severity(),
                        now,
                        diag,
                        actuators,
                        comms,
                    );
                }
            }
        }

        self.state
    }

    // ── Violation handling ──────────────────────────────────────────

    /// Record a violation and apply the severity escalation.
    pub fn report_violation<A: ActuatorSink, C: CommsSink>(
        &mut self,
        violation: Violation,
        severity: Severity,
        now: u32,
        diag: &mut DiagnosticStore,
        actuators: &mut A,
        comms: &mut C,
    ) {
        self.total_violations += 1;
        self.fault_counters[violation.index()] += 1;
        let _ = diag.set_dtc(violation.dtc(), now);
        diag.log_event(DiagEventKind::SafetyViolation, violation.index() as u32, now);
        warn!(?violation, ?severity, state = ?self.state, "safety violation");

        match severity {
            Severity::Low => {}
            Severity::Medium => {
                if self.state == SafetyState::Operational {
                    self.transition(SafetyState::Degraded, now, diag);
                }
            }
            Severity::High => {
                if self.state != SafetyState::Shutdown && self.state != SafetyState::Fault {
                    self.transition(SafetyState::Fault, now, diag);
                }
                self.fault_reaction_active = true;
            }
            Severity::Critical => {
                self.graceful_shutdown(now, diag, actuators, comms);
            }
        }
    }

    /// Graceful shutdown: terminal safe state with manual braking.
    ///
    /// Idempotent: the shutdown event and notification are emitted once.
    pub fn graceful_shutdown<A: ActuatorSink, C: CommsSink>(
        &mut self,
        now: u32,
        diag: &mut DiagnosticStore,
        actuators: &mut A,
        comms: &mut C,
    ) {
        if self.state == SafetyState::Shutdown {
            return;
        }
        self.transition(SafetyState::Shutdown, now, diag);
        self.system_enabled = false;
        self.fault_reaction_active = true;

        for wheel in WheelPosition::ALL {
            if actuators.set_wheel_pressure(wheel, 1.0).is_err() {
                error!(wheel = wheel.label(), "manual pressure command failed");
            }
        }
        if actuators.shutdown().is_err() {
            error!("actuator shutdown failed");
        }
        diag.log_event(DiagEventKind::SystemShutdown, 0, now);
        if comms.send_shutdown_notification().is_err() {
            error!("shutdown notification failed");
        }
        self.arm_emergency_watchdog(now);
        info!("graceful shutdown complete, manual control remains available");
    }

    fn transition(&mut self, new: SafetyState, now: u32, diag: &mut DiagnosticStore) {
        if self.state == new {
            return;
        }
        self.previous_state = self.state;
        self.state = new;
        diag.log_event(DiagEventKind::SafetyStateChange, new as u32, now);
        info!(from = ?self.previous_state, to = ?new, "safety state transition");
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
