//! EPS operating mode, status and system state.

/// Operating mode of the steering controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperatingMode {
    /// Startup, before the self-test has passed.
    Init = 0,
    /// Full assistance.
    Normal = 1,
    /// Reduced assistance (20 A current limit).
    Degraded = 2,
    /// Assistance off, motor disconnected, manual steering only.
    FailSafe = 3,
    /// Low-power state.
    Sleep = 4,
}

impl OperatingMode {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Init),
            1 => Some(Self::Normal),
            2 => Some(Self::Degraded),
            3 => Some(Self::FailSafe),
            4 => Some(Self::Sleep),
            _ => None,
        }
    }
}

impl Default for OperatingMode {
    fn default() -> Self {
        Self::Init
    }
}

/// Detailed controller status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SystemStatus {
    /// Initialization running.
    Initializing = 0,
    /// Initialized, waiting for the first control tick.
    Ready = 1,
    /// Control loop executing.
    Active = 2,
    /// Running with reduced capability.
    Degraded = 3,
    /// Fault latched.
    Fault = 4,
    /// Low-power state.
    Sleep = 5,
}

impl SystemStatus {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Initializing),
            1 => Some(Self::Ready),
            2 => Some(Self::Active),
            3 => Some(Self::Degraded),
            4 => Some(Self::Fault),
            5 => Some(Self::Sleep),
            _ => None,
        }
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::Initializing
    }
}

/// Aggregate EPS controller state.
///
/// Invariants: `FailSafe` and `Sleep` force `assistance_enabled = false`,
/// and manual steering is available in every mode: the field has no
/// setter and is born `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpsSystemState {
    /// Current operating mode.
    pub mode: OperatingMode,
    /// Current status.
    pub status: SystemStatus,
    /// Control ticks since init.
    pub uptime_ticks: u32,
    /// Faults recorded since init.
    pub fault_count: u32,
    /// Tick of the most recent fault.
    pub last_fault_tick: u32,
    manual_steering_available: bool,
    assistance_enabled: bool,
}

impl EpsSystemState {
    /// Fresh controller state: initializing, assistance off.
    pub const fn new() -> Self {
        Self {
            mode: OperatingMode::Init,
            status: SystemStatus::Initializing,
            uptime_ticks: 0,
            fault_count: 0,
            last_fault_tick: 0,
            manual_steering_available: true,
            assistance_enabled: false,
        }
    }

    /// Manual steering availability; true in every mode.
    #[inline]
    pub const fn manual_steering_available(&self) -> bool {
        self.manual_steering_available
    }

    /// Whether the assist motor may produce torque.
    #[inline]
    pub const fn assistance_enabled(&self) -> bool {
        self.assistance_enabled
    }

    /// Enter an operating mode, enforcing the assistance invariant.
    pub fn enter_mode(&mut self, mode: OperatingMode) {
        self.mode = mode;
        self.assistance_enabled = matches!(mode, OperatingMode::Normal | OperatingMode::Degraded);
    }

    /// Record a fault occurrence.
    pub fn record_fault(&mut self, now: u32) {
        self.fault_count += 1;
        self.last_fault_tick = now;
    }
}

impl Default for EpsSystemState {
    fn default() -> Self {
        Self::new()
    }
}
