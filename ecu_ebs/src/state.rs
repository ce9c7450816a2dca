//! ABS state and modulation-phase enums.
//!
//! `#[repr(u8)]` for compact diagnostic payloads; the phases are only
//! meaningful while the wheel is `Active`.

/// Per-wheel ABS state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AbsState {
    /// No intervention, vehicle below activation speed or slip nominal.
    Inactive = 0,
    /// Recently active; watching for slip re-entry.
    Monitoring = 1,
    /// Modulating brake pressure.
    Active = 2,
    /// Wheel sensor faulted; full manual pressure.
    Fault = 3,
}

impl AbsState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Inactive),
            1 => Some(Self::Monitoring),
            2 => Some(Self::Active),
            3 => Some(Self::Fault),
            _ => None,
        }
    }
}

impl Default for AbsState {
    fn default() -> Self {
        Self::Inactive
    }
}

/// Pressure modulation phase, used only inside `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AbsPhase {
    /// Master-cylinder pass-through.
    Normal = 0,
    /// Pressure stepped down each cycle.
    PressureReduction = 1,
    /// Pressure held while the wheel recovers.
    PressureHold = 2,
    /// Pressure stepped back up each cycle.
    PressureIncrease = 3,
}

impl AbsPhase {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::PressureReduction),
            2 => Some(Self::PressureHold),
            3 => Some(Self::PressureIncrease),
            _ => None,
        }
    }
}

impl Default for AbsPhase {
    fn default() -> Self {
        Self::Normal
    }
}
