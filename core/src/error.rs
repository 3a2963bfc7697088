//! RTC time base error types

/// RTC time base operation errors
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcError {
    /// Shared timer used before `init`
    NotInitialized,
    /// Calendar reads never settled, or a register handshake timed out
    HardwareFault,
    /// The alarm comparator rejected the programmed value
    AlarmProgramFailed,
    /// Calendar value outside its field ranges
    InvalidCalendar,
}

impl core::fmt::Display for RtcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "RTC not initialized"),
            Self::HardwareFault => write!(f, "RTC hardware fault"),
            Self::AlarmProgramFailed => write!(f, "RTC alarm programming failed"),
            Self::InvalidCalendar => write!(f, "Invalid calendar value"),
        }
    }
}

// Implement core::error::Error for no_std compatibility
impl core::error::Error for RtcError {}
