//! Real-time clock capability interface
//!
//! The calendar counter, its alarm comparator, the backup registers and the
//! stop-mode entry all live behind [`RtcHardware`]. Everything above this
//! trait is hardware-agnostic.

/// Raw calendar register contents
///
/// `subticks` counts *down* from 255 to 0 within one second, so the
/// fraction of the second already elapsed is `(255 - subticks) / 256`.
/// `day` is the raw day-of-month field; values derived from tick arithmetic
/// may be 0 or exceed the month length until normalized.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarValue {
    /// Years since the epoch (0-99)
    pub year: u8,
    /// Month (1-12)
    pub month: u8,
    /// Day of month (1-31)
    pub day: u8,
    /// Hours (0-23)
    pub hours: u8,
    /// Minutes (0-59)
    pub minutes: u8,
    /// Seconds (0-59)
    pub seconds: u8,
    /// Sub-second down-counter (255-0)
    pub subticks: u8,
}

impl CalendarValue {
    /// Create a calendar value
    pub const fn new(
        year: u8,
        month: u8,
        day: u8,
        hours: u8,
        minutes: u8,
        seconds: u8,
        subticks: u8,
    ) -> Self {
        Self {
            year,
            month,
            day,
            hours,
            minutes,
            seconds,
            subticks,
        }
    }
}

/// Alarm compare fields
///
/// The alarm fires on an exact match of every field, never on a periodic
/// mask. Month and year are not compared by the hardware.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmMatch {
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub subticks: u8,
}

impl From<CalendarValue> for AlarmMatch {
    fn from(value: CalendarValue) -> Self {
        Self {
            day: value.day,
            hours: value.hours,
            minutes: value.minutes,
            seconds: value.seconds,
            subticks: value.subticks,
        }
    }
}

impl AlarmMatch {
    /// Whether `now` satisfies this compare value
    pub fn matches(&self, now: &CalendarValue) -> bool {
        *self == AlarmMatch::from(*now)
    }
}

/// What brought the MCU out of stop mode
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// The wake-up flag is set: the alarm woke the MCU
    Alarm,
    /// Any other interrupt source, or no stop mode at all
    Other,
}

/// Board-specific RTC operations
///
/// Implementations talk to registers directly and must not cache anything:
/// callers provide the critical section around multi-step sequences.
pub trait RtcHardware {
    /// Error reported by register-level operations
    type Error: core::fmt::Debug;

    /// Single snapshot of the date, time and sub-second fields
    ///
    /// The counter runs asynchronously to the CPU, so one snapshot may be
    /// torn. Callers debounce.
    fn read_calendar(&mut self) -> Result<CalendarValue, Self::Error>;

    /// Overwrite the running calendar
    fn write_calendar(&mut self, value: &CalendarValue) -> Result<(), Self::Error>;

    /// Program the alarm compare register and enable its interrupt
    fn arm_alarm(&mut self, target: &AlarmMatch) -> Result<(), Self::Error>;

    /// Disable the alarm and acknowledge any pending match
    ///
    /// Disarming an alarm that was never armed is not an error.
    fn disarm_alarm(&mut self) -> Result<(), Self::Error>;

    /// Read a battery-backed register
    fn read_backup(&mut self, index: usize) -> u32;

    /// Write a battery-backed register
    fn write_backup(&mut self, index: usize, value: u32);

    /// Shut down peripherals that are not needed while stopped
    ///
    /// Also where the supply voltage detector gets disabled.
    fn prepare_stop_mode(&mut self) {}

    /// Enter stop mode; returns once any enabled interrupt source fires
    fn enter_stop_mode(&mut self);

    /// Report the wake-up flag
    fn wake_cause(&mut self) -> WakeCause;

    /// Clear the wake-up flag
    fn clear_wake_cause(&mut self);
}
