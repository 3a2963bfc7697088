//! Calendar register access and the epoch's calendar rules
//!
//! The hardware counter is clocked by the 32.768 kHz oscillator and runs
//! asynchronously to the CPU, so a single read of the date/time/sub-second
//! registers can straddle an increment. [`read_now`] re-reads until two
//! consecutive sub-second values agree.

use hal_abstractions::rtc::{CalendarValue, RtcHardware};

use crate::config::RtcConfig;
use crate::error::RtcError;

/// Number of seconds in a minute
pub const SECONDS_IN_MINUTE: u32 = 60;

/// Number of seconds in an hour
pub const SECONDS_IN_HOUR: u32 = 3_600;

/// Number of seconds in a day
pub const SECONDS_IN_DAY: u32 = 86_400;

/// Number of seconds in a leap year
pub const SECONDS_IN_LEAP_YEAR: u32 = 31_622_400;

/// Number of seconds in a common year
pub const SECONDS_IN_YEAR: u32 = 31_536_000;

/// Number of days in each month of a common year
const DAYS_IN_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Number of days in each month of a leap year
const DAYS_IN_MONTH_LEAP_YEAR: [u8; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Check if a year of the epoch window is a leap year
///
/// Years count from 2000 and every fourth one is a leap year. There is no
/// century exception, which makes the rule exact for 2000-2099 only.
pub fn is_leap_year(year: u8) -> bool {
    year == 0 || year.is_multiple_of(4)
}

/// Month length table for `year`
pub fn month_lengths(year: u8) -> &'static [u8; 12] {
    if is_leap_year(year) {
        &DAYS_IN_MONTH_LEAP_YEAR
    } else {
        &DAYS_IN_MONTH
    }
}

/// Number of days in `month` (1-12) of `year`
///
/// Out-of-range months are clamped into 1-12.
pub fn days_in_month(year: u8, month: u8) -> u8 {
    let index = usize::from(month.saturating_sub(1)).min(11);
    month_lengths(year)[index]
}

/// Whether every field of `value` is within its range for its year and month
pub fn is_valid(value: &CalendarValue) -> bool {
    value.year <= 99
        && (1..=12).contains(&value.month)
        && value.day >= 1
        && value.day <= days_in_month(value.year, value.month)
        && value.hours < 24
        && value.minutes < 60
        && value.seconds < 60
}

/// Read the calendar, rejecting torn reads
///
/// Reads until two consecutive snapshots carry the same sub-second value.
/// Gives up with [`RtcError::HardwareFault`] after `max_attempts` re-reads.
pub fn read_now<H: RtcHardware>(hw: &mut H, max_attempts: u8) -> Result<CalendarValue, RtcError> {
    let mut previous = hw.read_calendar().map_err(|_| RtcError::HardwareFault)?;

    for _ in 0..max_attempts {
        let current = hw.read_calendar().map_err(|_| RtcError::HardwareFault)?;
        if current.subticks == previous.subticks {
            return Ok(current);
        }
        previous = current;
    }

    warn!("RTC calendar did not settle after {=u8} re-reads", max_attempts);
    Err(RtcError::HardwareFault)
}

/// Write the seed calendar unless a previous boot already did
///
/// The sentinel lives in a battery-backed register, so once it is written
/// later boots leave the running calendar alone. Returns `true` if the
/// calendar was written by this call.
pub fn seed_if_unset<H: RtcHardware>(hw: &mut H, config: &RtcConfig) -> Result<bool, RtcError> {
    if hw.read_backup(config.sentinel_register) == config.seeded_sentinel {
        return Ok(false);
    }

    if !is_valid(&config.seed) {
        error!("Refusing to seed RTC with an invalid calendar");
        return Err(RtcError::InvalidCalendar);
    }

    hw.write_calendar(&config.seed)
        .map_err(|_| RtcError::HardwareFault)?;
    hw.write_backup(config.sentinel_register, config.seeded_sentinel);
    Ok(true)
}
