//! Calendar to tick counter conversions
//!
//! A tick is one step of the sub-second counter. The RTC runs with
//! `PREDIV_A = 127` and `PREDIV_S = 255` off the 32.768 kHz LSE, which gives
//! 256 ticks per second. The monotonic tick counter is
//! `(seconds_since_epoch << 8) | (255 - subticks)` truncated to 32 bits, so
//! it wraps every 2^32 ticks (~497 days). Every comparison across it must
//! be wraparound-aware.
//!
//! Milliseconds relate to ticks by 1000/256 = 125/32. Both directions round
//! half up, which keeps a ms -> tick -> ms round trip within one tick.

use hal_abstractions::rtc::CalendarValue;

use crate::calendar::{
    days_in_month, is_leap_year, month_lengths, SECONDS_IN_DAY, SECONDS_IN_HOUR,
    SECONDS_IN_LEAP_YEAR, SECONDS_IN_MINUTE, SECONDS_IN_YEAR,
};

/// Monotonic 32-bit tick counter value
pub type Tick = u32;

/// Number of bits of the sub-second field
pub const N_PREDIV_S: u32 = 8;

/// Synchronous prescaler: highest sub-second counter value
pub const PREDIV_S: u32 = (1 << N_PREDIV_S) - 1;

/// Ticks per second
pub const TICKS_PER_SECOND: u32 = PREDIV_S + 1;

/// Numerator of the tick -> ms ratio (1000 / 8)
const CONV_NUMER: u64 = 125;

/// Denominator of the tick -> ms ratio (256 / 8)
const CONV_DENOM: u64 = 32;

/// Length of one full tick counter period in milliseconds
///
/// Equals `tick_to_ms(2^32)`. Millisecond timestamps derived from the tick
/// counter live in `0..TICK_PERIOD_MS` and wrap with it.
pub const TICK_PERIOD_MS: u64 = (1u64 << 32) * CONV_NUMER / CONV_DENOM;

/// Convert milliseconds to ticks, rounding half up
///
/// Values past one tick period wrap like the counter does.
pub fn ms_to_tick(ms: u64) -> Tick {
    let doubled = ms * CONV_DENOM * 2 + CONV_NUMER;
    (doubled / (CONV_NUMER * 2)) as Tick
}

/// Convert ticks to milliseconds, rounding half up
pub fn tick_to_ms(ticks: Tick) -> u64 {
    (u64::from(ticks) * CONV_NUMER + CONV_DENOM / 2) / CONV_DENOM
}

/// Convert a calendar value to the monotonic tick counter
///
/// Only meaningful inside the epoch window (years 0-99). The day field is
/// counted as-is, not as `day - 1`, matching [`tick_to_calendar`].
pub fn calendar_to_tick(value: &CalendarValue) -> Tick {
    let mut seconds: u32 = 0;

    for year in 0..value.year {
        let year_seconds = if is_leap_year(year) {
            SECONDS_IN_LEAP_YEAR
        } else {
            SECONDS_IN_YEAR
        };
        seconds = seconds.wrapping_add(year_seconds);
    }

    let elapsed_months = usize::from(value.month.saturating_sub(1)).min(12);
    for &days in &month_lengths(value.year)[..elapsed_months] {
        seconds = seconds.wrapping_add(u32::from(days) * SECONDS_IN_DAY);
    }

    seconds = seconds
        .wrapping_add(u32::from(value.day) * SECONDS_IN_DAY)
        .wrapping_add(u32::from(value.hours) * SECONDS_IN_HOUR)
        .wrapping_add(u32::from(value.minutes) * SECONDS_IN_MINUTE)
        .wrapping_add(u32::from(value.seconds));

    // High bits fall off here: this is where the counter wraps
    (seconds << N_PREDIV_S) | (PREDIV_S - u32::from(value.subticks))
}

/// Convert a tick counter value back to a calendar value
///
/// The result is relative to the start of year 0: the seconds are first
/// split into days, hours, minutes and seconds, then whole months are
/// peeled off the day count using year 0's (leap) month table. As with
/// [`calendar_to_tick`], the day field is not offset by one, so the first
/// day of a month may come out as 0.
pub fn tick_to_calendar(tick: Tick) -> CalendarValue {
    let subticks = PREDIV_S - (tick & PREDIV_S);
    let mut remaining = tick >> N_PREDIV_S;

    let mut days = remaining / SECONDS_IN_DAY;
    remaining %= SECONDS_IN_DAY;
    let hours = remaining / SECONDS_IN_HOUR;
    remaining %= SECONDS_IN_HOUR;
    let minutes = remaining / SECONDS_IN_MINUTE;
    let seconds = remaining % SECONDS_IN_MINUTE;

    // 2^24 seconds is ~194 days, so this never runs past July
    let lengths = month_lengths(0);
    let mut month: usize = 1;
    while month < 12 && days > u32::from(lengths[month - 1]) {
        days -= u32::from(lengths[month - 1]);
        month += 1;
    }

    CalendarValue {
        year: 0,
        month: month as u8,
        day: days as u8,
        hours: hours as u8,
        minutes: minutes as u8,
        seconds: seconds as u8,
        subticks: subticks as u8,
    }
}

/// Advance a calendar value by `duration_ms`
///
/// Works on the calendar fields directly rather than through the tick
/// counter, so the result keeps `now`'s year and month and lands on an
/// exact sub-second value for the alarm comparator. The day count is
/// carried into the month at most once; longer spans are the caller's job
/// (see [`crate::config::MAX_ALARM_SPAN_MS`]). A carry out of December
/// rolls over to January of the next year.
pub fn advance_calendar_by(now: &CalendarValue, duration_ms: u32) -> CalendarValue {
    let ticks = ms_to_tick(u64::from(duration_ms));

    let mut fraction = PREDIV_S - u32::from(now.subticks) + (ticks & PREDIV_S);
    let mut remaining = ticks >> N_PREDIV_S;

    let mut days = u32::from(now.day) + remaining / SECONDS_IN_DAY;
    remaining %= SECONDS_IN_DAY;
    let mut hours = u32::from(now.hours) + remaining / SECONDS_IN_HOUR;
    remaining %= SECONDS_IN_HOUR;
    let mut minutes = u32::from(now.minutes) + remaining / SECONDS_IN_MINUTE;
    let mut seconds = u32::from(now.seconds) + remaining % SECONDS_IN_MINUTE;

    while fraction >= TICKS_PER_SECOND {
        fraction -= TICKS_PER_SECOND;
        seconds += 1;
    }
    while seconds >= 60 {
        seconds -= 60;
        minutes += 1;
    }
    while minutes >= 60 {
        minutes -= 60;
        hours += 1;
    }
    while hours >= 24 {
        hours -= 24;
        days += 1;
    }

    let mut year = now.year;
    let mut month = now.month;
    let month_length = u32::from(days_in_month(year, month));
    if days > month_length {
        days -= month_length;
        month += 1;
        if month > 12 {
            month = 1;
            year = (year + 1) % 100;
        }
    }

    CalendarValue {
        year,
        month,
        day: days as u8,
        hours: hours as u8,
        minutes: minutes as u8,
        seconds: seconds as u8,
        subticks: (PREDIV_S - fraction) as u8,
    }
}
