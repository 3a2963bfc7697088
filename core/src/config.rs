//! RTC time base configuration

use hal_abstractions::rtc::CalendarValue;

/// Number of milliseconds in the longest timeout the alarm can express
///
/// The comparator matches day-of-month, so the deadline has to stay
/// strictly inside the shortest month: 28 days is the current calendar
/// value again in a common-year February. One tick (4 ms) short of 28 days.
pub const MAX_ALARM_SPAN_MS: u32 = 28 * 86_400 * 1_000 - 4;

/// RTC time base configuration
#[derive(Debug, Clone)]
pub struct RtcConfig {
    /// Calendar written on first boot
    pub seed: CalendarValue,
    /// Backup register value meaning "calendar already seeded"
    pub seeded_sentinel: u32,
    /// Backup register holding the sentinel
    pub sentinel_register: usize,
    /// Shortest timeout the alarm is armed with (ms)
    pub min_timeout_ms: u32,
    /// Longest timeout the alarm is armed with (ms)
    pub max_timeout_ms: u32,
    /// Timeouts below this never enter stop mode (ms)
    pub low_power_floor_ms: u32,
    /// Calendar re-reads before giving up on a torn read
    pub max_read_attempts: u8,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            // 2017-11-05 21:42:00
            seed: CalendarValue::new(17, 11, 5, 21, 42, 0, 255),
            seeded_sentinel: 0x32F2,
            sentinel_register: 0,
            min_timeout_ms: 3,
            max_timeout_ms: MAX_ALARM_SPAN_MS,
            low_power_floor_ms: 50,
            max_read_attempts: 8,
        }
    }
}
