//! Single-slot wake alarm and millisecond time helpers
//!
//! Only one alarm exists. Arming it again replaces the previous deadline,
//! so callers with several deadlines multiplex them above this layer.

use hal_abstractions::rtc::{AlarmMatch, CalendarValue, RtcHardware};

use crate::calendar::read_now;
use crate::config::{RtcConfig, MAX_ALARM_SPAN_MS};
use crate::error::RtcError;
use crate::tick::{advance_calendar_by, calendar_to_tick, tick_to_ms, Tick, TICK_PERIOD_MS};

/// Ticks from `since` to `now` across the 2^32 wrap
pub fn elapsed_ticks(now: Tick, since: Tick) -> Tick {
    now.wrapping_sub(since)
}

/// Milliseconds from `event_ms` to `now_ms` across the tick period wrap
///
/// An `event_ms` of 0 means "never recorded" and yields 0. Both stamps are
/// taken modulo [`TICK_PERIOD_MS`].
pub fn elapsed_ms(now_ms: u64, event_ms: u64) -> u64 {
    if event_ms == 0 {
        return 0;
    }
    let now_ms = now_ms % TICK_PERIOD_MS;
    let event_ms = event_ms % TICK_PERIOD_MS;
    if now_ms < event_ms {
        now_ms + TICK_PERIOD_MS - event_ms
    } else {
        now_ms - event_ms
    }
}

/// Current time in milliseconds, in `0..TICK_PERIOD_MS`
pub fn current_time_ms<H: RtcHardware>(hw: &mut H, config: &RtcConfig) -> Result<u64, RtcError> {
    let now = read_now(hw, config.max_read_attempts)?;
    Ok(tick_to_ms(calendar_to_tick(&now)))
}

/// Alarm slot and the calendar snapshot it was armed at
#[derive(Debug, Default)]
pub struct AlarmScheduler {
    context: Option<CalendarValue>,
    armed: Option<AlarmMatch>,
}

impl AlarmScheduler {
    /// Create a scheduler with nothing armed
    pub const fn new() -> Self {
        Self {
            context: None,
            armed: None,
        }
    }

    /// Calendar captured when the alarm was last armed
    pub fn context(&self) -> Option<CalendarValue> {
        self.context
    }

    /// Compare value currently programmed, if any
    pub fn armed(&self) -> Option<AlarmMatch> {
        self.armed
    }

    /// Arm the alarm `timeout_ms` from now
    ///
    /// The timeout is clamped into `min_timeout_ms..=max_timeout_ms`, and
    /// never past [`MAX_ALARM_SPAN_MS`] whatever the config says. The
    /// calendar read here becomes the new alarm context even if programming
    /// the comparator fails.
    pub fn set_timeout<H: RtcHardware>(
        &mut self,
        hw: &mut H,
        timeout_ms: u32,
        config: &RtcConfig,
    ) -> Result<AlarmMatch, RtcError> {
        self.disarm(hw);

        let timeout_ms = timeout_ms
            .max(config.min_timeout_ms)
            .min(config.max_timeout_ms.min(MAX_ALARM_SPAN_MS));

        let now = read_now(hw, config.max_read_attempts)?;
        self.context = Some(now);

        let target = advance_calendar_by(&now, timeout_ms);
        let alarm = AlarmMatch::from(target);
        debug!(
            "RTC alarm in {=u32} ms: now {}, target {}",
            timeout_ms,
            now,
            target
        );

        hw.arm_alarm(&alarm).map_err(|_| {
            error!("RTC rejected alarm {}", alarm);
            RtcError::AlarmProgramFailed
        })?;
        self.armed = Some(alarm);
        Ok(alarm)
    }

    /// Disarm the alarm
    ///
    /// Hardware errors are logged and otherwise ignored: the next arm
    /// overwrites the comparator anyway.
    pub fn disarm<H: RtcHardware>(&mut self, hw: &mut H) {
        if hw.disarm_alarm().is_err() {
            warn!("RTC alarm disarm failed");
        }
        self.armed = None;
    }

    /// Milliseconds since the alarm was last armed
    ///
    /// Returns 0 if no alarm has been armed yet.
    pub fn elapsed_since_last_alarm<H: RtcHardware>(
        &self,
        hw: &mut H,
        config: &RtcConfig,
    ) -> Result<u64, RtcError> {
        let Some(context) = self.context else {
            return Ok(0);
        };
        let now = read_now(hw, config.max_read_attempts)?;
        let ticks = elapsed_ticks(calendar_to_tick(&now), calendar_to_tick(&context));
        Ok(tick_to_ms(ticks))
    }

    /// Absolute time, in milliseconds, `relative_ms` from now
    ///
    /// Wraps with the tick period, like [`current_time_ms`]. A result of 0
    /// would read as "never recorded", so it is reported as 1 ms instead.
    pub fn compute_future_event_time<H: RtcHardware>(
        &self,
        hw: &mut H,
        relative_ms: u64,
        config: &RtcConfig,
    ) -> Result<u64, RtcError> {
        let now = current_time_ms(hw, config)?;
        let event = (now + relative_ms % TICK_PERIOD_MS) % TICK_PERIOD_MS;
        Ok(event.max(1))
    }

    /// Milliseconds elapsed since `event_ms`, 0 if the event was never recorded
    pub fn compute_elapsed_time<H: RtcHardware>(
        &self,
        hw: &mut H,
        event_ms: u64,
        config: &RtcConfig,
    ) -> Result<u64, RtcError> {
        if event_ms == 0 {
            return Ok(0);
        }
        let now = current_time_ms(hw, config)?;
        Ok(elapsed_ms(now, event_ms))
    }
}
