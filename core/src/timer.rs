//! RTC timer: the owned time base, alarm and low-power state
//!
//! [`RtcTimer`] owns the hardware and every piece of mutable state the
//! alarm interrupt shares with task code: the alarm slot and its context,
//! the wake-up latency, the spurious-wake flag and the low-power gating
//! flags. All operations take `&mut self`; the caller supplies the
//! critical section (an RTIC resource lock, or [`crate::SharedRtcTimer`]).

use hal_abstractions::rtc::{AlarmMatch, CalendarValue, RtcHardware};

use crate::alarm::{current_time_ms, AlarmScheduler};
use crate::calendar::{read_now, seed_if_unset};
use crate::config::RtcConfig;
use crate::error::RtcError;
use crate::low_power::{LowPowerGate, PowerState, WakeReason};
use crate::wake::WakeLatencyCompensator;

/// Software timer layer notified when the alarm fires
///
/// Runs in interrupt context: it must return promptly and must not call
/// back into the [`RtcTimer`] that invoked it.
pub trait TimerIrqHandler {
    fn on_timer_irq(&mut self);
}

impl<F: FnMut()> TimerIrqHandler for F {
    fn on_timer_irq(&mut self) {
        self()
    }
}

/// RTC-backed time base and wake alarm
#[derive(Debug)]
pub struct RtcTimer<H> {
    hw: H,
    config: RtcConfig,
    initialized: bool,
    scheduler: AlarmScheduler,
    compensator: WakeLatencyCompensator,
    gate: LowPowerGate,
}

impl<H: RtcHardware> RtcTimer<H> {
    pub fn new(hw: H, config: RtcConfig) -> Self {
        let compensator = WakeLatencyCompensator::new(config.low_power_floor_ms);
        Self {
            hw,
            config,
            initialized: false,
            scheduler: AlarmScheduler::new(),
            compensator,
            gate: LowPowerGate::new(),
        }
    }

    /// Seed the calendar on first boot and log the running calendar
    ///
    /// Calling it again is a no-op.
    pub fn init(&mut self) -> Result<(), RtcError> {
        if self.initialized {
            return Ok(());
        }

        if seed_if_unset(&mut self.hw, &self.config)? {
            info!("RTC calendar seeded");
        } else {
            info!("RTC had already been initialized");
        }
        let now = self.now()?;
        info!("RTC time: {}", now);

        self.initialized = true;
        Ok(())
    }

    /// Debounced calendar read
    pub fn now(&mut self) -> Result<CalendarValue, RtcError> {
        read_now(&mut self.hw, self.config.max_read_attempts)
    }

    /// Arm the alarm `timeout_ms` from now, replacing any armed alarm
    pub fn set_timeout(&mut self, timeout_ms: u32) -> Result<AlarmMatch, RtcError> {
        match self
            .scheduler
            .set_timeout(&mut self.hw, timeout_ms, &self.config)
        {
            Ok(alarm) => {
                self.gate.set_state(PowerState::ArmedWaitingAlarm);
                Ok(alarm)
            }
            Err(e) => {
                self.gate.set_state(PowerState::Idle);
                Err(e)
            }
        }
    }

    /// Compensate a timeout for the wake-up latency
    ///
    /// Also decides whether the next [`Self::enter_low_power`] may stop.
    pub fn adjusted_timeout(&mut self, timeout_ms: u32) -> u32 {
        let (timeout, low_power) = self.compensator.adjust_timeout(timeout_ms);
        self.gate.set_low_power_allowed(low_power);
        timeout
    }

    /// Current time in milliseconds
    pub fn timer_value(&mut self) -> Result<u64, RtcError> {
        current_time_ms(&mut self.hw, &self.config)
    }

    /// Milliseconds since the alarm was last armed
    pub fn elapsed_alarm_time(&mut self) -> Result<u64, RtcError> {
        self.scheduler
            .elapsed_since_last_alarm(&mut self.hw, &self.config)
    }

    /// Absolute time `relative_ms` from now
    pub fn compute_future_event_time(&mut self, relative_ms: u64) -> Result<u64, RtcError> {
        self.scheduler
            .compute_future_event_time(&mut self.hw, relative_ms, &self.config)
    }

    /// Milliseconds since `event_ms`; 0 for an event never recorded
    pub fn compute_elapsed_time(&mut self, event_ms: u64) -> Result<u64, RtcError> {
        self.scheduler
            .compute_elapsed_time(&mut self.hw, event_ms, &self.config)
    }

    /// Stop the MCU until the next interrupt, if allowed
    ///
    /// Returns whether stop mode was entered.
    pub fn enter_low_power(&mut self) -> bool {
        self.gate.enter(&mut self.hw)
    }

    /// Inspect the wake-up flag after leaving stop mode
    pub fn recover_after_wake(&mut self) -> WakeReason {
        self.gate
            .recover_after_wake(&mut self.hw, &mut self.compensator)
    }

    /// Hold the MCU awake (`true`) or release it (`false`)
    pub fn block_low_power(&mut self, blocked: bool) {
        self.gate
            .block(&mut self.hw, &mut self.compensator, blocked);
    }

    /// Service the alarm interrupt
    ///
    /// Disarms the alarm, recovers from stop mode, calibrates the wake-up
    /// latency on the first alarm-caused wake, lifts any low-power block
    /// and finally calls `handler`.
    pub fn on_alarm_interrupt<T: TimerIrqHandler + ?Sized>(&mut self, handler: &mut T) -> WakeReason {
        let programmed = self.scheduler.armed();
        self.scheduler.disarm(&mut self.hw);
        self.gate.set_state(PowerState::FiredAlarm);

        let reason = self.recover_after_wake();
        if let (WakeReason::Alarm, Some(alarm)) = (reason, programmed) {
            if !self.compensator.is_calibrated() {
                match self.now() {
                    Ok(now) => {
                        self.compensator
                            .record_wake_latency(alarm.subticks, now.subticks);
                    }
                    Err(e) => warn!("Wake-up time not calibrated: {}", e),
                }
            }
        }
        self.block_low_power(false);

        handler.on_timer_irq();

        if self.gate.state() == PowerState::FiredAlarm {
            self.gate.set_state(PowerState::Idle);
        }
        reason
    }

    pub fn state(&self) -> PowerState {
        self.gate.state()
    }

    pub fn low_power_allowed(&self) -> bool {
        self.gate.low_power_allowed()
    }

    pub fn is_low_power_blocked(&self) -> bool {
        self.gate.is_blocked()
    }

    /// Measured wake-up latency, 0 until the first alarm wake
    pub fn wake_up_time_ms(&self) -> u32 {
        self.compensator.wake_up_time_ms()
    }

    pub fn config(&self) -> &RtcConfig {
        &self.config
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SimRtc;
    use crate::tick::tick_to_ms;

    fn timer() -> RtcTimer<SimRtc> {
        let hw = SimRtc::new(CalendarValue::new(0, 1, 1, 0, 0, 0, 255));
        let mut timer = RtcTimer::new(hw, RtcConfig::default());
        timer.init().unwrap();
        timer
    }

    #[test]
    fn test_init_seeds_once() {
        let mut timer = timer();
        assert_eq!(timer.now().unwrap(), RtcConfig::default().seed);
        timer.init().unwrap();
        assert_eq!(timer.hardware().calendar_writes, 1);
    }

    #[test]
    fn test_alarm_wake_end_to_end() {
        let mut timer = timer();
        timer.hardware_mut().wake_latency_ticks = 3;
        let mut fired = 0;

        let timeout = timer.adjusted_timeout(5_000);
        assert_eq!(timeout, 5_000);
        assert!(timer.low_power_allowed());
        timer.set_timeout(timeout).unwrap();
        assert_eq!(timer.state(), PowerState::ArmedWaitingAlarm);

        assert!(timer.enter_low_power());
        let reason = timer.on_alarm_interrupt(&mut || fired += 1);

        assert_eq!(reason, WakeReason::Alarm);
        assert_eq!(fired, 1);
        assert_eq!(timer.state(), PowerState::Idle);
        assert_eq!(timer.hardware().alarm, None);
        // 5000 ms plus the 3 ticks it took to wake up
        assert_eq!(timer.elapsed_alarm_time(), Ok(5_000 + tick_to_ms(3)));
        assert_eq!(timer.wake_up_time_ms(), 12);
    }

    #[test]
    fn test_wake_latency_compensates_next_timeout() {
        let mut timer = timer();
        timer.hardware_mut().wake_latency_ticks = 3;

        let timeout = timer.adjusted_timeout(5_000);
        timer.set_timeout(timeout).unwrap();
        timer.enter_low_power();
        timer.on_alarm_interrupt(&mut || {});

        assert_eq!(timer.adjusted_timeout(5_000), 4_988);

        // Latency is measured once only
        timer.hardware_mut().wake_latency_ticks = 10;
        timer.set_timeout(4_988).unwrap();
        timer.enter_low_power();
        timer.on_alarm_interrupt(&mut || {});
        assert_eq!(timer.wake_up_time_ms(), 12);
    }

    #[test]
    fn test_alarm_while_awake_is_not_calibration() {
        let mut timer = timer();
        let mut fired = 0;

        timer.set_timeout(100).unwrap();
        timer.hardware_mut().advance_ms(100);
        assert!(timer.hardware().alarm_due());

        let reason = timer.on_alarm_interrupt(&mut || fired += 1);
        assert_eq!(reason, WakeReason::Spurious);
        assert_eq!(fired, 1);
        assert_eq!(timer.wake_up_time_ms(), 0);
    }

    #[test]
    fn test_short_timeout_stays_awake() {
        let mut timer = timer();
        let timeout = timer.adjusted_timeout(20);
        timer.set_timeout(timeout).unwrap();

        assert!(!timer.enter_low_power());
        assert_eq!(timer.hardware().stop_entries, 0);
    }

    #[test]
    fn test_block_low_power_until_alarm() {
        let mut timer = timer();
        let timeout = timer.adjusted_timeout(1_000);
        timer.set_timeout(timeout).unwrap();

        timer.block_low_power(true);
        assert!(!timer.enter_low_power());

        // The alarm interrupt lifts the block
        timer.hardware_mut().advance_ms(1_000);
        timer.on_alarm_interrupt(&mut || {});
        assert!(!timer.is_low_power_blocked());
    }

    #[test]
    fn test_rejected_alarm_is_recoverable() {
        let mut timer = timer();
        timer.hardware_mut().reject_alarm = true;
        assert_eq!(timer.set_timeout(1_000), Err(RtcError::AlarmProgramFailed));
        assert_eq!(timer.state(), PowerState::Idle);

        timer.hardware_mut().reject_alarm = false;
        assert!(timer.set_timeout(1_000).is_ok());
        assert_eq!(timer.state(), PowerState::ArmedWaitingAlarm);
    }

    #[test]
    fn test_timer_value_tracks_calendar() {
        let mut timer = timer();
        let before = timer.timer_value().unwrap();
        timer.hardware_mut().advance_ms(2_000);
        assert_eq!(timer.timer_value().unwrap() - before, 2_000);

        let deadline = timer.compute_future_event_time(500).unwrap();
        assert_eq!(deadline, before + 2_500);
        assert_eq!(timer.compute_elapsed_time(before), Ok(2_000));
    }
}
