//! Wake-up latency compensation
//!
//! Leaving stop mode costs a fixed amount of time between the alarm match
//! and the moment code runs again. It is measured once, on the first wake
//! the alarm actually caused, and subtracted from every later timeout that
//! is long enough to sleep through.
//!
//! The measurement is never repeated. If the real latency drifts with
//! temperature or supply voltage the compensation goes stale.

use crate::tick::{tick_to_ms, PREDIV_S};

/// Wake-up latency calibration and timeout adjustment
#[derive(Debug)]
pub struct WakeLatencyCompensator {
    wake_up_time_ms: u32,
    calibrated: bool,
    non_scheduled_wakeup: bool,
    low_power_floor_ms: u32,
}

impl WakeLatencyCompensator {
    /// Create an uncalibrated compensator
    ///
    /// Timeouts shorter than `low_power_floor_ms` never allow stop mode.
    pub const fn new(low_power_floor_ms: u32) -> Self {
        Self {
            wake_up_time_ms: 0,
            calibrated: false,
            non_scheduled_wakeup: false,
            low_power_floor_ms,
        }
    }

    /// Measured wake-up latency in milliseconds, 0 until calibrated
    pub fn wake_up_time_ms(&self) -> u32 {
        self.wake_up_time_ms
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Whether a wake not caused by the alarm is still unaccounted for
    pub fn has_pending_spurious_wake(&self) -> bool {
        self.non_scheduled_wakeup
    }

    /// Remember that something other than the alarm woke the MCU
    pub fn note_spurious_wake(&mut self) {
        self.non_scheduled_wakeup = true;
    }

    /// Adjust a timeout for the wake-up latency
    ///
    /// Returns the timeout to arm and whether stop mode is worth entering
    /// for it. A spurious wake lost one wake-up latency, which is taken off
    /// the first timeout long enough to absorb it. Timeouts below the
    /// low-power floor, or no longer than the latency itself, stay awake.
    pub fn adjust_timeout(&mut self, requested_ms: u32) -> (u32, bool) {
        let mut timeout = requested_ms;

        if self.non_scheduled_wakeup && timeout > self.wake_up_time_ms {
            self.non_scheduled_wakeup = false;
            timeout -= self.wake_up_time_ms;
        }

        if timeout < self.low_power_floor_ms || timeout <= self.wake_up_time_ms {
            return (timeout, false);
        }

        (timeout - self.wake_up_time_ms, true)
    }

    /// Calibrate from the first alarm-caused wake
    ///
    /// `programmed_subticks` is the sub-second value the alarm matched on,
    /// `actual_subticks` the counter once code runs again. The latency is
    /// well under a second, so the difference is taken modulo one second.
    /// Returns the latency if this call calibrated, `None` if calibration
    /// already happened.
    pub fn record_wake_latency(&mut self, programmed_subticks: u8, actual_subticks: u8) -> Option<u32> {
        if self.calibrated {
            return None;
        }

        let start = PREDIV_S - u32::from(programmed_subticks);
        let stop = PREDIV_S - u32::from(actual_subticks);
        let ticks = stop.wrapping_sub(start) & PREDIV_S;

        self.wake_up_time_ms = tick_to_ms(ticks) as u32;
        self.calibrated = true;
        info!("MCU wake-up time calibrated: {=u32} ms", self.wake_up_time_ms);
        Some(self.wake_up_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrated(wake_up_ticks: u8) -> WakeLatencyCompensator {
        let mut compensator = WakeLatencyCompensator::new(50);
        compensator.record_wake_latency(200, 200 - wake_up_ticks);
        compensator
    }

    #[test]
    fn test_uncalibrated_passthrough() {
        let mut compensator = WakeLatencyCompensator::new(50);
        assert_eq!(compensator.adjust_timeout(1_000), (1_000, true));
        assert_eq!(compensator.adjust_timeout(49), (49, false));
        assert_eq!(compensator.adjust_timeout(50), (50, true));
    }

    #[test]
    fn test_short_timeouts_stay_awake() {
        for wake_up_ticks in [0u8, 1, 4, 20] {
            let mut compensator = calibrated(wake_up_ticks);
            for ms in 0..50 {
                let (_, low_power) = compensator.adjust_timeout(ms);
                assert!(!low_power, "{} ms allowed low power", ms);
            }
        }
    }

    #[test]
    fn test_compensates_long_timeouts() {
        // 3 ticks = 11.72 ms, rounds to 12
        let mut compensator = calibrated(3);
        assert_eq!(compensator.wake_up_time_ms(), 12);
        assert_eq!(compensator.adjust_timeout(1_000), (988, true));
    }

    #[test]
    fn test_latency_longer_than_floor() {
        // 20 ticks = 78 ms
        let mut compensator = calibrated(20);
        assert_eq!(compensator.adjust_timeout(60), (60, false));
        assert_eq!(compensator.adjust_timeout(100), (22, true));
    }

    #[test]
    fn test_spurious_wake_paid_once() {
        let mut compensator = calibrated(3);
        compensator.note_spurious_wake();

        assert_eq!(compensator.adjust_timeout(1_000), (976, true));
        assert!(!compensator.has_pending_spurious_wake());
        assert_eq!(compensator.adjust_timeout(1_000), (988, true));
    }

    #[test]
    fn test_spurious_wake_waits_for_long_enough_timeout() {
        let mut compensator = calibrated(3);
        compensator.note_spurious_wake();

        assert_eq!(compensator.adjust_timeout(10), (10, false));
        assert!(compensator.has_pending_spurious_wake());
        assert_eq!(compensator.adjust_timeout(100), (76, true));
    }

    #[test]
    fn test_calibrates_once() {
        let mut compensator = WakeLatencyCompensator::new(50);
        assert_eq!(compensator.record_wake_latency(128, 125), Some(12));
        assert_eq!(compensator.record_wake_latency(128, 100), None);
        assert_eq!(compensator.wake_up_time_ms(), 12);
    }

    #[test]
    fn test_latency_across_second_boundary() {
        // Alarm on subtick 1, code resumes 2 ticks into the next second
        let mut compensator = WakeLatencyCompensator::new(50);
        assert_eq!(compensator.record_wake_latency(1, 254), Some(12));
    }
}
