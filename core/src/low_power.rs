//! Stop-mode gating and wake recovery

use hal_abstractions::rtc::{RtcHardware, WakeCause};

use crate::wake::WakeLatencyCompensator;

/// Alarm lifecycle as seen by the low-power logic
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Nothing armed
    Idle,
    /// Alarm armed, waiting for it to fire
    ArmedWaitingAlarm,
    /// Alarm interrupt is being serviced
    FiredAlarm,
}

/// Result of inspecting the wake-up flag
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The armed alarm brought the MCU out of stop mode
    Alarm,
    /// Something else did, or the MCU never stopped
    Spurious,
}

/// Decides whether the MCU may enter stop mode
#[derive(Debug)]
pub struct LowPowerGate {
    state: PowerState,
    low_power_allowed: bool,
    blocked: bool,
}

impl Default for LowPowerGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LowPowerGate {
    pub const fn new() -> Self {
        Self {
            state: PowerState::Idle,
            low_power_allowed: false,
            blocked: false,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Whether the last adjusted timeout was long enough to sleep through
    pub fn low_power_allowed(&self) -> bool {
        self.low_power_allowed
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub(crate) fn set_low_power_allowed(&mut self, allowed: bool) {
        self.low_power_allowed = allowed;
    }

    pub(crate) fn set_state(&mut self, state: PowerState) {
        self.state = state;
    }

    /// Enter stop mode if nothing prevents it
    ///
    /// Blocks until an enabled interrupt fires. Returns `false` without
    /// touching the hardware when low power is blocked or the pending
    /// timeout is too short.
    pub fn enter<H: RtcHardware>(&mut self, hw: &mut H) -> bool {
        if self.blocked || !self.low_power_allowed {
            return false;
        }

        trace!("Entering stop mode");
        hw.prepare_stop_mode();
        hw.clear_wake_cause();
        hw.enter_stop_mode();
        true
    }

    /// Work out what woke the MCU
    ///
    /// A wake the alarm did not cause is handed to the compensator so the
    /// next timeout makes up for the lost wake-up time.
    pub fn recover_after_wake<H: RtcHardware>(
        &mut self,
        hw: &mut H,
        compensator: &mut WakeLatencyCompensator,
    ) -> WakeReason {
        match hw.wake_cause() {
            WakeCause::Alarm => {
                hw.clear_wake_cause();
                WakeReason::Alarm
            }
            WakeCause::Other => {
                debug!("Non-scheduled wake-up");
                compensator.note_spurious_wake();
                WakeReason::Spurious
            }
        }
    }

    /// Keep the MCU awake through a critical section
    ///
    /// Blocking recovers as if the MCU had just woken up, then holds off
    /// stop mode until unblocked.
    pub fn block<H: RtcHardware>(
        &mut self,
        hw: &mut H,
        compensator: &mut WakeLatencyCompensator,
        blocked: bool,
    ) {
        if blocked {
            self.recover_after_wake(hw, compensator);
        }
        self.blocked = blocked;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SimRtc;
    use hal_abstractions::rtc::CalendarValue;

    fn hw() -> SimRtc {
        SimRtc::new(CalendarValue::new(17, 11, 5, 21, 42, 0, 255))
    }

    #[test]
    fn test_enter_requires_permission() {
        let mut hw = hw();
        let mut gate = LowPowerGate::new();

        assert!(!gate.enter(&mut hw));
        assert_eq!(hw.stop_entries, 0);

        gate.set_low_power_allowed(true);
        assert!(gate.enter(&mut hw));
        assert_eq!(hw.stop_preparations, 1);
        assert_eq!(hw.stop_entries, 1);
    }

    #[test]
    fn test_enter_clears_stale_wake_flag() {
        let mut hw = hw();
        hw.wake_flag = true;
        let mut gate = LowPowerGate::new();
        gate.set_low_power_allowed(true);

        // No alarm armed: the simulated MCU wakes on "something else"
        assert!(gate.enter(&mut hw));
        assert!(!hw.wake_flag);
    }

    #[test]
    fn test_recover_after_alarm_wake() {
        let mut hw = hw();
        hw.wake_flag = true;
        let mut gate = LowPowerGate::new();
        let mut compensator = WakeLatencyCompensator::new(50);

        assert_eq!(
            gate.recover_after_wake(&mut hw, &mut compensator),
            WakeReason::Alarm
        );
        assert!(!hw.wake_flag);
        assert!(!compensator.has_pending_spurious_wake());
    }

    #[test]
    fn test_recover_after_spurious_wake() {
        let mut hw = hw();
        let mut gate = LowPowerGate::new();
        let mut compensator = WakeLatencyCompensator::new(50);

        assert_eq!(
            gate.recover_after_wake(&mut hw, &mut compensator),
            WakeReason::Spurious
        );
        assert!(compensator.has_pending_spurious_wake());
    }

    #[test]
    fn test_block_holds_off_stop_mode() {
        let mut hw = hw();
        let mut gate = LowPowerGate::new();
        let mut compensator = WakeLatencyCompensator::new(50);
        gate.set_low_power_allowed(true);

        gate.block(&mut hw, &mut compensator, true);
        assert!(gate.is_blocked());
        // Blocking recovers immediately; nothing set the wake flag
        assert!(compensator.has_pending_spurious_wake());
        assert!(!gate.enter(&mut hw));
        assert_eq!(hw.stop_entries, 0);

        gate.block(&mut hw, &mut compensator, false);
        assert!(gate.enter(&mut hw));
    }
}
