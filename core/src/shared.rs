//! Global access to an [`RtcTimer`] from task and interrupt context
//!
//! Boards without a framework-managed resource keep the timer in a
//! `static SharedRtcTimer`. Every access runs inside a critical section, so
//! the alarm interrupt can never observe a half-finished update.

use core::cell::RefCell;

use critical_section::Mutex;
use hal_abstractions::rtc::RtcHardware;

use crate::error::RtcError;
use crate::low_power::WakeReason;
use crate::timer::{RtcTimer, TimerIrqHandler};

/// Critical-section protected, lazily installed [`RtcTimer`]
pub struct SharedRtcTimer<H> {
    inner: Mutex<RefCell<Option<RtcTimer<H>>>>,
}

impl<H: RtcHardware> Default for SharedRtcTimer<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: RtcHardware> SharedRtcTimer<H> {
    /// Create an empty slot, usable in a `static`
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the timer, running its `init`
    ///
    /// Must be called once during system initialization before any time
    /// operations. A timer already installed is replaced.
    pub fn install(&self, mut timer: RtcTimer<H>) -> Result<(), RtcError> {
        timer.init()?;
        critical_section::with(|cs| {
            self.inner.borrow(cs).replace(Some(timer));
        });
        Ok(())
    }

    /// Run `f` on the timer inside a critical section
    ///
    /// Stop mode may be entered from inside `f`: on Cortex-M a pending
    /// interrupt still ends WFI with interrupts masked, and its handler runs
    /// as soon as the critical section ends.
    pub fn with<R>(&self, f: impl FnOnce(&mut RtcTimer<H>) -> R) -> Result<R, RtcError> {
        critical_section::with(|cs| {
            let mut slot = self.inner.borrow(cs).borrow_mut();
            slot.as_mut().map(f).ok_or(RtcError::NotInitialized)
        })
    }

    /// Service the alarm interrupt; call from the RTC alarm handler
    pub fn on_alarm_interrupt<T: TimerIrqHandler + ?Sized>(
        &self,
        handler: &mut T,
    ) -> Result<WakeReason, RtcError> {
        self.with(|timer| timer.on_alarm_interrupt(handler))
    }
}
