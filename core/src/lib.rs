//! Platform-agnostic RTC time base for low-power firmware
//!
//! Turns the hardware calendar counter into a monotonic millisecond time
//! base and a single-slot wake alarm. It has NO hardware dependencies:
//! boards implement [`hal_abstractions::rtc::RtcHardware`].
//!
//! ## Layers
//! - [`calendar`]: debounced calendar reads, first-boot seeding, leap rule
//! - [`tick`]: calendar <-> 32-bit tick counter, ticks <-> milliseconds
//! - [`alarm`]: arming the alarm slot, elapsed/future time helpers
//! - [`wake`]: wake-up latency calibration and timeout compensation
//! - [`low_power`]: stop-mode gating and wake recovery
//! - [`timer`]: [`RtcTimer`], the owned object that ties them together
//!
//! ## Usage
//! ```ignore
//! let mut rtc = RtcTimer::new(board_rtc, RtcConfig::default());
//! rtc.init()?;
//!
//! let timeout = rtc.adjusted_timeout(5_000);
//! rtc.set_timeout(timeout)?;
//! rtc.enter_low_power();
//!
//! // RTC alarm interrupt:
//! rtc.on_alarm_interrupt(&mut timer_layer);
//! ```

#![no_std]
#![deny(unsafe_code)]
#![deny(warnings)]

#[macro_use]
mod fmt;

pub mod alarm;
pub mod calendar;
pub mod config;
pub mod error;
pub mod low_power;
pub mod shared;
pub mod tick;
pub mod timer;
pub mod wake;

#[cfg(test)]
pub(crate) mod mock;

pub use config::RtcConfig;
pub use error::RtcError;
pub use hal_abstractions::rtc::{AlarmMatch, CalendarValue, RtcHardware, WakeCause};
pub use low_power::{PowerState, WakeReason};
pub use shared::SharedRtcTimer;
pub use timer::{RtcTimer, TimerIrqHandler};
