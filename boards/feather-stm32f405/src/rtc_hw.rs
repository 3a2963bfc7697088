//! STM32F405 RTC register access
//!
//! Implements [`RtcHardware`] directly on the RTC, PWR, EXTI and RCC registers.
//! embassy-stm32 brings the LSE up and programs the prescalers
//! (`PREDIV_A = 127`, `PREDIV_S = 255`, 256 sub-second ticks); everything
//! after that goes through `stm32-metapac`.
//!
//! Alarm A compares date, hours, minutes, seconds and all eight bits of
//! the sub-second counter, so it fires on one exact tick.

use cortex_m::peripheral::SCB;
use defmt::{trace, warn, Format};
use embassy_stm32::rtc::Rtc;
use hal_abstractions::rtc::{AlarmMatch, CalendarValue, RtcHardware, WakeCause};
use stm32_metapac::rcc::vals::Sw;
use stm32_metapac::{EXTI, PWR, RCC, RTC};

/// EXTI line the RTC alarm is wired to
const RTC_ALARM_EXTI_LINE: usize = 17;

/// Busy-wait bound for RTC register handshakes (INITF, ALRAWF)
const REGISTER_TIMEOUT_SPINS: u32 = 100_000;

/// Sub-second bits the alarm compares: SS[7:0]
const ALARM_SUBSECOND_BITS: u8 = 8;

/// RTC register-level errors
#[derive(Debug, Clone, Copy, Format)]
pub enum RtcHwError {
    /// Calendar never entered initialization mode
    InitTimeout,
    /// Alarm registers never became writable
    AlarmWriteTimeout,
}

/// The board's RTC, plus the core peripheral needed for deep sleep
pub struct Stm32Rtc {
    // Held for ownership: proves nothing else touches the RTC
    _rtc: Rtc,
    scb: SCB,
}

impl Stm32Rtc {
    pub fn new(rtc: Rtc, scb: SCB) -> Self {
        // Backup domain stays writable for the calendar and BKP0R
        PWR.cr1().modify(|w| w.set_dbp(true));

        with_write_access(|| {
            RTC.cr().modify(|w| w.set_bypshad(true));
        });

        // Alarm A wakes the MCU from stop mode through EXTI line 17
        EXTI.rtsr(0)
            .modify(|w| w.set_line(RTC_ALARM_EXTI_LINE, true));
        EXTI.imr(0)
            .modify(|w| w.set_line(RTC_ALARM_EXTI_LINE, true));

        Self { _rtc: rtc, scb }
    }
}

impl RtcHardware for Stm32Rtc {
    type Error = RtcHwError;

    fn read_calendar(&mut self) -> Result<CalendarValue, RtcHwError> {
        let ssr = RTC.ssr().read();
        let tr = RTC.tr().read();
        let dr = RTC.dr().read();

        Ok(CalendarValue {
            year: bcd2_to_byte(dr.yt(), dr.yu()),
            month: bcd2_to_byte(dr.mt() as u8, dr.mu()),
            day: bcd2_to_byte(dr.dt(), dr.du()),
            hours: bcd2_to_byte(tr.ht(), tr.hu()),
            minutes: bcd2_to_byte(tr.mnt(), tr.mnu()),
            seconds: bcd2_to_byte(tr.st(), tr.su()),
            subticks: ssr.ss() as u8,
        })
    }

    fn write_calendar(&mut self, value: &CalendarValue) -> Result<(), RtcHwError> {
        with_write_access(|| {
            RTC.isr().modify(|w| w.set_init(true));
            if !spin_until(|| RTC.isr().read().initf()) {
                return Err(RtcHwError::InitTimeout);
            }

            let (ht, hu) = byte_to_bcd2(value.hours);
            let (mnt, mnu) = byte_to_bcd2(value.minutes);
            let (st, su) = byte_to_bcd2(value.seconds);
            RTC.tr().write(|w| {
                w.set_ht(ht);
                w.set_hu(hu);
                w.set_mnt(mnt);
                w.set_mnu(mnu);
                w.set_st(st);
                w.set_su(su);
            });

            let (yt, yu) = byte_to_bcd2(value.year);
            let (mt, mu) = byte_to_bcd2(value.month);
            let (dt, du) = byte_to_bcd2(value.day);
            RTC.dr().write(|w| {
                w.set_yt(yt);
                w.set_yu(yu);
                w.set_mt(mt > 0);
                w.set_mu(mu);
                w.set_dt(dt);
                w.set_du(du);
                // Weekday is not tracked; Monday is a valid placeholder
                w.set_wdu(1);
            });

            RTC.isr().modify(|w| w.set_init(false));
            Ok(())
        })
    }

    fn arm_alarm(&mut self, target: &AlarmMatch) -> Result<(), RtcHwError> {
        with_write_access(|| {
            RTC.cr().modify(|w| {
                w.set_alre(0, false);
                w.set_alrie(0, false);
            });
            if !spin_until(|| RTC.isr().read().alrwf(0)) {
                return Err(RtcHwError::AlarmWriteTimeout);
            }

            let (dt, du) = byte_to_bcd2(target.day);
            let (ht, hu) = byte_to_bcd2(target.hours);
            let (mnt, mnu) = byte_to_bcd2(target.minutes);
            let (st, su) = byte_to_bcd2(target.seconds);
            // Zeroed mask bits: every field must match, date (not weekday)
            RTC.alrmr(0).write(|w| {
                w.set_dt(dt);
                w.set_du(du);
                w.set_ht(ht);
                w.set_hu(hu);
                w.set_mnt(mnt);
                w.set_mnu(mnu);
                w.set_st(st);
                w.set_su(su);
            });
            RTC.alrmssr(0).write(|w| {
                w.set_ss(u16::from(target.subticks));
                w.set_maskss(ALARM_SUBSECOND_BITS);
            });

            RTC.isr().modify(|w| w.set_alrf(0, false));
            EXTI.pr(0)
                .write(|w| w.set_line(RTC_ALARM_EXTI_LINE, true));
            RTC.cr().modify(|w| {
                w.set_alre(0, true);
                w.set_alrie(0, true);
            });
            Ok(())
        })
    }

    fn disarm_alarm(&mut self) -> Result<(), RtcHwError> {
        with_write_access(|| {
            RTC.cr().modify(|w| {
                w.set_alre(0, false);
                w.set_alrie(0, false);
            });
            RTC.isr().modify(|w| w.set_alrf(0, false));
        });
        EXTI.pr(0)
            .write(|w| w.set_line(RTC_ALARM_EXTI_LINE, true));
        Ok(())
    }

    fn read_backup(&mut self, index: usize) -> u32 {
        RTC.bkpr(index).read().bkp()
    }

    fn write_backup(&mut self, index: usize, value: u32) {
        RTC.bkpr(index).write(|w| w.set_bkp(value));
    }

    fn prepare_stop_mode(&mut self) {
        // Only the heartbeat LED is in use and it keeps its level in stop
        // mode, so the voltage detector is all there is to switch off.
        PWR.cr1().modify(|w| w.set_pvde(false));
    }

    fn enter_stop_mode(&mut self) {
        trace!("WFI (stop mode)");
        // Low-power regulator in stop mode; PDDS is left at 0 (stop, not standby)
        PWR.cr1().modify(|w| w.set_lpds(true));
        self.scb.set_sleepdeep();
        cortex_m::asm::dsb();
        cortex_m::asm::wfi();
        self.scb.clear_sleepdeep();
        restore_clocks_after_stop();
    }

    fn wake_cause(&mut self) -> WakeCause {
        if PWR.csr1().read().wuf() {
            WakeCause::Alarm
        } else {
            WakeCause::Other
        }
    }

    fn clear_wake_cause(&mut self) {
        PWR.cr1().modify(|w| w.set_cwuf(true));
    }
}

/// Switch SYSCLK back to the HSE-fed PLL
///
/// Stop mode clears HSEON, PLLON and SW and wakes on HSI. PLLCFGR, the bus
/// prescalers and the flash wait states survive, so re-enabling the
/// oscillators brings back the 84 MHz set up in `init`. On a timeout the
/// core stays on HSI (16 MHz) rather than hang.
fn restore_clocks_after_stop() {
    RCC.cr().modify(|w| w.set_hseon(true));
    if !spin_until(|| RCC.cr().read().hserdy()) {
        warn!("HSE not ready after stop mode, staying on HSI");
        return;
    }

    RCC.cr().modify(|w| w.set_pllon(true));
    if !spin_until(|| RCC.cr().read().pllrdy()) {
        warn!("PLL not locked after stop mode, staying on HSI");
        return;
    }

    RCC.cfgr().modify(|w| w.set_sw(Sw::PLL1_P));
    if !spin_until(|| RCC.cfgr().read().sws() == Sw::PLL1_P) {
        warn!("SYSCLK switch to PLL timed out");
    }
}

/// Run `f` with the RTC write protection lifted
fn with_write_access<R>(f: impl FnOnce() -> R) -> R {
    RTC.wpr().write(|w| w.set_key(0xca));
    RTC.wpr().write(|w| w.set_key(0x53));
    let result = f();
    RTC.wpr().write(|w| w.set_key(0xff));
    result
}

fn spin_until(mut ready: impl FnMut() -> bool) -> bool {
    (0..REGISTER_TIMEOUT_SPINS).any(|_| ready())
}

fn byte_to_bcd2(value: u8) -> (u8, u8) {
    (value / 10, value % 10)
}

fn bcd2_to_byte(tens: u8, units: u8) -> u8 {
    tens * 10 + units
}
