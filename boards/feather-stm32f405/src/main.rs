#![deny(unsafe_code)]
#![deny(warnings)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;

mod rtc_hw;

#[app(device = embassy_stm32, peripherals = true, dispatchers = [USART1])]
mod app {
    use super::*;
    use defmt::{info, warn};
    use embassy_stm32::gpio::{Level, Output, Speed};
    use embassy_stm32::rcc::{Hse, HseMode, LsConfig, LseConfig, LseMode};
    use embassy_stm32::rtc::Rtc;
    use embassy_stm32::time::Hertz;
    use rtc_core::{RtcConfig, RtcTimer};

    use rtc_hw::Stm32Rtc;

    /// How long the heartbeat LED stays lit, in milliseconds
    const HEARTBEAT_ON_MS: u32 = 100;
    /// Dark interval between heartbeat blinks, in milliseconds
    const HEARTBEAT_OFF_MS: u32 = 4_900;

    #[shared]
    struct Shared {
        rtc: RtcTimer<Stm32Rtc>,
    }

    #[local]
    struct Local {
        led: Output<'static>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        info!("RTC wake-alarm demo starting...");

        // Adafruit Feather STM32F405: 12 MHz HSE, 32.768 kHz LSE (PC14/PC15)
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // HSE (12 MHz) / PREDIV(6) = 2 MHz, * MUL(168) = 336 MHz (VCO)
        // VCO / DIVP(4) = 84 MHz (SYSCLK)
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: None,
            divr: None,
        });
        config.rcc.sys = embassy_stm32::rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = embassy_stm32::rcc::AHBPrescaler::DIV1; // 84 MHz
        config.rcc.apb1_pre = embassy_stm32::rcc::APBPrescaler::DIV2; // 42 MHz
        config.rcc.apb2_pre = embassy_stm32::rcc::APBPrescaler::DIV1; // 84 MHz

        config.rcc.ls = LsConfig {
            rtc: embassy_stm32::rcc::RtcClockSource::LSE,
            lsi: false,
            lse: Some(LseConfig {
                frequency: Hertz(32_768),
                mode: LseMode::Oscillator(embassy_stm32::rcc::LseDrive::MediumHigh),
            }),
        };

        let p = embassy_stm32::init(config);
        info!("System initialized with HSE (12MHz) and LSE (32.768kHz)");

        // Default prescalers: PREDIV_A = 127, PREDIV_S = 255
        let rtc = Rtc::new(p.RTC, embassy_stm32::rtc::RtcConfig::default());
        let mut rtc = RtcTimer::new(Stm32Rtc::new(rtc, cx.core.SCB), RtcConfig::default());
        match rtc.init() {
            Ok(()) => info!("RTC time base ready at {} ms", rtc.timer_value().unwrap_or(0)),
            Err(e) => warn!("RTC init failed: {}", e),
        }

        let led = Output::new(p.PC1, Level::High, Speed::Low);

        heartbeat::spawn().ok();

        (Shared { rtc }, Local { led })
    }

    /// RTC alarm A, routed through EXTI line 17
    #[task(binds = RTC_ALARM, priority = 2, shared = [rtc])]
    fn rtc_alarm(mut cx: rtc_alarm::Context) {
        cx.shared.rtc.lock(|rtc| {
            rtc.on_alarm_interrupt(&mut || {
                if heartbeat::spawn().is_err() {
                    warn!("Heartbeat still running, alarm dropped");
                }
            });
        });
    }

    /// Heartbeat task, paced entirely by the RTC alarm
    #[task(priority = 1, shared = [rtc], local = [led, lit: bool = true])]
    async fn heartbeat(mut cx: heartbeat::Context) {
        let next_ms = if *cx.local.lit {
            cx.local.led.set_low();
            HEARTBEAT_OFF_MS
        } else {
            cx.local.led.set_high();
            HEARTBEAT_ON_MS
        };
        *cx.local.lit = !*cx.local.lit;

        cx.shared.rtc.lock(|rtc| {
            let timeout = rtc.adjusted_timeout(next_ms);
            if let Err(e) = rtc.set_timeout(timeout) {
                warn!("Failed to arm heartbeat alarm: {}", e);
            }
        });
    }

    #[idle(shared = [rtc])]
    fn idle(mut cx: idle::Context) -> ! {
        info!("Idle task started - entering stop mode between alarms");
        loop {
            // Interrupts stay masked across WFI; a pending alarm still wakes
            // the core and is serviced once the critical section ends.
            let stopped = cortex_m::interrupt::free(|_| {
                cx.shared.rtc.lock(|rtc| rtc.enter_low_power())
            });
            if !stopped {
                cortex_m::asm::wfi();
            }
        }
    }
}
