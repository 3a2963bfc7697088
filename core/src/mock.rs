//! Simulated RTC peripheral for host tests
#![allow(dead_code)]

use hal_abstractions::rtc::{AlarmMatch, CalendarValue, RtcHardware, WakeCause};

use crate::calendar::days_in_month;
use crate::tick::ms_to_tick;

/// Longest stretch `run_to_alarm` will simulate (~4.5 hours of ticks)
const MAX_SIMULATED_TICKS: u32 = 1 << 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SimError {
    AlarmRejected,
}

/// Calendar counter advancing one subtick at a time
#[derive(Debug)]
pub(crate) struct SimRtc {
    pub now: CalendarValue,
    pub alarm: Option<AlarmMatch>,
    pub backup: [u32; 4],
    pub wake_flag: bool,
    /// Reads that land mid-increment: each advances the counter first
    pub torn_reads: u32,
    pub reject_alarm: bool,
    /// Ticks between the alarm match and the CPU running again
    pub wake_latency_ticks: u32,
    pub reads: u32,
    pub calendar_writes: u32,
    pub disarms: u32,
    pub stop_entries: u32,
    pub stop_preparations: u32,
}

impl SimRtc {
    pub fn new(now: CalendarValue) -> Self {
        Self {
            now,
            alarm: None,
            backup: [0; 4],
            wake_flag: false,
            torn_reads: 0,
            reject_alarm: false,
            wake_latency_ticks: 0,
            reads: 0,
            calendar_writes: 0,
            disarms: 0,
            stop_entries: 0,
            stop_preparations: 0,
        }
    }

    /// Advance the counter by one subtick
    pub fn tick(&mut self) {
        let now = &mut self.now;
        if now.subticks > 0 {
            now.subticks -= 1;
            return;
        }
        now.subticks = 255;
        now.seconds += 1;
        if now.seconds < 60 {
            return;
        }
        now.seconds = 0;
        now.minutes += 1;
        if now.minutes < 60 {
            return;
        }
        now.minutes = 0;
        now.hours += 1;
        if now.hours < 24 {
            return;
        }
        now.hours = 0;
        now.day += 1;
        if now.day <= days_in_month(now.year, now.month) {
            return;
        }
        now.day = 1;
        now.month += 1;
        if now.month > 12 {
            now.month = 1;
            now.year = (now.year + 1) % 100;
        }
    }

    pub fn advance_ticks(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    pub fn advance_ms(&mut self, ms: u32) {
        self.advance_ticks(ms_to_tick(u64::from(ms)));
    }

    /// Whether the armed alarm matches the current counter
    pub fn alarm_due(&self) -> bool {
        self.alarm.is_some_and(|alarm| alarm.matches(&self.now))
    }

    /// Run the counter until the armed alarm matches
    pub fn run_to_alarm(&mut self) -> bool {
        if self.alarm.is_none() {
            return false;
        }
        for _ in 0..MAX_SIMULATED_TICKS {
            if self.alarm_due() {
                return true;
            }
            self.tick();
        }
        false
    }
}

impl RtcHardware for SimRtc {
    type Error = SimError;

    fn read_calendar(&mut self) -> Result<CalendarValue, SimError> {
        self.reads += 1;
        if self.torn_reads > 0 {
            self.torn_reads -= 1;
            self.tick();
        }
        Ok(self.now)
    }

    fn write_calendar(&mut self, value: &CalendarValue) -> Result<(), SimError> {
        self.calendar_writes += 1;
        self.now = *value;
        Ok(())
    }

    fn arm_alarm(&mut self, target: &AlarmMatch) -> Result<(), SimError> {
        if self.reject_alarm {
            return Err(SimError::AlarmRejected);
        }
        self.alarm = Some(*target);
        Ok(())
    }

    fn disarm_alarm(&mut self) -> Result<(), SimError> {
        self.disarms += 1;
        self.alarm = None;
        Ok(())
    }

    fn read_backup(&mut self, index: usize) -> u32 {
        self.backup[index]
    }

    fn write_backup(&mut self, index: usize, value: u32) {
        self.backup[index] = value;
    }

    fn prepare_stop_mode(&mut self) {
        self.stop_preparations += 1;
    }

    fn enter_stop_mode(&mut self) {
        self.stop_entries += 1;
        if self.run_to_alarm() {
            self.advance_ticks(self.wake_latency_ticks);
            self.wake_flag = true;
        }
    }

    fn wake_cause(&mut self) -> WakeCause {
        if self.wake_flag {
            WakeCause::Alarm
        } else {
            WakeCause::Other
        }
    }

    fn clear_wake_cause(&mut self) {
        self.wake_flag = false;
    }
}
