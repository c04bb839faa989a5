//! Sleeping between readings
//!
//! Readings are aligned to multiples of the read period in Unix time, so
//! stations sharing a period sample at the same instants. Between readings
//! the station either deep sleeps with the link down or stays awake, pulsing
//! the link now and then so a USB power bank does not switch itself off.

use core::fmt::Write;

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{NetworkLink, StatusIndicator};
use heapless::String;

/// How long the link stays up during a power pulse
pub const POWER_PULSE_HOLD_MS: u32 = 1000;

/// Sleep policy between readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerSchedule {
    pub read_period_s: u32,
    /// 0 disables power pulses
    pub draw_power_period_s: u32,
    pub deep_sleep: bool,
}

/// Seconds until the next multiple of `period_s`, in `1..=period_s`
pub fn seconds_until_next(now: u64, period_s: u32) -> u32 {
    let period = period_s.max(1) as u64;
    (period - now % period) as u32
}

impl PowerSchedule {
    pub fn seconds_until_next_reading(&self, now: u64) -> u32 {
        seconds_until_next(now, self.read_period_s)
    }

    /// `None` when power pulses are disabled
    pub fn seconds_until_next_power_draw(&self, now: u64) -> Option<u32> {
        match self.draw_power_period_s {
            0 => None,
            period => Some(seconds_until_next(now, period)),
        }
    }

    /// Block until the next reading is due, following the sleep policy
    ///
    /// `clock` returns the current Unix time in seconds.
    pub async fn wait_until_next_reading<L, S, D, C>(
        &self,
        link: &mut L,
        status: &mut S,
        delay: &mut D,
        clock: C,
    ) where
        L: NetworkLink,
        S: StatusIndicator,
        D: DelayNs,
        C: Fn() -> u64,
    {
        if self.deep_sleep {
            self.deep_sleep_until_next_reading(link, status, delay, clock())
                .await;
        } else {
            self.keep_awake_until_next_reading(link, status, delay, clock)
                .await;
        }
    }

    async fn keep_awake_until_next_reading<L, S, D, C>(
        &self,
        link: &mut L,
        status: &mut S,
        delay: &mut D,
        clock: C,
    ) where
        L: NetworkLink,
        S: StatusIndicator,
        D: DelayNs,
        C: Fn() -> u64,
    {
        let mut text: String<32> = String::new();
        loop {
            let now = clock();
            let until_reading = self.seconds_until_next_reading(now);
            match self.seconds_until_next_power_draw(now) {
                Some(until_pulse) if until_pulse < until_reading => {
                    text.clear();
                    let _ = write!(text, "Pulse in {}s", until_pulse);
                    status.status(&text);
                    delay.delay_ms(until_pulse * 1000).await;
                    draw_power(link, status, delay).await;
                }
                _ => {
                    text.clear();
                    let _ = write!(text, "Sleeping for {}s", until_reading);
                    status.status(&text);
                    delay.delay_ms(until_reading * 1000).await;
                    return;
                }
            }
        }
    }

    async fn deep_sleep_until_next_reading<L, S, D>(
        &self,
        link: &mut L,
        status: &mut S,
        delay: &mut D,
        now: u64,
    ) where
        L: NetworkLink,
        S: StatusIndicator,
        D: DelayNs,
    {
        let seconds = self.seconds_until_next_reading(now);
        let mut text: String<32> = String::new();
        let _ = write!(text, "Deep sleeping for {}s", seconds);
        status.status(&text);
        link.disconnect().await;
        delay.delay_ms(seconds * 1000).await;
    }
}

/// Cycle the link to draw a burst of current
pub async fn draw_power<L, S, D>(link: &mut L, status: &mut S, delay: &mut D)
where
    L: NetworkLink,
    S: StatusIndicator,
    D: DelayNs,
{
    status.status("Power pulse.");
    link.disconnect().await;
    link.connect().await;
    delay.delay_ms(POWER_PULSE_HOLD_MS).await;
    link.disconnect().await;
}
