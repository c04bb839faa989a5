//! Wall clock on the STM32 RTC
//!
//! - SNTP (see `network::sntp`) sets the RTC after each successful sync
//! - Between syncs, timestamps are read back from the RTC (LSE, 1 s
//!   resolution, ±20-50 ppm)
//! - Sleeps go through the RTIC TIM2 monotonic via [`MonoDelay`]
#![deny(unsafe_code)]
#![deny(warnings)]

mod calendar;
mod rtc;

use defmt::error;
use embedded_hal_async::delay::DelayNs;
use rtic_monotonics::fugit::ExtU64;
use rtic_monotonics::Monotonic;

use crate::Mono;

pub use rtc::{initialize_rtc, write_rtc, RtcError};

/// `DelayNs` on the RTIC monotonic
///
/// The timer ticks at 1 MHz, so sub-microsecond delays round up.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonoDelay;

impl DelayNs for MonoDelay {
    async fn delay_ns(&mut self, ns: u32) {
        Mono::delay((ns as u64).div_ceil(1000).micros()).await;
    }

    async fn delay_us(&mut self, us: u32) {
        Mono::delay((us as u64).micros()).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        Mono::delay((ms as u64).millis()).await;
    }
}

/// Current Unix time in seconds, 0 before the first sync
pub fn unix_now() -> u64 {
    match rtc::unix_secs() {
        Ok(secs) => secs,
        Err(RtcError::NotInitialized) => 0,
        Err(e) => {
            error!("Failed to read RTC: {}", e);
            0
        }
    }
}
