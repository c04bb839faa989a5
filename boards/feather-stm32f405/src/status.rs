#![deny(unsafe_code)]
#![deny(warnings)]
//! Status output: defmt log plus LED flashes
//!
//! Messages are always logged. The LED task flashes once for a status and
//! twice for an error, unless status output has been hidden.

use defmt::{error, info};
use embassy_stm32::gpio::Output;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use hal_abstractions::StatusIndicator;
use rtic_monotonics::fugit::ExtU64;
use rtic_monotonics::Monotonic;

use crate::Mono;

const FLASH_MS: u64 = 50;

/// Flashes requested from the LED task
static FLASHES: Signal<CriticalSectionRawMutex, u8> = Signal::new();

/// Status indicator shared by the control loop and the fatal handler
pub struct LedStatus {
    visible: bool,
}

impl LedStatus {
    pub const fn new() -> Self {
        Self { visible: true }
    }

    /// Stop flashing; messages are still logged
    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    fn flash(&self, count: u8) {
        if self.visible {
            FLASHES.signal(count);
        }
    }
}

impl StatusIndicator for LedStatus {
    fn status(&mut self, text: &str) {
        info!("{}", text);
        self.flash(1);
    }

    fn error(&mut self, text: &str) {
        error!("{}", text);
        self.flash(2);
    }
}

/// Flash `led` on request; never returns
pub async fn run_led(led: &mut Output<'static>) -> ! {
    loop {
        let count = FLASHES.wait().await;
        for _ in 0..count {
            led.set_high();
            Mono::delay(FLASH_MS.millis()).await;
            led.set_low();
            Mono::delay(FLASH_MS.millis()).await;
        }
    }
}
