#![deny(unsafe_code)]
#![deny(warnings)]
//! Reading display
//!
//! The Feather has no screen, so frames are written to the defmt log. The
//! carousel is shared between the control loop, which refreshes it after each
//! reading, and the rotation task.

use core::cell::RefCell;
use core::fmt::Write;

use critical_section::Mutex;
use defmt::info;
use hal_abstractions::ReadingsDisplay;
use heapless::String;
use weather_core::display::ReadingCarousel;

static CAROUSEL: Mutex<RefCell<ReadingCarousel>> = Mutex::new(RefCell::new(ReadingCarousel::new()));

/// `ReadingsDisplay` on the defmt log
pub struct LogDisplay;

impl ReadingsDisplay for LogDisplay {
    fn show_reading(&mut self, time: &str, location: &str, temperature_c: f32) {
        let mut text: String<64> = String::new();
        let _ = write!(text, "{:.1}° {} {}", temperature_c, time, location);
        info!("{}", text.as_str());
    }
}

/// Replace the frames and show the local one straight away
pub fn update_readings(time: &str, local: (&str, f32), remote: Option<(&str, f32)>) {
    critical_section::with(|cs| {
        let mut carousel = CAROUSEL.borrow(cs).borrow_mut();
        carousel.update(time, local, remote);
        carousel.show_next(&mut LogDisplay);
    });
}

/// Advance to the next frame when there is more than one
pub fn cycle_display() {
    critical_section::with(|cs| {
        let mut carousel = CAROUSEL.borrow(cs).borrow_mut();
        if carousel.rotates() {
            carousel.show_next(&mut LogDisplay);
        }
    });
}
