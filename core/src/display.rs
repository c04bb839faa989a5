//! Prepared reading frames rotated on the display
//!
//! The control loop prepares frames after each reading; a periodic task
//! shows them one at a time.

use hal_abstractions::ReadingsDisplay;
use heapless::{String, Vec};

/// Longest location name shown
pub const LOCATION_CAPACITY: usize = 32;

/// One screenful: a temperature with its time and place
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayFrame {
    pub time: String<8>,
    pub location: String<LOCATION_CAPACITY>,
    pub temperature_c: f32,
}

impl DisplayFrame {
    pub fn new(time: &str, location: &str, temperature_c: f32) -> Self {
        let mut t = String::new();
        let _ = t.push_str(time);
        Self {
            time: t,
            location: title_case(location),
            temperature_c,
        }
    }
}

/// Local frame, then the remote one when there is a remote sensor
#[derive(Debug, Default)]
pub struct ReadingCarousel {
    frames: Vec<DisplayFrame, 2>,
    next: usize,
}

impl ReadingCarousel {
    pub const fn new() -> Self {
        Self {
            frames: Vec::new(),
            next: 0,
        }
    }

    /// Replace the frames and restart the rotation at the local one
    pub fn update(&mut self, time: &str, local: (&str, f32), remote: Option<(&str, f32)>) {
        self.frames.clear();
        self.next = 0;
        let _ = self.frames.push(DisplayFrame::new(time, local.0, local.1));
        if let Some((location, temperature_c)) = remote {
            let _ = self.frames.push(DisplayFrame::new(time, location, temperature_c));
        }
    }

    /// Whether rotation does anything
    pub fn rotates(&self) -> bool {
        self.frames.len() > 1
    }

    /// Show the next frame; `false` when nothing has been prepared yet
    pub fn show_next(&mut self, display: &mut impl ReadingsDisplay) -> bool {
        let Some(frame) = self.frames.get(self.next) else {
            return false;
        };
        display.show_reading(&frame.time, &frame.location, frame.temperature_c);
        self.next = (self.next + 1) % self.frames.len();
        true
    }
}

/// Capitalise each word: `"ballarat east"` becomes `"Ballarat East"`
pub fn title_case(text: &str) -> String<LOCATION_CAPACITY> {
    let mut out = String::new();
    let mut word_start = true;
    for c in text.chars() {
        let pushed = if c.is_alphabetic() {
            let upper = core::mem::replace(&mut word_start, false);
            if upper {
                c.to_uppercase().try_for_each(|u| out.push(u))
            } else {
                c.to_lowercase().try_for_each(|l| out.push(l))
            }
        } else {
            word_start = true;
            out.push(if c == '_' { ' ' } else { c })
        };
        if pushed.is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Shown(std::vec::Vec<std::string::String>);

    impl ReadingsDisplay for Shown {
        fn show_reading(&mut self, time: &str, location: &str, temperature_c: f32) {
            self.0
                .push(std::format!("{} {} {:.1}", time, location, temperature_c));
        }
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("geelong").as_str(), "Geelong");
        assert_eq!(title_case("BALLARAT east").as_str(), "Ballarat East");
        assert_eq!(title_case("mt_buller").as_str(), "Mt Buller");
        assert_eq!(title_case("").as_str(), "");
    }

    #[test]
    fn test_empty_carousel_shows_nothing() {
        let mut carousel = ReadingCarousel::new();
        let mut shown = Shown::default();
        assert!(!carousel.show_next(&mut shown));
        assert!(shown.0.is_empty());
    }

    #[test]
    fn test_local_only() {
        let mut carousel = ReadingCarousel::new();
        carousel.update("08:30 PM", ("geelong", 18.2), None);
        assert!(!carousel.rotates());

        let mut shown = Shown::default();
        carousel.show_next(&mut shown);
        carousel.show_next(&mut shown);
        assert_eq!(shown.0, ["08:30 PM Geelong 18.2", "08:30 PM Geelong 18.2"]);
    }

    #[test]
    fn test_rotation_restarts_on_update() {
        let mut carousel = ReadingCarousel::new();
        carousel.update("08:30 PM", ("geelong", 18.2), Some(("ballarat", 12.6)));
        assert!(carousel.rotates());

        let mut shown = Shown::default();
        carousel.show_next(&mut shown);
        carousel.show_next(&mut shown);
        carousel.show_next(&mut shown);
        carousel.update("08:31 PM", ("geelong", 18.4), Some(("ballarat", 12.5)));
        carousel.show_next(&mut shown);
        assert_eq!(
            shown.0,
            [
                "08:30 PM Geelong 18.2",
                "08:30 PM Ballarat 12.6",
                "08:30 PM Geelong 18.2",
                "08:31 PM Geelong 18.4",
            ]
        );
    }
}
