//! STM32 RTC as the station's wall clock
//!
//! The RTC runs on the LSE and keeps UTC in whole seconds. Until SNTP has
//! written it once, reads fail with [`RtcError::NotInitialized`].

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;
use defmt::{info, Format};
use embassy_stm32::rtc::Rtc;
use weather_core::clock::Timestamp;

use super::calendar::{datetime_to_unix, unix_to_datetime};

/// Set once the RTC holds NTP time
static CLOCK_SET: AtomicBool = AtomicBool::new(false);

static RTC: Mutex<RefCell<Option<Rtc>>> = Mutex::new(RefCell::new(None));

/// RTC operation errors
#[derive(Debug, Clone, Copy, Format)]
pub enum RtcError {
    /// Not initialized, or not yet set from NTP
    NotInitialized,
    /// RTC hardware error
    HardwareError,
}

/// Hand the RTC over; call once from `init`
pub fn initialize_rtc(rtc: Rtc) {
    critical_section::with(|cs| {
        RTC.borrow(cs).replace(Some(rtc));
    });
    info!("Internal RTC initialized");
}

fn with_rtc<R>(f: impl FnOnce(&mut Rtc) -> Result<R, RtcError>) -> Result<R, RtcError> {
    critical_section::with(|cs| match RTC.borrow(cs).borrow_mut().as_mut() {
        Some(rtc) => f(rtc),
        None => Err(RtcError::NotInitialized),
    })
}

/// Set the clock, rounding to the nearest second
pub fn write_rtc(timestamp: Timestamp) -> Result<(), RtcError> {
    let secs = timestamp.unix_secs + u64::from(timestamp.micros >= 500_000);
    let datetime = unix_to_datetime(secs).ok_or(RtcError::HardwareError)?;

    with_rtc(|rtc| {
        rtc.set_datetime(datetime)
            .map_err(|_| RtcError::HardwareError)
    })?;
    CLOCK_SET.store(true, Ordering::Release);
    Ok(())
}

/// Current Unix time in seconds
pub fn unix_secs() -> Result<u64, RtcError> {
    if !CLOCK_SET.load(Ordering::Acquire) {
        return Err(RtcError::NotInitialized);
    }

    with_rtc(|rtc| {
        rtc.now()
            .map(|datetime| datetime_to_unix(&datetime))
            .map_err(|_| RtcError::HardwareError)
    })
}
