#![deny(unsafe_code)]
#![deny(warnings)]
//! Last-error region in internal flash
//!
//! Sector 11 is the last 128 KB of the STM32F405RG's 1 MB, well past the end
//! of the program image. It holds the last-error frame.

use defmt::warn;
use embassy_stm32::flash::{Blocking, Error as FlashError, Flash};
use hal_abstractions::ErrorStore;

/// Offset of sector 11 from the start of flash
const REGION_OFFSET: u32 = 0xE_0000;
/// Sector 11 size
const REGION_SIZE: u32 = 128 * 1024;

/// `ErrorStore` on flash sector 11
pub struct FlashErrorStore {
    flash: Flash<'static, Blocking>,
}

impl FlashErrorStore {
    pub fn new(flash: Flash<'static, Blocking>) -> Self {
        Self { flash }
    }
}

impl ErrorStore for FlashErrorStore {
    type Error = FlashError;

    fn capacity(&self) -> usize {
        REGION_SIZE as usize
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), FlashError> {
        self.flash.blocking_read(REGION_OFFSET, buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), FlashError> {
        self.erase()?;
        self.flash.blocking_write(REGION_OFFSET, data).inspect_err(|e| {
            warn!("Flash write failed: {:?}", e);
        })
    }

    fn erase(&mut self) -> Result<(), FlashError> {
        self.flash
            .blocking_erase(REGION_OFFSET, REGION_OFFSET + REGION_SIZE)
            .inspect_err(|e| {
                warn!("Flash erase failed: {:?}", e);
            })
    }
}
