#![deny(unsafe_code)]
#![deny(warnings)]
//! W5500 Ethernet FeatherWing on SPI2

use defmt::{error, info, Debug2Format};
use embassy_embedded_hal::shared_bus::asynch::spi::SpiDevice;
use embassy_net_wiznet::chip::W5500;
use embassy_net_wiznet::{Device, Runner, State};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Output;
use embassy_stm32::mode::Async;
use embassy_stm32::spi::Spi;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Timer;
use static_cell::StaticCell;

use crate::network::NetworkError;

type SpiBus = Mutex<CriticalSectionRawMutex, Spi<'static, Async>>;
type EthSpi = SpiDevice<'static, CriticalSectionRawMutex, Spi<'static, Async>, Output<'static>>;

/// Drives the chip; poll it for as long as the stack is in use
pub type W5500Runner = Runner<'static, W5500, EthSpi, ExtiInput<'static>, Output<'static>>;

/// Pins and bus of the FeatherWing
pub struct EthPeripherals<'a> {
    pub spi: Spi<'a, Async>,
    pub cs: Output<'a>,
    pub reset: Output<'a>,
    pub int: ExtiInput<'a>,
}

/// Reset the chip and hand back the embassy-net device and its runner
pub async fn init_w5500(
    periph: EthPeripherals<'static>,
    mac_addr: [u8; 6],
) -> Result<(Device<'static>, W5500Runner), NetworkError> {
    static SPI_BUS: StaticCell<SpiBus> = StaticCell::new();
    static STATE: StaticCell<State<8, 8>> = StaticCell::new();

    let EthPeripherals {
        spi,
        cs,
        mut reset,
        int,
    } = periph;

    // Reset pulse: at least 500 µs low, then 1 ms for the PLL to lock
    reset.set_low();
    Timer::after_millis(1).await;
    reset.set_high();
    Timer::after_millis(2).await;

    let spi = SpiDevice::new(SPI_BUS.init(Mutex::new(spi)), cs);
    info!("W5500 MAC {:02x}", mac_addr);

    embassy_net_wiznet::new(mac_addr, STATE.init(State::new()), spi, int, reset)
        .await
        .map_err(|e| {
            error!("W5500 init failed: {:?}", Debug2Format(&e));
            NetworkError::LinkInitFailed
        })
}
