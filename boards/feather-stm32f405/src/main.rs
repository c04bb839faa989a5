#![deny(unsafe_code)]
#![deny(warnings)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;
use rtic_monotonics::stm32::prelude::*;

mod display;
mod error_store;
mod eth;
mod network;
mod sensor;
mod settings;
mod station;
mod status;
mod time;
mod tls_buffers;

stm32_tim2_monotonic!(Mono, 1_000_000);

#[app(device = embassy_stm32, peripherals = true, dispatchers = [USART1, USART2, USART3])]
mod app {
    use super::*;
    use defmt::{error, info};
    use embassy_futures::join::join3;
    use embassy_stm32::exti::ExtiInput;
    use embassy_stm32::gpio::{Level, Output, Pull, Speed};
    use embassy_stm32::peripherals;
    use embassy_stm32::rcc::{Hse, HseMode, LsConfig, LseConfig, LseMode};
    use embassy_stm32::rtc::{Rtc, RtcConfig};
    use embassy_stm32::spi::{self, Spi};
    use embassy_stm32::time::Hertz;
    use weather_core::settings::{Secrets, Settings};

    type SpiPeripheral = embassy_stm32::Peri<'static, peripherals::SPI2>;
    type PinPB13 = embassy_stm32::Peri<'static, peripherals::PB13>;
    type PinPB15 = embassy_stm32::Peri<'static, peripherals::PB15>;
    type PinPB14 = embassy_stm32::Peri<'static, peripherals::PB14>;
    type PinPC6 = embassy_stm32::Peri<'static, peripherals::PC6>;
    type PinPC3 = embassy_stm32::Peri<'static, peripherals::PC3>;
    type PinPC2 = embassy_stm32::Peri<'static, peripherals::PC2>;
    type ExtiChannel = embassy_stm32::Peri<'static, peripherals::EXTI2>;
    type DmaTx = embassy_stm32::Peri<'static, peripherals::DMA1_CH4>;
    type DmaRx = embassy_stm32::Peri<'static, peripherals::DMA1_CH3>;

    struct NetworkPeripherals {
        spi: SpiPeripheral,
        sck: PinPB13,
        mosi: PinPB15,
        miso: PinPB14,
        cs: PinPC6,
        reset: PinPC3,
        int: PinPC2,
        exti: ExtiChannel,
        dma_tx: DmaTx,
        dma_rx: DmaRx,
    }

    /// BME280 bus, error flash and RNG
    struct StationPeripherals {
        i2c: embassy_stm32::Peri<'static, peripherals::I2C1>,
        scl: embassy_stm32::Peri<'static, peripherals::PB6>,
        sda: embassy_stm32::Peri<'static, peripherals::PB7>,
        i2c_dma_tx: embassy_stm32::Peri<'static, peripherals::DMA1_CH6>,
        i2c_dma_rx: embassy_stm32::Peri<'static, peripherals::DMA1_CH0>,
        flash: embassy_stm32::Peri<'static, peripherals::FLASH>,
        rng: embassy_stm32::Peri<'static, peripherals::RNG>,
    }

    // RNG and I2C interrupt bindings
    embassy_stm32::bind_interrupts!(struct Irqs {
        RNG => embassy_stm32::rng::InterruptHandler<peripherals::RNG>;
        I2C1_EV => embassy_stm32::i2c::EventInterruptHandler<peripherals::I2C1>;
        I2C1_ER => embassy_stm32::i2c::ErrorInterruptHandler<peripherals::I2C1>;
    });

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        led: Output<'static>,
    }

    #[init]
    fn init(_cx: init::Context) -> (Shared, Local) {
        info!("Weather station starting...");

        // Adafruit Feather STM32F405: 12 MHz HSE, 32.768 kHz LSE (PC14/PC15)
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // Configure PLL for system clock and RNG (48MHz required for RNG)
        // HSE (12 MHz) / PREDIV(6) = 2 MHz (PLL input)
        // 2 MHz * MUL(168) = 336 MHz (VCO)
        // VCO / DIVP(4) = 84 MHz (SYSCLK)
        // VCO / DIVQ(7) = 48 MHz (USB/RNG clock)
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: Some(embassy_stm32::rcc::PllQDiv::DIV7),
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

        // TIM2 on APB1: timer clock = 2*APB1 when prescaler != 1
        let timer_clock_hz = 84_000_000;
        Mono::start(timer_clock_hz);
        info!("TIM2 monotonic timer initialized at 1 MHz");

        let rtc = Rtc::new(p.RTC, RtcConfig::default());
        time::initialize_rtc(rtc);

        let led = Output::new(p.PC1, Level::Low, Speed::Low);
        status_led::spawn().ok();

        let (settings, secrets) = match settings::load() {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("Settings rejected: {}", e);
                return (Shared {}, Local { led });
            }
        };
        info!(
            "Location {}, reading every {}s",
            settings.sensor_location, settings.sensor_read_period_s
        );

        let net_periph = NetworkPeripherals {
            spi: p.SPI2,
            sck: p.PB13,
            mosi: p.PB15,
            miso: p.PB14,
            cs: p.PC6,
            reset: p.PC3,
            int: p.PC2,
            exti: p.EXTI2,
            dma_tx: p.DMA1_CH4,
            dma_rx: p.DMA1_CH3,
        };

        let station_periph = StationPeripherals {
            i2c: p.I2C1,
            scl: p.PB6,
            sda: p.PB7,
            i2c_dma_tx: p.DMA1_CH6,
            i2c_dma_rx: p.DMA1_CH0,
            flash: p.FLASH,
            rng: p.RNG,
        };

        display_task::spawn(settings.display_cycle_period_ms).ok();
        network_task::spawn(net_periph, station_periph, settings, secrets).ok();

        (Shared {}, Local { led })
    }

    /// Status LED task
    #[task(priority = 1, local = [led])]
    async fn status_led(cx: status_led::Context) {
        status::run_led(cx.local.led).await;
    }

    /// Rotates the displayed reading frames
    #[task(priority = 1)]
    async fn display_task(_cx: display_task::Context, period_ms: u32) {
        loop {
            Mono::delay((period_ms as u64).millis()).await;
            display::cycle_display();
        }
    }

    /// Network task - runs the W5500, the network stack and the station
    ///
    /// Stack is !Send and must remain within this task.
    #[task(priority = 1)]
    async fn network_task(
        _cx: network_task::Context,
        periph: NetworkPeripherals,
        station_periph: StationPeripherals,
        settings: Settings<'static>,
        secrets: Secrets<'static>,
    ) -> ! {
        use embassy_net::{Config, StackResources};
        use embassy_stm32::flash::Flash;
        use embassy_stm32::i2c::{self, I2c};
        use embassy_stm32::rng::Rng;
        use rand_core::RngCore;
        use static_cell::StaticCell;

        use network::{EthLink, HttpsTransport, LinkConfig, NetworkConfig};
        use station::{Station, StationBuffers};

        info!("Network task started");

        // Setup ethernet peripherals
        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(10_000_000); // 10 MHz for W5500

        let spi = Spi::new(
            periph.spi,
            periph.sck,
            periph.mosi,
            periph.miso,
            periph.dma_tx,
            periph.dma_rx,
            spi_config,
        );

        let cs = Output::new(periph.cs, Level::High, Speed::VeryHigh);
        let reset = Output::new(periph.reset, Level::High, Speed::Low);
        let int = ExtiInput::new(periph.int, periph.exti, Pull::Up);

        let eth_periph = eth::EthPeripherals {
            spi,
            cs,
            reset,
            int,
        };

        let network_config = NetworkConfig::default();
        let (device, mut w5500_runner) =
            match eth::init_w5500(eth_periph, network_config.mac_addr).await {
                Ok(parts) => parts,
                Err(e) => {
                    error!("{}; rebooting", e);
                    Mono::delay(10_u64.secs()).await;
                    cortex_m::peripheral::SCB::sys_reset();
                }
            };

        let mut rng = Rng::new(station_periph.rng, Irqs);

        // No IPv4 configuration until the link is connected
        static RESOURCES: StaticCell<StackResources<5>> = StaticCell::new();
        let (stack, mut net_runner) = embassy_net::new(
            device,
            Config::default(),
            RESOURCES.init(StackResources::new()),
            rng.next_u64(),
        );
        info!("Network stack initialized");

        let buffers = tls_buffers::take();
        let transport = HttpsTransport::new(stack, buffers.tls_read, buffers.tls_write, rng.next_u64());

        let mut i2c_config = i2c::Config::default();
        i2c_config.frequency = Hertz(400_000);
        let i2c = I2c::new(
            station_periph.i2c,
            station_periph.scl,
            station_periph.sda,
            Irqs,
            station_periph.i2c_dma_tx,
            station_periph.i2c_dma_rx,
            i2c_config,
        );

        let store = error_store::FlashErrorStore::new(Flash::new_blocking(station_periph.flash));

        let link_config = LinkConfig {
            perform_complete_poweroff: settings.perform_complete_poweroff,
            ..LinkConfig::default()
        };

        let app_logic = async {
            let mut station = Station::new(
                settings,
                secrets,
                stack,
                EthLink::new(stack, link_config),
                transport,
                store,
                StationBuffers {
                    request_body: buffers.request_body,
                    response_body: buffers.response_body,
                    timezone_response: buffers.timezone_response,
                },
            );
            match station.run(i2c).await {
                Ok(never) => match never {},
                Err(fatal) => station.fail(fatal).await,
            }
        };

        join3(w5500_runner.run(), net_runner.run(), app_logic).await;
    }

    /// RTIC idle task - WFI sleep mode when no tasks active
    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        info!("Idle task started - entering WFI loop");
        loop {
            cortex_m::asm::wfi();
        }
    }
}
