#![deny(unsafe_code)]
#![deny(warnings)]
//! BME280 on I2C1 (SCL=PB6, SDA=PB7)

use defmt::info;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Async;
use weather_core::bme280::{self, Bme280, Measurement};
use weather_core::Error;

use crate::time::{self, MonoDelay};

/// Standard atmosphere, for the logged altitude estimate
const SEA_LEVEL_HPA: f32 = 1013.25;

pub type Sensor = Bme280<I2c<'static, Async>, MonoDelay>;

/// Load calibration and configure the sensor
pub async fn init(i2c: I2c<'static, Async>) -> Result<Sensor, Error> {
    let sensor = Bme280::new(i2c, MonoDelay, bme280::Config::default()).await?;
    info!("BME280 ready at {=u8:#x}", bme280::DEFAULT_ADDRESS);
    Ok(sensor)
}

/// Take one forced-mode reading, stamped with the RTC time
pub async fn read_sensor(sensor: &mut Sensor) -> Result<(u64, Measurement), Error> {
    let measurement = sensor.measure().await?;
    let now = time::unix_now();
    info!(
        "{}: {}°C {}hPa {}%RH (~{}m)",
        now,
        measurement.temperature_c(),
        measurement.pressure_hpa(),
        measurement.humidity_rh(),
        measurement.altitude_m(SEA_LEVEL_HPA)
    );
    Ok((now, measurement))
}
