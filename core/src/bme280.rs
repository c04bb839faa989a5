//! BME280 temperature, pressure and humidity sensor
//!
//! Async driver over `embedded-hal-async` I2C. Each [`Bme280::measure`] runs
//! one forced-mode conversion, so the sensor sleeps between readings.
//!
//! Compensation is the Bosch integer reference (BME280 datasheet §4.2.3 and
//! §8.2): temperature in 0.01 °C, pressure in Pa as Q24.8 via the 64-bit
//! path, humidity in %RH as Q22.10.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::error::Error;

/// I2C address with SDO pulled high
pub const DEFAULT_ADDRESS: u8 = 0x77;

const REG_CALIB_00: u8 = 0x88;
const REG_CALIB_26: u8 = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA: u8 = 0xF7;

/// Conversion running
const STATUS_MEASURING: u8 = 0x08;
/// Sleep mode, t×1 p×1, used until the first forced conversion
const CTRL_MEAS_SLEEP: u8 = 0x24;
const MODE_FORCED: u8 = 0x01;

/// Extra 1 ms status polls after the datasheet maximum has elapsed
const MAX_STATUS_POLLS: u8 = 10;

/// Oversampling modes (datasheet register encoding: 0 = skip, n = ×2^(n-1))
/// and IIR filter setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub address: u8,
    pub temperature_oversampling: u8,
    pub pressure_oversampling: u8,
    pub humidity_oversampling: u8,
    pub iir_filter: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            temperature_oversampling: 2,
            pressure_oversampling: 5,
            humidity_oversampling: 1,
            iir_filter: 1,
        }
    }
}

impl Config {
    /// Worst-case forced conversion time, datasheet appendix B
    pub fn max_conversion_time_us(&self) -> u32 {
        fn oversampling(mode: u8) -> u32 {
            match mode {
                0 => 0,
                n => 1 << (n.min(5) - 1),
            }
        }

        let mut us = 1250 + 2300 * oversampling(self.temperature_oversampling);
        if self.pressure_oversampling != 0 {
            us += 575 + 2300 * oversampling(self.pressure_oversampling);
        }
        if self.humidity_oversampling != 0 {
            us += 575 + 2300 * oversampling(self.humidity_oversampling);
        }
        us
    }

    fn ctrl_meas_forced(&self) -> u8 {
        (self.pressure_oversampling & 0x07) << 5
            | (self.temperature_oversampling & 0x07) << 2
            | MODE_FORCED
    }
}

/// Factory trimming parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// Decode `0x88..=0xA1` and `0xE1..=0xE7`
    pub fn from_registers(tp: &[u8; 26], h: &[u8; 7]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);

        Self {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p1: u16_at(6),
            p2: i16_at(8),
            p3: i16_at(10),
            p4: i16_at(12),
            p5: i16_at(14),
            p6: i16_at(16),
            p7: i16_at(18),
            p8: i16_at(20),
            p9: i16_at(22),
            h1: tp[25],
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            // 12-bit signed values sharing 0xE5
            h4: ((h[3] as i8 as i16) << 4) | (h[4] & 0x0F) as i16,
            h5: ((h[5] as i8 as i16) << 4) | (h[4] >> 4) as i16,
            h6: h[6] as i8,
        }
    }

    /// Returns `(t_fine, temperature in 0.01 °C)`
    pub fn compensate_temperature(&self, adc_t: i32) -> (i32, i32) {
        let adc_t = adc_t as i64;
        let t1 = self.t1 as i64;

        let var1 = (((adc_t >> 3) - (t1 << 1)) * self.t2 as i64) >> 11;
        let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * self.t3 as i64) >> 14;
        let t_fine = var1 + var2;
        (t_fine as i32, ((t_fine * 5 + 128) >> 8) as i32)
    }

    /// Pressure in Pa, Q24.8
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: i32) -> u32 {
        let mut var1 = t_fine as i64 - 128_000;
        let mut var2 = var1 * var1 * self.p6 as i64;
        var2 += (var1 * self.p5 as i64) << 17;
        var2 += (self.p4 as i64) << 35;
        var1 = ((var1 * var1 * self.p3 as i64) >> 8) + ((var1 * self.p2 as i64) << 12);
        var1 = (((1i64 << 47) + var1) * self.p1 as i64) >> 33;
        if var1 == 0 {
            // Avoid division by zero on an unprogrammed part
            return 0;
        }

        let mut p = 1_048_576 - adc_p as i64;
        p = (((p << 31) - var2) * 3125) / var1;
        let var1 = (self.p9 as i64 * (p >> 13) * (p >> 13)) >> 25;
        let var2 = (self.p8 as i64 * p) >> 19;
        (((p + var1 + var2) >> 8) + ((self.p7 as i64) << 4)) as u32
    }

    /// Relative humidity in %, Q22.10, clamped to 0..=100 %
    pub fn compensate_humidity(&self, adc_h: i32, t_fine: i32) -> u32 {
        let adc_h = adc_h as i64;
        let x = t_fine as i64 - 76_800;

        let mut v = (((adc_h << 14) - ((self.h4 as i64) << 20) - (self.h5 as i64 * x) + 16_384)
            >> 15)
            * (((((((x * self.h6 as i64) >> 10) * (((x * self.h3 as i64) >> 11) + 32_768))
                >> 10)
                + 2_097_152)
                * self.h2 as i64
                + 8192)
                >> 14);
        v -= ((((v >> 15) * (v >> 15)) >> 7) * self.h1 as i64) >> 4;
        (v.clamp(0, 419_430_400) >> 12) as u32
    }

    pub fn compensate(&self, raw: RawSample) -> Measurement {
        let (t_fine, temperature) = self.compensate_temperature(raw.temperature);
        Measurement {
            temperature,
            pressure: self.compensate_pressure(raw.pressure, t_fine),
            humidity: self.compensate_humidity(raw.humidity, t_fine),
        }
    }
}

/// Uncompensated ADC values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub temperature: i32,
    pub pressure: i32,
    pub humidity: i32,
}

impl RawSample {
    /// Decode the `0xF7..=0xFE` burst
    pub fn from_registers(data: &[u8; 8]) -> Self {
        let adc20 = |i: usize| {
            ((data[i] as i32) << 12) | ((data[i + 1] as i32) << 4) | ((data[i + 2] as i32) >> 4)
        };
        Self {
            pressure: adc20(0),
            temperature: adc20(3),
            humidity: ((data[6] as i32) << 8) | data[7] as i32,
        }
    }
}

/// Compensated sample in the sensor's fixed-point units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// 0.01 °C
    pub temperature: i32,
    /// Pa, Q24.8
    pub pressure: u32,
    /// %RH, Q22.10
    pub humidity: u32,
}

impl Measurement {
    pub fn temperature_c(&self) -> f32 {
        self.temperature as f32 / 100.0
    }

    pub fn pressure_pa(&self) -> f32 {
        self.pressure as f32 / 256.0
    }

    pub fn pressure_hpa(&self) -> f32 {
        self.pressure_pa() / 100.0
    }

    pub fn humidity_rh(&self) -> f32 {
        self.humidity as f32 / 1024.0
    }

    /// Barometric altitude for the given sea-level pressure
    pub fn altitude_m(&self, sea_level_hpa: f32) -> f32 {
        44_330.0 * (1.0 - powf(self.pressure_hpa() / sea_level_hpa, 1.0 / 5.255))
    }
}

/// `x^y` for the positive ratios the barometric formula needs
fn powf(x: f32, y: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }
    exp(y * ln(x))
}

fn ln(x: f32) -> f32 {
    // Reduce to [0.5, 1) then ln(m) = 2 atanh((m - 1) / (m + 1))
    let mut m = x;
    let mut k = 0i32;
    while m >= 1.0 {
        m *= 0.5;
        k += 1;
    }
    while m < 0.5 {
        m *= 2.0;
        k -= 1;
    }
    let s = (m - 1.0) / (m + 1.0);
    let s2 = s * s;
    let mut term = s;
    let mut sum = 0.0;
    let mut n = 1.0;
    for _ in 0..12 {
        sum += term / n;
        term *= s2;
        n += 2.0;
    }
    2.0 * sum + k as f32 * core::f32::consts::LN_2
}

fn exp(x: f32) -> f32 {
    // Taylor series; arguments here stay well inside (-1, 1)
    let mut term = 1.0;
    let mut sum = 1.0;
    for n in 1..16 {
        term *= x / n as f32;
        sum += term;
    }
    sum
}

/// Forced-mode BME280 driver
pub struct Bme280<I2C, D> {
    i2c: I2C,
    delay: D,
    config: Config,
    calibration: Calibration,
}

impl<I2C: I2c, D: DelayNs> Bme280<I2C, D> {
    /// Read the calibration and configure the sensor
    pub async fn new(i2c: I2C, delay: D, config: Config) -> Result<Self, Error> {
        let mut sensor = Self {
            i2c,
            delay,
            config,
            calibration: Calibration::default(),
        };
        sensor.init().await?;
        Ok(sensor)
    }

    async fn init(&mut self) -> Result<(), Error> {
        let mut tp = [0u8; 26];
        let mut h = [0u8; 7];
        self.read(REG_CALIB_00, &mut tp).await?;
        self.read(REG_CALIB_26, &mut h).await?;
        self.calibration = Calibration::from_registers(&tp, &h);

        // ctrl_hum only takes effect after the following ctrl_meas write
        self.write(REG_CTRL_HUM, self.config.humidity_oversampling & 0x07)
            .await?;
        self.delay.delay_ms(2).await;
        self.write(REG_CTRL_MEAS, CTRL_MEAS_SLEEP).await?;
        self.delay.delay_ms(2).await;
        self.write(REG_CONFIG, (self.config.iir_filter & 0x07) << 2)
            .await
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Run one forced conversion and return the compensated values
    pub async fn measure(&mut self) -> Result<Measurement, Error> {
        let raw = self.read_raw().await?;
        Ok(self.calibration.compensate(raw))
    }

    pub async fn read_raw(&mut self) -> Result<RawSample, Error> {
        self.write(REG_CTRL_MEAS, self.config.ctrl_meas_forced())
            .await?;
        self.delay
            .delay_us(self.config.max_conversion_time_us())
            .await;

        let mut polls = 0;
        loop {
            let mut status = [0u8];
            self.read(REG_STATUS, &mut status).await?;
            if status[0] & STATUS_MEASURING == 0 {
                break;
            }
            polls += 1;
            if polls > MAX_STATUS_POLLS {
                return Err(Error::Sensor);
            }
            self.delay.delay_ms(1).await;
        }

        let mut data = [0u8; 8];
        self.read(REG_DATA, &mut data).await?;
        Ok(RawSample::from_registers(&data))
    }

    /// Give back the bus and delay
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    async fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error> {
        self.i2c
            .write_read(self.config.address, &[reg], buf)
            .await
            .map_err(|_| Error::Sensor)
    }

    async fn write(&mut self, reg: u8, value: u8) -> Result<(), Error> {
        self.i2c
            .write(self.config.address, &[reg, value])
            .await
            .map_err(|_| Error::Sensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::{ErrorKind, ErrorType, Operation};

    fn datasheet_calibration() -> Calibration {
        Calibration {
            t1: 27504,
            t2: 26435,
            t3: -1000,
            p1: 36477,
            p2: -10685,
            p3: 3024,
            p4: 2855,
            p5: 140,
            p6: -7,
            p7: 15500,
            p8: -14600,
            p9: 6000,
            h1: 75,
            h2: 362,
            h3: 0,
            h4: 324,
            h5: 50,
            h6: 30,
        }
    }

    fn raw(temperature: i32, pressure: i32, humidity: i32) -> RawSample {
        RawSample {
            temperature,
            pressure,
            humidity,
        }
    }

    /// Register map laid out the way the part stores `datasheet_calibration()`
    fn register_map() -> [u8; 256] {
        let c = datasheet_calibration();
        let mut regs = [0u8; 256];
        let words: [u16; 12] = [
            c.t1,
            c.t2 as u16,
            c.t3 as u16,
            c.p1,
            c.p2 as u16,
            c.p3 as u16,
            c.p4 as u16,
            c.p5 as u16,
            c.p6 as u16,
            c.p7 as u16,
            c.p8 as u16,
            c.p9 as u16,
        ];
        for (i, w) in words.iter().enumerate() {
            let [lo, hi] = w.to_le_bytes();
            regs[0x88 + 2 * i] = lo;
            regs[0x89 + 2 * i] = hi;
        }
        regs[0xA1] = c.h1;
        regs[0xE1..0xE3].copy_from_slice(&c.h2.to_le_bytes());
        regs[0xE3] = c.h3;
        // h4 = 324 = 0x144, h5 = 50 = 0x032
        regs[0xE4] = 0x14;
        regs[0xE5] = 0x24;
        regs[0xE6] = 0x03;
        regs[0xE7] = c.h6 as u8;
        // raw p 415148, raw t 519888, raw h 30000
        regs[0xF7..=0xFE].copy_from_slice(&[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30]);
        regs
    }

    struct FakeBus {
        regs: [u8; 256],
        pointer: u8,
        busy_polls: u8,
        writes: std::vec::Vec<(u8, u8)>,
        fail: bool,
    }

    impl FakeBus {
        fn new() -> Self {
            Self {
                regs: register_map(),
                pointer: 0,
                busy_polls: 0,
                writes: std::vec::Vec::new(),
                fail: false,
            }
        }
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail || address != DEFAULT_ADDRESS {
                return Err(ErrorKind::Other);
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        self.pointer = bytes[0];
                        if bytes.len() == 2 {
                            self.writes.push((bytes[0], bytes[1]));
                        }
                    }
                    Operation::Read(buf) => {
                        if self.pointer == REG_STATUS && buf.len() == 1 {
                            if self.busy_polls > 0 {
                                self.busy_polls -= 1;
                                buf[0] = STATUS_MEASURING;
                            } else {
                                buf[0] = 0;
                            }
                            continue;
                        }
                        let start = self.pointer as usize;
                        buf.copy_from_slice(&self.regs[start..start + buf.len()]);
                    }
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDelay {
        total_ns: u64,
    }

    impl DelayNs for FakeDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.total_ns += ns as u64;
        }
    }

    #[test]
    fn test_datasheet_temperature() {
        let (t_fine, t) = datasheet_calibration().compensate_temperature(519888);
        assert_eq!(t_fine, 128422);
        assert_eq!(t, 2508);
    }

    #[test]
    fn test_datasheet_pressure() {
        let p = datasheet_calibration().compensate_pressure(415148, 128422);
        assert_eq!(p, 25_767_233);
        // 100653.254 Pa
        assert_eq!(p / 256, 100_653);
        assert_eq!(p % 256, 65);
    }

    #[test]
    fn test_humidity() {
        let c = datasheet_calibration();
        assert_eq!(c.compensate_humidity(30000, 128422), 52306);
    }

    #[test]
    fn test_humidity_is_clamped() {
        let c = datasheet_calibration();
        assert_eq!(c.compensate_humidity(0, 128422), 0);
        assert_eq!(c.compensate_humidity(65535, 128422), 100 * 1024);
    }

    #[test]
    fn test_below_freezing() {
        let m = datasheet_calibration().compensate(raw(400000, 500000, 28000));
        assert_eq!(m.temperature, -1264);
        assert_eq!(m.pressure, 20_787_123);
        assert_eq!(m.humidity, 40543);
    }

    #[test]
    fn test_zero_p1_gives_zero_pressure() {
        let mut c = datasheet_calibration();
        c.p1 = 0;
        assert_eq!(c.compensate_pressure(415148, 128422), 0);
    }

    #[test]
    fn test_calibration_decoding() {
        let regs = register_map();
        let mut tp = [0u8; 26];
        tp.copy_from_slice(&regs[0x88..=0xA1]);
        let mut h = [0u8; 7];
        h.copy_from_slice(&regs[0xE1..=0xE7]);
        assert_eq!(Calibration::from_registers(&tp, &h), datasheet_calibration());
    }

    #[test]
    fn test_negative_h4_h5() {
        let tp = [0u8; 26];
        // h4 = 0xFF << 4 | 0xF = -1, h5 = 0x80 << 4 | 0x0 = -2048
        let h = [0, 0, 0, 0xFF, 0x0F, 0x80, 0xFF];
        let c = Calibration::from_registers(&tp, &h);
        assert_eq!(c.h4, -1);
        assert_eq!(c.h5, -2048);
        assert_eq!(c.h6, -1);
    }

    #[test]
    fn test_raw_sample_decoding() {
        let r = RawSample::from_registers(&[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30]);
        assert_eq!(r, raw(519888, 415148, 30000));
    }

    #[test]
    fn test_conversion_time() {
        // t×2, p×16, h×1
        assert_eq!(Config::default().max_conversion_time_us(), 46_100);
        let t_only = Config {
            pressure_oversampling: 0,
            humidity_oversampling: 0,
            temperature_oversampling: 1,
            ..Config::default()
        };
        assert_eq!(t_only.max_conversion_time_us(), 3550);
    }

    #[test]
    fn test_unit_conversions() {
        let m = datasheet_calibration().compensate(raw(519888, 415148, 30000));
        assert!((m.temperature_c() - 25.08).abs() < 1e-4);
        assert!((m.pressure_hpa() - 1006.5325).abs() < 1e-2);
        assert!((m.humidity_rh() - 51.08).abs() < 1e-2);
    }

    #[test]
    fn test_altitude() {
        let m = datasheet_calibration().compensate(raw(519888, 415148, 30000));
        assert!((m.altitude_m(1013.25) - 56.08).abs() < 0.5);

        let sea_level = Measurement {
            temperature: 2000,
            pressure: 101_325 * 256,
            humidity: 0,
        };
        assert!(sea_level.altitude_m(1013.25).abs() < 0.1);

        let high = Measurement {
            pressure: 90_000 * 256,
            ..sea_level
        };
        assert!((high.altitude_m(1013.25) - 988.65).abs() < 1.0);
    }

    #[test]
    fn test_driver_init_and_measure() {
        block_on(async {
            let mut sensor = Bme280::new(FakeBus::new(), FakeDelay::default(), Config::default())
                .await
                .unwrap();
            assert_eq!(*sensor.calibration(), datasheet_calibration());

            let m = sensor.measure().await.unwrap();
            assert_eq!(
                m,
                Measurement {
                    temperature: 2508,
                    pressure: 25_767_233,
                    humidity: 52306,
                }
            );

            let (bus, delay) = sensor.release();
            assert_eq!(
                bus.writes,
                [
                    (REG_CTRL_HUM, 1),
                    (REG_CTRL_MEAS, 0x24),
                    (REG_CONFIG, 1 << 2),
                    (REG_CTRL_MEAS, 5 << 5 | 2 << 2 | 1),
                ]
            );
            // 2 + 2 ms of init settling, then the conversion wait
            assert_eq!(delay.total_ns, 4_000_000 + 46_100_000);
        });
    }

    #[test]
    fn test_driver_polls_status() {
        block_on(async {
            let mut bus = FakeBus::new();
            bus.busy_polls = 3;
            let mut sensor = Bme280::new(bus, FakeDelay::default(), Config::default())
                .await
                .unwrap();
            assert_eq!(sensor.measure().await.unwrap().temperature, 2508);
        });
    }

    #[test]
    fn test_driver_gives_up_on_stuck_status() {
        block_on(async {
            let mut bus = FakeBus::new();
            bus.busy_polls = u8::MAX;
            let mut sensor = Bme280::new(bus, FakeDelay::default(), Config::default())
                .await
                .unwrap();
            assert_eq!(sensor.measure().await, Err(Error::Sensor));
        });
    }

    #[test]
    fn test_bus_error_is_sensor_error() {
        block_on(async {
            let mut bus = FakeBus::new();
            bus.fail = true;
            let result = Bme280::new(bus, FakeDelay::default(), Config::default()).await;
            assert!(matches!(result, Err(Error::Sensor)));
        });
    }
}
