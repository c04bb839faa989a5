#![deny(unsafe_code)]
#![deny(warnings)]
//! Weather station control loop
//!
//! Startup connects and sets the clock (retrying until it works), looks up
//! the timezone and uploads the last persisted error. Each cycle then reads
//! the sensor, refreshes the display, queues the readings and, when the link
//! comes up, resyncs the clock as scheduled, uploads and fetches the remote
//! reading before sleeping until the next aligned reading.
//!
//! Network failures and failed sensor reads are reported and the station
//! carries on with the next cycle. Anything that escapes [`Station::run`],
//! such as a sensor that cannot be initialised, is fatal: it is persisted,
//! shown, and the board resets when `reboot_on_error` is set.

use core::convert::Infallible;
use core::fmt::Write;

use defmt::{error, info, warn, Format};
use embassy_net::Stack;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Async;
use hal_abstractions::{NetworkLink, StatusIndicator};
use heapless::String;
use rtic_monotonics::fugit::ExtU64;
use rtic_monotonics::Monotonic;
use weather_core::bme280::Measurement;
use weather_core::clock::{local_time_string, SyncCountdown};
use weather_core::last_error::LastErrorLog;
use weather_core::power::PowerSchedule;
use weather_core::record::ReadingBatch;
use weather_core::settings::{Secrets, Settings};
use weather_core::timestream::Timestream;
use weather_core::timezone::fetch_timezone;
use weather_core::Error;

use crate::display;
use crate::error_store::FlashErrorStore;
use crate::network::{EthLink, HttpsTransport, NetworkClient, SntpClient, SntpConfig};
use crate::sensor::{self, Sensor};
use crate::status::LedStatus;
use crate::time::{self, MonoDelay};
use crate::Mono;

/// Wait between failed startup connection attempts
const STARTUP_RETRY_SECS: u64 = 10;
/// Repeat interval of the error report when parked
const PARKED_REPORT_SECS: u64 = 5;

/// An error the control loop cannot recover from
#[derive(Debug, Clone, Copy, Format)]
pub struct FatalError {
    pub error: Error,
    /// Where it happened, stored as the stack trace record
    pub context: &'static str,
}

impl FatalError {
    fn at(context: &'static str) -> impl FnOnce(Error) -> Self {
        move |error| Self { error, context }
    }
}

impl core::fmt::Display for FatalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.error, self.context)
    }
}

impl core::error::Error for FatalError {}

/// Everything the station owns apart from the sensor
pub struct Station<'a> {
    settings: Settings<'static>,
    timezone_api_key: &'static str,
    stack: Stack<'static>,
    link: EthLink,
    sntp: SntpClient,
    timestream: Timestream<'a, HttpsTransport>,
    timezone_rx: &'a mut [u8],
    log: LastErrorLog<FlashErrorStore>,
    status: LedStatus,
    batch: ReadingBatch,
    countdown: SyncCountdown,
    schedule: PowerSchedule,
    utc_offset_secs: i32,
    remote_temperature_c: f32,
}

/// HTTP buffers used by the station
pub struct StationBuffers<'a> {
    pub request_body: &'a mut [u8],
    pub response_body: &'a mut [u8],
    pub timezone_response: &'a mut [u8],
}

impl<'a> Station<'a> {
    pub fn new(
        settings: Settings<'static>,
        secrets: Secrets<'static>,
        stack: Stack<'static>,
        link: EthLink,
        transport: HttpsTransport,
        store: FlashErrorStore,
        buffers: StationBuffers<'a>,
    ) -> Self {
        let timestream = Timestream::new(
            transport,
            secrets.credentials(),
            settings.timestream_config(),
            buffers.request_body,
            buffers.response_body,
        );

        Self {
            settings,
            timezone_api_key: secrets.timezone_api_key,
            stack,
            link,
            sntp: SntpClient::with_config(SntpConfig::with_server(settings.ntp_time_server)),
            timestream,
            timezone_rx: buffers.timezone_response,
            log: LastErrorLog::new(store),
            status: LedStatus::new(),
            batch: ReadingBatch::new(settings.max_pending_readings),
            countdown: settings.sync_countdown(),
            schedule: settings.power_schedule(),
            utc_offset_secs: 0,
            remote_temperature_c: 0.0,
        }
    }

    /// Run the station; returns only on a fatal error
    pub async fn run(&mut self, i2c: I2c<'static, Async>) -> Result<Infallible, FatalError> {
        self.startup().await;

        let mut sensor = sensor::init(i2c)
            .await
            .map_err(FatalError::at("init sensor"))?;

        match sensor::read_sensor(&mut sensor).await {
            Ok((now, measurement)) => {
                self.read_remote_sensor(now).await;
                self.update_display(now, &measurement);
            }
            Err(e) => {
                self.report_read_error(e);
                self.read_remote_sensor(time::unix_now()).await;
            }
        }
        self.wait_until_next_reading().await;

        loop {
            self.cycle(&mut sensor).await;
        }
    }

    async fn startup(&mut self) {
        self.status.status("Connecting...");
        self.connect_and_sync_time().await;
        self.refresh_timezone().await;

        let now = time::unix_now();
        self.timestream
            .upload_last_error(&mut self.log, now, &mut self.status)
            .await;
        self.status.hide();
    }

    /// Retry until the link is up and the RTC is set
    async fn connect_and_sync_time(&mut self) {
        loop {
            if self.link.connect().await {
                self.status.status("Connected");
                if self.sntp.run(&self.stack).await.is_ok() {
                    return;
                }
            } else {
                warn!("Could not establish LAN connection");
            }
            self.link.disconnect().await;
            Mono::delay(STARTUP_RETRY_SECS.secs()).await;
        }
    }

    /// One reading period; a failed read still uploads what is pending
    async fn cycle(&mut self, sensor: &mut Sensor) {
        let read = sensor::read_sensor(sensor).await;
        let now = match &read {
            Ok((now, measurement)) => {
                self.update_display(*now, measurement);
                *now
            }
            Err(_) => time::unix_now(),
        };

        let read = read.as_ref().map(|(_, measurement)| measurement).map_err(|e| *e);
        if let Some(dropped) = self.batch.queue(read, now, &mut self.status) {
            if dropped > 0 {
                warn!("Dropped {} oldest samples", dropped);
            }
        }

        if self.link.connect().await {
            self.sync_time().await;
            let now = time::unix_now();
            self.timestream
                .upload_readings(&mut self.batch, now, &mut self.status)
                .await;
            self.read_remote_sensor(now).await;
        }

        self.wait_until_next_reading().await;
    }

    fn report_read_error(&mut self, error: Error) {
        let mut text: String<48> = String::new();
        let _ = write!(text, "Sensor read failed: {}", error);
        self.status.error(&text);
    }

    async fn read_remote_sensor(&mut self, now: u64) {
        if !self.settings.has_remote_sensor() {
            return;
        }
        self.remote_temperature_c = self
            .timestream
            .read_remote_sensor(self.remote_temperature_c, now, &mut self.status)
            .await;
    }

    /// Resync the RTC when the countdown says so
    async fn sync_time(&mut self) {
        let synced = self.countdown.is_due() && {
            match self.sntp.run(&self.stack).await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Clock sync failed: {}", e);
                    false
                }
            }
        };
        if synced {
            self.refresh_timezone().await;
        }
        self.countdown.advance(synced);
    }

    /// Look up the UTC offset
    ///
    /// A refused lookup resets the offset to UTC; a transport failure keeps
    /// the previous one.
    async fn refresh_timezone(&mut self) {
        let result = fetch_timezone(
            self.timestream.transport_mut(),
            &mut *self.timezone_rx,
            self.settings.timezone_location,
            self.timezone_api_key,
            time::unix_now(),
        )
        .await;

        match result {
            Ok(tz) => {
                info!(
                    "Retrieved timezone information for {}, offset = {}s",
                    tz.zone_id.as_str(),
                    tz.offset_secs
                );
                self.utc_offset_secs = tz.offset_secs;
            }
            Err(Error::Transport) => warn!("Timezone lookup failed, keeping offset"),
            Err(e) => {
                warn!("Timezone lookup failed: {}", e);
                self.utc_offset_secs = 0;
            }
        }
    }

    fn update_display(&self, now: u64, measurement: &Measurement) {
        let time = local_time_string(now, self.utc_offset_secs);
        let remote = self
            .settings
            .has_remote_sensor()
            .then_some((self.settings.remote_sensor_location, self.remote_temperature_c));
        display::update_readings(
            &time,
            (self.settings.sensor_location, measurement.temperature_c()),
            remote,
        );
    }

    async fn wait_until_next_reading(&mut self) {
        self.schedule
            .wait_until_next_reading(&mut self.link, &mut self.status, &mut MonoDelay, time::unix_now)
            .await;
    }

    /// Persist and report `fatal`, then reset or park
    pub async fn fail(&mut self, fatal: FatalError) -> ! {
        error!("Fatal: {}", fatal);
        let now = time::unix_now();
        if let Err(e) = self.log.record(now, &fatal.error, fatal.context) {
            error!("Could not persist last error: {}", e);
        }

        let mut text: String<64> = String::new();
        let _ = write!(text, "{}", fatal);
        self.status.show();
        self.status.error(&text);
        self.link.disconnect().await;

        if self.settings.reboot_on_error {
            // Let the error flashes finish
            Mono::delay(500_u64.millis()).await;
            cortex_m::peripheral::SCB::sys_reset();
        }

        loop {
            Mono::delay(PARKED_REPORT_SECS.secs()).await;
            self.status.error(&text);
        }
    }
}
