//! Location settings and secrets
//!
//! Both are JSON documents embedded in the firmware image. Every setting has
//! a default, so a location file only lists what differs.

use serde::Deserialize;

use crate::clock::SyncCountdown;
use crate::error::Error;
use crate::power::PowerSchedule;
use crate::sigv4::{Credentials, MAX_ACCESS_KEY_LEN, MAX_SCOPE_PART_LEN};
use crate::timestream::TimestreamConfig;

/// Per-location behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct Settings<'a> {
    pub sensor_read_period_s: u32,
    pub ntp_time_server: &'a str,
    pub sync_time_period_s: u32,
    /// `lat%2Clng`, as passed to the timezone API
    pub timezone_location: &'a str,
    pub aws_region: &'a str,
    pub database_name: &'a str,
    pub sensor_readings_table: &'a str,
    pub device_log_table: &'a str,
    pub sensor_location: &'a str,
    /// Empty disables the remote reading
    pub remote_sensor_location: &'a str,
    pub display_cycle_period_ms: u32,
    pub reboot_on_error: bool,
    /// 0 disables power pulses
    pub draw_power_period_s: u32,
    pub deep_sleep: bool,
    pub perform_complete_poweroff: bool,
    /// Readings kept while uploads fail, oldest dropped first
    pub max_pending_readings: usize,
}

impl Default for Settings<'_> {
    fn default() -> Self {
        Self {
            sensor_read_period_s: 60,
            ntp_time_server: "au.pool.ntp.org",
            sync_time_period_s: 30 * 60,
            timezone_location: "-37.9707183%2C144.392352",
            aws_region: "ap-southeast-2",
            database_name: "WeatherDb",
            sensor_readings_table: "Weather",
            device_log_table: "DeviceLog",
            sensor_location: "home",
            remote_sensor_location: "",
            display_cycle_period_ms: 5000,
            reboot_on_error: true,
            draw_power_period_s: 0,
            deep_sleep: false,
            perform_complete_poweroff: false,
            max_pending_readings: 60,
        }
    }
}

impl<'a> Settings<'a> {
    /// Parse and validate a settings document
    pub fn from_json(json: &'a [u8]) -> Result<Self, Error> {
        let (settings, _) = serde_json_core::from_slice::<Settings<'a>>(json)
            .map_err(|_| Error::InvalidSettings)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            self.ntp_time_server,
            self.aws_region,
            self.database_name,
            self.sensor_readings_table,
            self.device_log_table,
            self.sensor_location,
        ];
        if self.sensor_read_period_s == 0
            || self.display_cycle_period_ms == 0
            || self.max_pending_readings == 0
            || required.iter().any(|s| s.is_empty())
            || self.aws_region.len() > MAX_SCOPE_PART_LEN
        {
            return Err(Error::InvalidSettings);
        }
        Ok(())
    }

    pub fn has_remote_sensor(&self) -> bool {
        !self.remote_sensor_location.is_empty()
    }

    pub fn sync_countdown(&self) -> SyncCountdown {
        SyncCountdown::new(self.sync_time_period_s, self.sensor_read_period_s)
    }

    pub fn power_schedule(&self) -> PowerSchedule {
        PowerSchedule {
            read_period_s: self.sensor_read_period_s,
            draw_power_period_s: self.draw_power_period_s,
            deep_sleep: self.deep_sleep,
        }
    }

    pub fn timestream_config(&self) -> TimestreamConfig<'a> {
        TimestreamConfig {
            region: self.aws_region,
            database: self.database_name,
            readings_table: self.sensor_readings_table,
            device_log_table: self.device_log_table,
            sensor_location: self.sensor_location,
            remote_sensor_location: self.remote_sensor_location,
        }
    }
}

/// Credentials and API keys
#[derive(Clone, Copy, Deserialize)]
pub struct Secrets<'a> {
    pub aws_access_key: &'a str,
    pub aws_secret_access_key: &'a str,
    #[serde(borrow, default)]
    pub aws_session_token: Option<&'a str>,
    #[serde(default)]
    pub timezone_api_key: &'a str,
}

impl<'a> Secrets<'a> {
    pub fn from_json(json: &'a [u8]) -> Result<Self, Error> {
        let (secrets, _) = serde_json_core::from_slice::<Secrets<'a>>(json)
            .map_err(|_| Error::InvalidSettings)?;
        if secrets.aws_access_key.is_empty()
            || secrets.aws_access_key.len() > MAX_ACCESS_KEY_LEN
            || secrets.aws_secret_access_key.is_empty()
        {
            return Err(Error::InvalidSettings);
        }
        Ok(secrets)
    }

    pub fn credentials(&self) -> Credentials<'a> {
        Credentials::new(self.aws_access_key, self.aws_secret_access_key)
            .with_session_token(self.aws_session_token)
    }
}

impl core::fmt::Debug for Secrets<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Secrets")
            .field("aws_access_key", &self.aws_access_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_all_defaults() {
        let settings = Settings::from_json(b"{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.sync_countdown(), SyncCountdown::new(1800, 60));
        assert!(!settings.has_remote_sensor());
    }

    #[test]
    fn test_location_overrides() {
        let settings = Settings::from_json(
            br#"{
                "sensor_location": "geelong",
                "remote_sensor_location": "ballarat",
                "sensor_read_period_s": 300,
                "deep_sleep": true,
                "draw_power_period_s": 25
            }"#,
        )
        .unwrap();
        assert_eq!(settings.sensor_location, "geelong");
        assert_eq!(settings.database_name, "WeatherDb");
        assert!(settings.has_remote_sensor());
        assert_eq!(
            settings.power_schedule(),
            PowerSchedule {
                read_period_s: 300,
                draw_power_period_s: 25,
                deep_sleep: true,
            }
        );

        let config = settings.timestream_config();
        assert_eq!(config.sensor_location, "geelong");
        assert_eq!(config.remote_sensor_location, "ballarat");
        assert_eq!(config.readings_table, "Weather");
    }

    #[test]
    fn test_invalid_settings() {
        assert_eq!(
            Settings::from_json(br#"{"sensor_read_period_s": 0}"#),
            Err(Error::InvalidSettings)
        );
        assert_eq!(
            Settings::from_json(br#"{"aws_region": ""}"#),
            Err(Error::InvalidSettings)
        );
        assert_eq!(
            Settings::from_json(br#"{"sensor_read_period_s": "60"}"#),
            Err(Error::InvalidSettings)
        );

        let long_region = std::format!(
            r#"{{"aws_region": "{}"}}"#,
            "x".repeat(MAX_SCOPE_PART_LEN + 1)
        );
        assert_eq!(
            Settings::from_json(long_region.as_bytes()),
            Err(Error::InvalidSettings)
        );
    }

    #[test]
    fn test_secrets() {
        let secrets = Secrets::from_json(
            br#"{"aws_access_key":"AKID","aws_secret_access_key":"SECRET","timezone_api_key":"KEY"}"#,
        )
        .unwrap();
        let credentials = secrets.credentials();
        assert_eq!(credentials.access_key, "AKID");
        assert_eq!(credentials.session_token, None);
        assert_eq!(secrets.timezone_api_key, "KEY");

        let secrets = Secrets::from_json(
            br#"{"aws_access_key":"AKID","aws_secret_access_key":"SECRET","aws_session_token":"TOKEN"}"#,
        )
        .unwrap();
        assert_eq!(secrets.credentials().session_token, Some("TOKEN"));
        assert!(!std::format!("{:?}", secrets).contains("SECRET"));
    }

    #[test]
    fn test_missing_keys_rejected() {
        assert!(Secrets::from_json(br#"{"aws_access_key":"AKID"}"#).is_err());
        assert!(Secrets::from_json(br#"{"aws_access_key":"","aws_secret_access_key":"S"}"#).is_err());

        let oversized = std::format!(
            r#"{{"aws_access_key":"{}","aws_secret_access_key":"S"}}"#,
            "A".repeat(MAX_ACCESS_KEY_LEN + 1)
        );
        assert!(Secrets::from_json(oversized.as_bytes()).is_err());
    }
}
