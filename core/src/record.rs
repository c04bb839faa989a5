//! Sensor readings and the Timestream record shapes they upload as

use core::fmt::Write;

use hal_abstractions::StatusIndicator;
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::bme280::Measurement;
use crate::Error;

/// Most records a batch can hold; also the WriteRecords per-call limit
pub const BATCH_CAPACITY: usize = 100;

/// Measure names written to the readings table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Temperature,
    Pressure,
    Humidity,
}

impl Measure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Pressure => "pressure",
            Self::Humidity => "humidity",
        }
    }
}

/// One measurement ready to upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(rename = "MeasureName")]
    pub measure: Measure,
    #[serde(rename = "MeasureValue")]
    pub value: String<16>,
    /// Unix seconds, as text
    #[serde(rename = "Time")]
    pub time: String<20>,
}

impl Reading {
    /// Build a reading from an already formatted value
    ///
    /// Values longer than the record allows are truncated.
    pub fn new(measure: Measure, value: &str, unix_secs: u64) -> Self {
        let mut v = String::new();
        for c in value.chars() {
            if v.push(c).is_err() {
                break;
            }
        }
        Self {
            measure,
            value: v,
            time: unix_time_string(unix_secs),
        }
    }

    fn from_f32(measure: Measure, value: f32, unix_secs: u64) -> Self {
        let mut v = String::new();
        let _ = write!(v, "{:.2}", value);
        Self {
            measure,
            value: v,
            time: unix_time_string(unix_secs),
        }
    }
}

/// Unix seconds rendered the way Timestream expects `Time`
pub fn unix_time_string(unix_secs: u64) -> String<20> {
    let mut s = String::new();
    // u64::MAX has 20 digits
    let _ = write!(s, "{}", unix_secs);
    s
}

/// Temperature (°C), pressure (hPa) and humidity (%RH) records for one sample
pub fn format_readings(measurement: &Measurement, unix_secs: u64) -> [Reading; 3] {
    [
        Reading::from_f32(Measure::Temperature, measurement.temperature_c(), unix_secs),
        Reading::from_f32(Measure::Pressure, measurement.pressure_hpa(), unix_secs),
        Reading::from_f32(Measure::Humidity, measurement.humidity_rh(), unix_secs),
    ]
}

/// Records produced by one sensor read
pub const READINGS_PER_SAMPLE: usize = 3;

/// Readings waiting for upload
///
/// Holds whole samples only. Bounded by `limit`, rounded down to a whole
/// number of samples; when full the oldest sample is discarded so the newest
/// data always survives an extended outage.
#[derive(Debug, Clone)]
pub struct ReadingBatch {
    readings: Vec<Reading, BATCH_CAPACITY>,
    limit: usize,
}

impl ReadingBatch {
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(READINGS_PER_SAMPLE, BATCH_CAPACITY);
        Self {
            readings: Vec::new(),
            limit: limit - limit % READINGS_PER_SAMPLE,
        }
    }

    /// Append one sample, returns how many old samples were dropped
    pub fn push_sample(&mut self, sample: [Reading; READINGS_PER_SAMPLE]) -> usize {
        let mut dropped = 0;
        while self.readings.len() + READINGS_PER_SAMPLE > self.limit {
            for _ in 0..READINGS_PER_SAMPLE {
                self.readings.remove(0);
            }
            dropped += 1;
        }
        for reading in sample {
            // Room was made above
            let _ = self.readings.push(reading);
        }
        dropped
    }

    /// Queue the outcome of a sensor read
    ///
    /// A failed read is reported on `status` and leaves the pending readings
    /// untouched. Returns the number of samples dropped to make room, or
    /// `None` when there was nothing to queue.
    pub fn queue<S: StatusIndicator>(
        &mut self,
        read: Result<&Measurement, Error>,
        unix_secs: u64,
        status: &mut S,
    ) -> Option<usize> {
        match read {
            Ok(measurement) => Some(self.push_sample(format_readings(measurement, unix_secs))),
            Err(e) => {
                let mut text: String<48> = String::new();
                let _ = write!(text, "Sensor read failed: {}", e);
                status.error(&text);
                None
            }
        }
    }

    pub fn as_slice(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

/// Timestream `Dimension`
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasureValueType {
    Double,
    Varchar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeUnit {
    Seconds,
}

/// Attributes shared by every record of a WriteRecords call
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonAttributes<'a> {
    pub dimensions: &'a [Dimension<'a>],
    pub measure_value_type: MeasureValueType,
    pub time_unit: TimeUnit,
}

impl<'a> CommonAttributes<'a> {
    pub fn new(dimensions: &'a [Dimension<'a>], measure_value_type: MeasureValueType) -> Self {
        Self {
            dimensions,
            measure_value_type,
            time_unit: TimeUnit::Seconds,
        }
    }
}
