//! Amazon Timestream client
//!
//! Speaks the Timestream JSON-RPC API (`Timestream_20181101.*`) over any
//! [`HttpTransport`]. Every call is signed with [`crate::sigv4`].
//!
//! Timestream uses endpoint discovery: each write or query first asks
//! `{ingest|query}.timestream.{region}.amazonaws.com` for the cell endpoint,
//! then sends the real request there. Endpoints are not cached, so a cell
//! migration never strands the station.
//!
//! The high-level operations (`upload_readings`, `read_remote_sensor`,
//! `upload_last_error`) never fail: problems are reported through the
//! [`StatusIndicator`] and the previous state is kept.

use core::fmt::Write;

use hal_abstractions::{ErrorStore, HttpResponse, HttpTransport, StatusIndicator};
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::last_error::LastErrorLog;
use crate::record::{CommonAttributes, Dimension, Measure, MeasureValueType, ReadingBatch};
use crate::sigv4::{self, Credentials, Scope, SigningRequest};

pub const SERVICE: &str = "timestream";
const TARGET_PREFIX: &str = "Timestream_20181101.";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const API_VERSION: &str = "2018-11-01";

/// Dimension name the readings are keyed by
pub const LOCATION_DIMENSION: &str = "location";

pub type Host = String<128>;
type Url = String<144>;
type StatusText = String<64>;

/// Which endpoint family to discover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointMode {
    Ingest,
    Query,
}

impl EndpointMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Query => "query",
        }
    }
}

/// API operations used by the station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    DescribeEndpoints,
    WriteRecords,
    Query,
}

impl Command {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DescribeEndpoints => "DescribeEndpoints",
            Self::WriteRecords => "WriteRecords",
            Self::Query => "Query",
        }
    }
}

/// Outcome of a WriteRecords call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UploadResult {
    pub ingested: u32,
    pub sent: u32,
}

impl UploadResult {
    /// Every submitted record was ingested
    pub fn is_complete(&self) -> bool {
        self.ingested == self.sent
    }
}

/// Where and what the station writes
#[derive(Debug, Clone, Copy)]
pub struct TimestreamConfig<'a> {
    pub region: &'a str,
    pub database: &'a str,
    pub readings_table: &'a str,
    pub device_log_table: &'a str,
    pub sensor_location: &'a str,
    /// Empty when there is no remote sensor
    pub remote_sensor_location: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WriteRecordsRequest<'a, R> {
    database_name: &'a str,
    table_name: &'a str,
    records: &'a [R],
    common_attributes: &'a CommonAttributes<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryRequest<'a> {
    query_string: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEndpointsResponse<'a> {
    #[serde(borrow)]
    endpoints: Vec<Endpoint<'a>, 4>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Endpoint<'a> {
    address: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WriteRecordsResponse {
    records_ingested: RecordsIngested,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecordsIngested {
    total: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryResponse<'a> {
    #[serde(borrow)]
    rows: Vec<Row<'a>, 4>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Row<'a> {
    #[serde(borrow)]
    data: Vec<Datum<'a>, 4>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Datum<'a> {
    #[serde(borrow, default)]
    scalar_value: Option<&'a str>,
}

/// Timestream client over an HTTP transport
///
/// `tx` holds serialized request bodies, `rx` receives response bodies.
pub struct Timestream<'a, T> {
    transport: T,
    credentials: Credentials<'a>,
    config: TimestreamConfig<'a>,
    tx: &'a mut [u8],
    rx: &'a mut [u8],
}

impl<'a, T: HttpTransport> Timestream<'a, T> {
    pub fn new(
        transport: T,
        credentials: Credentials<'a>,
        config: TimestreamConfig<'a>,
        tx: &'a mut [u8],
        rx: &'a mut [u8],
    ) -> Self {
        Self {
            transport,
            credentials,
            config,
            tx,
            rx,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Look up the cell endpoint for `mode`
    pub async fn resolve_endpoint(&mut self, mode: EndpointMode, now: u64) -> Result<Host, Error> {
        let mut discovery: Host = String::new();
        write!(
            discovery,
            "{}.timestream.{}.amazonaws.com",
            mode.as_str(),
            self.config.region
        )
        .map_err(|_| Error::Capacity)?;

        let response = send(
            &mut self.transport,
            &self.credentials,
            self.config.region,
            &discovery,
            Command::DescribeEndpoints,
            b"{}",
            &mut *self.rx,
            now,
        )
        .await?;
        if !response.success {
            return Err(Error::NoEndpoint);
        }

        let (parsed, _) =
            serde_json_core::from_slice::<DescribeEndpointsResponse<'_>>(response.body)?;
        let address = parsed
            .endpoints
            .first()
            .map(|e| e.address)
            .filter(|a| !a.is_empty())
            .ok_or(Error::NoEndpoint)?;

        let mut host = Host::new();
        host.push_str(address).map_err(|_| Error::Capacity)?;
        Ok(host)
    }

    /// Write `records` to `database.table`
    pub async fn write<R: Serialize>(
        &mut self,
        database: &str,
        table: &str,
        records: &[R],
        common_attributes: &CommonAttributes<'_>,
        now: u64,
    ) -> Result<UploadResult, Error> {
        let request = WriteRecordsRequest {
            database_name: database,
            table_name: table,
            records,
            common_attributes,
        };
        let len = serde_json_core::to_slice(&request, &mut *self.tx)?;
        let host = self.resolve_endpoint(EndpointMode::Ingest, now).await?;

        let response = send(
            &mut self.transport,
            &self.credentials,
            self.config.region,
            &host,
            Command::WriteRecords,
            &self.tx[..len],
            &mut *self.rx,
            now,
        )
        .await?;
        if !response.success {
            return Err(Error::UnexpectedResponse);
        }

        let (parsed, _) = serde_json_core::from_slice::<WriteRecordsResponse>(response.body)?;
        Ok(UploadResult {
            ingested: parsed.records_ingested.total,
            sent: records.len() as u32,
        })
    }

    /// Run `query_string`; returns the first scalar of the first row
    pub async fn query<const N: usize>(
        &mut self,
        query_string: &str,
        now: u64,
    ) -> Result<Option<String<N>>, Error> {
        let len = serde_json_core::to_slice(&QueryRequest { query_string }, &mut *self.tx)?;
        let host = self.resolve_endpoint(EndpointMode::Query, now).await?;

        let response = send(
            &mut self.transport,
            &self.credentials,
            self.config.region,
            &host,
            Command::Query,
            &self.tx[..len],
            &mut *self.rx,
            now,
        )
        .await?;
        if !response.success {
            return Err(Error::UnexpectedResponse);
        }

        let (parsed, _) = serde_json_core::from_slice::<QueryResponse<'_>>(response.body)?;
        let scalar = parsed
            .rows
            .first()
            .and_then(|row| row.data.first())
            .and_then(|datum| datum.scalar_value);
        match scalar {
            Some(value) => {
                let mut out = String::new();
                out.push_str(value).map_err(|_| Error::Capacity)?;
                Ok(Some(out))
            }
            None => Ok(None),
        }
    }

    /// Latest value of `measure` at `location` within the last 30 minutes
    pub async fn read_last_record(
        &mut self,
        location: &str,
        measure: Measure,
        now: u64,
    ) -> Result<Option<f32>, Error> {
        let query = last_record_query(
            self.config.database,
            self.config.readings_table,
            location,
            measure,
        )?;
        match self.query::<32>(&query, now).await? {
            Some(value) => value
                .trim()
                .parse::<f32>()
                .map(Some)
                .map_err(|_| Error::UnexpectedResponse),
            None => Ok(None),
        }
    }

    /// Upload the pending readings; the batch is cleared only when every
    /// record was ingested
    ///
    /// Returns whether the upload completed.
    pub async fn upload_readings(
        &mut self,
        batch: &mut ReadingBatch,
        now: u64,
        status: &mut impl StatusIndicator,
    ) -> bool {
        if batch.is_empty() {
            return true;
        }

        let mut text = StatusText::new();
        let _ = write!(text, "Upload {} reads.", batch.len());
        status.status(&text);

        let location = self.config.sensor_location;
        let dimensions = [Dimension {
            name: LOCATION_DIMENSION,
            value: location,
        }];
        let attributes = CommonAttributes::new(&dimensions, MeasureValueType::Double);
        let (database, table) = (self.config.database, self.config.readings_table);

        match self
            .write(database, table, batch.as_slice(), &attributes, now)
            .await
        {
            Ok(result) => {
                text.clear();
                let _ = write!(text, "Uploaded {} of {}.", result.ingested, result.sent);
                status.status(&text);
                if result.is_complete() {
                    batch.clear();
                    return true;
                }
            }
            Err(e) => report(status, "Upload", e),
        }
        status.error("Upload failed.");
        false
    }

    /// Latest remote temperature, or `last_valid` when it cannot be read
    pub async fn read_remote_sensor(
        &mut self,
        last_valid: f32,
        now: u64,
        status: &mut impl StatusIndicator,
    ) -> f32 {
        let location = self.config.remote_sensor_location;
        if location.is_empty() {
            return last_valid;
        }
        match self
            .read_last_record(location, Measure::Temperature, now)
            .await
        {
            Ok(Some(value)) => value,
            Ok(None) => last_valid,
            Err(e) => {
                report(status, "read_remote_sensor", e);
                last_valid
            }
        }
    }

    /// Upload the persisted last error to the device log table
    ///
    /// The record is cleared once the upload is confirmed. Returns whether a
    /// record was uploaded.
    pub async fn upload_last_error<S: ErrorStore>(
        &mut self,
        log: &mut LastErrorLog<S>,
        now: u64,
        status: &mut impl StatusIndicator,
    ) -> bool {
        let last_error = match log.read() {
            Ok(Some(last_error)) => last_error,
            Ok(None) => return false,
            Err(e) => {
                report(status, "Read log", e);
                return false;
            }
        };

        status.status("Upload log.");
        let location = self.config.sensor_location;
        let dimensions = [Dimension {
            name: LOCATION_DIMENSION,
            value: location,
        }];
        let attributes = CommonAttributes::new(&dimensions, MeasureValueType::Varchar);
        let (database, table) = (self.config.database, self.config.device_log_table);

        match self
            .write(database, table, last_error.records(), &attributes, now)
            .await
        {
            Ok(result) if result.is_complete() => {
                status.status("Upload successful.");
                if let Err(e) = log.clear() {
                    report(status, "Clear log", e);
                }
                return true;
            }
            Ok(_) => {}
            Err(e) => report(status, "Upload log", e),
        }
        status.error("Upload failed.");
        false
    }
}

/// `MAX_BY` query for the newest value of one measure at one location
pub fn last_record_query(
    database: &str,
    table: &str,
    location: &str,
    measure: Measure,
) -> Result<String<320>, Error> {
    let mut query = String::new();
    write!(
        query,
        "select MAX_BY(measure_value::double, time) FROM {}.\"{}\" WHERE measure_name = '{}' and location='{}' and time between ago(30m) and now()",
        database,
        table,
        measure.as_str(),
        location
    )
    .map_err(|_| Error::Capacity)?;
    Ok(query)
}

/// Sign and POST one API call to `host`
#[allow(clippy::too_many_arguments)]
async fn send<'r, T: HttpTransport>(
    transport: &mut T,
    credentials: &Credentials<'_>,
    region: &str,
    host: &str,
    command: Command,
    body: &[u8],
    rx: &'r mut [u8],
    now: u64,
) -> Result<HttpResponse<'r>, Error> {
    let mut url = Url::new();
    write!(url, "https://{}/", host).map_err(|_| Error::Capacity)?;
    let mut target: String<48> = String::new();
    write!(target, "{}{}", TARGET_PREFIX, command.as_str()).map_err(|_| Error::Capacity)?;

    let signed = sigv4::sign(
        credentials,
        &Scope {
            region,
            service: SERVICE,
        },
        &SigningRequest {
            method: "POST",
            host,
            body,
            timestamp: now,
        },
    );

    let mut headers: Vec<(&str, &str), 8> = Vec::new();
    let _ = headers.push(("X-Amz-Target", target.as_str()));
    let _ = headers.push(("Content-Type", CONTENT_TYPE));
    let _ = headers.push(("x-amz-api-version", API_VERSION));
    for header in signed.iter() {
        let _ = headers.push(header);
    }

    transport
        .post(&url, &headers, body, rx)
        .await
        .map_err(|_| Error::Transport)
}

fn report(status: &mut impl StatusIndicator, what: &str, error: Error) {
    let mut text = StatusText::new();
    let _ = write!(text, "{} failed: {}", what, error);
    status.error(&text);
}
