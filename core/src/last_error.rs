//! Persisted record of the last unhandled error
//!
//! When the control loop dies the board writes the error here before
//! resetting. On the next boot the record is uploaded to the device log table
//! and cleared once the upload is confirmed.
//!
//! The region holds one frame: `MAGIC` (u32 LE), JSON length (u32 LE), then
//! the JSON array of two Timestream records, padded to a word boundary.

use core::fmt::Write;

use hal_abstractions::ErrorStore;
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::record::unix_time_string;

const MAGIC: u32 = 0x4C45_5252;
const HEADER_LEN: usize = 8;

/// Longest stored message/context text
pub const VALUE_CAPACITY: usize = 192;

/// Largest frame ever written
pub const FRAME_CAPACITY: usize = 640;

pub const MEASURE_EXCEPTION: &str = "exception";
pub const MEASURE_STACK_TRACE: &str = "stack_trace";

/// One device-log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "Time")]
    pub time: String<20>,
    #[serde(rename = "MeasureName")]
    pub measure_name: String<16>,
    #[serde(rename = "MeasureValue")]
    pub measure_value: String<VALUE_CAPACITY>,
}

impl ErrorRecord {
    fn new(unix_secs: u64, measure_name: &str, text: &str) -> Self {
        let mut name = String::new();
        let _ = name.push_str(measure_name);
        Self {
            time: unix_time_string(unix_secs),
            measure_name: name,
            measure_value: sanitize(text),
        }
    }
}

/// The `exception` and `stack_trace` records describing one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    records: Vec<ErrorRecord, 2>,
}

impl LastError {
    pub fn new(unix_secs: u64, message: &str, context: &str) -> Self {
        let mut records = Vec::new();
        let _ = records.push(ErrorRecord::new(unix_secs, MEASURE_EXCEPTION, message));
        let _ = records.push(ErrorRecord::new(unix_secs, MEASURE_STACK_TRACE, context));
        Self { records }
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn message(&self) -> &str {
        self.find(MEASURE_EXCEPTION)
    }

    pub fn context(&self) -> &str {
        self.find(MEASURE_STACK_TRACE)
    }

    fn find(&self, name: &str) -> &str {
        self.records
            .iter()
            .find(|r| r.measure_name == name)
            .map(|r| r.measure_value.as_str())
            .unwrap_or("")
    }
}

/// Printable ASCII without quotes or backslashes, truncated to fit a record
///
/// Keeps the stored JSON free of escape sequences. Line breaks become ` | `.
pub fn sanitize(text: &str) -> String<VALUE_CAPACITY> {
    let mut out = String::new();
    for c in text.chars() {
        let pushed = match c {
            '"' => out.push('\''),
            '\\' => out.push('/'),
            '\n' => out.push_str(" | "),
            ' '..='~' => out.push(c),
            '\r' => continue,
            _ => out.push('?'),
        };
        if pushed.is_err() {
            break;
        }
    }
    out
}

/// Last-error log kept in an [`ErrorStore`]
pub struct LastErrorLog<S> {
    store: S,
}

impl<S: ErrorStore> LastErrorLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist `error`, replacing any previous record
    pub fn write(&mut self, error: &LastError) -> Result<(), Error> {
        let mut frame = [0xFFu8; FRAME_CAPACITY];
        let len = serde_json_core::to_slice(&error.records, &mut frame[HEADER_LEN..])?;
        frame[..4].copy_from_slice(&MAGIC.to_le_bytes());
        frame[4..HEADER_LEN].copy_from_slice(&(len as u32).to_le_bytes());

        let total = padded(HEADER_LEN + len);
        if total > self.store.capacity() {
            return Err(Error::Capacity);
        }
        self.store
            .write(&frame[..total])
            .map_err(|_| Error::Storage)
    }

    /// The stored record, or `None` when the region holds no frame
    pub fn read(&mut self) -> Result<Option<LastError>, Error> {
        let mut header = [0u8; HEADER_LEN];
        self.store.read(&mut header).map_err(|_| Error::Storage)?;

        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if magic != MAGIC || len == 0 || HEADER_LEN + len > FRAME_CAPACITY {
            return Ok(None);
        }

        let mut frame = [0u8; FRAME_CAPACITY];
        let total = padded(HEADER_LEN + len).min(FRAME_CAPACITY);
        self.store
            .read(&mut frame[..total])
            .map_err(|_| Error::Storage)?;

        let (records, _) = serde_json_core::from_slice::<Vec<ErrorRecord, 2>>(
            &frame[HEADER_LEN..HEADER_LEN + len],
        )?;
        Ok(Some(LastError { records }))
    }

    /// Forget the stored record
    pub fn clear(&mut self) -> Result<(), Error> {
        self.store.erase().map_err(|_| Error::Storage)
    }

    /// Persist a failure described by any `Display` value
    pub fn record(
        &mut self,
        unix_secs: u64,
        error: &impl core::fmt::Display,
        context: &str,
    ) -> Result<(), Error> {
        let mut message: String<VALUE_CAPACITY> = String::new();
        // Truncated messages are still worth keeping
        let _ = write!(message, "{}", error);
        self.write(&LastError::new(unix_secs, &message, context))
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory region behaving like erased flash
    pub(crate) struct MemoryStore {
        pub data: std::vec::Vec<u8>,
        pub fail: bool,
    }

    impl MemoryStore {
        pub fn new(capacity: usize) -> Self {
            Self {
                data: std::vec![0xFF; capacity],
                fail: false,
            }
        }
    }

    impl ErrorStore for MemoryStore {
        type Error = ();

        fn capacity(&self) -> usize {
            self.data.len()
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<(), ()> {
            if self.fail {
                return Err(());
            }
            buf.copy_from_slice(&self.data[..buf.len()]);
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> Result<(), ()> {
            self.erase()?;
            self.data[..data.len()].copy_from_slice(data);
            Ok(())
        }

        fn erase(&mut self) -> Result<(), ()> {
            if self.fail {
                return Err(());
            }
            self.data.iter_mut().for_each(|b| *b = 0xFF);
            Ok(())
        }
    }

    #[test]
    fn test_empty_region_reads_none() {
        let mut log = LastErrorLog::new(MemoryStore::new(1024));
        assert_eq!(log.read().unwrap(), None);
    }

    #[test]
    fn test_write_read_clear() {
        let mut log = LastErrorLog::new(MemoryStore::new(1024));
        let error = LastError::new(1_697_535_000, "Sensor error", "station: read sensor");
        log.write(&error).unwrap();

        let stored = log.read().unwrap().unwrap();
        assert_eq!(stored, error);
        assert_eq!(stored.message(), "Sensor error");
        assert_eq!(stored.context(), "station: read sensor");
        assert_eq!(stored.records()[0].time.as_str(), "1697535000");
        assert_eq!(stored.records()[1].measure_name.as_str(), "stack_trace");

        log.clear().unwrap();
        assert_eq!(log.read().unwrap(), None);
    }

    #[test]
    fn test_frame_layout() {
        let mut log = LastErrorLog::new(MemoryStore::new(1024));
        log.record(5, &Error::Transport, "ctx").unwrap();
        let store = log.into_inner();

        assert_eq!(&store.data[..4], &MAGIC.to_le_bytes());
        let len = u32::from_le_bytes(store.data[4..8].try_into().unwrap()) as usize;
        let json = core::str::from_utf8(&store.data[8..8 + len]).unwrap();
        assert_eq!(
            json,
            r#"[{"Time":"5","MeasureName":"exception","MeasureValue":"Transport error"},{"Time":"5","MeasureName":"stack_trace","MeasureValue":"ctx"}]"#
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(
            sanitize("say \"hi\"\\n\r\nnext\tline°").as_str(),
            "say 'hi'/n | next?line?"
        );
        let long = "a".repeat(VALUE_CAPACITY + 10);
        assert_eq!(sanitize(&long).len(), VALUE_CAPACITY);
    }

    #[test]
    fn test_longest_record_fits() {
        let long = "x".repeat(VALUE_CAPACITY * 2);
        let mut log = LastErrorLog::new(MemoryStore::new(1024));
        log.write(&LastError::new(u64::MAX, &long, &long)).unwrap();
        assert_eq!(log.read().unwrap().unwrap().message().len(), VALUE_CAPACITY);
    }

    #[test]
    fn test_region_too_small() {
        let mut log = LastErrorLog::new(MemoryStore::new(32));
        assert_eq!(
            log.write(&LastError::new(1, "message", "context")),
            Err(Error::Capacity)
        );
    }

    #[test]
    fn test_storage_failure() {
        let mut store = MemoryStore::new(1024);
        store.fail = true;
        let mut log = LastErrorLog::new(store);
        assert_eq!(log.read(), Err(Error::Storage));
        assert_eq!(log.clear(), Err(Error::Storage));
    }

    #[test]
    fn test_corrupt_frame_is_json_error() {
        let mut store = MemoryStore::new(1024);
        store.data[..4].copy_from_slice(&MAGIC.to_le_bytes());
        store.data[4..8].copy_from_slice(&4u32.to_le_bytes());
        store.data[8..12].copy_from_slice(b"[{]}");
        let mut log = LastErrorLog::new(store);
        assert_eq!(log.read(), Err(Error::Json));
    }
}
