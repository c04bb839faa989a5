//! Wall clock: SNTP packets, resync scheduling and local time display
//!
//! The board owns the UDP socket and the RTC; this module only builds and
//! checks the 48-byte NTP messages and decides when to resync.

use core::fmt::Write;

use heapless::String;

use crate::calendar::DateTime;

/// NTP packet size (no extension fields)
pub const NTP_PACKET_LEN: usize = 48;

/// NTP server port
pub const NTP_PORT: u16 = 123;

/// NTP epoch (1900-01-01) to Unix epoch (1970-01-01) in seconds
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// LI=0, VN=3, Mode=3 (client)
const NTP_CLIENT_HEADER: u8 = 0x1B;
/// Mode=4 (server)
const NTP_MODE_SERVER: u8 = 4;

/// Timestamp with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timestamp {
    /// Seconds since 1970-01-01 00:00:00 UTC
    pub unix_secs: u64,
    /// 0..=999_999
    pub micros: u32,
}

impl Timestamp {
    pub const fn new(unix_secs: u64, micros: u32) -> Self {
        Self { unix_secs, micros }
    }

    /// Convert from an NTP timestamp (seconds since 1900, 2^-32 fraction)
    pub fn from_ntp(ntp_secs: u64, ntp_frac: u32) -> Self {
        let unix_secs = ntp_secs.saturating_sub(NTP_UNIX_OFFSET);
        let micros = ((ntp_frac as u64 * 1_000_000) >> 32) as u32;
        Self::new(unix_secs, micros)
    }

    /// Add a round-trip correction, carrying into seconds
    pub fn add_micros(mut self, micros: u64) -> Self {
        let total = self.micros as u64 + micros;
        self.unix_secs = self.unix_secs.saturating_add(total / 1_000_000);
        self.micros = (total % 1_000_000) as u32;
        self
    }
}

/// SNTP reply rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NtpError {
    /// Fewer than 48 bytes
    Truncated,
    /// Not a server-mode packet
    NotServerReply,
    /// Kiss-o'-death (stratum 0) or worse than the accepted maximum
    InvalidStratum(u8),
}

impl core::fmt::Display for NtpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "Truncated NTP reply"),
            Self::NotServerReply => write!(f, "Not an NTP server reply"),
            Self::InvalidStratum(s) => write!(f, "Invalid NTP stratum {}", s),
        }
    }
}

impl core::error::Error for NtpError {}

/// Client request packet
pub fn ntp_request() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = NTP_CLIENT_HEADER;
    packet
}

/// Extract the transmit timestamp from a server reply
pub fn parse_ntp_response(reply: &[u8], max_stratum: u8) -> Result<Timestamp, NtpError> {
    if reply.len() < NTP_PACKET_LEN {
        return Err(NtpError::Truncated);
    }
    if reply[0] & 0x07 != NTP_MODE_SERVER {
        return Err(NtpError::NotServerReply);
    }
    let stratum = reply[1];
    if stratum == 0 || stratum > max_stratum {
        return Err(NtpError::InvalidStratum(stratum));
    }

    let secs = u32::from_be_bytes([reply[40], reply[41], reply[42], reply[43]]) as u64;
    let frac = u32::from_be_bytes([reply[44], reply[45], reply[46], reply[47]]);
    Ok(Timestamp::from_ntp(secs, frac))
}

/// Counts reading cycles between RTC resyncs
///
/// A sync is due once `period` cycles have passed since the last successful
/// one. A failed sync leaves it due, so the next cycle tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncCountdown {
    count: u32,
    period: u32,
}

impl SyncCountdown {
    /// Resync every `sync_period_s`, counted in `read_period_s` cycles
    pub fn new(sync_period_s: u32, read_period_s: u32) -> Self {
        Self {
            count: 0,
            period: sync_period_s / read_period_s.max(1),
        }
    }

    pub fn is_due(&self) -> bool {
        self.count >= self.period
    }

    /// Record one cycle; `synced` is the outcome of a sync attempted because
    /// [`is_due`](Self::is_due) returned `true`
    pub fn advance(&mut self, synced: bool) {
        if self.is_due() && synced {
            self.count = 0;
        } else {
            self.count = self.count.saturating_add(1);
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// `hh:mm AM|PM` for `utc_secs` shifted by `offset_secs`
pub fn local_time_string(utc_secs: u64, offset_secs: i32) -> String<8> {
    let local = utc_secs.saturating_add_signed(offset_secs as i64);
    let dt = DateTime::from_unix(local);

    let hour12 = match dt.hour % 12 {
        0 => 12,
        h => h,
    };
    let suffix = if dt.hour >= 12 { "PM" } else { "AM" };

    let mut s = String::new();
    let _ = write!(s, "{:02}:{:02} {}", hour12, dt.minute, suffix);
    s
}
