#![deny(unsafe_code)]
#![deny(warnings)]
//! Network client error types

use defmt::Format;
use weather_core::clock::NtpError;

use crate::time::RtcError;

/// Network client operation errors
#[derive(Debug, Clone, Copy, Format)]
pub enum NetworkError {
    /// W5500 did not come up
    LinkInitFailed,
    /// No IP configuration
    LinkDown,
    /// DNS resolution failed
    DnsError,
    /// Socket bind/connect error
    SocketError,
    /// Request timeout
    Timeout,
    /// Invalid response from server
    InvalidResponse,
    /// Server error (e.g., invalid stratum for NTP)
    ServerError,
    /// All configured servers failed
    AllServersFailed,
    /// RTC not initialized
    RtcNotInitialized,
    /// RTC hardware error
    RtcHardwareError,
}

impl core::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::LinkInitFailed => write!(f, "W5500 initialization failed"),
            Self::LinkDown => write!(f, "Link down"),
            Self::DnsError => write!(f, "DNS resolution failed"),
            Self::SocketError => write!(f, "Socket error"),
            Self::Timeout => write!(f, "Request timeout"),
            Self::InvalidResponse => write!(f, "Invalid response"),
            Self::ServerError => write!(f, "Server error"),
            Self::AllServersFailed => write!(f, "All servers failed"),
            Self::RtcNotInitialized => write!(f, "RTC not initialized"),
            Self::RtcHardwareError => write!(f, "RTC hardware error"),
        }
    }
}

// Implement core::error::Error for no_std compatibility
impl core::error::Error for NetworkError {}

impl From<RtcError> for NetworkError {
    fn from(e: RtcError) -> Self {
        match e {
            RtcError::NotInitialized => NetworkError::RtcNotInitialized,
            RtcError::HardwareError => NetworkError::RtcHardwareError,
        }
    }
}

impl From<NtpError> for NetworkError {
    fn from(e: NtpError) -> Self {
        match e {
            NtpError::Truncated | NtpError::NotServerReply => NetworkError::InvalidResponse,
            NtpError::InvalidStratum(_) => NetworkError::ServerError,
        }
    }
}
