//! Core error types

/// Errors surfaced by the core logic
///
/// None of these are fatal to the station: the control loop reports them
/// and tries again on the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// HTTP transport failed (DNS, TCP, TLS, HTTP framing)
    Transport,
    /// Endpoint discovery returned no usable address
    NoEndpoint,
    /// A request could not be serialized or a response could not be parsed
    Json,
    /// The response parsed but did not carry the expected value
    UnexpectedResponse,
    /// A fixed-capacity buffer was too small
    Capacity,
    /// Sensor bus error
    Sensor,
    /// A settings file failed validation
    InvalidSettings,
    /// Non-volatile storage failed
    Storage,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Transport => write!(f, "Transport error"),
            Self::NoEndpoint => write!(f, "No endpoint"),
            Self::Json => write!(f, "JSON error"),
            Self::UnexpectedResponse => write!(f, "Unexpected response"),
            Self::Capacity => write!(f, "Buffer too small"),
            Self::Sensor => write!(f, "Sensor error"),
            Self::InvalidSettings => write!(f, "Invalid settings"),
            Self::Storage => write!(f, "Storage error"),
        }
    }
}

impl core::error::Error for Error {}

impl From<serde_json_core::ser::Error> for Error {
    fn from(_: serde_json_core::ser::Error) -> Self {
        Error::Capacity
    }
}

impl From<serde_json_core::de::Error> for Error {
    fn from(_: serde_json_core::de::Error) -> Self {
        Error::Json
    }
}
