//! Platform-agnostic core logic for the weather station firmware
//!
//! This crate contains business logic that is shared by every supported
//! board. It has NO hardware dependencies: buses, transports and storage are
//! reached through `embedded-hal-async` and `hal-abstractions` traits, so all
//! of it builds and tests on the host.
//!
//! - **`sigv4`**: AWS Signature Version 4 request signer
//! - **`timestream`**: Timestream write/query client built on the signer
//! - **`record`**: readings, batches and Timestream record attributes
//! - **`bme280`**: BME280 driver with the Bosch fixed-point compensation
//! - **`clock`**: SNTP packets, resync countdown, local time formatting
//! - **`calendar`**: O(1) unix <-> civil date conversions
//! - **`timezone`**: timezone offset lookup request/response
//! - **`power`**: sleep and power-pulse scheduling
//! - **`settings`**: location settings and secrets
//! - **`last_error`**: persisted record of the last unhandled error
//! - **`display`**: prepared reading frames rotated on the display

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod bme280;
pub mod calendar;
pub mod clock;
pub mod display;
pub mod error;
pub mod last_error;
pub mod power;
pub mod record;
pub mod settings;
pub mod sigv4;
pub mod timestream;
pub mod timezone;

pub use error::Error;
