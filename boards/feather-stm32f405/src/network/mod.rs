#![deny(warnings)]
//! Network module with trait-based client architecture
//!
//! - **`client`**: `NetworkClient` trait for protocols run on the stack
//! - **`config`**: Configuration structs with `Default` implementations
//! - **`error`**: Simple error enum for network operations
//! - **`https`**: reqwless-backed `HttpTransport` for Timestream and the
//!   timezone API
//! - **`link`**: `NetworkLink` that takes the DHCP lease up and down
//! - **`manager`**: stack status logging
//! - **`sntp`**: SNTP client implementing `NetworkClient`
//!
//! ## Architecture
//!
//! The W5500 (`embassy-net-wiznet`) provides the device and runner, the
//! `embassy-net` stack handles TCP/IP, and everything above it goes through
//! the `hal-abstractions` traits that `weather-core` consumes.

pub mod client;
pub mod config;
pub mod error;
pub mod https;
pub mod link;
pub mod manager;
pub mod sntp;

// Re-export commonly used types
pub use client::NetworkClient;
pub use config::{LinkConfig, NetworkConfig, SntpConfig};
pub use error::NetworkError;
pub use https::HttpsTransport;
pub use link::EthLink;
pub use sntp::SntpClient;
