#![deny(unsafe_code)]
#![deny(warnings)]
//! Network configuration structures

/// SNTP client configuration
#[derive(Debug, Clone)]
pub struct SntpConfig {
    /// NTP server host name
    pub server: &'static str,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Number of attempts
    pub retry_count: usize,
    /// Maximum accepted stratum level (1-15)
    pub max_stratum: u8,
}

impl Default for SntpConfig {
    fn default() -> Self {
        Self {
            server: "pool.ntp.org",
            timeout_ms: 1000,
            retry_count: 1,
            max_stratum: 3,
        }
    }
}

impl SntpConfig {
    pub fn with_server(server: &'static str) -> Self {
        Self {
            server,
            ..Self::default()
        }
    }
}

/// Link bring-up and tear-down timing
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// DHCP polls before giving up
    pub connect_retries: u32,
    /// Delay between DHCP polls
    pub retry_interval_ms: u64,
    /// Wait for the link to settle after bring-up and tear-down
    pub perform_complete_poweroff: bool,
    /// Settle time after bring-up
    pub power_up_delay_ms: u64,
    /// Settle time after tear-down
    pub power_down_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_retries: 20,
            retry_interval_ms: 500,
            perform_complete_poweroff: false,
            power_up_delay_ms: 3000,
            power_down_delay_ms: 200,
        }
    }
}

/// Network stack configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// MAC address for Ethernet
    pub mac_addr: [u8; 6],
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mac_addr: [0x02, 0x00, 0x00, 0x12, 0x34, 0x56],
        }
    }
}
