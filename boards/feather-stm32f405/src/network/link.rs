#![deny(unsafe_code)]
#![deny(warnings)]
//! W5500 link control
//!
//! The station's "connect" is a DHCP lease on the embassy-net stack and its
//! "disconnect" drops the IPv4 configuration. The W5500 runner keeps running
//! underneath either way.

use defmt::{info, warn};
use embassy_net::{ConfigV4, DhcpConfig, Stack};
use hal_abstractions::NetworkLink;
use rtic_monotonics::fugit::ExtU64;
use rtic_monotonics::Monotonic;

use crate::Mono;

use super::config::LinkConfig;
use super::manager;

/// `NetworkLink` over the embassy-net stack
pub struct EthLink {
    stack: Stack<'static>,
    config: LinkConfig,
    active: bool,
}

impl EthLink {
    /// The stack must start without an IPv4 configuration
    pub fn new(stack: Stack<'static>, config: LinkConfig) -> Self {
        Self {
            stack,
            config,
            active: false,
        }
    }
}

impl NetworkLink for EthLink {
    async fn connect(&mut self) -> bool {
        if self.stack.is_config_up() {
            return true;
        }

        if !self.active {
            info!("Activating link");
            self.stack
                .set_config_v4(ConfigV4::Dhcp(DhcpConfig::default()));
            self.active = true;
            if self.config.perform_complete_poweroff {
                Mono::delay(self.config.power_up_delay_ms.millis()).await;
            }
        }

        info!("Waiting for DHCP...");
        let mut retries = 0;
        while !self.stack.is_config_up() && retries < self.config.connect_retries {
            retries += 1;
            info!("Retry {}", retries);
            Mono::delay(self.config.retry_interval_ms.millis()).await;
        }

        if self.stack.is_config_up() {
            info!("Network is UP!");
            manager::log_config(&self.stack);
            true
        } else {
            warn!("No DHCP lease after {} retries", retries);
            false
        }
    }

    async fn disconnect(&mut self) {
        if !self.active {
            return;
        }

        info!("Deactivating link");
        self.stack.set_config_v4(ConfigV4::None);
        self.active = false;
        if self.config.perform_complete_poweroff {
            Mono::delay(self.config.power_down_delay_ms.millis()).await;
        }
    }

    fn is_connected(&self) -> bool {
        self.stack.is_config_up()
    }
}
