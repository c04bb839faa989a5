#![deny(unsafe_code)]
#![deny(warnings)]
//! Network stack status

use defmt::info;
use embassy_net::Stack;

/// Log the DHCP lease (address and gateway)
pub fn log_config(stack: &Stack<'_>) {
    let Some(config) = stack.config_v4() else {
        return;
    };

    let octets = config.address.address().octets();
    info!(
        "IP: {}.{}.{}.{}",
        octets[0], octets[1], octets[2], octets[3]
    );

    if let Some(gateway) = config.gateway {
        let gw_octets = gateway.octets();
        info!(
            "Gateway: {}.{}.{}.{}",
            gw_octets[0], gw_octets[1], gw_octets[2], gw_octets[3]
        );
    }
}
