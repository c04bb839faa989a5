#![deny(unsafe_code)]
#![deny(warnings)]
//! SNTP client implementing NetworkClient trait

use defmt::{error, info, warn, Debug2Format};
use embassy_futures::select::{select, Either};
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, Instant, Timer};
use weather_core::clock::{ntp_request, parse_ntp_response, Timestamp, NTP_PACKET_LEN, NTP_PORT};

use crate::time::write_rtc;

use super::client::NetworkClient;
use super::config::SntpConfig;
use super::error::NetworkError;

/// SNTP client for time synchronization
pub struct SntpClient {
    config: SntpConfig,
}

impl SntpClient {
    pub fn with_config(config: SntpConfig) -> Self {
        Self { config }
    }

    /// Perform SNTP synchronization and set the RTC
    async fn sync(&self, stack: &Stack<'static>) -> Result<Timestamp, NetworkError> {
        if !stack.is_config_up() {
            return Err(NetworkError::LinkDown);
        }

        let server = self.config.server;
        for attempt in 0..self.config.retry_count {
            info!(
                "Attempting SNTP sync with {} (attempt {})",
                server,
                attempt + 1
            );
            match self.sntp_request(stack, server).await {
                Ok(timestamp) => {
                    write_rtc(timestamp)?;
                    info!(
                        "UTC time {}.{:06} has been set from ntp time server",
                        timestamp.unix_secs, timestamp.micros
                    );
                    return Ok(timestamp);
                }
                Err(e) => warn!("SNTP sync failed: {:?}", e),
            }
        }
        error!("time could not be read from ntp time server");
        Err(NetworkError::AllServersFailed)
    }

    async fn sntp_request(
        &self,
        stack: &Stack<'static>,
        server: &str,
    ) -> Result<Timestamp, NetworkError> {
        let server_ip = stack
            .dns_query(server, DnsQueryType::A)
            .await
            .map_err(|_| NetworkError::DnsError)?
            .first()
            .copied()
            .ok_or(NetworkError::DnsError)?;

        let server_endpoint = IpEndpoint::new(server_ip, NTP_PORT);
        info!("Resolved {} to {}", server, Debug2Format(&server_endpoint));

        let mut rx_meta = [PacketMetadata::EMPTY; 2];
        let mut rx_buffer = [0u8; 64];
        let mut tx_meta = [PacketMetadata::EMPTY; 2];
        let mut tx_buffer = [0u8; 64];
        let mut socket = UdpSocket::new(
            *stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        socket.bind(0).map_err(|_| NetworkError::SocketError)?;

        let transmit_time = Instant::now();
        socket
            .send_to(&ntp_request(), server_endpoint)
            .await
            .map_err(|_| NetworkError::SocketError)?;

        let mut response = [0u8; NTP_PACKET_LEN];
        let timeout = Timer::after(Duration::from_millis(self.config.timeout_ms));
        let (recv_len, from_addr) = match select(timeout, socket.recv_from(&mut response)).await {
            Either::First(_) => return Err(NetworkError::Timeout),
            Either::Second(result) => result.map_err(|_| NetworkError::SocketError)?,
        };
        let receive_time = Instant::now();

        if from_addr.endpoint.addr != server_ip {
            return Err(NetworkError::InvalidResponse);
        }

        let timestamp = parse_ntp_response(&response[..recv_len], self.config.max_stratum)?;

        let rtt_correction_micros = receive_time.duration_since(transmit_time).as_micros() / 2;
        let timestamp = timestamp.add_micros(rtt_correction_micros);
        info!(
            "NTP timestamp: {}.{:06} UTC (RTT correction: {} µs)",
            timestamp.unix_secs, timestamp.micros, rtt_correction_micros
        );
        Ok(timestamp)
    }
}

impl NetworkClient for SntpClient {
    type Output = Timestamp;

    async fn run(&mut self, stack: &Stack<'static>) -> Result<Self::Output, NetworkError> {
        self.sync(stack).await
    }
}
