#![deny(unsafe_code)]
#![deny(warnings)]
//! HTTPS transport over embassy-net
//!
//! One TCP connection and TLS 1.3 session per request. Server certificates
//! are not verified.

use defmt::{debug, warn};
use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::{TcpClient, TcpClientState};
use embassy_net::Stack;
use hal_abstractions::{HttpResponse, HttpTransport};
use reqwless::client::{HttpClient, TlsConfig, TlsVerify};
use reqwless::request::{Method, RequestBuilder};
use static_cell::StaticCell;

const TCP_BUFFER_SIZE: usize = 4096;

type Tcp = TcpClient<'static, 1, TCP_BUFFER_SIZE, TCP_BUFFER_SIZE>;

/// `HttpTransport` backed by reqwless
pub struct HttpsTransport {
    client: HttpClient<'static, Tcp, DnsSocket<'static>>,
}

impl HttpsTransport {
    /// Build the transport on `stack`
    ///
    /// Call once; the TCP and DNS clients live in statics.
    pub fn new(
        stack: Stack<'static>,
        tls_read: &'static mut [u8],
        tls_write: &'static mut [u8],
        seed: u64,
    ) -> Self {
        static TCP_STATE: StaticCell<TcpClientState<1, TCP_BUFFER_SIZE, TCP_BUFFER_SIZE>> =
            StaticCell::new();
        static TCP: StaticCell<Tcp> = StaticCell::new();
        static DNS: StaticCell<DnsSocket<'static>> = StaticCell::new();

        let tcp = TCP.init(TcpClient::new(stack, TCP_STATE.init(TcpClientState::new())));
        let dns = DNS.init(DnsSocket::new(stack));
        let tls = TlsConfig::new(seed, tls_read, tls_write, TlsVerify::None);

        Self {
            client: HttpClient::new_with_tls(tcp, dns, tls),
        }
    }
}

impl HttpTransport for HttpsTransport {
    type Error = reqwless::Error;

    async fn post<'b>(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
        rx_buf: &'b mut [u8],
    ) -> Result<HttpResponse<'b>, Self::Error> {
        debug!("POST {} ({} bytes)", url, body.len());
        let mut request = self
            .client
            .request(Method::POST, url)
            .await?
            .headers(headers)
            .body(body);
        let response = request.send(rx_buf).await?;
        let success = response.status.is_successful();
        if !success {
            warn!("POST {} returned {}", url, response.status);
        }
        let body = response.body().read_to_end().await?;
        Ok(HttpResponse { success, body })
    }

    async fn get<'b>(
        &mut self,
        url: &str,
        rx_buf: &'b mut [u8],
    ) -> Result<HttpResponse<'b>, Self::Error> {
        let mut request = self.client.request(Method::GET, url).await?;
        let response = request.send(rx_buf).await?;
        let success = response.status.is_successful();
        if !success {
            warn!("GET returned {}", response.status);
        }
        let body = response.body().read_to_end().await?;
        Ok(HttpResponse { success, body })
    }
}
