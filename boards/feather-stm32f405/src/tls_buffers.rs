//! HTTPS Buffer Allocations in Main SRAM
//!
//! Every HTTPS exchange (Timestream and the timezone API) runs one request at
//! a time, so a single set of buffers serves them all. They live in statics
//! rather than on the task stack and are handed out exactly once at startup.
//!
//! # Buffer Sizing
//!
//! **TLS read buffer (16.25 KB)**:
//! - TLS 1.3 maximum plaintext: 16384 bytes
//! - Record header, AEAD tag and content type: 256 bytes of headroom
//!
//! **TLS write buffer (16.25 KB)**:
//! - Request bodies are serialized before the handshake, so outgoing records
//!   can reach the maximum size too
//!
//! **Request body (8 KB)**: a full batch of 100 readings serializes to about
//! 7 KB of `WriteRecords` JSON.
//!
//! **Response bodies (4 KB, 1 KB)**: Timestream replies, and the timezone
//! reply which is read while a Timestream client holds the first buffer.

#![deny(unsafe_code)]
#![deny(warnings)]

use static_cell::ConstStaticCell;

const TLS_READ_BUF_SIZE: usize = 16_640;
const TLS_WRITE_BUF_SIZE: usize = 16_640;
const REQUEST_BODY_SIZE: usize = 8 * 1024;
const RESPONSE_BODY_SIZE: usize = 4 * 1024;
const TIMEZONE_RESPONSE_SIZE: usize = 1024;

static TLS_READ_BUF: ConstStaticCell<[u8; TLS_READ_BUF_SIZE]> =
    ConstStaticCell::new([0; TLS_READ_BUF_SIZE]);
static TLS_WRITE_BUF: ConstStaticCell<[u8; TLS_WRITE_BUF_SIZE]> =
    ConstStaticCell::new([0; TLS_WRITE_BUF_SIZE]);
static REQUEST_BODY: ConstStaticCell<[u8; REQUEST_BODY_SIZE]> =
    ConstStaticCell::new([0; REQUEST_BODY_SIZE]);
static RESPONSE_BODY: ConstStaticCell<[u8; RESPONSE_BODY_SIZE]> =
    ConstStaticCell::new([0; RESPONSE_BODY_SIZE]);
static TIMEZONE_RESPONSE: ConstStaticCell<[u8; TIMEZONE_RESPONSE_SIZE]> =
    ConstStaticCell::new([0; TIMEZONE_RESPONSE_SIZE]);

/// All HTTPS buffers
pub struct HttpsBuffers {
    pub tls_read: &'static mut [u8],
    pub tls_write: &'static mut [u8],
    pub request_body: &'static mut [u8],
    pub response_body: &'static mut [u8],
    pub timezone_response: &'static mut [u8],
}

/// Take the buffers
///
/// # Panics
///
/// When called twice.
pub fn take() -> HttpsBuffers {
    HttpsBuffers {
        tls_read: TLS_READ_BUF.take(),
        tls_write: TLS_WRITE_BUF.take(),
        request_body: REQUEST_BODY.take(),
        response_body: RESPONSE_BODY.take(),
        timezone_response: TIMEZONE_RESPONSE.take(),
    }
}
