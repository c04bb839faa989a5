//! AWS Signature Version 4 request signer
//!
//! Signs requests whose URI is always `/` with an empty query string, which
//! is all the JSON-RPC style AWS APIs (Timestream, DynamoDB, ...) need. The
//! signed header set is fixed: `host`, `x-amz-date` and, with temporary
//! credentials, `x-amz-security-token`.
//!
//! The four steps are the ones from the AWS general reference:
//! 1. canonical request
//! 2. string to sign
//! 3. signing key (HMAC chain over date, region, service)
//! 4. signature = HMAC(signing key, string to sign)
//!
//! Signing is pure and total. Nothing is allocated: the canonical request is
//! streamed straight into SHA-256 instead of being built in memory.
//!
//! # Example
//!
//! ```
//! use weather_core::sigv4::{sign, Credentials, Scope, SigningRequest};
//!
//! let credentials = Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
//! let scope = Scope { region: "us-east-1", service: "timestream" };
//! let request = SigningRequest {
//!     method: "POST",
//!     host: "ingest.timestream.us-east-1.amazonaws.com",
//!     body: b"{}",
//!     timestamp: 1_697_535_000,
//! };
//! let headers = sign(&credentials, &scope, &request);
//! assert!(headers.authorization().starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20231017/"));
//! ```

use core::fmt::{self, Write};

use heapless::{String, Vec};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::calendar::DateTime;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm identifier for HMAC-SHA256 version 4 signing
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Credential scope terminator
const SCOPE_TERMINATOR: &str = "aws4_request";

/// Longest access key id AWS issues
pub const MAX_ACCESS_KEY_LEN: usize = 128;

/// Longest region or service name accepted in a credential scope
pub const MAX_SCOPE_PART_LEN: usize = 32;

const SIGNED_HEADERS_WITH_TOKEN: &str = "host;x-amz-date;x-amz-security-token";
const SIGNED_HEADERS: &str = "host;x-amz-date";

/// Worst-case `Authorization` value for inputs within the limits above
const AUTHORIZATION_CAPACITY: usize = ALGORITHM.len()
    + " Credential=".len()
    + MAX_ACCESS_KEY_LEN
    + "/YYYYMMDD/".len()
    + MAX_SCOPE_PART_LEN
    + "/".len()
    + MAX_SCOPE_PART_LEN
    + "/".len()
    + SCOPE_TERMINATOR.len()
    + ", SignedHeaders=".len()
    + SIGNED_HEADERS_WITH_TOKEN.len()
    + ", Signature=".len()
    + 64;

/// SHA-256 block size; longer HMAC keys are hashed first
const HMAC_BLOCK_SIZE: usize = 64;

/// Lower-case hex SHA-256 digest
pub type HexDigest = String<64>;

/// AWS access credentials
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    /// STS session token for temporary credentials
    pub session_token: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    /// Long-term credentials without a session token
    pub const fn new(access_key: &'a str, secret_key: &'a str) -> Self {
        Self {
            access_key,
            secret_key,
            session_token: None,
        }
    }

    /// Attach a session token (empty tokens are ignored)
    pub fn with_session_token(mut self, token: Option<&'a str>) -> Self {
        self.session_token = token.filter(|t| !t.is_empty());
        self
    }
}

impl fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.map(|_| "<redacted>"))
            .finish()
    }
}

/// Region and service of the credential scope
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub region: &'a str,
    pub service: &'a str,
}

/// The request parts covered by the signature
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    /// Upper-case HTTP method
    pub method: &'a str,
    /// Host header value
    pub host: &'a str,
    /// Exact bytes that will be transmitted as the body
    pub body: &'a [u8],
    /// Request time, Unix seconds (UTC)
    pub timestamp: u64,
}

/// `YYYYMMDDTHHMMSSZ` timestamp; the first 8 characters are the scope date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmzDate(String<16>);

impl AmzDate {
    pub fn from_unix(unix_secs: u64) -> Self {
        let dt = DateTime::from_unix(unix_secs);
        let mut s = String::new();
        // Four-digit years always fit
        let _ = write!(
            s,
            "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
            dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
        );
        Self(s)
    }

    /// Full `x-amz-date` value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `YYYYMMDD` used in the credential scope
    pub fn date(&self) -> &str {
        self.0.get(..8).unwrap_or("")
    }
}

/// Headers produced by [`sign`]
#[derive(Debug, Clone)]
pub struct SignedHeaders<'a> {
    authorization: String<AUTHORIZATION_CAPACITY>,
    amz_date: AmzDate,
    content_sha256: HexDigest,
    security_token: Option<&'a str>,
}

impl<'a> SignedHeaders<'a> {
    pub fn authorization(&self) -> &str {
        &self.authorization
    }

    pub fn amz_date(&self) -> &str {
        self.amz_date.as_str()
    }

    pub fn content_sha256(&self) -> &str {
        &self.content_sha256
    }

    pub fn security_token(&self) -> Option<&'a str> {
        self.security_token
    }

    /// Header name/value pairs to put on the wire
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        let mut headers: Vec<(&str, &str), 4> = Vec::new();
        // Capacity matches the number of headers pushed
        let _ = headers.push(("Authorization", self.authorization()));
        let _ = headers.push(("x-amz-date", self.amz_date()));
        let _ = headers.push(("x-amz-content-sha256", self.content_sha256()));
        if let Some(token) = self.security_token {
            let _ = headers.push(("X-Amz-Security-Token", token));
        }
        headers.into_iter()
    }
}

/// Sign `request` and return the authentication headers
///
/// The access key must be at most [`MAX_ACCESS_KEY_LEN`] bytes and the
/// region and service at most [`MAX_SCOPE_PART_LEN`]; settings validation
/// enforces both.
pub fn sign<'a>(
    credentials: &Credentials<'a>,
    scope: &Scope<'_>,
    request: &SigningRequest<'_>,
) -> SignedHeaders<'a> {
    let amz_date = AmzDate::from_unix(request.timestamp);
    let payload_hash = sha256_hex(request.body);

    let mut canonical = HashWriter::new();
    let _ = write_canonical_request(
        &mut canonical,
        request,
        &amz_date,
        credentials.session_token,
        &payload_hash,
    );
    let canonical_hash = canonical.finish();

    let key = signing_key(credentials.secret_key, amz_date.date(), scope);
    let mut string_to_sign = MacWriter(new_mac(&key));
    let _ = write_string_to_sign(&mut string_to_sign, &amz_date, scope, &canonical_hash);
    let signature = hex_digest(&string_to_sign.finish());

    let mut authorization = String::new();
    let written = write!(
        authorization,
        "{} Credential={}/{}/{}/{}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM,
        credentials.access_key,
        amz_date.date(),
        scope.region,
        scope.service,
        SCOPE_TERMINATOR,
        signed_headers(credentials.session_token),
        signature
    );
    debug_assert!(written.is_ok(), "Authorization header truncated");

    SignedHeaders {
        authorization,
        amz_date,
        content_sha256: payload_hash,
        security_token: credentials.session_token,
    }
}

/// Semicolon-separated list of the signed header names
pub fn signed_headers(session_token: Option<&str>) -> &'static str {
    if session_token.is_some() {
        SIGNED_HEADERS_WITH_TOKEN
    } else {
        SIGNED_HEADERS
    }
}

/// Step 1: write the canonical request
pub fn write_canonical_request<W: Write>(
    out: &mut W,
    request: &SigningRequest<'_>,
    amz_date: &AmzDate,
    session_token: Option<&str>,
    payload_hash: &str,
) -> fmt::Result {
    // Method, URI, empty query string
    write!(out, "{}\n/\n\n", request.method)?;
    // Canonical headers, lower-case and sorted, each newline-terminated
    write!(out, "host:{}\n", request.host)?;
    write!(out, "x-amz-date:{}\n", amz_date.as_str())?;
    if let Some(token) = session_token {
        write!(out, "x-amz-security-token:{}\n", token)?;
    }
    write!(out, "\n{}\n{}", signed_headers(session_token), payload_hash)
}

/// Step 2: write the string to sign
pub fn write_string_to_sign<W: Write>(
    out: &mut W,
    amz_date: &AmzDate,
    scope: &Scope<'_>,
    canonical_request_hash: &str,
) -> fmt::Result {
    write!(
        out,
        "{}\n{}\n{}/{}/{}/{}\n{}",
        ALGORITHM,
        amz_date.as_str(),
        amz_date.date(),
        scope.region,
        scope.service,
        SCOPE_TERMINATOR,
        canonical_request_hash
    )
}

/// Step 3: derive the signing key
pub fn signing_key(secret_key: &str, date: &str, scope: &Scope<'_>) -> [u8; 32] {
    let mut k_secret = [0u8; HMAC_BLOCK_SIZE];
    let prefixed_len = 4 + secret_key.len();
    let k_secret = if prefixed_len <= HMAC_BLOCK_SIZE {
        k_secret[..4].copy_from_slice(b"AWS4");
        k_secret[4..prefixed_len].copy_from_slice(secret_key.as_bytes());
        &k_secret[..prefixed_len]
    } else {
        // HMAC replaces keys longer than a block with their digest
        let digest = Sha256::new()
            .chain_update(b"AWS4")
            .chain_update(secret_key.as_bytes())
            .finalize();
        k_secret[..32].copy_from_slice(&digest);
        &k_secret[..32]
    };

    let k_date = hmac_sha256(k_secret, date.as_bytes());
    let k_region = hmac_sha256(&k_date, scope.region.as_bytes());
    let k_service = hmac_sha256(&k_region, scope.service.as_bytes());
    hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes())
}

/// Hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> HexDigest {
    hex_digest(&Sha256::digest(data).into())
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = new_mac(key);
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => unreachable!(),
    }
}

fn hex_digest(digest: &[u8; 32]) -> HexDigest {
    let mut buf = [0u8; 64];
    let mut out = HexDigest::new();
    if hex::encode_to_slice(digest, &mut buf).is_ok() {
        let _ = out.push_str(core::str::from_utf8(&buf).unwrap_or(""));
    }
    out
}

/// `fmt::Write` sink that feeds SHA-256
struct HashWriter(Sha256);

impl HashWriter {
    fn new() -> Self {
        Self(Sha256::new())
    }

    fn finish(self) -> HexDigest {
        hex_digest(&self.0.finalize().into())
    }
}

impl Write for HashWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.update(s.as_bytes());
        Ok(())
    }
}

/// `fmt::Write` sink that feeds HMAC-SHA256
struct MacWriter(HmacSha256);

impl MacWriter {
    fn finish(self) -> [u8; 32] {
        self.0.finalize().into_bytes().into()
    }
}

impl Write for MacWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.update(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_KEY: &str = "AKIDEXAMPLE";
    const SECRET_KEY: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    /// 2015-08-30T12:36:00Z
    const VANILLA_TIME: u64 = 1_440_938_160;

    fn vanilla_request() -> SigningRequest<'static> {
        SigningRequest {
            method: "GET",
            host: "example.amazonaws.com",
            body: b"",
            timestamp: VANILLA_TIME,
        }
    }

    const VANILLA_SCOPE: Scope<'static> = Scope {
        region: "us-east-1",
        service: "service",
    };

    #[test]
    fn test_amz_date_format() {
        let date = AmzDate::from_unix(VANILLA_TIME);
        assert_eq!(date.as_str(), "20150830T123600Z");
        assert_eq!(date.date(), "20150830");
    }

    #[test]
    fn test_empty_body_hash() {
        assert_eq!(sha256_hex(b"").as_str(), EMPTY_SHA256);
    }

    #[test]
    fn test_signing_key_derivation_example() {
        let scope = Scope {
            region: "us-east-1",
            service: "iam",
        };
        let key = signing_key(SECRET_KEY, "20120215", &scope);
        assert_eq!(
            hex_digest(&key).as_str(),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_get_vanilla_canonical_request() {
        let mut canonical = std::string::String::new();
        write_canonical_request(
            &mut canonical,
            &vanilla_request(),
            &AmzDate::from_unix(VANILLA_TIME),
            None,
            EMPTY_SHA256,
        )
        .unwrap();
        assert_eq!(
            canonical,
            "GET\n/\n\nhost:example.amazonaws.com\nx-amz-date:20150830T123600Z\n\nhost;x-amz-date\n\
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex(canonical.as_bytes()).as_str(),
            "bb579772317eb040ac9ed261061d46c1f17a8133879d6129b6e1c25292927e63"
        );
    }

    #[test]
    fn test_get_vanilla_string_to_sign() {
        let mut sts = std::string::String::new();
        write_string_to_sign(
            &mut sts,
            &AmzDate::from_unix(VANILLA_TIME),
            &VANILLA_SCOPE,
            "bb579772317eb040ac9ed261061d46c1f17a8133879d6129b6e1c25292927e63",
        )
        .unwrap();
        assert_eq!(
            sts,
            "AWS4-HMAC-SHA256\n20150830T123600Z\n20150830/us-east-1/service/aws4_request\n\
             bb579772317eb040ac9ed261061d46c1f17a8133879d6129b6e1c25292927e63"
        );
    }

    #[test]
    fn test_get_vanilla_authorization() {
        let credentials = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let headers = sign(&credentials, &VANILLA_SCOPE, &vanilla_request());
        assert_eq!(
            headers.authorization(),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert_eq!(headers.amz_date(), "20150830T123600Z");
        assert_eq!(headers.content_sha256(), EMPTY_SHA256);
        assert_eq!(headers.security_token(), None);
    }

    #[test]
    fn test_elasticsearch_example_authorization() {
        let credentials = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let scope = Scope {
            region: "us-east-1",
            service: "es",
        };
        let request = SigningRequest {
            method: "GET",
            host: "search-service-foobar.us-east-1.es.amazonaws.com",
            body: b"",
            timestamp: 1_466_287_445, // 2016-06-18T22:04:05Z
        };
        let headers = sign(&credentials, &scope, &request);
        assert_eq!(
            headers.authorization(),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20160618/us-east-1/es/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=8b72ca5643e88cdfc4f806940726081b78dafc08c8001962e47f735b4b22ec80"
        );
    }

    #[test]
    fn test_timestream_post_with_session_token() {
        let credentials =
            Credentials::new(ACCESS_KEY, SECRET_KEY).with_session_token(Some("SESSIONTOKEN"));
        let scope = Scope {
            region: "us-east-1",
            service: "timestream",
        };
        let request = SigningRequest {
            method: "POST",
            host: "ingest.timestream.us-east-1.amazonaws.com",
            body: b"{}",
            timestamp: 1_697_535_000, // 2023-10-17T09:30:00Z
        };
        let headers = sign(&credentials, &scope, &request);
        assert_eq!(
            headers.authorization(),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20231017/us-east-1/timestream/aws4_request, \
             SignedHeaders=host;x-amz-date;x-amz-security-token, \
             Signature=cc56d3a9b95dea60236908c6d2141943d96e31f6406ca4f4351bca187ee45340"
        );
        assert_eq!(
            headers.content_sha256(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );

        let names: std::vec::Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            ["Authorization", "x-amz-date", "x-amz-content-sha256", "X-Amz-Security-Token"]
        );
    }

    #[test]
    fn test_timestream_post_without_session_token() {
        let credentials = Credentials::new(ACCESS_KEY, SECRET_KEY).with_session_token(Some(""));
        let scope = Scope {
            region: "us-east-1",
            service: "timestream",
        };
        let request = SigningRequest {
            method: "POST",
            host: "ingest.timestream.us-east-1.amazonaws.com",
            body: b"{}",
            timestamp: 1_697_535_000,
        };
        let headers = sign(&credentials, &scope, &request);
        assert!(headers.authorization().ends_with(
            "Signature=2ae9f0acd9479c4e737dabc388b5aaadc4a6482a503f9de353b0319f1ed7f7ef"
        ));
        assert_eq!(headers.iter().count(), 3);
    }

    #[test]
    fn test_long_secret_key() {
        // Longer than an HMAC block once prefixed with "AWS4"
        let secret = "x".repeat(80);
        let credentials = Credentials::new(ACCESS_KEY, &secret);
        let headers = sign(&credentials, &VANILLA_SCOPE, &vanilla_request());
        assert!(headers.authorization().ends_with(
            "Signature=9431578cf1cca2218cb8db4a1e403293ea0bae2f2406f3e6ede0d0a65c5f116b"
        ));
    }

    #[test]
    fn test_longest_inputs_fit_authorization() {
        let access_key = "A".repeat(MAX_ACCESS_KEY_LEN);
        let region = "r".repeat(MAX_SCOPE_PART_LEN);
        let service = "s".repeat(MAX_SCOPE_PART_LEN);
        let credentials =
            Credentials::new(&access_key, SECRET_KEY).with_session_token(Some("token"));
        let scope = Scope {
            region: &region,
            service: &service,
        };
        let headers = sign(&credentials, &scope, &vanilla_request());

        let authorization = headers.authorization();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AAAA"));
        assert!(authorization.contains(SIGNED_HEADERS_WITH_TOKEN));
        let signature = authorization.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let credentials = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let a = sign(&credentials, &VANILLA_SCOPE, &vanilla_request());
        let b = sign(&credentials, &VANILLA_SCOPE, &vanilla_request());
        assert_eq!(a.authorization(), b.authorization());
    }

    #[test]
    fn test_every_input_changes_signature() {
        let credentials = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let base = sign(&credentials, &VANILLA_SCOPE, &vanilla_request());
        let signature = |h: &SignedHeaders<'_>| {
            std::string::String::from(h.authorization().rsplit('=').next().unwrap())
        };
        let base_sig = signature(&base);

        let mut variants = std::vec::Vec::new();

        let mut req = vanilla_request();
        req.host = "examplf.amazonaws.com";
        variants.push(sign(&credentials, &VANILLA_SCOPE, &req));

        let mut req = vanilla_request();
        req.body = b"x";
        variants.push(sign(&credentials, &VANILLA_SCOPE, &req));

        let mut req = vanilla_request();
        req.timestamp += 1;
        variants.push(sign(&credentials, &VANILLA_SCOPE, &req));

        let mut req = vanilla_request();
        req.method = "POST";
        variants.push(sign(&credentials, &VANILLA_SCOPE, &req));

        let other_secret = Credentials::new(ACCESS_KEY, "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEZ");
        variants.push(sign(&other_secret, &VANILLA_SCOPE, &vanilla_request()));

        let with_token = credentials.with_session_token(Some("token"));
        variants.push(sign(&with_token, &VANILLA_SCOPE, &vanilla_request()));

        let other_region = Scope {
            region: "us-east-2",
            service: "service",
        };
        variants.push(sign(&credentials, &other_region, &vanilla_request()));

        for variant in &variants {
            assert_ne!(signature(variant), base_sig);
        }
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials = Credentials::new(ACCESS_KEY, SECRET_KEY);
        let debug = std::format!("{:?}", credentials);
        assert!(debug.contains(ACCESS_KEY));
        assert!(!debug.contains(SECRET_KEY));
    }
}
