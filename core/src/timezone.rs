//! Local timezone offset from the Google Maps Time Zone API

use core::fmt::Write;

use hal_abstractions::HttpTransport;
use heapless::String;
use serde::Deserialize;

use crate::error::Error;

pub const TIMEZONE_API_URL: &str = "https://maps.googleapis.com/maps/api/timezone/json";

pub type TimezoneUrl = String<256>;

/// Offset from UTC, DST included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timezone {
    pub offset_secs: i32,
    pub zone_id: String<48>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimezoneResponse<'a> {
    status: &'a str,
    #[serde(default)]
    raw_offset: i32,
    #[serde(default)]
    dst_offset: i32,
    #[serde(default, borrow)]
    time_zone_id: Option<&'a str>,
}

/// Request URL for `location` (`lat%2Clng`) at `unix_secs`
pub fn timezone_url(location: &str, unix_secs: u64, api_key: &str) -> Result<TimezoneUrl, Error> {
    let mut url = String::new();
    write!(
        url,
        "{}?location={}&timestamp={}&key={}",
        TIMEZONE_API_URL, location, unix_secs, api_key
    )
    .map_err(|_| Error::Capacity)?;
    Ok(url)
}

/// Parse an API reply; anything but `status: "OK"` is rejected
pub fn parse_timezone(body: &[u8]) -> Result<Timezone, Error> {
    let (reply, _) = serde_json_core::from_slice::<TimezoneResponse<'_>>(body)?;
    if reply.status != "OK" {
        return Err(Error::UnexpectedResponse);
    }

    let mut zone_id = String::new();
    if let Some(id) = reply.time_zone_id {
        // Informational only
        let _ = zone_id.push_str(id);
    }
    Ok(Timezone {
        offset_secs: reply.raw_offset.saturating_add(reply.dst_offset),
        zone_id,
    })
}

/// Look up the offset for `location` at `unix_secs`
pub async fn fetch_timezone<T: HttpTransport>(
    transport: &mut T,
    rx: &mut [u8],
    location: &str,
    api_key: &str,
    unix_secs: u64,
) -> Result<Timezone, Error> {
    let url = timezone_url(location, unix_secs, api_key)?;
    let response = transport
        .get(&url, rx)
        .await
        .map_err(|_| Error::Transport)?;
    if !response.success {
        return Err(Error::UnexpectedResponse);
    }
    parse_timezone(response.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use hal_abstractions::HttpResponse;

    const MELBOURNE: &str = "-37.9707183%2C144.392352";

    struct FixedReply {
        reply: Option<&'static str>,
        requested: std::string::String,
    }

    impl HttpTransport for FixedReply {
        type Error = ();

        async fn post<'b>(
            &mut self,
            _url: &str,
            _headers: &[(&str, &str)],
            _body: &[u8],
            _rx_buf: &'b mut [u8],
        ) -> Result<HttpResponse<'b>, ()> {
            Err(())
        }

        async fn get<'b>(&mut self, url: &str, rx_buf: &'b mut [u8]) -> Result<HttpResponse<'b>, ()> {
            self.requested = url.into();
            let text = self.reply.ok_or(())?;
            rx_buf[..text.len()].copy_from_slice(text.as_bytes());
            Ok(HttpResponse {
                success: true,
                body: &rx_buf[..text.len()],
            })
        }
    }

    #[test]
    fn test_url() {
        let url = timezone_url(MELBOURNE, 1_697_535_000, "KEY").unwrap();
        assert_eq!(
            url.as_str(),
            "https://maps.googleapis.com/maps/api/timezone/json?location=-37.9707183%2C144.392352&timestamp=1697535000&key=KEY"
        );
    }

    #[test]
    fn test_offset_includes_dst() {
        let tz = parse_timezone(
            br#"{"dstOffset":3600,"rawOffset":36000,"status":"OK","timeZoneId":"Australia/Melbourne","timeZoneName":"Australian Eastern Daylight Time"}"#,
        )
        .unwrap();
        assert_eq!(tz.offset_secs, 39_600);
        assert_eq!(tz.zone_id.as_str(), "Australia/Melbourne");
    }

    #[test]
    fn test_negative_offset() {
        let tz =
            parse_timezone(br#"{"dstOffset":0,"rawOffset":-18000,"status":"OK"}"#).unwrap();
        assert_eq!(tz.offset_secs, -18_000);
        assert!(tz.zone_id.is_empty());
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            parse_timezone(br#"{"errorMessage":"The provided API key is invalid.","status":"REQUEST_DENIED"}"#),
            Err(Error::UnexpectedResponse)
        );
        assert_eq!(parse_timezone(b"<html>"), Err(Error::Json));
    }

    #[test]
    fn test_fetch() {
        let mut transport = FixedReply {
            reply: Some(r#"{"dstOffset":0,"rawOffset":36000,"status":"OK"}"#),
            requested: std::string::String::new(),
        };
        let mut rx = [0u8; 512];
        let tz = block_on(fetch_timezone(&mut transport, &mut rx, MELBOURNE, "KEY", 1)).unwrap();
        assert_eq!(tz.offset_secs, 36_000);
        assert!(transport.requested.contains("timestamp=1&key=KEY"));

        transport.reply = None;
        assert_eq!(
            block_on(fetch_timezone(&mut transport, &mut rx, MELBOURNE, "KEY", 1)),
            Err(Error::Transport)
        );
    }
}
