#![deny(unsafe_code)]
#![deny(warnings)]
//! Settings and secrets embedded at build time
//!
//! `config/settings.json` overrides the defaults for this station's location;
//! `config/secrets.json` holds the AWS credentials and the timezone API key.

use weather_core::settings::{Secrets, Settings};
use weather_core::Error;

static SETTINGS_JSON: &str = include_str!("../config/settings.json");
static SECRETS_JSON: &str = include_str!("../config/secrets.json");

/// Parse and validate both documents
pub fn load() -> Result<(Settings<'static>, Secrets<'static>), Error> {
    let settings = Settings::from_json(SETTINGS_JSON.as_bytes())?;
    let secrets = Secrets::from_json(SECRETS_JSON.as_bytes())?;
    Ok((settings, secrets))
}
