//! `Duration` fields in config files.
//!
//! Written back as plain milliseconds; read from either a millisecond count
//! or a string with an `ms` or `s` suffix:
//!
//! ```yaml
//! min_interval: 1100
//! timeout: "10s"
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

#[derive(Deserialize)]
#[serde(untagged)]
enum Millis {
    Count(u64),
    Text(String),
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(millis)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match Millis::deserialize(deserializer)? {
        Millis::Count(millis) => Ok(Duration::from_millis(millis)),
        Millis::Text(text) => parse(&text).map_err(D::Error::custom),
    }
}

fn parse(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let (digits, scale) = if let Some(ms) = text.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(s) = text.strip_suffix('s') {
        (s, 1_000)
    } else {
        (text, 1)
    };
    let value: u64 = digits.trim().parse().map_err(|_| {
        format!("invalid duration {text:?}, expected e.g. 1100, \"1100ms\" or \"2s\"")
    })?;
    value
        .checked_mul(scale)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration {text:?} is out of range"))
}
