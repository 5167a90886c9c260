//! Column encoding shared by the repositories.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;

use greenhub_domain::channel::ChannelId;
use greenhub_domain::id::DeviceId;

/// Fixed-width UTC timestamps, so text order matches time order.
pub(crate) fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.to_utc())
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(raw).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn decode_parsed<T>(raw: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|err: T::Err| sqlx::Error::Decode(err.to_string().into()))
}

pub(crate) fn decode_channel(device_id: String, gpio: i64) -> Result<ChannelId, sqlx::Error> {
    let device_id = DeviceId::new(device_id).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    let gpio = u8::try_from(gpio).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    Ok(ChannelId::new(device_id, gpio))
}
