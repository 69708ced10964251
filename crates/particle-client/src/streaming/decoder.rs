//! Event record decoder
//!
//! Turns a completed [`Record`] into an [`Event`]. The payload carries
//! `data`, `ttl`, `published_at` (and optionally `coreid`); the name always
//! comes from the record's `event:` line.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use super::parser::Record;
use super::types::{DecodeError, Event};

/// Decode one record
pub fn decode(record: Record) -> Result<Event, DecodeError> {
    match serde_json::from_str::<Event>(&record.data) {
        Ok(mut event) => {
            event.name = record.name;
            Ok(event)
        }
        Err(source) => Err(DecodeError {
            name: record.name,
            payload: record.data,
            source,
        }),
    }
}

/// `ttl` is an integer in current payloads and a decimal string in older ones.
/// Both normalize to whole seconds; `null` or `""` mean zero.
pub(crate) fn deserialize_ttl<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ttl {
        Seconds(u64),
        Text(String),
    }

    match Option::<Ttl>::deserialize(deserializer) {
        Ok(None) => Ok(0),
        Ok(Some(Ttl::Seconds(seconds))) => Ok(seconds),
        Ok(Some(Ttl::Text(text))) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(0);
            }
            text.parse().map_err(|_| {
                D::Error::custom(format!(
                    "invalid ttl {:?}: expected non-negative whole seconds",
                    text
                ))
            })
        }
        Err(_) => Err(D::Error::custom(
            "invalid ttl: expected non-negative whole seconds",
        )),
    }
}

pub(crate) fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
