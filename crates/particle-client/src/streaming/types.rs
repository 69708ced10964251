//! Types for event stream sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::decoder::{deserialize_nullable_string, deserialize_ttl};

/// A single event published to the Particle cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event name, taken from the record's `event:` line (empty if absent)
    #[serde(default)]
    pub name: String,

    /// Application payload, kept as text
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub data: String,

    /// Time-to-live in seconds
    #[serde(default, deserialize_with = "deserialize_ttl")]
    pub ttl: u64,

    /// Time the event was published
    pub published_at: DateTime<Utc>,

    /// ID of the publishing device, when the cloud reports one
    #[serde(default, rename = "coreid", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Which event feed a session subscribes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventScope {
    /// The public firehose: `/v1/events`
    Public,
    /// Events from every device on the token's account: `/v1/devices/events`
    Mine,
    /// Events from one device: `/v1/devices/{id}/events`
    Device(String),
}

impl EventScope {
    /// Path segments for this scope, optionally narrowed to one event name
    ///
    /// An empty name means "all events". An empty device id is rejected.
    pub fn segments<'a>(&'a self, name: Option<&'a str>) -> StreamResult<Vec<&'a str>> {
        let mut segments = match self {
            EventScope::Public => vec!["v1", "events"],
            EventScope::Mine => vec!["v1", "devices", "events"],
            EventScope::Device(id) if id.trim().is_empty() => {
                return Err(StreamError::InvalidEndpoint(
                    "device event stream requires a device id".into(),
                ));
            }
            EventScope::Device(id) => vec!["v1", "devices", id.as_str(), "events"],
        };

        if let Some(name) = name.filter(|n| !n.is_empty()) {
            segments.push(name);
        }

        Ok(segments)
    }
}

/// A record payload that could not be decoded into an [`Event`]
#[derive(Debug, Error)]
#[error("failed to decode event {name:?}: {source} (data: {})", preview(.payload))]
pub struct DecodeError {
    /// Name from the record's `event:` line
    pub name: String,
    /// The concatenated `data:` payload as received
    pub payload: String,
    #[source]
    pub source: serde_json::Error,
}

fn preview(payload: &str) -> String {
    const MAX_PREVIEW: usize = 100;

    if payload.chars().count() > MAX_PREVIEW {
        format!("{}...", payload.chars().take(MAX_PREVIEW).collect::<String>())
    } else {
        payload.to_string()
    }
}

/// Errors that can occur while opening or consuming an event stream
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream could not be established
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// Server rejected the stream request
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Endpoint could not be built
    #[error("Invalid event endpoint: {0}")]
    InvalidEndpoint(String),

    /// Reading from an open stream failed
    #[error("Read error: {0}")]
    Read(#[source] reqwest::Error),

    /// Stream was closed by the server
    #[error("Stream closed")]
    Closed,

    /// A record could not be decoded; the session keeps running
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// `listen()` was called on a session with no connection attached
    #[error("Session is not connected")]
    NotConnected,

    /// A connection was attached to a session that already has one
    #[error("Session is already connected")]
    AlreadyConnected,

    /// `listen()` was called while another `listen()` is running
    #[error("Session is already listening")]
    AlreadyListening,

    /// Session has been stopped and cannot be reused
    #[error("Session stopped")]
    Stopped,
}

impl StreamError {
    /// Whether this error ends the session
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StreamError::Decode(_))
    }
}

/// Result type for streaming operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_segments() {
        assert_eq!(EventScope::Public.segments(None).unwrap(), vec!["v1", "events"]);
        assert_eq!(
            EventScope::Public.segments(Some("temp")).unwrap(),
            vec!["v1", "events", "temp"]
        );
    }

    #[test]
    fn test_empty_name_means_all_events() {
        assert_eq!(
            EventScope::Mine.segments(Some("")).unwrap(),
            vec!["v1", "devices", "events"]
        );
    }

    #[test]
    fn test_device_segments() {
        let scope = EventScope::Device("abc123".into());
        assert_eq!(
            scope.segments(Some("temp")).unwrap(),
            vec!["v1", "devices", "abc123", "events", "temp"]
        );
    }

    #[test]
    fn test_device_scope_requires_id() {
        let scope = EventScope::Device(" ".into());
        let result = scope.segments(None);
        assert!(matches!(result, Err(StreamError::InvalidEndpoint(_))));

        let scope = EventScope::Device(String::new());
        assert!(scope.segments(Some("temp")).is_err());
    }

    #[test]
    fn test_decode_error_preview_is_truncated() {
        let payload = "x".repeat(300);
        let source = serde_json::from_str::<serde_json::Value>(&payload).unwrap_err();
        let err = DecodeError {
            name: "big".into(),
            payload,
            source,
        };
        let message = err.to_string();
        assert!(message.contains("\"big\""));
        assert!(message.ends_with("...)"));
        assert!(message.len() < 250);
    }

    #[test]
    fn test_only_decode_errors_are_non_fatal() {
        assert!(StreamError::Closed.is_fatal());
        assert!(StreamError::Stopped.is_fatal());

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = StreamError::from(DecodeError {
            name: String::new(),
            payload: "{".into(),
            source,
        });
        assert!(!err.is_fatal());
    }
}
