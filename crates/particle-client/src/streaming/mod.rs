//! Event streaming for Particle cloud subscriptions
//!
//! The cloud pushes events as a never-ending `text/event-stream` body:
//!
//! ```text
//! event: temp
//! data: {"data":"21.5","ttl":60,"published_at":"2023-01-01T00:00:00Z","coreid":"..."}
//!
//! ```
//!
//! [`EventSession`] owns the connection and runs the read loop; events are
//! delivered on a bounded channel, undecodable records on a separate error
//! channel.
//!
//! # Example
//!
//! ```no_run
//! use particle_client::{Client, EventScope};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new("my-access-token")?;
//!
//! let session = client.open_events(EventScope::Mine, Some("temp")).await?;
//! let mut events = session.take_events().expect("fresh session");
//!
//! let listener = session.clone();
//! let handle = tokio::spawn(async move { listener.listen().await });
//!
//! while let Some(event) = events.recv().await {
//!     println!("{} = {} (ttl {}s)", event.name, event.data, event.ttl);
//!     if event.data == "done" {
//!         session.stop();
//!     }
//! }
//!
//! handle.await??;
//! # Ok(())
//! # }
//! ```

mod decoder;
mod parser;
mod session;
mod types;

pub use decoder::decode;
pub use parser::{FrameParser, Record, EVENT_DATA_LABEL, EVENT_NAME_LABEL, MAX_LINE_LENGTH};
pub(crate) use session::ByteStream;
pub use session::{EventSession, SessionState, DEFAULT_ERROR_BUFFER, DEFAULT_EVENT_BUFFER};
pub use types::{DecodeError, Event, EventScope, StreamError, StreamResult};
