//! Particle Cloud Client Library
//!
//! Provides a typed HTTP client for the Particle device cloud, including
//! live event subscriptions over server-sent events.
//!
//! # Example
//!
//! ```rust,no_run
//! use particle_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("my-access-token")?;
//!
//!     // List devices
//!     let devices = client.list_devices().await?;
//!
//!     // Read a cloud variable
//!     let temp = client.get_variable(&devices[0].id, "temperature").await?;
//!     println!("{}", temp.result);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Events
//!
//! ```rust,ignore
//! let session = client.open_device_events(&device.id, Some("temp")).await?;
//! let mut events = session.take_events().expect("fresh session");
//!
//! let listener = session.clone();
//! tokio::spawn(async move { listener.listen().await });
//!
//! while let Some(event) = events.recv().await {
//!     println!("{} {}", event.name, event.data);
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides utilities for integration testing:
//!
//! ```rust,ignore
//! use particle_client::testing::{event_stream, TestServer};
//!
//! let server = TestServer::start(router).await?;
//! let devices = server.client.list_devices().await?;
//! ```

mod client;
mod error;
pub mod streaming;
pub mod testing;
mod types;

pub use client::{Client, ClientConfig, DEFAULT_BASE_URL};
pub use error::{ClientError, Result};
pub use types::*;

// Re-export streaming types for convenience
pub use streaming::{Event, EventScope, EventSession, SessionState, StreamError};
