//! Particle cloud HTTP client implementation

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ClientError, Result};
use crate::streaming::{
    EventScope, EventSession, StreamError, StreamResult, DEFAULT_ERROR_BUFFER,
    DEFAULT_EVENT_BUFFER,
};
use crate::types::*;

/// Default cloud API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.particle.io";

/// User agent sent with every request
const USER_AGENT: &str = concat!("particle-rs/", env!("CARGO_PKG_VERSION"));
/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_STREAM: &str = "text/event-stream";

/// Client tuning
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Total timeout for request/response calls (not applied to event streams)
    pub timeout: Duration,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// Capacity of each session's event channel
    pub event_buffer: usize,
    /// Capacity of each session's decode error channel
    pub error_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_buffer: DEFAULT_EVENT_BUFFER,
            error_buffer: DEFAULT_ERROR_BUFFER,
        }
    }
}

/// Particle cloud API client
///
/// Every request carries the access token as a bearer `Authorization`
/// header.
#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
}

impl Client {
    /// Create a client for the public cloud
    ///
    /// # Arguments
    /// * `token` - Particle access token
    pub fn new(token: &str) -> Result<Self> {
        Self::with_config(DEFAULT_BASE_URL, token, ClientConfig::default())
    }

    /// Create a client with a custom endpoint and configuration
    pub fn with_config(base_url: &str, token: &str, config: ClientConfig) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ClientError::ParseError(format!("Invalid auth token: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        // No client-wide total timeout: event stream bodies never end
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build an endpoint URL from path segments, percent-encoding each one
    pub fn endpoint_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// List the devices claimed by the token's account
    #[instrument(skip(self))]
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let url = self.endpoint_url(&["v1", "devices"])?;
        debug!("Listing devices from {}", url);

        let response = self.get(url).send().await?;
        self.handle_response(response).await
    }

    /// Get a single device by id
    #[instrument(skip(self))]
    pub async fn get_device(&self, device_id: &str) -> Result<Device> {
        let url = self.endpoint_url(&["v1", "devices", device_id])?;

        let response = self.get(url).send().await?;
        match self.handle_response(response).await {
            Err(ClientError::ServerError { status: 404, .. }) => {
                Err(ClientError::DeviceNotFound(device_id.to_string()))
            }
            other => other,
        }
    }

    // =========================================================================
    // Variables / Functions
    // =========================================================================

    /// Read a cloud variable from a device
    ///
    /// An unknown device or variable is a `ServerError` with status 404; the
    /// cloud's message says which.
    #[instrument(skip(self))]
    pub async fn get_variable(&self, device_id: &str, name: &str) -> Result<VariableValue> {
        let url = self.endpoint_url(&["v1", "devices", device_id, name])?;

        let response = self.get(url).send().await?;
        self.handle_response(response).await
    }

    /// Call a cloud function on a device
    #[instrument(skip(self))]
    pub async fn call_function(
        &self,
        device_id: &str,
        name: &str,
        argument: &str,
    ) -> Result<FunctionResult> {
        let url = self.endpoint_url(&["v1", "devices", device_id, name])?;

        let response = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .header(ACCEPT, "application/json")
            .form(&FunctionCall { arg: argument })
            .send()
            .await?;
        self.handle_response(response).await
    }

    // =========================================================================
    // Event Streams
    // =========================================================================

    /// Open an event stream
    ///
    /// Resolves once the response headers arrive. The returned session is
    /// connected but not yet listening; see [`EventSession::listen`].
    ///
    /// # Arguments
    /// * `scope` - Which feed to subscribe to
    /// * `name` - Optional event name filter (prefix match on the cloud side)
    #[instrument(skip(self))]
    pub async fn open_events(
        &self,
        scope: EventScope,
        name: Option<&str>,
    ) -> StreamResult<EventSession> {
        let url = self
            .endpoint_url(&scope.segments(name)?)
            .map_err(|e| StreamError::InvalidEndpoint(e.to_string()))?;

        debug!("Connecting to event stream: {}", url);

        let session = EventSession::new(
            url.as_str(),
            self.config.event_buffer,
            self.config.error_buffer,
        );

        let response = self
            .client
            .get(url)
            .header(ACCEPT, EVENT_STREAM)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response, status).await;
            return Err(StreamError::Server {
                status: status.as_u16(),
                message,
            });
        }

        session.attach(Box::pin(response.bytes_stream()))?;
        Ok(session)
    }

    /// Open the public event stream
    pub async fn open_public_events(&self, name: Option<&str>) -> StreamResult<EventSession> {
        self.open_events(EventScope::Public, name).await
    }

    /// Open the stream of events from the account's own devices
    pub async fn open_my_events(&self, name: Option<&str>) -> StreamResult<EventSession> {
        self.open_events(EventScope::Mine, name).await
    }

    /// Open the stream of events from one device
    pub async fn open_device_events(
        &self,
        device_id: &str,
        name: Option<&str>,
    ) -> StreamResult<EventSession> {
        self.open_events(EventScope::Device(device_id.to_string()), name)
            .await
    }

    // =========================================================================
    // Helper Methods
    // =========================================================================

    fn get(&self, url: Url) -> RequestBuilder {
        self.client
            .get(url)
            .timeout(self.config.timeout)
            .header(ACCEPT, "application/json")
    }

    /// Handle response and deserialize JSON
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ClientError::ParseError(e.to_string()))
        } else {
            Err(self.extract_error_from_status(response, status).await)
        }
    }

    async fn extract_error_from_status(
        &self,
        response: reqwest::Response,
        status: StatusCode,
    ) -> ClientError {
        let message = error_message(response, status).await;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ClientError::Timeout,
            _ => ClientError::server_error(status.as_u16(), message),
        }
    }
}

/// Best message from an error response: the JSON error body, the raw text,
/// or just the status
async fn error_message(response: reqwest::Response, status: StatusCode) -> String {
    let text = response.text().await.unwrap_or_default();

    serde_json::from_str::<ErrorResponse>(&text)
        .ok()
        .and_then(|err| err.message())
        .or_else(|| {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {}", status))
}
